//! Maps transport failures onto the response taxonomy.

use crate::errors::{ErrorKind, TransportError};

/// Classified transport failure: the kind plus the original text for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: ErrorKind,
    pub diagnostic: String,
}

pub fn classify(error: &TransportError) -> Classified {
    let kind = match error {
        TransportError::Authentication(_) => ErrorKind::AuthenticationError,
        TransportError::Connection(_) | TransportError::Timeout(_) => ErrorKind::ConnectivityError,
        _ => ErrorKind::UnknownTransportError,
    };
    Classified {
        kind,
        diagnostic: error.to_string(),
    }
}
