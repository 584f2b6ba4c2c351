//! contact-dispatch: contact-request notifications over SMTP from Cloudflare Workers (Rust).
//!
//! A request is validated, rendered into a notification for its recipient and a
//! courtesy acknowledgment for its sender, then sent over one verified SMTP
//! session. Only the primary send decides the outcome.

pub mod classifier;
pub mod composer;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod errors;
pub mod handler;
pub mod logger;
pub mod mailer;
pub mod request;
pub mod transport;
pub mod utils;
pub mod validator;

#[cfg(target_arch = "wasm32")]
mod entry;

// Re-exports
pub use classifier::{classify, Classified};
pub use composer::{compose, AckTemplate, ComposedMessage};
pub use config::{AuthType, Credentials, SecurityMode, ServiceConfig, TransportConfig};
pub use dispatch::{DispatchFailure, DispatchOutcome, Dispatcher};
pub use email::{Envelope, Mailbox};
pub use errors::{ConfigError, ErrorKind, TransportError, ValidationError};
pub use handler::{gate, handle, outcome_response, CorsPolicy, Gate, ResponseBody};
pub use logger::{LogLevel, Logger};
pub use mailer::{SmtpConnector, SmtpTransport};
pub use request::{DeliveryPriority, NotificationRequest, RawRequest, UrgencyLevel};
pub use transport::{Connector, ProviderReceipt, Transport};
pub use utils::{encode_header, encode_quoted_printable, escape_html, is_valid_email};
pub use validator::validate;
