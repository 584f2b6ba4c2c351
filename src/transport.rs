//! Transport abstraction used by the dispatcher.
//!
//! A [`Connector`] builds a handle from configuration without talking to the
//! network; the handle is then verified once and used for every send of a
//! single dispatch call. Handles are never shared between calls.

use crate::config::TransportConfig;
use crate::email::Envelope;
use crate::errors::TransportError;
use async_trait::async_trait;

/// What the provider returns for an accepted envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub message_id: String,
    /// Final server reply, if the provider gives one.
    pub response: Option<String>,
}

/// An open channel able to transmit envelopes.
///
/// Workers sockets are not `Send`, hence `?Send`.
#[async_trait(?Send)]
pub trait Transport {
    /// Handshake and authenticate. Must succeed before any [`Transport::send`].
    async fn verify(&mut self) -> Result<(), TransportError>;

    /// Transmit one envelope.
    async fn send(&mut self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError>;

    /// Release the channel. Errors are not reported.
    async fn close(&mut self) {}
}

/// Builds transport handles.
pub trait Connector {
    type Transport: Transport;

    /// Construct a handle. No network I/O beyond what creating the handle needs.
    fn open(&self, config: &TransportConfig) -> Result<Self::Transport, TransportError>;
}
