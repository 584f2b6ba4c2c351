//! Dispatch orchestration: validate, compose, connect, send, acknowledge.

use crate::classifier::classify;
use crate::composer::{compose, ComposedMessage};
use crate::config::ServiceConfig;
use crate::email::{Envelope, Mailbox};
use crate::errors::{ErrorKind, TransportError};
use crate::logger::Logger;
use crate::request::{DeliveryPriority, NotificationRequest, RawRequest};
use crate::transport::{Connector, ProviderReceipt, Transport};
use crate::validator::validate;
use chrono::{DateTime, SecondsFormat, Utc};

/// Failure part of a [`DispatchOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub kind: ErrorKind,
    /// Safe to show to the requester.
    pub message: String,
    /// Original transport error text, for logs and diagnostics.
    pub diagnostic: Option<String>,
}

/// Result of one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<DispatchFailure>,
}

impl DispatchOutcome {
    pub fn delivered(receipt: ProviderReceipt) -> Self {
        Self {
            success: true,
            message_id: Some(receipt.message_id),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            timestamp: Utc::now(),
            error: Some(DispatchFailure {
                kind,
                message: message.into(),
                diagnostic,
            }),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// ISO-8601 timestamp as sent in responses.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Runs dispatch calls against transports built by `C`.
///
/// Holds configuration only; every call opens its own transport.
pub struct Dispatcher<C> {
    connector: C,
    config: ServiceConfig,
    logger: Logger,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(connector: C, config: ServiceConfig) -> Self {
        let logger = Logger::new(config.log_level, "[contact-dispatch]");
        Self {
            connector,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Primary and acknowledgment envelopes for a validated request.
    pub fn envelopes(&self, request: &NotificationRequest, composed: &ComposedMessage) -> (Envelope, Envelope) {
        let sender = &self.config.sender;

        let primary = Envelope::new(
            Mailbox::with_name(sender.email.clone(), request.sender_name.clone()),
            Mailbox::new(request.recipient_address.clone()),
            composed.subject_line.clone(),
        )
        .reply_to(Mailbox::new(request.reply_target()))
        .text(composed.primary_text.clone())
        .html(composed.primary_html.clone())
        .priority(request.urgency.priority());

        let ack = Envelope::new(
            Mailbox::with_name(sender.email.clone(), self.config.ack.site_name.clone()),
            Mailbox::with_name(request.sender_address.clone(), request.sender_name.clone()),
            composed.ack_subject.clone(),
        )
        .reply_to(Mailbox::new(request.recipient_address.clone()))
        .text(composed.ack_text.clone())
        .html(composed.ack_html.clone())
        .priority(DeliveryPriority::Normal);

        (primary, ack)
    }

    fn transport_failure(&self, stage: &str, error: &TransportError) -> DispatchOutcome {
        let classified = classify(error);
        self.logger.error(&format!(
            "{} failed ({}): {}",
            stage,
            classified.kind.code(),
            classified.diagnostic
        ));
        DispatchOutcome::failed(
            classified.kind,
            classified.kind.user_message(),
            Some(classified.diagnostic),
        )
    }

    /// One full dispatch call. Never retries; the acknowledgment never affects the outcome.
    pub async fn dispatch(&self, mut raw: RawRequest) -> DispatchOutcome {
        if raw.to.as_deref().map_or(true, |t| t.trim().is_empty()) {
            raw.to = self.config.default_recipient.clone();
        }

        let request = match validate(&raw) {
            Ok(r) => r,
            Err(e) => {
                self.logger.warn(&format!("rejected request: {}", e));
                return DispatchOutcome::failed(ErrorKind::ValidationError, e.to_string(), None);
            }
        };

        let composed = compose(&request, &self.config.ack);
        let (primary, ack) = self.envelopes(&request, &composed);

        let mut transport = match self.connector.open(&self.config.transport) {
            Ok(t) => t,
            Err(e) => return self.transport_failure("open", &e),
        };
        if let Err(e) = transport.verify().await {
            transport.close().await;
            return self.transport_failure("verify", &e);
        }

        let receipt = match transport.send(&primary).await {
            Ok(r) => r,
            Err(e) => {
                transport.close().await;
                return self.transport_failure("primary send", &e);
            }
        };
        self.logger.info(&format!(
            "delivered {} to {}",
            receipt.message_id, request.recipient_address
        ));

        match transport.send(&ack).await {
            Ok(r) => self.logger.debug(&format!("acknowledgment {} sent", r.message_id)),
            Err(e) => self.logger.warn(&format!("acknowledgment to sender failed: {}", e)),
        }
        transport.close().await;

        DispatchOutcome::delivered(receipt)
    }
}
