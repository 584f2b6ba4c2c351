//! Request validation: required fields and address syntax.

use crate::errors::ValidationError;
use crate::request::{NotificationRequest, RawRequest, UrgencyLevel};
use crate::utils::is_valid_email;

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ValidationError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn address(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if is_valid_email(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        })
    }
}

/// Checks a raw payload and lifts it into a [`NotificationRequest`].
///
/// Field values are carried over as given; only urgency is interpreted,
/// falling back to `normal` when unrecognized.
pub fn validate(raw: &RawRequest) -> Result<NotificationRequest, ValidationError> {
    let name = required(&raw.name, "name")?;
    let from = required(&raw.from, "from")?;
    let message = required(&raw.message, "message")?;
    let to = required(&raw.to, "to")?;

    address(from, "from")?;
    address(to, "to")?;

    let reply_to = raw.reply_to.as_deref().filter(|r| !r.trim().is_empty());
    if let Some(r) = reply_to {
        address(r, "replyTo")?;
    }

    Ok(NotificationRequest {
        sender_name: name.to_string(),
        sender_address: from.to_string(),
        recipient_address: to.to_string(),
        subject: raw.subject.clone().unwrap_or_default(),
        message: message.to_string(),
        urgency: UrgencyLevel::parse_lenient(raw.urgency.as_deref()),
        requester_id: raw.requester_id.clone(),
        client_timestamp: raw.timestamp.clone(),
        reply_to: reply_to.map(str::to_string),
    })
}
