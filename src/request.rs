//! Contact request as received on the wire and after validation.

use serde::Deserialize;

/// Flat payload posted by the contact form. Every field is optional here;
/// the validator decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRequest {
    pub name: Option<String>,
    #[serde(alias = "email")]
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub urgency: Option<String>,
    #[serde(alias = "userId")]
    pub requester_id: Option<String>,
    pub timestamp: Option<String>,
    pub reply_to: Option<String>,
}

/// Urgency chosen by the requester. Display and priority hinting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrgencyLevel {
    Urgent,
    High,
    #[default]
    Normal,
}

/// Transport priority hint derived from urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPriority {
    High,
    #[default]
    Normal,
}

impl UrgencyLevel {
    /// Lenient parse: anything unrecognized (or absent) is `Normal`.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("urgent") => UrgencyLevel::Urgent,
            Some("high") => UrgencyLevel::High,
            _ => UrgencyLevel::Normal,
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            UrgencyLevel::Urgent => "🔴",
            UrgencyLevel::High => "🟠",
            UrgencyLevel::Normal => "🟢",
        }
    }

    pub fn priority(self) -> DeliveryPriority {
        match self {
            UrgencyLevel::Urgent | UrgencyLevel::High => DeliveryPriority::High,
            UrgencyLevel::Normal => DeliveryPriority::Normal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UrgencyLevel::Urgent => "URGENT",
            UrgencyLevel::High => "HIGH",
            UrgencyLevel::Normal => "NORMAL",
        }
    }
}

impl DeliveryPriority {
    /// `X-Priority` header value.
    pub fn x_priority(self) -> &'static str {
        match self {
            DeliveryPriority::High => "1 (Highest)",
            DeliveryPriority::Normal => "3 (Normal)",
        }
    }

    /// `Importance` header value.
    pub fn importance(self) -> &'static str {
        match self {
            DeliveryPriority::High => "high",
            DeliveryPriority::Normal => "normal",
        }
    }
}

/// A validated contact request. Built only by [`crate::validator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub sender_name: String,
    pub sender_address: String,
    pub recipient_address: String,
    pub subject: String,
    pub message: String,
    pub urgency: UrgencyLevel,
    pub requester_id: Option<String>,
    pub client_timestamp: Option<String>,
    pub reply_to: Option<String>,
}

impl NotificationRequest {
    /// Where replies to the primary notification should go.
    pub fn reply_target(&self) -> &str {
        self.reply_to.as_deref().unwrap_or(&self.sender_address)
    }
}
