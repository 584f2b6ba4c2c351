//! Renders the notification and acknowledgment bodies for a request.
//!
//! Pure: no I/O. Every user-supplied value placed into HTML goes through
//! [`escape_html`].

use crate::request::NotificationRequest;
use crate::utils::{escape_html, normalize_newlines};
use serde::Deserialize;

/// Static text used in the acknowledgment sent back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AckTemplate {
    pub site_name: String,
    pub response_window: String,
    pub alternate_contact: String,
}

impl Default for AckTemplate {
    fn default() -> Self {
        Self {
            site_name: "Our team".to_string(),
            response_window: "24-48 hours".to_string(),
            alternate_contact: "replying directly to this email".to_string(),
        }
    }
}

/// Rendered bodies and subjects for one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject_line: String,
    pub primary_html: String,
    pub primary_text: String,
    pub ack_subject: String,
    pub ack_html: String,
    pub ack_text: String,
}

const NOT_PROVIDED: &str = "not provided";

fn display_subject(subject: &str) -> &str {
    if subject.trim().is_empty() {
        "(no subject)"
    } else {
        subject
    }
}

/// Subject for the primary notification: indicator, subject, sender.
pub fn subject_line(request: &NotificationRequest) -> String {
    format!(
        "{} {} - from {}",
        request.urgency.indicator(),
        display_subject(&request.subject),
        request.sender_name
    )
}

fn message_html(message: &str) -> String {
    normalize_newlines(message)
        .split('\n')
        .map(escape_html)
        .collect::<Vec<_>>()
        .join("<br>\n")
}

fn primary_html(request: &NotificationRequest) -> String {
    let name = escape_html(&request.sender_name);
    let reply = escape_html(request.reply_target());
    let subject = escape_html(display_subject(&request.subject));
    let timestamp = escape_html(request.client_timestamp.as_deref().unwrap_or(NOT_PROVIDED));
    let requester = escape_html(request.requester_id.as_deref().unwrap_or(NOT_PROVIDED));
    let urgency = request.urgency;

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #222;">
<h2>New contact request</h2>
<table cellpadding="4">
<tr><td><strong>From:</strong></td><td>{name} &lt;<a href="mailto:{reply}">{reply}</a>&gt;</td></tr>
<tr><td><strong>Subject:</strong></td><td>{subject}</td></tr>
<tr><td><strong>Urgency:</strong></td><td>{indicator} {label}</td></tr>
</table>
<h3>Message</h3>
<div style="padding: 12px; background: #f6f6f6; border-radius: 4px;">{message}</div>
<hr>
<p style="font-size: 12px; color: #666;">Submitted at: {timestamp}<br>
Requester ID: {requester}</p>
</body>
</html>"#,
        indicator = urgency.indicator(),
        label = urgency.label(),
        message = message_html(&request.message),
    )
}

fn primary_text(request: &NotificationRequest) -> String {
    let urgency = request.urgency;
    format!(
        "New contact request\n\n\
         From: {name} <{reply}>\n\
         Subject: {subject}\n\
         Urgency: {indicator} {label}\n\n\
         Message:\n{message}\n\n\
         ---\n\
         Submitted at: {timestamp}\n\
         Requester ID: {requester}\n",
        name = request.sender_name,
        reply = request.reply_target(),
        subject = display_subject(&request.subject),
        indicator = urgency.indicator(),
        label = urgency.label(),
        message = normalize_newlines(&request.message),
        timestamp = request.client_timestamp.as_deref().unwrap_or(NOT_PROVIDED),
        requester = request.requester_id.as_deref().unwrap_or(NOT_PROVIDED),
    )
}

fn ack_subject(request: &NotificationRequest) -> String {
    format!("We received your message: {}", display_subject(&request.subject))
}

fn ack_html(request: &NotificationRequest, template: &AckTemplate) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #222;">
<p>Hi {name},</p>
<p>Thank you for getting in touch. We received your message "{subject}" and will get back to you within {window}.</p>
<p>If you need to reach us sooner, you can contact us by {alternate}.</p>
<p>{site}</p>
</body>
</html>"#,
        name = escape_html(&request.sender_name),
        subject = escape_html(display_subject(&request.subject)),
        window = escape_html(&template.response_window),
        alternate = escape_html(&template.alternate_contact),
        site = escape_html(&template.site_name),
    )
}

fn ack_text(request: &NotificationRequest, template: &AckTemplate) -> String {
    format!(
        "Hi {name},\n\n\
         Thank you for getting in touch. We received your message \"{subject}\" \
         and will get back to you within {window}.\n\n\
         If you need to reach us sooner, you can contact us by {alternate}.\n\n\
         {site}\n",
        name = request.sender_name,
        subject = display_subject(&request.subject),
        window = template.response_window,
        alternate = template.alternate_contact,
        site = template.site_name,
    )
}

/// Renders everything the orchestrator needs to build both envelopes.
pub fn compose(request: &NotificationRequest, template: &AckTemplate) -> ComposedMessage {
    ComposedMessage {
        subject_line: subject_line(request),
        primary_html: primary_html(request),
        primary_text: primary_text(request),
        ack_subject: ack_subject(request),
        ack_html: ack_html(request, template),
        ack_text: ack_text(request, template),
    }
}
