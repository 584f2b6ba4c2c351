//! Envelope building and MIME encoding.

use crate::request::DeliveryPriority;
use crate::utils::{encode_display_name, encode_header, encode_quoted_printable};
use chrono::{DateTime, Utc};

/// Address with optional display name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    pub email: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    pub fn domain(&self) -> &str {
        self.email.rsplit_once('@').map(|(_, d)| d).unwrap_or("localhost")
    }

    /// Header form: `"Name" <addr>`, `=?UTF-8?Q?...?= <addr>` or bare `addr`.
    pub fn to_header(&self) -> String {
        match self.name {
            Some(ref n) => format!("{} <{}>", encode_display_name(n), self.email),
            None => self.email.clone(),
        }
    }
}

/// Fully composed message ready for transmission.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub reply_to: Option<Mailbox>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub priority: DeliveryPriority,
    pub message_id: String,
    pub date: DateTime<Utc>,
}

impl Envelope {
    /// New envelope with a fresh `Message-ID` on the sender's domain.
    pub fn new(from: Mailbox, to: Mailbox, subject: impl Into<String>) -> Self {
        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), from.domain());
        Self {
            from,
            to: vec![to],
            reply_to: None,
            subject: subject.into(),
            text: None,
            html: None,
            priority: DeliveryPriority::Normal,
            message_id,
            date: Utc::now(),
        }
    }

    pub fn reply_to(mut self, mailbox: Mailbox) -> Self {
        self.reply_to = Some(mailbox);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn priority(mut self, priority: DeliveryPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Recipient addresses for `RCPT TO`.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.iter().map(|m| m.email.as_str())
    }

    /// Headers in emission order.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("From", self.from.to_header()),
            (
                "To",
                self.to
                    .iter()
                    .map(Mailbox::to_header)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        ];
        if let Some(ref r) = self.reply_to {
            headers.push(("Reply-To", r.to_header()));
        }
        headers.push(("Subject", encode_header(&self.subject)));
        headers.push(("Date", self.date.to_rfc2822()));
        headers.push(("Message-ID", self.message_id.clone()));
        headers.push(("X-Priority", self.priority.x_priority().to_string()));
        headers.push(("Importance", self.priority.importance().to_string()));
        headers.push(("MIME-Version", "1.0".to_string()));
        headers
    }

    fn generate_safe_boundary(prefix: &str) -> String {
        let mut bytes = [0u8; 16];
        if getrandom::getrandom(&mut bytes).is_err() {
            bytes = *uuid::Uuid::new_v4().as_bytes();
        }
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}{}", prefix, hex)
    }

    fn apply_dot_stuffing(data: &str) -> String {
        let mut result = data.replace("\r\n.", "\r\n..");
        if result.starts_with('.') {
            result.insert(0, '.');
        }
        result
    }

    fn push_part(out: &mut String, boundary: &str, content_type: &str, body: &str) {
        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str(&format!("Content-Type: {}; charset=\"UTF-8\"\r\n", content_type));
        out.push_str("Content-Transfer-Encoding: quoted-printable\r\n\r\n");
        out.push_str(&encode_quoted_printable(body, 76));
        out.push_str("\r\n\r\n");
    }

    /// Raw MIME message for the SMTP DATA phase, including the final CRLF.CRLF.
    pub fn to_mime(&self) -> String {
        let boundary = Self::generate_safe_boundary("alternative_");

        let mut data: String = self
            .headers()
            .into_iter()
            .map(|(k, v)| format!("{}: {}\r\n", k, v))
            .collect();
        data.push_str(&format!(
            "Content-Type: multipart/alternative; boundary=\"{}\"\r\n\r\n",
            boundary
        ));

        if let Some(ref text) = self.text {
            Self::push_part(&mut data, &boundary, "text/plain", text);
        }
        if let Some(ref html) = self.html {
            Self::push_part(&mut data, &boundary, "text/html", html);
        }
        data.push_str(&format!("--{}--\r\n", boundary));

        format!("{}\r\n.\r\n", Self::apply_dot_stuffing(&data))
    }
}
