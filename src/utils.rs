//! Address syntax, markup escaping and MIME encodings.

use regex::Regex;
use std::sync::OnceLock;

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("address pattern compiles")
    })
}

/// Checks `local@domain.tld` shape: no whitespace, one `@`, a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && address_pattern().is_match(email)
}

/// Escapes a value for interpolation into HTML text or attribute context.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalizes CRLF and lone CR to LF.
pub fn normalize_newlines(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Quoted-printable encoding (RFC 2045).
pub fn encode_quoted_printable(text: &str, line_length: usize) -> String {
    let bytes = text.as_bytes();
    let mut result = String::new();
    let mut current_line_length = 0;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte == b'\n' {
            result.push_str("\r\n");
            current_line_length = 0;
            i += 1;
            continue;
        }
        if byte == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            result.push_str("\r\n");
            current_line_length = 0;
            i += 2;
            continue;
        }

        let is_whitespace = byte == b' ' || byte == b'\t';
        let next_is_line_break = matches!(bytes.get(i + 1), None | Some(b'\n') | Some(b'\r'));
        let needs_encoding = (byte < 32 && !is_whitespace)
            || byte > 126
            || byte == b'='
            || (is_whitespace && next_is_line_break);

        let encoded = if needs_encoding {
            format!("={:02X}", byte)
        } else {
            char::from(byte).to_string()
        };

        if current_line_length + encoded.len() > line_length.saturating_sub(3) {
            result.push_str("=\r\n");
            current_line_length = 0;
        }
        result.push_str(&encoded);
        current_line_length += encoded.len();
        i += 1;
    }

    result
}

fn needs_encoding(text: &str) -> bool {
    text.chars().any(|c| !c.is_ascii() || c.is_ascii_control())
}

fn encode_word(text: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut encoded = String::new();
    for byte in text.bytes() {
        if byte == b' ' {
            encoded.push('_');
        } else if keep(byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("={:02X}", byte));
        }
    }
    format!("=?UTF-8?Q?{}?=", encoded)
}

/// RFC 2047 header encoding (UTF-8 Q) for unstructured headers such as `Subject`.
///
/// Plain printable ASCII passes through. Anything non-ASCII or containing a
/// control character (CR and LF included) becomes a single encoded-word.
pub fn encode_header(text: &str) -> String {
    if !needs_encoding(text) {
        return text.to_string();
    }
    encode_word(text, |b| {
        (33..=126).contains(&b) && b != b'?' && b != b'=' && b != b'_'
    })
}

/// Display name for an address header: an RFC 2047 `phrase`.
///
/// Printable ASCII is returned as a quoted-string. Otherwise an encoded-word
/// restricted to the phrase-safe set, never wrapped in quotes.
pub fn encode_display_name(name: &str) -> String {
    if !needs_encoding(name) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("\"{}\"", escaped);
    }
    encode_word(name, |b| {
        b.is_ascii_alphanumeric() || matches!(b, b'!' | b'*' | b'+' | b'-' | b'/')
    })
}
