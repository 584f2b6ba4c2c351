//! Error types for contact dispatch.

use thiserror::Error;

/// Request rejected before any network activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid email address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

impl ValidationError {
    pub const CODE: &'static str = "VALIDATION_ERROR";
}

/// Failure raised by a transport while opening, verifying or sending.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be constructed from its configuration.
    #[error("Invalid transport configuration: {0}")]
    Config(String),
    /// Credentials were refused or could not be presented.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// Socket could not be opened, was closed, or the server is unavailable.
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    /// The server answered with a non-success reply.
    #[error("Rejected by server: {0}")]
    Rejected(String),
    /// The server reply could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Invalid or incomplete service configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl ConfigError {
    pub const CODE: &'static str = "CONFIG_ERROR";
}

/// Response taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationError,
    AuthenticationError,
    ConnectivityError,
    UnknownTransportError,
    MethodNotAllowed,
    OriginNotAllowed,
}

impl ErrorKind {
    /// Stable code carried in the `error` field of failure responses.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => ValidationError::CODE,
            ErrorKind::AuthenticationError => "AUTH_FAILED",
            ErrorKind::ConnectivityError => "CONNECTION_FAILED",
            ErrorKind::UnknownTransportError => "SEND_FAILED",
            ErrorKind::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorKind::OriginNotAllowed => "ORIGIN_NOT_ALLOWED",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::ValidationError => 400,
            ErrorKind::OriginNotAllowed => 403,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::AuthenticationError
            | ErrorKind::ConnectivityError
            | ErrorKind::UnknownTransportError => 500,
        }
    }

    /// Generic message shown to the requester. Validation failures carry their own text instead.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "The request is missing information or contains an invalid address",
            ErrorKind::AuthenticationError => {
                "The email service rejected our credentials. Please try again later."
            }
            ErrorKind::ConnectivityError => {
                "Unable to reach the email service. Please try again later."
            }
            ErrorKind::UnknownTransportError => "Failed to send your message. Please try again later.",
            ErrorKind::MethodNotAllowed => "Method not allowed",
            ErrorKind::OriginNotAllowed => "Origin not allowed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::ValidationError.http_status(), 400);
        assert_eq!(ErrorKind::MethodNotAllowed.http_status(), 405);
        assert_eq!(ErrorKind::AuthenticationError.http_status(), 500);
        assert_eq!(ErrorKind::ConnectivityError.http_status(), 500);
        assert_eq!(ErrorKind::UnknownTransportError.http_status(), 500);
    }

    #[test]
    fn test_validation_message() {
        let e = ValidationError::MissingField("name");
        assert_eq!(e.to_string(), "Missing required field: name");
    }
}
