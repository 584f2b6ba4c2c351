//! Service and transport configuration.
//!
//! Values are passed explicitly into the dispatcher. In a deployed Worker they
//! come from vars and secrets via [`ServiceConfig::from_env`].

use crate::composer::AckTemplate;
use crate::email::Mailbox;
use crate::errors::ConfigError;
use crate::logger::LogLevel;
use crate::utils::is_valid_email;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Auth mechanisms the client may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Plain,
    Login,
}

/// How the SMTP socket is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Implicit TLS from the first byte (usually port 465).
    Tls,
    /// Plain connection upgraded when the server offers STARTTLS.
    #[default]
    StartTls,
    None,
}

impl std::str::FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "true" => Ok(SecurityMode::Tls),
            "starttls" => Ok(SecurityMode::StartTls),
            "none" | "false" => Ok(SecurityMode::None),
            other => Err(other.to_string()),
        }
    }
}

/// SMTP credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything needed to open and verify a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub security: SecurityMode,
    pub credentials: Option<Credentials>,
    #[serde(default = "default_auth_types")]
    pub auth_type: Vec<AuthType>,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_port() -> u16 {
    587
}
fn default_auth_types() -> Vec<AuthType> {
    vec![AuthType::Plain, AuthType::Login]
}
fn default_client_name() -> String {
    "127.0.0.1".to_string()
}
fn default_socket_timeout_ms() -> u64 {
    60_000
}
fn default_response_timeout_ms() -> u64 {
    30_000
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: SecurityMode::default(),
            credentials: None,
            auth_type: default_auth_types(),
            client_name: default_client_name(),
            socket_timeout_ms: default_socket_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Top-level configuration for one deployed dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    pub transport: TransportConfig,
    /// Mailbox both envelopes are sent from.
    pub sender: Mailbox,
    /// Used when the payload has no `to`.
    #[serde(default)]
    pub default_recipient: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub ack: AckTemplate,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_with<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServiceConfig {
    /// Builds the configuration from a key lookup (env vars, secrets, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = non_empty(lookup("SMTP_HOST")).ok_or(ConfigError::Missing("SMTP_HOST"))?;
        let mut transport = TransportConfig::new(host, parse_with(&lookup, "SMTP_PORT", default_port())?);
        transport.security = parse_with(&lookup, "SMTP_SECURITY", SecurityMode::default())?;
        transport.socket_timeout_ms =
            parse_with(&lookup, "SMTP_TIMEOUT_MS", default_socket_timeout_ms())?;
        transport.response_timeout_ms =
            parse_with(&lookup, "SMTP_RESPONSE_TIMEOUT_MS", default_response_timeout_ms())?;

        let user = non_empty(lookup("SMTP_USER"));
        transport.credentials = match (user.clone(), non_empty(lookup("SMTP_PASS"))) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SMTP_PASS")),
            (None, Some(_)) => return Err(ConfigError::Missing("SMTP_USER")),
        };

        if let Some(list) = non_empty(lookup("SMTP_AUTH")) {
            transport.auth_type = split_list(&list)
                .into_iter()
                .map(|a| match a.to_ascii_lowercase().as_str() {
                    "plain" => Ok(AuthType::Plain),
                    "login" => Ok(AuthType::Login),
                    _ => Err(ConfigError::Invalid {
                        key: "SMTP_AUTH",
                        value: a.clone(),
                    }),
                })
                .collect::<Result<_, _>>()?;
        }

        let sender_address = non_empty(lookup("MAIL_FROM"))
            .or(user)
            .ok_or(ConfigError::Missing("MAIL_FROM"))?;
        if !is_valid_email(&sender_address) {
            return Err(ConfigError::Invalid {
                key: "MAIL_FROM",
                value: sender_address,
            });
        }

        let default_recipient = non_empty(lookup("CONTACT_RECIPIENT"));
        if let Some(ref r) = default_recipient {
            if !is_valid_email(r) {
                return Err(ConfigError::Invalid {
                    key: "CONTACT_RECIPIENT",
                    value: r.clone(),
                });
            }
        }

        let mut ack = AckTemplate::default();
        if let Some(v) = non_empty(lookup("SITE_NAME")) {
            ack.site_name = v;
        }
        if let Some(v) = non_empty(lookup("ACK_RESPONSE_WINDOW")) {
            ack.response_window = v;
        }
        if let Some(v) = non_empty(lookup("ACK_ALTERNATE_CONTACT")) {
            ack.alternate_contact = v;
        }

        Ok(Self {
            transport,
            sender: Mailbox::new(sender_address),
            default_recipient,
            allowed_origins: non_empty(lookup("ALLOWED_ORIGINS"))
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            log_level: parse_with(&lookup, "LOG_LEVEL", LogLevel::default())?,
            ack,
        })
    }

    /// Reads secrets first, then plain vars.
    pub fn from_env(env: &worker::Env) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            env.secret(key)
                .map(|v| v.to_string())
                .or_else(|_| env.var(key).map(|v| v.to_string()))
                .ok()
        })
    }
}
