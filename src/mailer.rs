//! SMTP transport over a Cloudflare Workers TCP socket.

use crate::config::{AuthType, Credentials, SecurityMode, TransportConfig};
use crate::email::Envelope;
use crate::errors::TransportError;
use crate::logger::{LogLevel, Logger};
use crate::transport::{Connector, ProviderReceipt, Transport};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use futures_util::future::{select, Either};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use worker::{ConnectionBuilder, Delay, SecureTransport, Socket};

/// Opens [`SmtpTransport`] handles.
#[derive(Debug, Clone, Default)]
pub struct SmtpConnector {
    log_level: LogLevel,
}

impl SmtpConnector {
    pub fn new(log_level: LogLevel) -> Self {
        Self { log_level }
    }
}

impl Connector for SmtpConnector {
    type Transport = SmtpTransport;

    fn open(&self, config: &TransportConfig) -> Result<SmtpTransport, TransportError> {
        if config.host.trim().is_empty() {
            return Err(TransportError::Config("empty SMTP host".into()));
        }
        if config.port == 0 {
            return Err(TransportError::Config("SMTP port must be non-zero".into()));
        }

        let secure = match config.security {
            SecurityMode::Tls => SecureTransport::On,
            SecurityMode::StartTls => SecureTransport::StartTls,
            SecurityMode::None => SecureTransport::Off,
        };
        let socket = ConnectionBuilder::new()
            .secure_transport(secure)
            .allow_half_open(false)
            .connect(config.host.clone(), config.port)
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(SmtpTransport {
            socket: Some(socket),
            logger: Logger::new(
                self.log_level,
                format!("[smtp:{}:{}]", config.host, config.port),
            ),
            config: config.clone(),
            capabilities: Capabilities::default(),
            verified: false,
        })
    }
}

/// One parsed (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let code = raw
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| TransportError::Protocol(format!("unexpected reply: {:?}", raw.trim())))?;
        Ok(Self {
            code,
            text: raw.trim_end().to_string(),
        })
    }

    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// Maps a non-success reply at `stage` to a transport error.
pub fn reply_error(stage: &str, reply: &Reply) -> TransportError {
    let detail = format!("{} failed: {}", stage, reply.text);
    match reply.code {
        421 => TransportError::Connection(detail),
        530 | 534 | 535 | 538 => TransportError::Authentication(detail),
        _ => TransportError::Rejected(detail),
    }
}

/// Extensions advertised in the EHLO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub auth: Vec<AuthType>,
    pub allow_auth: bool,
    pub start_tls: bool,
}

impl Capabilities {
    pub fn parse(ehlo: &str) -> Self {
        let mut caps = Self::default();
        for line in ehlo.lines().skip(1) {
            let keyword = line.get(4..).unwrap_or("").trim().to_ascii_uppercase();
            let mut words = keyword.split(|c: char| c == ' ' || c == '=');
            match words.next() {
                Some("AUTH") => {
                    caps.allow_auth = true;
                    for mechanism in words {
                        let parsed = match mechanism {
                            "PLAIN" => Some(AuthType::Plain),
                            "LOGIN" => Some(AuthType::Login),
                            _ => None,
                        };
                        if let Some(m) = parsed {
                            if !caps.auth.contains(&m) {
                                caps.auth.push(m);
                            }
                        }
                    }
                }
                Some("STARTTLS") => caps.start_tls = true,
                _ => {}
            }
        }
        caps
    }
}

/// Whether a session is upgraded with `STARTTLS` after the first EHLO.
pub fn should_start_tls(mode: SecurityMode, capabilities: &Capabilities) -> bool {
    mode == SecurityMode::StartTls && capabilities.start_tls
}

/// How the session authenticates after EHLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlan {
    /// No credentials configured.
    Skip,
    /// Credentials configured but the server advertises no AUTH.
    Unadvertised,
    Use(AuthType),
    /// AUTH advertised, but none of the configured mechanisms.
    Unsupported,
}

/// Picks the first configured mechanism the server advertises.
pub fn auth_plan(config: &TransportConfig, capabilities: &Capabilities) -> AuthPlan {
    if config.credentials.is_none() {
        return AuthPlan::Skip;
    }
    if !capabilities.allow_auth {
        return AuthPlan::Unadvertised;
    }
    config
        .auth_type
        .iter()
        .copied()
        .find(|m| capabilities.auth.contains(m))
        .map_or(AuthPlan::Unsupported, AuthPlan::Use)
}

/// `MAIL FROM` followed by one `RCPT TO` per recipient.
pub fn envelope_commands(envelope: &Envelope) -> (String, Vec<String>) {
    let mail = format!("MAIL FROM:<{}>", envelope.from.email);
    let rcpts = envelope
        .recipients()
        .map(|r| format!("RCPT TO:<{}>", r))
        .collect();
    (mail, rcpts)
}

/// What happens to the session after a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The server is still in step with us: `RSET` and keep the socket.
    Reset,
    /// The socket may be dead or out of sync: drop it without further commands.
    Abandon,
}

pub fn recovery_for(error: &TransportError) -> Recovery {
    match error {
        TransportError::Timeout(_) | TransportError::Connection(_) | TransportError::Protocol(_) => {
            Recovery::Abandon
        }
        _ => Recovery::Reset,
    }
}

/// Upper bound for `RSET`, `QUIT` and socket close.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    let fut = pin!(fut);
    let delay = pin!(Delay::from(limit));
    match select(fut, delay).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(TransportError::Timeout(format!(
            "{} after {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    TransportError::Connection(e.to_string())
}

/// SMTP session on a single socket.
pub struct SmtpTransport {
    socket: Option<Socket>,
    logger: Logger,
    config: TransportConfig,
    capabilities: Capabilities,
    verified: bool,
}

impl SmtpTransport {
    async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let limit = self.config.response_timeout();
        with_timeout(limit, "server reply", self.read_reply_inner()).await
    }

    async fn read_reply_inner(&mut self) -> Result<Reply, TransportError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| TransportError::Connection("socket already closed".into()))?;
        let mut buf = [0u8; 4096];
        let mut raw = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.map_err(io_error)?;
            if n == 0 {
                return Err(TransportError::Connection("connection closed by server".into()));
            }
            raw.extend_from_slice(&buf[..n]);
            if !raw.ends_with(b"\n") {
                continue;
            }
            // "250-..." continues, "250 ..." ends the reply
            let text = String::from_utf8_lossy(&raw);
            match text.lines().last() {
                Some(last) if last.as_bytes().get(3) == Some(&b'-') => continue,
                _ => break,
            }
        }
        let text = String::from_utf8_lossy(&raw).into_owned();
        self.logger.debug(&format!("S: {}", text.trim_end()));
        Reply::parse(&text)
    }

    async fn write(&mut self, data: &str) -> Result<(), TransportError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| TransportError::Connection("socket already closed".into()))?;
        socket.write_all(data.as_bytes()).await.map_err(io_error)?;
        socket.flush().await.map_err(io_error)
    }

    async fn command(&mut self, line: &str) -> Result<Reply, TransportError> {
        self.logger.debug(&format!("C: {}", line));
        self.write(&format!("{}\r\n", line)).await?;
        self.read_reply().await
    }

    /// Like [`Self::command`] but keeps the payload out of the log.
    async fn secret_command(&mut self, line: &str, label: &str) -> Result<Reply, TransportError> {
        self.logger.debug(&format!("C: {} <redacted>", label));
        self.write(&format!("{}\r\n", line)).await?;
        self.read_reply().await
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        let greeting = self.read_reply().await?;
        if greeting.code != 220 {
            return Err(match reply_error("greeting", &greeting) {
                TransportError::Rejected(d) => TransportError::Connection(d),
                other => other,
            });
        }
        self.ehlo().await?;

        if should_start_tls(self.config.security, &self.capabilities) {
            let reply = self.command("STARTTLS").await?;
            if reply.code != 220 {
                return Err(reply_error("STARTTLS", &reply));
            }
            let socket = self
                .socket
                .take()
                .ok_or_else(|| TransportError::Connection("socket already closed".into()))?;
            self.socket = Some(socket.start_tls());
            self.ehlo().await?;
        }

        self.authenticate().await
    }

    async fn ehlo(&mut self) -> Result<(), TransportError> {
        let reply = self.command(&format!("EHLO {}", self.config.client_name)).await?;
        if reply.code == 421 {
            return Err(reply_error("EHLO", &reply));
        }
        if !reply.is_positive() {
            return self.helo().await;
        }
        self.capabilities = Capabilities::parse(&reply.text);
        Ok(())
    }

    async fn helo(&mut self) -> Result<(), TransportError> {
        let reply = self.command(&format!("HELO {}", self.config.client_name)).await?;
        if !reply.is_positive() {
            return Err(reply_error("HELO", &reply));
        }
        self.capabilities = Capabilities::default();
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<(), TransportError> {
        let creds = match self.config.credentials.clone() {
            Some(c) => c,
            None => return Ok(()),
        };
        let mechanism = match auth_plan(&self.config, &self.capabilities) {
            AuthPlan::Skip => return Ok(()),
            AuthPlan::Unadvertised => {
                self.logger
                    .warn("credentials configured but server does not advertise AUTH; continuing unauthenticated");
                return Ok(());
            }
            AuthPlan::Unsupported => {
                return Err(TransportError::Authentication(
                    "no supported auth mechanism".into(),
                ))
            }
            AuthPlan::Use(m) => m,
        };

        match mechanism {
            AuthType::Plain => self.auth_plain(&creds).await,
            AuthType::Login => self.auth_login(&creds).await,
        }
    }

    async fn auth_plain(&mut self, creds: &Credentials) -> Result<(), TransportError> {
        let blob = format!("\u{0}{}\u{0}{}", creds.username, creds.password);
        let line = format!("AUTH PLAIN {}", B64.encode(blob.as_bytes()));
        let reply = self.secret_command(&line, "AUTH PLAIN").await?;
        if !reply.is_positive() {
            return Err(TransportError::Authentication(reply.text));
        }
        Ok(())
    }

    async fn auth_login(&mut self, creds: &Credentials) -> Result<(), TransportError> {
        let reply = self.command("AUTH LOGIN").await?;
        if !reply.is_intermediate() {
            return Err(TransportError::Authentication(reply.text));
        }
        let reply = self
            .secret_command(&B64.encode(creds.username.as_bytes()), "username")
            .await?;
        if !reply.is_intermediate() {
            return Err(TransportError::Authentication(reply.text));
        }
        let reply = self
            .secret_command(&B64.encode(creds.password.as_bytes()), "password")
            .await?;
        if !reply.is_positive() {
            return Err(TransportError::Authentication(reply.text));
        }
        Ok(())
    }

    async fn transmit(&mut self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError> {
        let (mail, rcpts) = envelope_commands(envelope);
        let reply = self.command(&mail).await?;
        if !reply.is_positive() {
            return Err(reply_error("MAIL FROM", &reply));
        }

        for rcpt in rcpts {
            let reply = self.command(&rcpt).await?;
            if !reply.is_positive() {
                return Err(reply_error(&rcpt, &reply));
            }
        }

        let reply = self.command("DATA").await?;
        if reply.code != 354 {
            return Err(reply_error("DATA", &reply));
        }

        self.logger
            .debug(&format!("C: <message {}>", envelope.message_id));
        self.write(&envelope.to_mime()).await?;
        let reply = self.read_reply().await?;
        if !reply.is_positive() {
            return Err(reply_error("message body", &reply));
        }

        Ok(ProviderReceipt {
            message_id: envelope.message_id.clone(),
            response: Some(reply.text),
        })
    }

    /// Closes the socket without speaking SMTP on it again.
    async fn abandon(&mut self) {
        self.verified = false;
        if let Some(mut socket) = self.socket.take() {
            let closing = async {
                socket
                    .close()
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))
            };
            if let Err(e) = with_timeout(CLEANUP_TIMEOUT, "socket close", closing).await {
                self.logger.debug(&format!("close: {}", e));
            }
        }
    }

    async fn recover(&mut self, error: &TransportError) {
        match recovery_for(error) {
            Recovery::Abandon => {
                self.logger.debug("session out of step, dropping the socket");
                self.abandon().await;
            }
            Recovery::Reset if self.socket.is_some() => {
                // leave the session usable for the next envelope
                if let Err(e) = with_timeout(CLEANUP_TIMEOUT, "RSET", self.command("RSET")).await {
                    self.logger.debug(&format!("RSET: {}", e));
                    self.abandon().await;
                }
            }
            Recovery::Reset => {}
        }
    }
}

#[async_trait(?Send)]
impl Transport for SmtpTransport {
    async fn verify(&mut self) -> Result<(), TransportError> {
        let limit = self.config.socket_timeout();
        let result = with_timeout(limit, "SMTP handshake", self.handshake()).await;
        if let Err(ref e) = result {
            if recovery_for(e) == Recovery::Abandon {
                self.abandon().await;
            }
        }
        result?;
        self.verified = true;
        self.logger.debug("session verified");
        Ok(())
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError> {
        if !self.verified {
            return Err(TransportError::Protocol("send attempted before verify".into()));
        }
        let limit = self.config.socket_timeout();
        let result = with_timeout(limit, "SMTP send", self.transmit(envelope)).await;
        if let Err(ref e) = result {
            self.recover(e).await;
        }
        result
    }

    async fn close(&mut self) {
        if self.socket.is_none() {
            return;
        }
        if let Err(e) = with_timeout(CLEANUP_TIMEOUT, "QUIT", self.command("QUIT")).await {
            self.logger.debug(&format!("QUIT: {}", e));
        }
        self.abandon().await;
    }
}
