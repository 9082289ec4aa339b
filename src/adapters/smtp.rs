//! Minimal SMTP submission client: one session per message.

use crate::domain::model::OutgoingMessage;
use crate::domain::ports::Transport;
use crate::utils::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::crypto::{aws_lc_rs as provider, CryptoProvider};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

const MAX_REPLY_LINES: usize = 128;

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upgrade with STARTTLS after the first EHLO.
    pub use_tls: bool,
    pub timeout: Duration,
    pub helo_name: String,
}

impl SmtpSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            use_tls: false,
            timeout: Duration::from_secs(15),
            helo_name: "localhost".to_string(),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

pub struct SmtpTransport {
    settings: SmtpSettings,
    tls: Option<TlsConnector>,
}

impl SmtpTransport {
    pub fn new(settings: SmtpSettings) -> Result<Self, TransportError> {
        let tls = if settings.use_tls {
            Some(build_tls_connector()?)
        } else {
            None
        };
        Ok(Self { settings, tls })
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let addr = (self.settings.host.as_str(), self.settings.port);
        match timeout(self.settings.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(TransportError::connection(format!(
                "cannot connect to {}:{}: {}",
                self.settings.host, self.settings.port, e
            ))),
            Err(_) => Err(TransportError::timeout(format!(
                "connecting to {}:{} timed out",
                self.settings.host, self.settings.port
            ))),
        }
    }

    async fn transact<S>(
        &self,
        conn: &mut SmtpConnection<S>,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some((user, pass)) = self.settings.credentials() {
            let token = BASE64.encode(format!("\0{}\0{}", user, pass).as_bytes());
            conn.command(&format!("AUTH PLAIN {}", token), &[235], Stage::Auth)
                .await?;
        }

        conn.command(&format!("MAIL FROM:<{}>", message.from), &[250], Stage::MailFrom)
            .await?;
        conn.command(&format!("RCPT TO:<{}>", message.to), &[250, 251], Stage::RcptTo)
            .await?;
        conn.command("DATA", &[354], Stage::Data).await?;

        let payload = dot_stuff(&format_message(message, Utc::now(), &self.settings.helo_name));
        conn.write_raw(&payload).await?;
        conn.command(".", &[250], Stage::DataEnd).await?;

        // 訊息已被接受，QUIT 失敗不影響結果
        if let Err(e) = conn.command("QUIT", &[221], Stage::Quit).await {
            tracing::debug!("QUIT after delivery to {} failed: {}", message.to, e);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let tcp = self.connect().await?;
        let mut conn = SmtpConnection::new(tcp, self.settings.timeout);
        conn.expect_reply(&[220], Stage::Greeting).await?;
        conn.command(&format!("EHLO {}", self.settings.helo_name), &[250], Stage::Ehlo)
            .await?;

        match &self.tls {
            None => self.transact(&mut conn, message).await,
            Some(connector) => {
                conn.command("STARTTLS", &[220], Stage::StartTls).await?;
                let server_name = ServerName::try_from(self.settings.host.clone()).map_err(|_| {
                    TransportError::protocol(format!(
                        "STARTTLS: {} is not a valid DNS name",
                        self.settings.host
                    ))
                })?;
                let tls = connector
                    .connect(server_name, conn.into_inner())
                    .await
                    .map_err(|e| TransportError::connection(format!("TLS handshake failed: {}", e)))?;

                let mut conn = SmtpConnection::new(tls, self.settings.timeout);
                conn.command(&format!("EHLO {}", self.settings.helo_name), &[250], Stage::Ehlo)
                    .await?;
                self.transact(&mut conn, message).await
            }
        }
    }
}

fn build_tls_connector() -> Result<TlsConnector, TransportError> {
    let provider: Arc<CryptoProvider> = Arc::new(provider::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(tokio_rustls::rustls::DEFAULT_VERSIONS)
        .map_err(|e| TransportError::protocol(format!("TLS configuration error: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(
            rustls_platform_verifier::Verifier::new().with_provider(provider),
        ))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    DataEnd,
    Quit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Greeting => "greeting",
            Stage::Ehlo => "EHLO",
            Stage::StartTls => "STARTTLS",
            Stage::Auth => "AUTH",
            Stage::MailFrom => "MAIL FROM",
            Stage::RcptTo => "RCPT TO",
            Stage::Data => "DATA",
            Stage::DataEnd => "message data",
            Stage::Quit => "QUIT",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

fn reply_error(stage: Stage, reply: &Reply) -> TransportError {
    let message = format!("{} rejected: {}", stage, reply);
    match reply.code {
        530 | 534 | 535 | 538 if stage == Stage::Auth => TransportError::authentication(message),
        500..=599 => TransportError::rejected(message),
        _ => TransportError::protocol(message),
    }
}

struct SmtpConnection<S> {
    stream: BufReader<S>,
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpConnection<S> {
    fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            timeout,
        }
    }

    fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    async fn command(
        &mut self,
        line: &str,
        expected: &[u16],
        stage: Stage,
    ) -> Result<Reply, TransportError> {
        self.write_raw(&format!("{}\r\n", line)).await?;
        self.expect_reply(expected, stage).await
    }

    async fn expect_reply(&mut self, expected: &[u16], stage: Stage) -> Result<Reply, TransportError> {
        let reply = self.read_reply(stage).await?;
        if expected.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(reply_error(stage, &reply))
        }
    }

    async fn write_raw(&mut self, data: &str) -> Result<(), TransportError> {
        let stream = self.stream.get_mut();
        let write = async {
            stream.write_all(data.as_bytes()).await?;
            stream.flush().await
        };
        match timeout(self.timeout, write).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::timeout("timed out writing to SMTP server")),
        }
    }

    async fn read_reply(&mut self, stage: Stage) -> Result<Reply, TransportError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = match timeout(self.timeout, self.stream.read_line(&mut line)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(TransportError::timeout(format!(
                        "timed out waiting for {} reply",
                        stage
                    )))
                }
            };
            if read == 0 {
                return Err(TransportError::connection(format!(
                    "server closed the connection during {}",
                    stage
                )));
            }

            let (code, last, text) = parse_reply_line(line.trim_end_matches(['\r', '\n']))
                .ok_or_else(|| {
                    TransportError::protocol(format!("malformed {} reply: {:?}", stage, line))
                })?;
            lines.push(text.to_string());
            if last {
                return Ok(Reply { code, lines });
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(TransportError::protocol(format!("{} reply is too long", stage)));
            }
        }
    }
}

/// `250-text` -> (250, false, "text"); `250 text` or `250` -> (250, true, ...)
fn parse_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = code.parse().ok()?;
    match line.as_bytes().get(3) {
        None => Some((code, true, "")),
        Some(b' ') => Some((code, true, &line[4..])),
        Some(b'-') => Some((code, false, &line[4..])),
        Some(_) => None,
    }
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_header(text: &str) -> String {
    if text.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        text.to_string()
    } else {
        format!("=?utf-8?B?{}?=", BASE64.encode(text.as_bytes()))
    }
}

fn format_address(address: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => {
            let encoded = encode_header(name);
            if encoded == name {
                format!("\"{}\" <{}>", name.replace('\\', "\\\\").replace('"', "\\\""), address)
            } else {
                format!("{} <{}>", encoded, address)
            }
        }
        _ => format!("<{}>", address),
    }
}

fn message_id(now: DateTime<Utc>, domain: &str) -> String {
    let seq = MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "<{}.{}.{}@{}>",
        now.timestamp_millis(),
        std::process::id(),
        seq,
        domain
    )
}

/// Headers and body with CRLF line endings, ending in CRLF.
pub fn format_message(message: &OutgoingMessage, now: DateTime<Utc>, domain: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", format_address(&message.from, None)));
    out.push_str(&format!(
        "To: {}\r\n",
        format_address(&message.to, message.to_name.as_deref())
    ));
    out.push_str(&format!("Subject: {}\r\n", encode_header(&message.subject)));
    out.push_str(&format!("Date: {}\r\n", now.to_rfc2822()));
    out.push_str(&format!("Message-ID: {}\r\n", message_id(now, domain)));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n");
    out.push_str("\r\n");

    for line in message.body.lines() {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// Escapes lines starting with '.' for the DATA phase.
pub fn dot_stuff(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 16);
    for line in payload.split_inclusive("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    out
}
