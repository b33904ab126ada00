//! Pooled SMTP dispatch
//!
//! [`SmtpDispatcher`] owns one lettre transport for the life of the process.
//! The transport keeps up to five connections open and reuses them across
//! requests. Transport failures are folded into a small set of
//! [`SmtpError`] categories the HTTP layer can map to status codes.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{SenderIdentity, SmtpSettings};
use crate::types::{Attachment, EmailAddress, EmailBody, EmailSendResult, SendEmailRequest};

const MAX_POOLED_CONNECTIONS: u32 = 5;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// SMTP dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    #[error("Failed to connect to SMTP server: {0}")]
    Connection(String),

    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    #[error("SMTP connection timed out: {0}")]
    Timeout(String),

    #[error("Failed to send email: {0}")]
    Send(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Invalid SMTP configuration: {0}")]
    Setup(String),
}

impl SmtpError {
    /// Machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) | Self::Timeout(_) => "SMTP_CONNECTION_ERROR",
            Self::Auth(_) => "SMTP_AUTH_ERROR",
            Self::Send(_) | Self::Build(_) | Self::Setup(_) => "SMTP_SEND_ERROR",
        }
    }

    /// Short summary without transport detail
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Failed to connect to SMTP server",
            Self::Auth(_) => "SMTP authentication failed",
            Self::Timeout(_) => "SMTP connection timed out",
            Self::Send(_) | Self::Build(_) | Self::Setup(_) => "Failed to send email",
        }
    }

    /// The raw transport text
    pub fn detail(&self) -> &str {
        match self {
            Self::Connection(detail)
            | Self::Auth(detail)
            | Self::Timeout(detail)
            | Self::Send(detail)
            | Self::Build(detail)
            | Self::Setup(detail) => detail,
        }
    }

    /// Detail text safe to show when transport errors are hidden
    pub fn public_detail(&self) -> &'static str {
        match self {
            Self::Connection(_) => "The email server is unavailable. Please try again later.",
            Self::Auth(_) => "The email server rejected the credentials.",
            Self::Timeout(_) => "The email server did not respond in time.",
            Self::Send(_) | Self::Build(_) | Self::Setup(_) => {
                "An error occurred while sending the email."
            }
        }
    }

    /// True when the upstream relay failed (as opposed to this service)
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Auth(_) | Self::Timeout(_))
    }

    /// Classify a lettre transport error
    pub fn from_transport(err: &lettre::transport::smtp::Error) -> Self {
        FailureSignals::from_transport(err).classify(err.to_string())
    }
}

/// What a transport failure looked like, before classification
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FailureSignals {
    refused: bool,
    connection_lost: bool,
    timed_out: bool,
    socket_error: bool,
    auth_rejected: bool,
    reply_code: Option<u16>,
}

impl FailureSignals {
    fn from_transport(err: &lettre::transport::smtp::Error) -> Self {
        let mut signals = Self {
            timed_out: err.is_timeout(),
            reply_code: err
                .status()
                .and_then(|code| code.to_string().parse::<u16>().ok()),
            ..Self::default()
        };

        let text = err.to_string().to_ascii_lowercase();
        if text.contains("connection error") {
            signals.connection_lost = true;
        }
        if err.is_client() && text.contains("authentication") {
            signals.auth_rejected = true;
        }

        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                signals.record_io(io_err.kind());
            }
            source = cause.source();
        }

        signals
    }

    fn record_io(&mut self, kind: io::ErrorKind) {
        match kind {
            io::ErrorKind::ConnectionRefused => self.refused = true,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable => self.connection_lost = true,
            io::ErrorKind::TimedOut => self.timed_out = true,
            _ => self.socket_error = true,
        }
    }

    /// Connection problems win over auth, auth over timeouts
    fn classify(self, detail: String) -> SmtpError {
        if self.refused || self.connection_lost {
            SmtpError::Connection(detail)
        } else if self.auth_rejected || self.reply_code == Some(535) {
            SmtpError::Auth(detail)
        } else if self.timed_out || self.socket_error {
            SmtpError::Timeout(detail)
        } else {
            SmtpError::Send(detail)
        }
    }
}

/// Turns validated requests into MIME messages from the configured sender
#[derive(Debug, Clone)]
pub struct MessageComposer {
    from: Mailbox,
    message_id_domain: String,
}

impl MessageComposer {
    pub fn new(sender: &SenderIdentity) -> Result<Self, SmtpError> {
        let address: Address = sender
            .email
            .parse()
            .map_err(|e| SmtpError::Setup(format!("invalid sender address: {e}")))?;
        let message_id_domain = address.domain().to_string();
        let from = Mailbox::new(Some(sender.name.clone()), address);

        Ok(Self {
            from,
            message_id_domain,
        })
    }

    /// `<uuid@sender-domain>`
    pub fn next_message_id(&self) -> String {
        format!("<{}@{}>", uuid::Uuid::new_v4(), self.message_id_domain)
    }

    pub fn build_message(
        &self,
        request: &SendEmailRequest,
        message_id: &str,
    ) -> Result<Message, SmtpError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .message_id(Some(message_id.to_string()))
            .subject(request.subject.as_str());

        for to in &request.to {
            builder = builder.to(mailbox(to)?);
        }
        for cc in &request.cc {
            builder = builder.cc(mailbox(cc)?);
        }
        for bcc in &request.bcc {
            builder = builder.bcc(mailbox(bcc)?);
        }
        if let Some(reply_to) = &request.reply_to {
            builder = builder.reply_to(mailbox(reply_to)?);
        }

        let result = if request.attachments.is_empty() {
            match body_part(&request.body) {
                BodyPart::Single(part) => builder.singlepart(part),
                BodyPart::Alternative(part) => builder.multipart(part),
            }
        } else {
            let mixed = match body_part(&request.body) {
                BodyPart::Single(part) => MultiPart::mixed().singlepart(part),
                BodyPart::Alternative(part) => MultiPart::mixed().multipart(part),
            };
            let mixed = request
                .attachments
                .iter()
                .try_fold(mixed, |mixed, attachment| {
                    attachment_part(attachment).map(|part| mixed.singlepart(part))
                })?;
            builder.multipart(mixed)
        };

        result.map_err(|e| SmtpError::Build(e.to_string()))
    }
}

/// Sends validated requests through a pooled SMTP transport
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    composer: MessageComposer,
    host: String,
}

impl SmtpDispatcher {
    /// Build the transport. No connection is opened until the first send or
    /// [`verify`](Self::verify). The pool spawns its reaper task here, so
    /// this must run inside a Tokio runtime.
    pub fn new(smtp: &SmtpSettings, sender: &SenderIdentity) -> Result<Self, SmtpError> {
        let composer = MessageComposer::new(sender)?;

        let host = smtp.host.trim();
        let builder = if LOCAL_HOSTS.contains(&host) {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        } else if smtp.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| SmtpError::Setup(e.to_string()))?
        } else {
            let tls = TlsParameters::new(host.to_string())
                .map_err(|e| SmtpError::Setup(e.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Opportunistic(tls))
        };

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ))
            .timeout(Some(COMMAND_TIMEOUT))
            .pool_config(
                PoolConfig::new()
                    .max_size(MAX_POOLED_CONNECTIONS)
                    .idle_timeout(POOL_IDLE_TIMEOUT),
            )
            .build();

        debug!(host = %host, port = smtp.port, secure = smtp.secure, "SMTP transport configured");

        Ok(Self {
            transport,
            composer,
            host: host.to_string(),
        })
    }

    /// Send one message and report what the relay accepted
    #[instrument(
        skip(self, request),
        fields(
            recipients = request.recipient_count(),
            subject_len = request.subject.chars().count(),
            attachments = request.attachments.len()
        )
    )]
    pub async fn send(&self, request: &SendEmailRequest) -> Result<EmailSendResult, SmtpError> {
        let message_id = self.composer.next_message_id();
        let message = self.composer.build_message(request, &message_id)?;

        match self.transport.send(message).await {
            Ok(response) => {
                info!(message_id = %message_id, code = %response.code(), "Email sent");
                Ok(EmailSendResult {
                    message_id,
                    accepted: request.envelope_recipients(),
                    rejected: Vec::new(),
                })
            }
            Err(err) => {
                let error = SmtpError::from_transport(&err);
                error!(code = error.code(), error = %err, "Failed to send email");
                Err(error)
            }
        }
    }

    /// Probe the relay: connect, greet, authenticate. Never fails outward.
    pub async fn verify(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(host = %self.host, error = %err, "SMTP verification failed");
                false
            }
        }
    }

    /// Drop the pool, closing idle connections
    pub fn close(self) {
        info!(host = %self.host, "SMTP connection pool closed");
        drop(self.transport);
    }
}

enum BodyPart {
    Single(SinglePart),
    Alternative(MultiPart),
}

fn body_part(body: &EmailBody) -> BodyPart {
    match body {
        EmailBody::Text(text) => BodyPart::Single(SinglePart::plain(text.clone())),
        EmailBody::Html(html) => BodyPart::Single(SinglePart::html(html.clone())),
        EmailBody::Multipart { text, html } => BodyPart::Alternative(
            MultiPart::alternative_plain_html(text.clone(), html.clone()),
        ),
    }
}

fn attachment_part(attachment: &Attachment) -> Result<SinglePart, SmtpError> {
    let content_type = match attachment.content_type.as_deref() {
        Some(raw) => ContentType::parse(raw)
            .map_err(|e| SmtpError::Build(format!("{}: {e}", attachment.filename)))?,
        None => ContentType::parse("application/octet-stream")
            .map_err(|e| SmtpError::Build(e.to_string()))?,
    };

    Ok(MimeAttachment::new(attachment.filename.clone())
        .body(attachment.content.clone(), content_type))
}

fn mailbox(address: &EmailAddress) -> Result<Mailbox, SmtpError> {
    let email: Address = address
        .email
        .parse()
        .map_err(|e| SmtpError::Build(format!("{}: {e}", address.email)))?;
    let name = address.name.clone().filter(|name| !name.is_empty());
    Ok(Mailbox::new(name, email))
}
