//! Normalized request and result types
//!
//! Everything here is produced by [`crate::validation`]: recipients are
//! always a list of [`EmailAddress`], the body always has at least one part,
//! and attachment content is already decoded to bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sanitize::sanitize_html;

/// A mailbox: address plus optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EmailAddress {
    /// Address without a display name
    pub fn bare(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

/// Renders `"Name" <email>` when a name is set, otherwise just the address
impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => write!(f, "\"{}\" <{}>", name, self.email),
            _ => f.write_str(&self.email),
        }
    }
}

/// The body content of an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    /// Plain text only
    Text(String),
    /// HTML only
    Html(String),
    /// Both plain text and HTML (multipart/alternative)
    Multipart { text: String, html: String },
}

impl EmailBody {
    /// Build from the optional request fields; empty strings count as absent
    pub fn from_parts(text: Option<String>, html: Option<String>) -> Option<Self> {
        let text = text.filter(|t| !t.is_empty());
        let html = html.filter(|h| !h.is_empty());

        match (text, html) {
            (Some(text), Some(html)) => Some(Self::Multipart { text, html }),
            (Some(text), None) => Some(Self::Text(text)),
            (None, Some(html)) => Some(Self::Html(html)),
            (None, None) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Multipart { text, .. } => Some(text),
            Self::Html(_) => None,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            Self::Html(html) | Self::Multipart { html, .. } => Some(html),
            Self::Text(_) => None,
        }
    }

    fn map_html(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            Self::Text(text) => Self::Text(text),
            Self::Html(html) => Self::Html(f(&html)),
            Self::Multipart { text, html } => Self::Multipart {
                text,
                html: f(&html),
            },
        }
    }
}

/// A decoded attachment
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    /// MIME type; the dispatcher falls back to `application/octet-stream`
    pub content_type: Option<String>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("size", &self.content.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// A validated send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendEmailRequest {
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Option<EmailAddress>,
    pub subject: String,
    pub body: EmailBody,
    pub attachments: Vec<Attachment>,
}

impl SendEmailRequest {
    /// Create a simple plain-text request
    pub fn simple(to: &str, subject: &str, text: &str) -> Self {
        Self {
            to: vec![EmailAddress::bare(to)],
            cc: vec![],
            bcc: vec![],
            reply_to: None,
            subject: subject.to_string(),
            body: EmailBody::Text(text.to_string()),
            attachments: vec![],
        }
    }

    /// Run the HTML part (if any) through [`sanitize_html`]
    pub fn with_sanitized_html(self) -> Self {
        Self {
            body: self.body.map_html(sanitize_html),
            ..self
        }
    }

    /// Every envelope recipient address, in To, Cc, Bcc order
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(|address| address.email.clone())
            .collect()
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

/// Outcome reported by the relay for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSendResult {
    pub message_id: String,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}
