//! Send-request validation
//!
//! [`validate_send_request`] walks an arbitrary JSON body, normalizes the
//! recipient unions (`"a@b.com"`, `{email, name}`, or an array of either)
//! into `Vec<EmailAddress>`, decodes attachments, and collects every
//! violation in one pass instead of stopping at the first.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use lazy_static::lazy_static;
use lettre::message::header::ContentType;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::format_megabytes;
use crate::types::{Attachment, EmailAddress, EmailBody, SendEmailRequest};

pub const MAX_RECIPIENTS: usize = 50;
pub const MAX_ATTACHMENTS: usize = 10;
pub const MAX_SUBJECT_CHARS: usize = 998; // RFC 5322 line limit
pub const MAX_TEXT_CHARS: usize = 1_000_000;
pub const MAX_HTML_CHARS: usize = 2_000_000;
pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_FILENAME_CHARS: usize = 255;
pub const MAX_CONTENT_TYPE_CHARS: usize = 100;

/// Accepts padded or unpadded input, like most base64 producers emit
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

lazy_static! {
    /// Permissive `local@domain.tld`, no whitespace
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// What kind of rule a field broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Required,
    InvalidType,
    InvalidEmail,
    TooShort,
    TooLong,
    TooFewItems,
    TooManyItems,
    InvalidFilename,
    InvalidContentType,
    InvalidAttachment,
    AttachmentTooLarge,
    MissingBody,
}

/// One violated rule, with a dotted path such as `to.2.email`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Violations on one field path
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldViolation> {
        self.violations.iter().filter(move |v| v.field == field)
    }

    /// The kind shared by all violations, if there is exactly one
    pub fn common_kind(&self) -> Option<ViolationKind> {
        let first = self.violations.first()?.kind;
        self.violations
            .iter()
            .all(|v| v.kind == first)
            .then_some(first)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate and normalize a send-email body
pub fn validate_send_request(
    body: &Value,
    max_attachment_bytes: usize,
) -> Result<SendEmailRequest, ValidationErrors> {
    let mut validator = Validator {
        violations: Vec::new(),
        max_attachment_bytes,
    };

    let Some(obj) = body.as_object() else {
        validator.push(
            "body",
            ViolationKind::InvalidType,
            format!("Expected object, received {}", type_name(body)),
        );
        return Err(validator.into_errors());
    };

    validator.check(obj)
}

struct Validator {
    violations: Vec<FieldViolation>,
    max_attachment_bytes: usize,
}

impl Validator {
    fn push(&mut self, field: impl Into<String>, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    fn into_errors(self) -> ValidationErrors {
        ValidationErrors {
            violations: self.violations,
        }
    }

    fn check(mut self, obj: &Map<String, Value>) -> Result<SendEmailRequest, ValidationErrors> {
        let to = match present(obj, "to") {
            Some(value) => self.recipients(value, "to"),
            None => {
                self.push("to", ViolationKind::Required, "Required");
                None
            }
        };
        let cc = present(obj, "cc").map(|value| self.recipients(value, "cc"));
        let bcc = present(obj, "bcc").map(|value| self.recipients(value, "bcc"));
        let reply_to = present(obj, "replyTo").map(|value| self.address(value, "replyTo"));

        let subject = self.subject(obj);
        let text = self.body_part(obj, "text", MAX_TEXT_CHARS, "Text body is too long");
        let html = self.body_part(obj, "html", MAX_HTML_CHARS, "HTML body is too long");

        let body_supplied = [&text, &html]
            .iter()
            .any(|part| !matches!(part, BodyPart::Absent));
        if !body_supplied {
            self.push(
                "text",
                ViolationKind::MissingBody,
                "Either text or html body is required",
            );
        }

        let attachments = match present(obj, "attachments") {
            Some(value) => self.attachments(value),
            None => Some(Vec::new()),
        };

        let body = EmailBody::from_parts(text.into_valid(), html.into_valid());

        match (to, cc, bcc, reply_to, subject, body, attachments) {
            (Some(to), cc, bcc, reply_to, Some(subject), Some(body), Some(attachments))
                if self.violations.is_empty() =>
            {
                Ok(SendEmailRequest {
                    to,
                    cc: cc.flatten().unwrap_or_default(),
                    bcc: bcc.flatten().unwrap_or_default(),
                    reply_to: reply_to.flatten(),
                    subject,
                    body,
                    attachments,
                })
            }
            _ => Err(self.into_errors()),
        }
    }

    fn recipients(&mut self, value: &Value, path: &str) -> Option<Vec<EmailAddress>> {
        let Value::Array(items) = value else {
            return self.address(value, path).map(|address| vec![address]);
        };

        if items.is_empty() {
            self.push(
                path,
                ViolationKind::TooFewItems,
                "Array must contain at least 1 element(s)",
            );
            return None;
        }
        if items.len() > MAX_RECIPIENTS {
            self.push(
                path,
                ViolationKind::TooManyItems,
                format!("Array must contain at most {MAX_RECIPIENTS} element(s)"),
            );
        }

        let addresses: Vec<Option<EmailAddress>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.address(item, &format!("{path}.{i}")))
            .collect();
        addresses.into_iter().collect()
    }

    fn address(&mut self, value: &Value, path: &str) -> Option<EmailAddress> {
        match value {
            Value::String(email) => self
                .email(email, path)
                .then(|| EmailAddress::bare(email.clone())),
            Value::Object(fields) => {
                let email_path = format!("{path}.email");
                let email = match present(fields, "email") {
                    Some(Value::String(email)) => {
                        self.email(email, &email_path).then(|| email.clone())
                    }
                    Some(other) => {
                        self.push(
                            email_path,
                            ViolationKind::InvalidType,
                            format!("Expected string, received {}", type_name(other)),
                        );
                        None
                    }
                    None => {
                        self.push(email_path, ViolationKind::Required, "Required");
                        None
                    }
                };

                let name_path = format!("{path}.name");
                let name = match present(fields, "name") {
                    Some(Value::String(name)) if name.chars().count() > MAX_NAME_CHARS => {
                        self.push(
                            name_path,
                            ViolationKind::TooLong,
                            format!("String must contain at most {MAX_NAME_CHARS} character(s)"),
                        );
                        return None;
                    }
                    Some(Value::String(name)) => Some(name.clone()),
                    Some(other) => {
                        self.push(
                            name_path,
                            ViolationKind::InvalidType,
                            format!("Expected string, received {}", type_name(other)),
                        );
                        return None;
                    }
                    None => None,
                };

                email.map(|email| EmailAddress { email, name })
            }
            other => {
                self.push(
                    path,
                    ViolationKind::InvalidType,
                    format!(
                        "Expected email address string or {{email, name}} object, received {}",
                        type_name(other)
                    ),
                );
                None
            }
        }
    }

    fn email(&mut self, email: &str, path: &str) -> bool {
        let valid =
            EMAIL_PATTERN.is_match(email) && email.parse::<lettre::Address>().is_ok();
        if !valid {
            self.push(path, ViolationKind::InvalidEmail, "Invalid email address format");
        }
        valid
    }

    fn subject(&mut self, obj: &Map<String, Value>) -> Option<String> {
        let subject = self.string(obj, "subject", true)?;
        let len = subject.chars().count();
        if len == 0 {
            self.push("subject", ViolationKind::TooShort, "Subject is required");
            None
        } else if len > MAX_SUBJECT_CHARS {
            self.push("subject", ViolationKind::TooLong, "Subject is too long");
            None
        } else {
            Some(subject.to_string())
        }
    }

    fn body_part(
        &mut self,
        obj: &Map<String, Value>,
        field: &str,
        max_chars: usize,
        too_long: &str,
    ) -> BodyPart {
        let Some(value) = present(obj, field) else {
            return BodyPart::Absent;
        };
        let Some(content) = value.as_str() else {
            self.push(
                field,
                ViolationKind::InvalidType,
                format!("Expected string, received {}", type_name(value)),
            );
            return BodyPart::Invalid;
        };
        if content.is_empty() {
            return BodyPart::Absent;
        }
        if content.chars().count() > max_chars {
            self.push(
                field,
                ViolationKind::TooLong,
                format!("{too_long} (max {max_chars} characters)"),
            );
            return BodyPart::Invalid;
        }
        BodyPart::Valid(content.to_string())
    }

    fn attachments(&mut self, value: &Value) -> Option<Vec<Attachment>> {
        let Value::Array(items) = value else {
            self.push(
                "attachments",
                ViolationKind::InvalidType,
                format!("Expected array, received {}", type_name(value)),
            );
            return None;
        };

        if items.len() > MAX_ATTACHMENTS {
            self.push(
                "attachments",
                ViolationKind::TooManyItems,
                format!("Array must contain at most {MAX_ATTACHMENTS} element(s)"),
            );
        }

        let attachments: Vec<Option<Attachment>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.attachment(item, &format!("attachments.{i}")))
            .collect();
        attachments.into_iter().collect()
    }

    fn attachment(&mut self, value: &Value, path: &str) -> Option<Attachment> {
        let Some(fields) = value.as_object() else {
            self.push(
                path,
                ViolationKind::InvalidType,
                format!("Expected object, received {}", type_name(value)),
            );
            return None;
        };

        let filename = self.filename(fields, path);
        let content = self.attachment_content(fields, path);
        let content_type = self.content_type(fields, path);

        Some(Attachment {
            filename: filename?,
            content: content?,
            content_type: content_type?,
        })
    }

    fn filename(&mut self, fields: &Map<String, Value>, path: &str) -> Option<String> {
        let field = format!("{path}.filename");
        let filename = self.nested_string(fields, "filename", &field)?;
        let len = filename.chars().count();

        if len == 0 {
            self.push(field, ViolationKind::TooShort, "Filename is required");
            None
        } else if len > MAX_FILENAME_CHARS {
            self.push(field, ViolationKind::TooLong, "Filename is too long");
            None
        } else if filename.contains(FORBIDDEN_FILENAME_CHARS) {
            self.push(
                field,
                ViolationKind::InvalidFilename,
                "Filename contains invalid characters",
            );
            None
        } else {
            Some(filename.to_string())
        }
    }

    fn attachment_content(&mut self, fields: &Map<String, Value>, path: &str) -> Option<Vec<u8>> {
        let field = format!("{path}.content");
        let encoded = self.nested_string(fields, "content", &field)?;

        if encoded.is_empty() {
            self.push(
                field,
                ViolationKind::InvalidAttachment,
                "Attachment content is required",
            );
            return None;
        }

        let compact: Vec<u8> = encoded
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let Ok(decoded) = LENIENT_BASE64.decode(&compact) else {
            self.push(
                field,
                ViolationKind::InvalidAttachment,
                "Attachment content must be valid base64",
            );
            return None;
        };

        if decoded.len() > self.max_attachment_bytes {
            self.push(
                field,
                ViolationKind::AttachmentTooLarge,
                format!(
                    "Attachment exceeds the {} limit ({} bytes decoded)",
                    format_megabytes(self.max_attachment_bytes),
                    decoded.len()
                ),
            );
            return None;
        }

        Some(decoded)
    }

    /// `Some(None)` when absent, `None` when invalid
    fn content_type(&mut self, fields: &Map<String, Value>, path: &str) -> Option<Option<String>> {
        let field = format!("{path}.contentType");
        let Some(value) = present(fields, "contentType") else {
            return Some(None);
        };
        let Some(content_type) = value.as_str() else {
            self.push(
                field,
                ViolationKind::InvalidType,
                format!("Expected string, received {}", type_name(value)),
            );
            return None;
        };

        if content_type.chars().count() > MAX_CONTENT_TYPE_CHARS {
            self.push(
                field,
                ViolationKind::TooLong,
                format!("String must contain at most {MAX_CONTENT_TYPE_CHARS} character(s)"),
            );
            None
        } else if ContentType::parse(content_type).is_err() {
            self.push(field, ViolationKind::InvalidContentType, "Invalid content type");
            None
        } else {
            Some(Some(content_type.to_string()))
        }
    }

    fn string<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        required: bool,
    ) -> Option<&'a str> {
        match present(obj, key) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                self.push(
                    key,
                    ViolationKind::InvalidType,
                    format!("Expected string, received {}", type_name(other)),
                );
                None
            }
            None => {
                if required {
                    self.push(key, ViolationKind::Required, "Required");
                }
                None
            }
        }
    }

    fn nested_string<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        field: &str,
    ) -> Option<&'a str> {
        match present(obj, key) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                self.push(
                    field,
                    ViolationKind::InvalidType,
                    format!("Expected string, received {}", type_name(other)),
                );
                None
            }
            None => {
                self.push(field, ViolationKind::Required, "Required");
                None
            }
        }
    }
}

enum BodyPart {
    Absent,
    Invalid,
    Valid(String),
}

impl BodyPart {
    fn into_valid(self) -> Option<String> {
        match self {
            Self::Valid(content) => Some(content),
            Self::Absent | Self::Invalid => None,
        }
    }
}

/// A key that is missing or `null` counts as absent
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|value| !value.is_null())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    const TEN_MB: usize = 10 * 1024 * 1024;

    fn validate(body: Value) -> Result<SendEmailRequest, ValidationErrors> {
        validate_send_request(&body, TEN_MB)
    }

    fn kinds(errors: &ValidationErrors) -> Vec<(&str, ViolationKind)> {
        errors
            .violations()
            .iter()
            .map(|v| (v.field.as_str(), v.kind))
            .collect()
    }

    #[test]
    fn test_minimal_request() {
        let request = validate(json!({"to": "a@b.com", "subject": "Hi", "text": "hello"})).unwrap();
        assert_eq!(request.to, vec![EmailAddress::bare("a@b.com")]);
        assert_eq!(request.subject, "Hi");
        assert_eq!(request.body, EmailBody::Text("hello".into()));
        assert!(request.cc.is_empty());
        assert!(request.attachments.is_empty());
    }

    #[test]
    fn test_recipient_unions_normalize() {
        let request = validate(json!({
            "to": [{"email": "a@b.com", "name": "Ada"}, "c@d.org"],
            "cc": {"email": "e@f.net"},
            "bcc": ["g@h.io"],
            "replyTo": "reply@b.com",
            "subject": "Hi",
            "html": "<p>hello</p>"
        }))
        .unwrap();

        assert_eq!(
            request.to,
            vec![EmailAddress::named("a@b.com", "Ada"), EmailAddress::bare("c@d.org")]
        );
        assert_eq!(request.cc, vec![EmailAddress::bare("e@f.net")]);
        assert_eq!(request.bcc, vec![EmailAddress::bare("g@h.io")]);
        assert_eq!(request.reply_to, Some(EmailAddress::bare("reply@b.com")));
        assert_eq!(request.body, EmailBody::Html("<p>hello</p>".into()));
    }

    #[test]
    fn test_missing_body_attributed_to_text() {
        let errors = validate(json!({"to": "a@b.com", "subject": "Hi"})).unwrap_err();
        assert_eq!(kinds(&errors), vec![("text", ViolationKind::MissingBody)]);
        assert_eq!(
            errors.to_string(),
            "text: Either text or html body is required"
        );
    }

    #[test]
    fn test_empty_text_does_not_count_as_body() {
        let errors = validate(json!({"to": "a@b.com", "subject": "Hi", "text": ""})).unwrap_err();
        assert_eq!(kinds(&errors), vec![("text", ViolationKind::MissingBody)]);
    }

    #[test]
    fn test_all_violations_reported_together() {
        let errors = validate(json!({
            "to": [],
            "cc": "not-an-email",
            "subject": "",
            "attachments": [{"filename": "a/b.txt", "content": "!!!"}]
        }))
        .unwrap_err();

        assert_eq!(
            kinds(&errors),
            vec![
                ("to", ViolationKind::TooFewItems),
                ("cc", ViolationKind::InvalidEmail),
                ("subject", ViolationKind::TooShort),
                ("text", ViolationKind::MissingBody),
                ("attachments.0.filename", ViolationKind::InvalidFilename),
                ("attachments.0.content", ViolationKind::InvalidAttachment),
            ]
        );
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = validate(json!({"text": "hello"})).unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![("to", ViolationKind::Required), ("subject", ViolationKind::Required)]
        );
    }

    #[test]
    fn test_non_object_body() {
        let errors = validate(json!(["a@b.com"])).unwrap_err();
        assert_eq!(kinds(&errors), vec![("body", ViolationKind::InvalidType)]);
        assert_eq!(errors.to_string(), "body: Expected object, received array");
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["plainaddress", "a b@c.com", "a@b", "@b.com", "a@@b.com"] {
            let errors = validate(json!({"to": bad, "subject": "Hi", "text": "x"})).unwrap_err();
            assert_eq!(kinds(&errors), vec![("to", ViolationKind::InvalidEmail)], "{bad}");
        }

        let errors = validate(json!({
            "to": ["a@b.com", {"email": "bad"}, 42],
            "subject": "Hi",
            "text": "x"
        }))
        .unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![
                ("to.1.email", ViolationKind::InvalidEmail),
                ("to.2", ViolationKind::InvalidType),
            ]
        );
    }

    #[test]
    fn test_recipient_limit() {
        let to: Vec<String> = (0..51).map(|i| format!("user{i}@example.com")).collect();
        let errors = validate(json!({"to": to, "subject": "Hi", "text": "x"})).unwrap_err();
        assert_eq!(kinds(&errors), vec![("to", ViolationKind::TooManyItems)]);

        let to: Vec<String> = (0..50).map(|i| format!("user{i}@example.com")).collect();
        assert_eq!(
            validate(json!({"to": to, "subject": "Hi", "text": "x"})).unwrap().to.len(),
            50
        );
    }

    #[test]
    fn test_name_length_limit() {
        let errors = validate(json!({
            "to": {"email": "a@b.com", "name": "x".repeat(101)},
            "subject": "Hi",
            "text": "x"
        }))
        .unwrap_err();
        assert_eq!(kinds(&errors), vec![("to.name", ViolationKind::TooLong)]);
    }

    #[test]
    fn test_subject_length_limit() {
        let ok = validate(json!({"to": "a@b.com", "subject": "s".repeat(998), "text": "x"}));
        assert!(ok.is_ok());

        let errors =
            validate(json!({"to": "a@b.com", "subject": "s".repeat(999), "text": "x"})).unwrap_err();
        assert_eq!(kinds(&errors), vec![("subject", ViolationKind::TooLong)]);
    }

    #[test]
    fn test_body_length_limits() {
        let errors = validate(json!({
            "to": "a@b.com",
            "subject": "Hi",
            "text": "t".repeat(MAX_TEXT_CHARS + 1),
            "html": "h".repeat(MAX_HTML_CHARS + 1)
        }))
        .unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![("text", ViolationKind::TooLong), ("html", ViolationKind::TooLong)]
        );
    }

    #[test]
    fn test_wrong_types() {
        let errors = validate(json!({
            "to": "a@b.com",
            "subject": 5,
            "text": true,
            "attachments": "file"
        }))
        .unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![
                ("subject", ViolationKind::InvalidType),
                ("text", ViolationKind::InvalidType),
                ("attachments", ViolationKind::InvalidType),
            ]
        );
    }

    #[test]
    fn test_null_optional_fields_are_absent() {
        let request = validate(json!({
            "to": "a@b.com",
            "cc": null,
            "replyTo": null,
            "subject": "Hi",
            "text": "x",
            "html": null,
            "attachments": null
        }))
        .unwrap();
        assert!(request.cc.is_empty());
        assert_eq!(request.reply_to, None);
    }

    #[test]
    fn test_attachment_decoded() {
        let request = validate(json!({
            "to": "a@b.com",
            "subject": "Report",
            "text": "attached",
            "attachments": [{
                "filename": "report.pdf",
                "content": BASE64.encode(b"%PDF-1.7 fake"),
                "contentType": "application/pdf"
            }]
        }))
        .unwrap();

        assert_eq!(request.attachments.len(), 1);
        let attachment = &request.attachments[0];
        assert_eq!(attachment.filename, "report.pdf");
        assert_eq!(attachment.content, b"%PDF-1.7 fake");
        assert_eq!(attachment.content_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn test_attachment_base64_with_line_breaks_and_no_padding() {
        let encoded = BASE64.encode(vec![7u8; 100]);
        let wrapped = format!("{}\r\n{}", &encoded[..76], &encoded[76..]);
        let unpadded = encoded.trim_end_matches('=').to_string();

        for content in [wrapped, unpadded] {
            let request = validate(json!({
                "to": "a@b.com",
                "subject": "Hi",
                "text": "x",
                "attachments": [{"filename": "blob.bin", "content": content}]
            }))
            .unwrap();
            assert_eq!(request.attachments[0].content, vec![7u8; 100]);
        }
    }

    #[test]
    fn test_oversized_attachment() {
        let content = BASE64.encode(vec![0u8; 2048]);
        let errors = validate_send_request(
            &json!({
                "to": "a@b.com",
                "subject": "Hi",
                "text": "x",
                "attachments": [{"filename": "big.bin", "content": content}]
            }),
            1024,
        )
        .unwrap_err();

        assert_eq!(
            kinds(&errors),
            vec![("attachments.0.content", ViolationKind::AttachmentTooLarge)]
        );
        assert_eq!(errors.common_kind(), Some(ViolationKind::AttachmentTooLarge));
    }

    #[test]
    fn test_attachment_field_rules() {
        let errors = validate(json!({
            "to": "a@b.com",
            "subject": "Hi",
            "text": "x",
            "attachments": [
                {"filename": "", "content": ""},
                {"filename": "x".repeat(256), "content": "QQ=="},
                {"filename": "ok.txt", "content": "QQ==", "contentType": "not a mime"},
                {"content": "QQ=="},
                "nope"
            ]
        }))
        .unwrap_err();

        assert_eq!(
            kinds(&errors),
            vec![
                ("attachments.0.filename", ViolationKind::TooShort),
                ("attachments.0.content", ViolationKind::InvalidAttachment),
                ("attachments.1.filename", ViolationKind::TooLong),
                ("attachments.2.contentType", ViolationKind::InvalidContentType),
                ("attachments.3.filename", ViolationKind::Required),
                ("attachments.4", ViolationKind::InvalidType),
            ]
        );
    }

    #[test]
    fn test_attachment_count_limit() {
        let attachments: Vec<Value> = (0..11)
            .map(|i| json!({"filename": format!("f{i}.txt"), "content": "QQ=="}))
            .collect();
        let errors = validate(json!({
            "to": "a@b.com",
            "subject": "Hi",
            "text": "x",
            "attachments": attachments
        }))
        .unwrap_err();
        assert_eq!(kinds(&errors), vec![("attachments", ViolationKind::TooManyItems)]);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let request = validate(json!({
            "to": "a@b.com",
            "subject": "Hi",
            "text": "x",
            "priority": "high"
        }));
        assert!(request.is_ok());
    }

    #[test]
    fn test_common_kind_mixed() {
        let errors = validate(json!({"to": "bad", "subject": "Hi"})).unwrap_err();
        assert_eq!(errors.common_kind(), None);
        assert_eq!(errors.for_field("to").count(), 1);
    }

    fn email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9_]{0,15}", "[a-z][a-z0-9]{0,15}", "[a-z]{2,6}")
            .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
    }

    fn address() -> impl Strategy<Value = Value> {
        prop_oneof![
            email().prop_map(Value::String),
            (email(), proptest::option::of("[A-Za-z ]{1,40}"))
                .prop_map(|(email, name)| json!({"email": email, "name": name})),
        ]
    }

    fn recipients() -> impl Strategy<Value = Value> {
        prop_oneof![
            address(),
            prop::collection::vec(address(), 1..=MAX_RECIPIENTS).prop_map(Value::Array),
        ]
    }

    fn recipient_count(value: &Value) -> usize {
        value.as_array().map_or(1, Vec::len)
    }

    proptest! {
        /// Property: well-formed payloads validate and keep every recipient
        #[test]
        fn valid_payloads_validate(
            to in recipients(),
            cc in proptest::option::of(recipients()),
            subject in "[ -~]{1,120}",
            text in proptest::option::of("[ -~]{1,200}"),
            html in proptest::option::of("<p>[a-z ]{1,80}</p>"),
        ) {
            prop_assume!(text.is_some() || html.is_some());
            let body = json!({"to": to.clone(), "cc": cc.clone(), "subject": subject, "text": text, "html": html});

            let request = validate(body).unwrap();
            prop_assert_eq!(request.to.len(), recipient_count(&to));
            prop_assert_eq!(request.cc.len(), cc.as_ref().map_or(0, recipient_count));
            prop_assert!(request.to.iter().all(|a| a.email.contains('@')));
        }

        /// Property: without text or html, validation fails on `text`
        #[test]
        fn missing_body_always_fails(to in recipients(), subject in "[ -~]{1,120}") {
            let errors = validate(json!({"to": to.clone(), "subject": subject})).unwrap_err();
            prop_assert!(errors.for_field("text").any(|v| v.kind == ViolationKind::MissingBody));
        }

        /// Property: attachments over the ceiling never validate
        #[test]
        fn oversized_attachments_rejected(limit in 1usize..512, extra in 1usize..512) {
            let content = BASE64.encode(vec![1u8; limit + extra]);
            let body = json!({
                "to": "a@b.com",
                "subject": "Hi",
                "text": "x",
                "attachments": [{"filename": "f.bin", "content": content}]
            });
            let errors = validate_send_request(&body, limit).unwrap_err();
            prop_assert_eq!(errors.common_kind(), Some(ViolationKind::AttachmentTooLarge));
        }
    }
}
