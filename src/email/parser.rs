//! Parse uploaded email files into a normalized message.

use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use tracing::{debug, info};

use crate::config::file_extension;
use crate::email::mime::guess_mime;
use crate::error::EmailError;

/// A file attached to the email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub mime_type: String,
}

/// Normalized email. Missing headers are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEmail {
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub date: String,
    pub body: String,
    pub attachments: Vec<EmailAttachment>,
}

impl ParsedEmail {
    /// Header block plus body, as handed to the extraction providers.
    pub fn analysis_text(&self) -> String {
        format!(
            "Von: {}\nAn: {}\nDatum: {}\nBetreff: {}\n\n{}",
            self.sender, self.recipient, self.date, self.subject, self.body
        )
    }
}

/// One container format (RFC 822, Outlook MSG, ...).
pub trait MessageFormat: Send + Sync {
    /// Lowercase extensions with leading dot handled by this format.
    fn extensions(&self) -> &[&'static str];

    fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedEmail, EmailError>;
}

/// RFC 822 / MIME messages via `mail-parser`.
pub struct EmlFormat;

impl MessageFormat for EmlFormat {
    fn extensions(&self) -> &[&'static str] {
        &[".eml"]
    }

    fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedEmail, EmailError> {
        let message =
            MessageParser::default()
                .parse(bytes)
                .ok_or_else(|| EmailError::Malformed {
                    filename: filename.to_string(),
                    reason: "not a MIME message".to_string(),
                })?;

        Ok(ParsedEmail {
            subject: message.subject().unwrap_or_default().to_string(),
            sender: first_address(message.from()),
            recipient: first_address(message.to()),
            date: message.date().map(|d| d.to_rfc3339()).unwrap_or_default(),
            body: extract_body(&message),
            attachments: extract_attachments(&message),
        })
    }
}

/// Outlook `.msg` files are compound documents that need their own reader.
pub struct MsgFormat;

impl MessageFormat for MsgFormat {
    fn extensions(&self) -> &[&'static str] {
        &[".msg"]
    }

    fn parse(&self, _bytes: &[u8], filename: &str) -> Result<ParsedEmail, EmailError> {
        Err(EmailError::UnsupportedFormat(format!(
            "{filename}: Outlook .msg files are not supported, please export as .eml"
        )))
    }
}

/// Dispatches to a `MessageFormat` by file extension. Unknown or missing
/// extensions are tried as `.eml`.
pub struct EmailParser {
    formats: Vec<Box<dyn MessageFormat>>,
}

impl Default for EmailParser {
    fn default() -> Self {
        Self {
            formats: vec![Box::new(EmlFormat), Box::new(MsgFormat)],
        }
    }
}

impl EmailParser {
    pub fn new(formats: Vec<Box<dyn MessageFormat>>) -> Self {
        Self { formats }
    }

    pub fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedEmail, EmailError> {
        let ext = file_extension(filename).unwrap_or_else(|| ".eml".to_string());
        let format = self
            .formats
            .iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
            .or_else(|| self.formats.iter().find(|f| f.extensions().contains(&".eml")))
            .ok_or_else(|| EmailError::UnsupportedFormat(filename.to_string()))?;

        let parsed = format.parse(bytes, filename)?;
        info!(
            subject = %parsed.subject,
            attachments = parsed.attachments.len(),
            "Email parsed"
        );
        Ok(parsed)
    }
}

/// Bare address of the first entry in an address header.
fn first_address(header: Option<&mail_parser::Address>) -> String {
    header
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// First text/plain body part. Only when the message has no plain part at
/// all is the first HTML body stripped of tags instead.
fn extract_body(message: &Message) -> String {
    let plain = message
        .text_body
        .iter()
        .filter_map(|&id| message.part(id))
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.trim()),
            _ => None,
        });
    if let Some(text) = plain {
        return text.to_string();
    }
    if let Some(html) = message.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

fn extract_attachments(message: &Message) -> Vec<EmailAttachment> {
    message
        .attachments()
        .filter_map(|part| {
            let filename = part.attachment_name()?.trim();
            if filename.is_empty() {
                return None;
            }

            let mime_type = part
                .content_type()
                .and_then(|ct| ct.subtype().map(|sub| format!("{}/{}", ct.ctype(), sub)))
                .map(|m| m.to_ascii_lowercase())
                .filter(|m| m != "application/octet-stream")
                .unwrap_or_else(|| guess_mime(filename));

            debug!(filename, mime_type = %mime_type, size = part.contents().len(), "Found attachment");
            Some(EmailAttachment {
                filename: filename.to_string(),
                content: part.contents().to_vec(),
                mime_type,
            })
        })
        .collect()
}

/// Strip HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
