//! Inbound email handling.
//!
//! - `parser`: container formats into `ParsedEmail`
//! - `mime`: MIME guessing and the provider attachment filter

pub mod mime;
pub mod parser;

pub use mime::{guess_mime, supported_mime};
pub use parser::{EmailAttachment, EmailParser, EmlFormat, MessageFormat, MsgFormat, ParsedEmail};
