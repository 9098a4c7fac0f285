//! Email parsing and attachment extraction.

use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{
    HeaderName, Message, MessageParser as MimeParser, MessagePart, MimeHeaders, PartType,
};
use tracing::{debug, info, warn};

use crate::config::PollerConfig;

use super::attachment::{Attachment, DestinationInfo, Extraction};
use super::error::{EmailError, Result};

/// Charset labels the MIME decoder is known to handle.
const KNOWN_CHARSETS: &[&str] = &[
    "utf-8",
    "utf8",
    "us-ascii",
    "ascii",
    "iso-8859-1",
    "latin1",
    "iso-8859-2",
    "iso-8859-3",
    "iso-8859-4",
    "iso-8859-5",
    "iso-8859-6",
    "iso-8859-7",
    "iso-8859-8",
    "iso-8859-9",
    "iso-8859-10",
    "iso-8859-13",
    "iso-8859-14",
    "iso-8859-15",
    "iso-8859-16",
    "windows-1250",
    "windows-1251",
    "windows-1252",
    "windows-1253",
    "windows-1254",
    "windows-1255",
    "windows-1256",
    "windows-1257",
    "windows-1258",
    "cp1252",
    "koi8-r",
    "koi8-u",
    "gb2312",
    "gbk",
    "gb18030",
    "big5",
    "shift_jis",
    "shift-jis",
    "sjis",
    "euc-jp",
    "iso-2022-jp",
    "euc-kr",
    "ks_c_5601-1987",
    "utf-16",
    "utf-16le",
    "utf-16be",
    "utf-7",
    "macintosh",
    "ibm866",
];

/// Extracts attachments from messages of allowed senders.
#[derive(Debug, Clone)]
pub struct MessageParser {
    allowed_senders: Vec<String>,
    destination: DestinationInfo,
}

impl MessageParser {
    /// `allowed_senders` are exact `From` header values; an empty list
    /// accepts every sender.
    pub fn new(allowed_senders: Vec<String>, destination: DestinationInfo) -> Self {
        Self {
            allowed_senders,
            destination,
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(
            config.allowed_senders.clone(),
            DestinationInfo::new(
                config.destination.clone(),
                config.destination_directory.clone(),
            ),
        )
    }

    /// Extracts every attachment part of `raw`.
    ///
    /// Returns `Err` when the message as a whole is rejected: unreadable
    /// structure or a sender outside the allow-list. Failures of single
    /// parts are collected in the returned extraction instead, and the
    /// remaining parts are still processed.
    pub fn parse_message(&self, raw: &[u8]) -> Result<Extraction> {
        let message = MimeParser::default()
            .parse(raw)
            .ok_or_else(|| EmailError::ParseError("Failed to parse email message".to_string()))?;

        self.check_sender(&message)?;
        warn_unknown_charsets(&message);

        let mut extraction = Extraction::new();

        let Some(root) = message.parts.first() else {
            warn!("Message has no parts");
            return Ok(extraction);
        };
        if !matches!(root.body, PartType::Multipart(_)) {
            warn!("Message is not multipart, skipping");
            return Ok(extraction);
        }

        let mut index = 0;
        self.collect_parts(&message, root, &mut index, &mut extraction);

        debug!(
            "Extracted {} attachments, {} part failures",
            extraction.attachments.len(),
            extraction.errors.len()
        );
        Ok(extraction)
    }

    fn check_sender(&self, message: &Message<'_>) -> Result<()> {
        if self.allowed_senders.is_empty() {
            return Ok(());
        }

        let sender = message
            .header_raw(HeaderName::From)
            .map(unfold)
            .unwrap_or_default();

        if self.allowed_senders.iter().any(|allowed| *allowed == sender) {
            Ok(())
        } else {
            info!("Sender '{}' is not allowed", sender);
            Err(EmailError::SenderNotAllowed { sender })
        }
    }

    /// Walks the children of a multipart container in order, descending into
    /// nested containers.
    fn collect_parts(
        &self,
        message: &Message<'_>,
        container: &MessagePart<'_>,
        index: &mut usize,
        extraction: &mut Extraction,
    ) {
        let PartType::Multipart(children) = &container.body else {
            return;
        };

        for &child in children {
            let Some(part) = message.parts.get(child as usize) else {
                continue;
            };

            if matches!(part.body, PartType::Multipart(_)) {
                self.collect_parts(message, part, index, extraction);
                continue;
            }

            *index += 1;
            match self.parse_part(message, *index, part) {
                Ok(Some(attachment)) => extraction.attachments.push(attachment),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping message part {}: {}", index, e);
                    extraction.errors.push(e);
                }
            }
        }
    }

    /// Turns one leaf part into an attachment.
    ///
    /// `Ok(None)` for parts that are not attachments, such as the body text.
    fn parse_part(
        &self,
        message: &Message<'_>,
        index: usize,
        part: &MessagePart<'_>,
    ) -> Result<Option<Attachment>> {
        let Some(disposition) = part.content_disposition() else {
            debug!("Part {} has no Content-Disposition, not an attachment", index);
            return Ok(None);
        };
        if !disposition.ctype().eq_ignore_ascii_case("attachment") {
            debug!(
                "Part {} has disposition '{}', not an attachment",
                index,
                disposition.ctype()
            );
            return Ok(None);
        }

        let filename = disposition
            .attribute("filename")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| EmailError::AttachmentError {
                index,
                reason: "Content-Disposition has no filename".to_string(),
            })?;

        let encoding = part
            .content_transfer_encoding()
            .map(str::trim)
            .filter(|encoding| !encoding.is_empty())
            .ok_or_else(|| EmailError::AttachmentError {
                index,
                reason: "missing Content-Transfer-Encoding header".to_string(),
            })?;

        let Some(content) = attachment_bytes(message, part, encoding) else {
            return Err(EmailError::AttachmentError {
                index,
                reason: format!("body is not valid {}", encoding),
            });
        };
        info!(
            "Found attachment '{}' ({} bytes, {})",
            filename,
            content.len(),
            encoding
        );

        Ok(Some(Attachment {
            filename: filename.to_string(),
            content,
            destination: self.destination.clone(),
        }))
    }
}

/// The bytes of an attachment with only the transfer encoding undone.
///
/// Text parts are charset-decoded by the MIME parser, so their content is
/// taken from the raw message instead.
fn attachment_bytes(
    message: &Message<'_>,
    part: &MessagePart<'_>,
    encoding: &str,
) -> Option<Vec<u8>> {
    match part.body {
        PartType::Text(_) | PartType::Html(_) => {
            let raw = message
                .raw_message()
                .get(part.raw_body_offset() as usize..part.raw_end_offset() as usize)?;
            decode_transfer(raw, encoding)
        }
        _ => Some(part.contents().to_vec()),
    }
}

fn decode_transfer(raw: &[u8], encoding: &str) -> Option<Vec<u8>> {
    if encoding.eq_ignore_ascii_case("base64") {
        base64_decode(raw)
    } else if encoding.eq_ignore_ascii_case("quoted-printable") {
        quoted_printable_decode(raw)
    } else {
        Some(raw.to_vec())
    }
}

/// Joins the lines of a folded header value with single spaces.
fn unfold(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unknown charsets are decoded best-effort; this only makes them visible.
fn warn_unknown_charsets(message: &Message<'_>) {
    for part in &message.parts {
        let Some(charset) = part.content_type().and_then(|ct| ct.attribute("charset")) else {
            continue;
        };
        if !is_known_charset(charset) {
            warn!("Unknown charset '{}', decoding best-effort", charset);
        }
    }
}

fn is_known_charset(label: &str) -> bool {
    let label = label.trim().trim_matches('"');
    KNOWN_CHARSETS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(label))
}
