//! Extracted attachments and the per-boundary extraction result.

use std::sync::Arc;

use crate::config::DestinationConfig;

use super::error::{AggregateError, EmailError, Result};

/// Delivery target shared by every attachment of a poller.
#[derive(Debug, Clone)]
pub struct DestinationInfo {
    pub config: Arc<DestinationConfig>,
    /// Directory inside the destination.
    pub directory: String,
}

impl DestinationInfo {
    pub fn new(config: Arc<DestinationConfig>, directory: impl Into<String>) -> Self {
        Self {
            config,
            directory: directory.into(),
        }
    }
}

/// A decoded file taken from a message part.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename as given in the part's `Content-Disposition` header.
    pub filename: String,
    /// Decoded bytes.
    pub content: Vec<u8>,
    pub destination: DestinationInfo,
}

/// Attachments gathered by one unit of work, together with every failure it
/// recovered from.
///
/// A message, a directory and a whole cycle each produce one. Partial
/// success is the normal case: attachments found next to failing siblings
/// are kept.
#[derive(Debug, Default)]
pub struct Extraction {
    pub attachments: Vec<Attachment>,
    pub errors: AggregateError,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the result of a child unit into this one.
    ///
    /// A child contributes at most one cause: its fatal error, or its own
    /// aggregate when non-empty. `attribute` wraps that cause with the
    /// child's identity.
    pub fn absorb<F>(&mut self, child: Result<Extraction>, attribute: F)
    where
        F: FnOnce(EmailError) -> EmailError,
    {
        match child {
            Ok(extraction) => {
                self.attachments.extend(extraction.attachments);
                if !extraction.errors.is_empty() {
                    self.errors
                        .push(attribute(EmailError::Aggregate(extraction.errors)));
                }
            }
            Err(err) => self.errors.push(attribute(err)),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Attachment>, AggregateError) {
        (self.attachments, self.errors)
    }
}
