//! Email source error types.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while polling a mailbox source.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Failed to connect to the IMAP server.
    #[error("IMAP connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS/SSL error during connection.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Failed to resolve credentials for the source.
    #[error("Credentials not found: {0}")]
    CredentialsNotFound(String),

    /// IMAP protocol error.
    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    /// Folder could not be selected.
    #[error("IMAP folder '{folder}' could not be selected: {reason}")]
    FolderNotFound { folder: String, reason: String },

    /// The fetch producer finished with an error.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// Failed to parse email message.
    #[error("Failed to parse email: {0}")]
    ParseError(String),

    /// Sender is not on the configured allow-list.
    #[error("Message from sender '{sender}' is not on the allow-list")]
    SenderNotAllowed { sender: String },

    /// Failed to extract one attachment part.
    #[error("Failed to extract attachment part {index}: {reason}")]
    AttachmentError { index: usize, reason: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A failure attributed to one message.
    #[error("message {id}: {source}")]
    Message {
        id: u32,
        #[source]
        source: Box<EmailError>,
    },

    /// A failure attributed to one directory.
    #[error("directory '{directory}': {source}")]
    Directory {
        directory: String,
        #[source]
        source: Box<EmailError>,
    },

    /// Several independent failures from one unit of work.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl EmailError {
    /// Attributes this error to a message id.
    pub fn in_message(self, id: u32) -> Self {
        EmailError::Message {
            id,
            source: Box::new(self),
        }
    }

    /// Attributes this error to a directory.
    pub fn in_directory(self, directory: impl Into<String>) -> Self {
        EmailError::Directory {
            directory: directory.into(),
            source: Box::new(self),
        }
    }
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::TlsError(err.to_string())
    }
}

impl From<async_imap::error::Error> for EmailError {
    fn from(err: async_imap::error::Error) -> Self {
        EmailError::ProtocolError(err.to_string())
    }
}

/// Result type for email operations.
pub type Result<T> = std::result::Result<T, EmailError>;

/// Ordered collection of independent failures.
///
/// Collecting never short-circuits: callers push every failure they see and
/// keep working on sibling items. An empty aggregate means "no error".
#[derive(Debug, Default)]
pub struct AggregateError {
    causes: Vec<EmailError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a cause. Empty nested aggregates are dropped.
    pub fn push(&mut self, err: EmailError) {
        if let EmailError::Aggregate(inner) = &err {
            if inner.is_empty() {
                return;
            }
        }
        self.causes.push(err);
    }

    /// Records the error of `result`, if any, and returns its value.
    pub fn collect<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EmailError> {
        self.causes.iter()
    }

    pub fn causes(&self) -> &[EmailError] {
        &self.causes
    }

    pub fn into_causes(self) -> Vec<EmailError> {
        self.causes
    }

    /// `Ok(())` when no cause was recorded.
    pub fn into_result(self) -> std::result::Result<(), AggregateError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.causes.as_slice() {
            [] => write!(f, "no errors"),
            [only] => write!(f, "{}", only),
            causes => {
                write!(f, "{} errors occurred:", causes.len())?;
                for (i, cause) in causes.iter().enumerate() {
                    write!(f, " [{}] {}", i + 1, cause)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AggregateError {}

impl Extend<EmailError> for AggregateError {
    fn extend<I: IntoIterator<Item = EmailError>>(&mut self, iter: I) {
        for err in iter {
            self.push(err);
        }
    }
}

impl FromIterator<EmailError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = EmailError>>(iter: I) -> Self {
        let mut aggregate = AggregateError::new();
        aggregate.extend(iter);
        aggregate
    }
}

impl<'a> IntoIterator for &'a AggregateError {
    type Item = &'a EmailError;
    type IntoIter = std::slice::Iter<'a, EmailError>;

    fn into_iter(self) -> Self::IntoIter {
        self.causes.iter()
    }
}
