//! IMAP attachment source module.
//!
//! Connections are pooled per source identity and locked for the duration
//! of a poll cycle. Each cycle selects the configured directories, fetches
//! unread messages and extracts their attachment parts.

pub mod attachment;
pub mod client;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod pool;
pub mod scanner;
pub mod session;

pub use attachment::{Attachment, DestinationInfo, Extraction};
pub use client::{ImapConnector, ImapSession};
pub use error::{AggregateError, EmailError};
pub use fetch::{fetch_and_drain, FetchOutcome, DEFAULT_FETCH_BUFFER};
pub use parser::MessageParser;
pub use pool::{ConnectionPool, PooledSession, SourceKey};
pub use scanner::DirectoryScanner;
pub use session::{Connector, MailSession, RawMessage};
