//! Protocol session capability consumed by the scanner and the pool.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SourceConfig;

use super::error::Result;

/// A raw message as returned by the server.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Sequence number in the selected directory.
    pub id: u32,
    pub uid: Option<u32>,
    /// Full RFC 5322 message bytes.
    pub body: Vec<u8>,
}

/// Operations the poller needs from a live mailbox session.
#[async_trait]
pub trait MailSession: Send {
    /// Selects `directory` for subsequent search and fetch calls.
    async fn select(&mut self, directory: &str) -> Result<()>;

    /// Ids of messages in the selected directory lacking the `\Seen` flag,
    /// in ascending order.
    async fn search_unseen(&mut self) -> Result<Vec<u32>>;

    /// Streams the bodies of `ids` into `sink`.
    ///
    /// This is the producer half of a fetch: it returns once every message
    /// has been sent (or the fetch failed) and the returned value is the
    /// completion signal of the whole fetch.
    async fn fetch(&mut self, ids: &[u32], sink: mpsc::Sender<RawMessage>) -> Result<()>;

    /// Round trip used as a liveness check.
    async fn noop(&mut self) -> Result<()>;

    async fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens new sessions for a source.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, source: &SourceConfig) -> Result<Box<dyn MailSession>>;
}
