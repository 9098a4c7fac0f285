//! Keyed pool of exclusively locked mailbox sessions.
//!
//! One [`PooledConnection`] exists per source identity. It is created on the
//! first [`ConnectionPool::connect_and_lock`] for that identity and reused by
//! every later cycle. Holding a [`PooledSession`] means holding the
//! connection's lock; the lock is released when the handle is dropped, so
//! every exit path of the caller (including unwinding and cancelled futures)
//! gives the connection back.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;

use super::client::ImapConnector;
use super::error::{EmailError, Result};
use super::session::{Connector, MailSession, RawMessage};

/// Identity a connection is pooled under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl From<&SourceConfig> for SourceKey {
    fn from(source: &SourceConfig) -> Self {
        Self {
            host: source.host.clone(),
            port: source.port,
            username: source.username.clone(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// A session slot bound to one source.
pub struct PooledConnection {
    key: SourceKey,
    session: Option<Box<dyn MailSession>>,
    /// Set while a command runs; still set on the next lock means the
    /// previous holder was dropped mid-command and the session is unusable.
    in_flight: bool,
}

impl PooledConnection {
    fn new(key: SourceKey) -> Self {
        Self {
            key,
            session: None,
            in_flight: false,
        }
    }

    fn session(&mut self) -> Result<&mut Box<dyn MailSession>> {
        self.session
            .as_mut()
            .ok_or_else(|| EmailError::ConnectionFailed("Not connected".to_string()))
    }
}

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    connections: Mutex<HashMap<SourceKey, Arc<AsyncMutex<PooledConnection>>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Pool opening real IMAP-over-TLS sessions.
    pub fn imap() -> Self {
        Self::new(Arc::new(ImapConnector::new()))
    }

    /// Locks the connection for `source`, connecting or reconnecting first
    /// if needed.
    ///
    /// Waits while another holder has the same source locked. Sources with
    /// different identities never wait on each other.
    pub async fn connect_and_lock(&self, source: &SourceConfig) -> Result<PooledSession> {
        let slot = self.slot(source);

        let mut guard = slot.lock_owned().await;
        debug!("Acquired connection lock for {}", guard.key);

        // On error the guard drops here and the lock is released.
        self.ensure_connected(&mut guard, source).await?;

        Ok(PooledSession { guard })
    }

    /// Number of source identities seen so far.
    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, source: &SourceConfig) -> Arc<AsyncMutex<PooledConnection>> {
        let key = SourceKey::from(source);
        let mut connections = self.lock_index();
        Arc::clone(
            connections
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(PooledConnection::new(key)))),
        )
    }

    fn lock_index(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SourceKey, Arc<AsyncMutex<PooledConnection>>>> {
        // The index is only touched by short, non-panicking critical sections.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn ensure_connected(
        &self,
        conn: &mut PooledConnection,
        source: &SourceConfig,
    ) -> Result<()> {
        if conn.in_flight {
            warn!(
                "Connection for {} was abandoned mid-command, reconnecting",
                conn.key
            );
            conn.session = None;
            conn.in_flight = false;
        }

        if let Some(session) = conn.session.as_mut() {
            match session.noop().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Connection for {} is stale ({}), reconnecting", conn.key, e);
                    conn.session = None;
                }
            }
        }

        info!("Opening connection for {}", conn.key);
        let session = self.connector.connect(source).await?;
        conn.session = Some(session);
        Ok(())
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("sources", &self.len())
            .finish()
    }
}

/// Exclusive handle to a pooled, connected session.
pub struct PooledSession {
    guard: OwnedMutexGuard<PooledConnection>,
}

impl PooledSession {
    pub fn source_key(&self) -> &SourceKey {
        &self.guard.key
    }

    /// Releases the lock. Dropping the handle does the same.
    pub fn unlock(self) {}
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        debug!("Released connection lock for {}", self.guard.key);
    }
}

#[async_trait]
impl MailSession for PooledSession {
    async fn select(&mut self, directory: &str) -> Result<()> {
        let conn = &mut *self.guard;
        conn.in_flight = true;
        let result = conn.session()?.select(directory).await;
        conn.in_flight = false;
        result
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        let conn = &mut *self.guard;
        conn.in_flight = true;
        let result = conn.session()?.search_unseen().await;
        conn.in_flight = false;
        result
    }

    async fn fetch(&mut self, ids: &[u32], sink: mpsc::Sender<RawMessage>) -> Result<()> {
        let conn = &mut *self.guard;
        conn.in_flight = true;
        let result = conn.session()?.fetch(ids, sink).await;
        conn.in_flight = false;
        result
    }

    async fn noop(&mut self) -> Result<()> {
        let conn = &mut *self.guard;
        conn.in_flight = true;
        let result = conn.session()?.noop().await;
        conn.in_flight = false;
        result
    }

    async fn logout(&mut self) -> Result<()> {
        let conn = &mut *self.guard;
        match conn.session.take() {
            Some(mut session) => session.logout().await,
            None => Ok(()),
        }
    }
}
