//! In-memory mailbox standing in for an IMAP server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use maildav::config::SourceConfig;
use maildav::email::{Connector, EmailError, MailSession, RawMessage};

struct StoredMessage {
    body: Vec<u8>,
    seen: bool,
}

#[derive(Default)]
struct MailboxState {
    directories: HashMap<String, Vec<StoredMessage>>,
    connects: usize,
    fetches: usize,
    selects: Vec<String>,
    fail_connect: bool,
    fail_fetch: bool,
}

/// Shared handle to the mailbox; clones see the same state.
#[derive(Clone, Default)]
pub struct MockMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl MockMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory holding `messages`, all unread.
    pub fn with_directory(self, name: &str, messages: Vec<Vec<u8>>) -> Self {
        self.lock().directories.insert(
            name.to_string(),
            messages
                .into_iter()
                .map(|body| StoredMessage { body, seen: false })
                .collect(),
        );
        self
    }

    pub fn deliver(&self, directory: &str, body: Vec<u8>) {
        self.lock()
            .directories
            .entry(directory.to_string())
            .or_default()
            .push(StoredMessage { body, seen: false });
    }

    pub fn unseen(&self, directory: &str) -> usize {
        self.lock()
            .directories
            .get(directory)
            .map(|messages| messages.iter().filter(|m| !m.seen).count())
            .unwrap_or(0)
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn selects(&self) -> Vec<String> {
        self.lock().selects.clone()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    pub fn connector(&self) -> Arc<MockConnector> {
        Arc::new(MockConnector {
            mailbox: self.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap()
    }
}

pub struct MockConnector {
    mailbox: MockMailbox,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _source: &SourceConfig) -> Result<Box<dyn MailSession>, EmailError> {
        let mut state = self.mailbox.lock();
        if state.fail_connect {
            return Err(EmailError::ConnectionFailed("connection refused".to_string()));
        }
        state.connects += 1;

        Ok(Box::new(MockSession {
            mailbox: self.mailbox.clone(),
            selected: None,
        }))
    }
}

struct MockSession {
    mailbox: MockMailbox,
    selected: Option<String>,
}

#[async_trait]
impl MailSession for MockSession {
    async fn select(&mut self, directory: &str) -> Result<(), EmailError> {
        let mut state = self.mailbox.lock();
        state.selects.push(directory.to_string());

        if state.directories.contains_key(directory) {
            self.selected = Some(directory.to_string());
            Ok(())
        } else {
            self.selected = None;
            Err(EmailError::FolderNotFound {
                folder: directory.to_string(),
                reason: "NO [NONEXISTENT] Unknown Mailbox".to_string(),
            })
        }
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>, EmailError> {
        let selected = self
            .selected
            .as_ref()
            .ok_or_else(|| EmailError::ProtocolError("No mailbox selected".to_string()))?;

        let state = self.mailbox.lock();
        Ok(state.directories[selected]
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.seen)
            .map(|(i, _)| i as u32 + 1)
            .collect())
    }

    async fn fetch(
        &mut self,
        ids: &[u32],
        sink: mpsc::Sender<RawMessage>,
    ) -> Result<(), EmailError> {
        let selected = self
            .selected
            .clone()
            .ok_or_else(|| EmailError::ProtocolError("No mailbox selected".to_string()))?;

        // Fetching BODY[] marks the messages read.
        let (batch, fail) = {
            let mut state = self.mailbox.lock();
            state.fetches += 1;
            let fail = state.fail_fetch;
            let messages = state.directories.get_mut(&selected).unwrap();
            let batch: Vec<RawMessage> = ids
                .iter()
                .map(|&id| {
                    let message = &mut messages[(id - 1) as usize];
                    message.seen = true;
                    RawMessage {
                        id,
                        uid: Some(1000 + id),
                        body: message.body.clone(),
                    }
                })
                .collect();
            (batch, fail)
        };

        for raw in batch {
            if sink.send(raw).await.is_err() {
                return Err(EmailError::FetchFailed("receiver dropped".to_string()));
            }
        }

        if fail {
            return Err(EmailError::FetchFailed("connection reset during FETCH".to_string()));
        }
        Ok(())
    }

    async fn noop(&mut self) -> Result<(), EmailError> {
        Ok(())
    }
}
