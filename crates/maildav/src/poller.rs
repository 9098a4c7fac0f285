//! Periodic polling of one mailbox source.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::PollerConfig;
use crate::delivery::Delivery;
use crate::email::{ConnectionPool, DirectoryScanner, EmailError, Extraction, MessageParser};

/// Polls the directories of one source and hands attachments to a
/// [`Delivery`].
#[derive(Debug)]
pub struct Poller {
    config: PollerConfig,
    pool: Arc<ConnectionPool>,
    scanner: DirectoryScanner,
}

impl Poller {
    pub fn new(config: PollerConfig, pool: Arc<ConnectionPool>) -> Self {
        let scanner = DirectoryScanner::new(MessageParser::from_config(&config));
        Self {
            config,
            pool,
            scanner,
        }
    }

    /// Replaces the scanner, e.g. to tune its fetch buffer.
    pub fn with_scanner(mut self, scanner: DirectoryScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Runs poll cycles until `cancel` fires.
    ///
    /// Errors of a cycle, whether from polling or delivery, are logged and the
    /// loop goes on. Cancellation is observed before every cycle and during
    /// the wait between cycles, never in the middle of one.
    pub async fn start_polling<D>(&self, cancel: CancellationToken, delivery: &D)
    where
        D: Delivery + ?Sized,
    {
        info!(
            "Starting poller for '{}' every {:?}",
            self.config.source_name, self.config.poll_interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let attachments = match self.poll().await {
                Ok(extraction) => {
                    let (attachments, errors) = extraction.into_parts();
                    if !errors.is_empty() {
                        error!(
                            source = %self.config.source_name,
                            "Error while polling: {}",
                            errors
                        );
                    }
                    attachments
                }
                Err(e) => {
                    error!(
                        source = %self.config.source_name,
                        "Error while polling: {}",
                        e
                    );
                    Vec::new()
                }
            };

            if let Err(e) = delivery.upload_attachments(attachments).await {
                error!(
                    source = %self.config.source_name,
                    "Error while uploading attachments: {}",
                    e
                );
            }

            debug!("Sleeping for {:?}", self.config.poll_interval);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Poller for '{}' stopped", self.config.source_name);
    }

    /// Runs one cycle over every configured directory.
    ///
    /// `Err` only when no session could be obtained. Directory and message
    /// failures come back inside the extraction, next to whatever was found.
    pub async fn poll(&self) -> Result<Extraction, EmailError> {
        let span = info_span!("poll", source = %self.config.source_name);

        async move {
            info!("Polling");

            let mut session = self.pool.connect_and_lock(&self.config.source).await?;
            let extraction = self
                .scanner
                .scan_directories(&mut session, &self.config.directories)
                .await;
            session.unlock();

            if !extraction.is_clean() {
                warn!(
                    "{} of {} directories reported failures",
                    extraction.errors.len(),
                    self.config.directories.len()
                );
            }
            info!(
                "Poll finished with {} attachments",
                extraction.attachments.len()
            );

            Ok(extraction)
        }
        .instrument(span)
        .await
    }
}
