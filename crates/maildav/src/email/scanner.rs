//! Directory scanning: select, search unseen, fetch and parse.

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::attachment::Extraction;
use super::error::Result;
use super::fetch::{fetch_and_drain, DEFAULT_FETCH_BUFFER};
use super::parser::MessageParser;
use super::session::MailSession;

/// Scans directories of a locked session for unread messages.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    parser: MessageParser,
    fetch_buffer: usize,
}

impl DirectoryScanner {
    pub fn new(parser: MessageParser) -> Self {
        Self {
            parser,
            fetch_buffer: DEFAULT_FETCH_BUFFER,
        }
    }

    /// Sets how many fetched messages may wait for the parser.
    pub fn with_fetch_buffer(mut self, capacity: usize) -> Self {
        self.fetch_buffer = capacity.max(1);
        self
    }

    /// Scans `directories` in order.
    ///
    /// A failing directory never stops the others; its failure becomes one
    /// cause of the returned aggregate.
    pub async fn scan_directories<S>(&self, session: &mut S, directories: &[String]) -> Extraction
    where
        S: MailSession + ?Sized,
    {
        let mut cycle = Extraction::new();

        for directory in directories {
            info!("Scanning directory '{}'", directory);
            let result = self.scan_directory(session, directory).await;
            if let Err(e) = &result {
                error!("Error while scanning directory '{}': {}", directory, e);
            }
            cycle.absorb(result, |e| e.in_directory(directory.as_str()));
            info!("Finished scanning directory '{}'", directory);
        }

        cycle
    }

    /// Extracts attachments from every unread message in `directory`.
    ///
    /// `Err` means the directory could not be selected or searched. Once the
    /// fetch has started, every message is parsed and failures are collected
    /// per message.
    pub async fn scan_directory<S>(&self, session: &mut S, directory: &str) -> Result<Extraction>
    where
        S: MailSession + ?Sized,
    {
        let span = info_span!("scan_directory", directory = %directory);

        async move {
            session.select(directory).await?;

            let ids = session.search_unseen().await?;
            if ids.is_empty() {
                info!("No unread messages");
                return Ok(Extraction::new());
            }
            info!("Found {} unread messages", ids.len());

            let outcome = fetch_and_drain(session, &ids, self.fetch_buffer, |raw| {
                debug!("Parsing message {} (uid {:?})", raw.id, raw.uid);
                (raw.id, self.parser.parse_message(&raw.body))
            })
            .await;

            let mut extraction = Extraction::new();
            for (id, result) in outcome.items {
                if let Err(e) = &result {
                    warn!("Skipping message {}: {}", id, e);
                }
                extraction.absorb(result, |e| e.in_message(id));
            }

            if let Err(e) = outcome.completion {
                error!("Error while fetching mail: {}", e);
                extraction.errors.push(e);
            }

            if !extraction.is_clean() {
                warn!(
                    "{} failures while scanning: {}",
                    extraction.errors.len(),
                    extraction.errors
                );
            }
            info!("Extracted {} attachments", extraction.attachments.len());

            Ok(extraction)
        }
        .instrument(span)
        .await
    }
}
