//! Delivery of extracted attachments to their destinations.

pub mod filesystem;
pub mod webdav;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};

use crate::config::DestinationKind;
use crate::email::Attachment;

pub use filesystem::FilesystemStore;
pub use webdav::WebDavClient;

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for HTTP requests (2 minutes, uploads can be large).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("WebDAV request to '{url}' failed: {reason}")]
    WebDav { url: String, reason: String },

    #[error("Invalid WebDAV URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Credentials not found: {0}")]
    Credentials(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("Delivery task failed: {0}")]
    Task(String),

    #[error("Failed to deliver '{filename}': {source}")]
    Attachment {
        filename: String,
        #[source]
        source: Box<DeliveryError>,
    },

    #[error("{} of {total} attachments could not be delivered", failures.len())]
    Partial {
        total: usize,
        failures: Vec<DeliveryError>,
    },
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Consumer of the attachments found in a poll cycle.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Delivers every attachment to its destination.
    ///
    /// One failing attachment does not stop the others.
    async fn upload_attachments(&self, attachments: Vec<Attachment>) -> Result<()>;
}

/// Delivers attachments to filesystem and WebDAV destinations.
#[derive(Debug, Clone)]
pub struct Uploader {
    http: Client,
}

impl Uploader {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::HttpClient(e.to_string()))?;
        Ok(Self { http })
    }

    /// Delivers one attachment and returns where it ended up.
    async fn deliver(&self, attachment: Attachment) -> Result<String> {
        let Attachment {
            filename,
            content,
            destination,
        } = attachment;

        match &destination.config.kind {
            DestinationKind::Filesystem(settings) => {
                let store = FilesystemStore::new(&settings.path);
                let directory = destination.directory.clone();
                let path = tokio::task::spawn_blocking(move || {
                    store.store(&directory, &filename, &content)
                })
                .await
                .map_err(|e| DeliveryError::Task(e.to_string()))??;
                Ok(path.display().to_string())
            }
            DestinationKind::WebDav(settings) => {
                WebDavClient::new(&self.http, settings)
                    .upload(&destination.directory, &filename, content)
                    .await
            }
        }
    }
}

#[async_trait]
impl Delivery for Uploader {
    async fn upload_attachments(&self, attachments: Vec<Attachment>) -> Result<()> {
        let total = attachments.len();
        if total == 0 {
            return Ok(());
        }

        let span = info_span!("upload_attachments", count = total);
        async move {
            let mut failures = Vec::new();

            for attachment in attachments {
                let filename = attachment.filename.clone();
                let destination = attachment.destination.config.name.clone();

                match self.deliver(attachment).await {
                    Ok(location) => {
                        info!(
                            "Delivered '{}' to '{}' at {}",
                            filename, destination, location
                        );
                    }
                    Err(e) => {
                        error!(
                            "Failed to deliver '{}' to '{}': {}",
                            filename, destination, e
                        );
                        failures.push(DeliveryError::Attachment {
                            filename,
                            source: Box::new(e),
                        });
                    }
                }
            }

            if failures.is_empty() {
                Ok(())
            } else {
                Err(DeliveryError::Partial { total, failures })
            }
        }
        .instrument(span)
        .await
    }
}
