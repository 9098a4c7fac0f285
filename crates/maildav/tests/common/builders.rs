//! Builders for raw messages, configurations and deliveries.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use maildav::config::{
    AuthSettings, DestinationConfig, DestinationKind, FilesystemSettings, PollerConfig,
    SourceConfig,
};
use maildav::delivery::{Delivery, DeliveryError};
use maildav::email::Attachment;

pub const SENDER: &str = "Billing <billing@example.com>";

/// A multipart message with a text body followed by one part per attachment.
pub fn message_with_attachments<N, C>(from: &str, attachments: &[(N, C)]) -> Vec<u8>
where
    N: AsRef<str>,
    C: AsRef<[u8]>,
{
    let mut raw = format!(
        "From: {}\r\nTo: inbox@example.com\r\nSubject: Documents\r\nMIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n\r\n\
         --BOUNDARY\r\nContent-Type: text/plain; charset=utf-8\r\n\
         Content-Transfer-Encoding: 7bit\r\n\r\nPlease find the documents attached.\r\n",
        from
    );

    for (filename, content) in attachments {
        raw.push_str(&format!(
            "--BOUNDARY\r\nContent-Type: application/octet-stream\r\n\
             Content-Disposition: attachment; filename=\"{}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n{}\r\n",
            filename.as_ref(),
            base64::engine::general_purpose::STANDARD.encode(content.as_ref())
        ));
    }

    raw.push_str("--BOUNDARY--\r\n");
    raw.into_bytes()
}

/// A single-part text message.
pub fn plain_message(from: &str) -> Vec<u8> {
    format!(
        "From: {}\r\nTo: inbox@example.com\r\nSubject: Hello\r\n\r\nNo attachments here.\r\n",
        from
    )
    .into_bytes()
}

pub fn source(host: &str) -> SourceConfig {
    SourceConfig {
        host: host.to_string(),
        port: 993,
        use_tls: true,
        username: "inbox@example.com".to_string(),
        auth: AuthSettings {
            password_insecure: Some("secret".to_string()),
            ..Default::default()
        },
    }
}

/// Poller writing to a filesystem destination below `root`.
pub fn poller_config(directories: &[&str], root: &Path) -> PollerConfig {
    PollerConfig {
        source_name: "test-source".to_string(),
        source: source("imap.example.com"),
        directories: directories.iter().map(|d| d.to_string()).collect(),
        allowed_senders: Vec::new(),
        destination: Arc::new(DestinationConfig {
            name: "local".to_string(),
            kind: DestinationKind::Filesystem(FilesystemSettings {
                path: root.to_path_buf(),
            }),
        }),
        destination_directory: "attachments".to_string(),
        poll_interval: Duration::from_secs(3600),
    }
}

/// Delivery that records every batch it is handed.
#[derive(Default)]
pub struct RecordingDelivery {
    batches: Mutex<Vec<Vec<Attachment>>>,
    fail: bool,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records batches but reports every non-empty one as failed.
    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|a| a.filename.clone())
            .collect()
    }

    /// Waits until at least `calls` batches arrived.
    pub async fn wait_for_calls(&self, calls: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls() < calls {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("delivery was not called in time");
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn upload_attachments(&self, attachments: Vec<Attachment>) -> Result<(), DeliveryError> {
        let total = attachments.len();
        self.batches.lock().unwrap().push(attachments);

        if self.fail && total > 0 {
            return Err(DeliveryError::Partial {
                total,
                failures: vec![DeliveryError::WebDav {
                    url: "https://dav.example.com".to_string(),
                    reason: "503 Service Unavailable".to_string(),
                }],
            });
        }
        Ok(())
    }
}
