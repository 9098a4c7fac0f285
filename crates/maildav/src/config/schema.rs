use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub pollers: Vec<PollerSettings>,
}

impl Config {
    /// Resolves every poller's destination reference.
    pub fn poller_configs(&self) -> Result<Vec<PollerConfig>, ConfigError> {
        let destinations: Vec<Arc<DestinationConfig>> =
            self.destinations.iter().cloned().map(Arc::new).collect();

        self.pollers
            .iter()
            .map(|poller| {
                let destination = destinations
                    .iter()
                    .find(|d| d.name == poller.destination)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownDestination {
                        poller: poller.source_name.clone(),
                        destination: poller.destination.clone(),
                    })?;

                Ok(PollerConfig {
                    source_name: poller.source_name.clone(),
                    source: poller.source.clone(),
                    directories: poller.directories.clone(),
                    allowed_senders: poller.allowed_senders.clone(),
                    destination,
                    destination_directory: poller.destination_directory.clone(),
                    poll_interval: Duration::from_secs(poller.poll_interval),
                })
            })
            .collect()
    }
}

/// A poller as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerSettings {
    /// Name used in logs for this source.
    pub source_name: String,

    /// Mailbox source to poll.
    pub source: SourceConfig,

    /// Directories scanned in order on each cycle (default: ["INBOX"]).
    #[serde(default = "default_directories")]
    pub directories: Vec<String>,

    /// Exact `From` header values accepted. Empty accepts every sender.
    #[serde(default)]
    pub allowed_senders: Vec<String>,

    /// Name of the destination attachments are delivered to.
    pub destination: String,

    /// Directory inside the destination.
    #[serde(default)]
    pub destination_directory: String,

    /// Poll interval in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_directories() -> Vec<String> {
    vec!["INBOX".to_string()]
}

fn default_poll_interval() -> u64 {
    300
}

/// Resolved poller configuration handed to a [`crate::Poller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub source_name: String,
    pub source: SourceConfig,
    pub directories: Vec<String>,
    pub allowed_senders: Vec<String>,
    pub destination: Arc<DestinationConfig>,
    pub destination_directory: String,
    pub poll_interval: Duration,
}

/// Identity and credentials of an IMAP mailbox source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// IMAP server hostname (e.g., "imap.gmail.com").
    pub host: String,

    /// IMAP server port (default: 993 for IMAPS).
    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// Whether to use TLS (required for security).
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Email username (typically the email address).
    pub username: String,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthSettings,
}

fn default_imap_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

/// IMAP authentication settings.
///
/// Secrets are looked up at connect time from the direct value, a file, or an
/// environment variable, in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,

    /// WARNING: Storing passwords directly in config files is insecure.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "passwordInsecure",
        alias = "password"
    )]
    pub password_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    /// Environment variable holding an OAuth2 access token (XOAUTH2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_env_var: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "accessTokenInsecure",
        alias = "accessToken"
    )]
    pub access_token_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Password,
    OAuth2,
}

/// Where extracted attachments are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: DestinationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationKind {
    Filesystem(FilesystemSettings),
    WebDav(WebDavSettings),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemSettings {
    /// Root directory; destination directories are created below it.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDavSettings {
    /// Collection URL uploads are placed under.
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "passwordInsecure",
        alias = "password"
    )]
    pub password_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,
}
