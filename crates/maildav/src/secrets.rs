//! Credential lookup for mailbox sources and delivery destinations.
//!
//! A secret is configured through up to three fields and the first non-empty
//! one wins:
//!
//! 1. **Direct value** - `passwordInsecure: "hunter2"` (local testing only)
//! 2. **File reference** - `passwordFile: /run/secrets/imap_password`
//! 3. **Env var reference** - `passwordEnvVar: IMAP_PASSWORD`

use secrecy::SecretString;
use std::fs;

use crate::config::{AuthSettings, WebDavSettings};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// The configured locations of one secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSource<'a> {
    pub direct: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    pub fn new(
        direct: Option<&'a str>,
        file_path: Option<&'a str>,
        env_var: Option<&'a str>,
    ) -> Self {
        Self {
            direct,
            file_path,
            env_var,
        }
    }

    /// IMAP password of a source.
    pub fn imap_password(auth: &'a AuthSettings) -> Self {
        Self::new(
            auth.password_insecure.as_deref(),
            auth.password_file.as_deref(),
            auth.password_env_var.as_deref(),
        )
    }

    /// OAuth2 access token of a source.
    pub fn imap_access_token(auth: &'a AuthSettings) -> Self {
        Self::new(
            auth.access_token_insecure.as_deref(),
            auth.access_token_file.as_deref(),
            auth.access_token_env_var.as_deref(),
        )
    }

    /// Password of a WebDAV destination.
    pub fn webdav_password(settings: &'a WebDavSettings) -> Self {
        Self::new(
            settings.password_insecure.as_deref(),
            settings.password_file.as_deref(),
            settings.password_env_var.as_deref(),
        )
    }

    /// Whether at least one location is non-empty.
    pub fn is_configured(&self) -> bool {
        self.direct.is_some_and(|s| !s.is_empty())
            || self.file_path.is_some_and(|s| !s.is_empty())
            || self.env_var.is_some_and(|s| !s.is_empty())
    }

    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = self.direct.filter(|v| !v.is_empty()) {
            if self.file_path.is_some() || self.env_var.is_some() {
                log::debug!("Direct secret value shadows file/env configuration");
            }
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = self.file_path.filter(|p| !p.is_empty()) {
            let expanded = expand_home(path);
            return fs::read_to_string(&expanded)
                .map(|content| SecretString::from(content.trim().to_string()))
                .map_err(|e| SecretError::FileReadError {
                    path: expanded,
                    source: e,
                });
        }

        if let Some(name) = self.env_var.filter(|n| !n.is_empty()) {
            return match std::env::var(name) {
                // Env vars may carry a trailing newline.
                Ok(value) => Ok(SecretString::from(value.trim())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }

    /// Like [`resolve`](Self::resolve), but an unconfigured secret is `None`.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Expands a leading `~` to the user's home directory.
///
/// `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
