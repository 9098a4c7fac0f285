use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaildavError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Email error: {0}")]
    Email(#[from] crate::email::EmailError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] crate::delivery::DeliveryError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Poller '{poller}' references unknown destination '{destination}'")]
    UnknownDestination { poller: String, destination: String },

    #[error("Duplicate destination name '{0}'")]
    DuplicateDestination(String),
}

pub type Result<T> = std::result::Result<T, MaildavError>;
