pub mod config;
pub mod delivery;
pub mod email;
pub mod error;
pub mod poller;
pub mod sanitize;
pub mod secrets;

pub use config::{load_config, Config, PollerConfig};
pub use delivery::{Delivery, DeliveryError, Uploader};
pub use email::{AggregateError, Attachment, ConnectionPool, EmailError, Extraction};
pub use error::{ConfigError, MaildavError, Result};
pub use poller::Poller;
pub use secrets::{SecretError, SecretSource};
