//! Shared test utilities for maildav integration tests.
//!
//! This module provides:
//! - `MockMailbox`, an in-memory IMAP server with connectors and sessions
//! - Builders for raw messages and poller configurations
//! - `RecordingDelivery`, a delivery that remembers every batch

pub mod builders;
pub mod mailbox;

pub use builders::*;
pub use mailbox::MockMailbox;
