//! Vault Backup Library
//!
//! Snapshot, delivery and restore of a self-hosted password vault's
//! persisted state.

pub mod archive;
pub mod config;
pub mod dispatch;
pub mod executor;
pub mod fs;
pub mod notify;
pub mod restore;
pub mod snapshot;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{BackupError, Result};
