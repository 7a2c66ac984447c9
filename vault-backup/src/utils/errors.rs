//! Error types for the backup agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// Bad command-line input, rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Database snapshot, packing or encryption failed; no archive was kept.
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Delivery via {method} failed: {reason}")]
    Delivery { method: String, reason: String },

    /// Restore aborted before or while replacing the database.
    #[error("Restore failed: {0}")]
    RestoreFatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::Validation(_) => 2,
            _ => 1,
        }
    }
}

impl From<::config::ConfigError> for BackupError {
    fn from(err: ::config::ConfigError) -> Self {
        BackupError::Config(err.to_string())
    }
}

/// Failure of one external collaborator call.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("{0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
pub type ToolResult<T> = std::result::Result<T, ToolError>;
