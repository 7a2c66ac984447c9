//! Logging configuration using tracing.
//!
//! Every event is appended to a durable log file; the console mirror sends
//! warnings and errors to stderr and everything else to stdout.

use crate::config::LogConfig;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the configured level and log file.
pub fn init(log: &LogConfig, log_file: &Path) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout));

    let file_layer = match open_sink(log_file) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!(
                "warning: cannot open log file {} ({}), logging to console only",
                log_file.display(),
                e
            );
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Open the log file for appending, creating parent directories.
fn open_sink(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_sink_creates_parents_and_appends() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("log/nested/backup.log");

        writeln!(open_sink(&path)?, "first")?;
        writeln!(open_sink(&path)?, "second")?;

        assert_eq!(std::fs::read_to_string(&path)?, "first\nsecond\n");
        Ok(())
    }

    #[test]
    fn test_open_sink_reports_unwritable_path() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file")?;

        assert!(open_sink(&blocker.join("backup.log")).is_err());
        Ok(())
    }
}
