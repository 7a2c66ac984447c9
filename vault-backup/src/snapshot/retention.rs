//! Age-based pruning of the backup directory.
//!
//! Only files named like archives with the configured prefix are ever
//! considered; the age comes from the timestamp in the name.

use crate::archive::list_archives;
use chrono::{Duration, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Delete archives in `dir` older than `retention_days` relative to `now`.
/// Returns the deleted paths. A retention of zero days disables pruning.
pub fn sweep(
    dir: &Path,
    prefix: &str,
    retention_days: u32,
    now: NaiveDateTime,
) -> std::io::Result<Vec<PathBuf>> {
    if retention_days == 0 {
        return Ok(Vec::new());
    }

    let cutoff = now - Duration::days(i64::from(retention_days));
    let mut removed = Vec::new();

    for (archive, name) in list_archives(dir, prefix)? {
        if name.created >= cutoff {
            continue;
        }
        match std::fs::remove_file(&archive.path) {
            Ok(()) => {
                info!("[Retention] Removed old backup: {}", archive.file_name());
                removed.push(archive.path);
            }
            Err(e) => warn!("[Retention] Failed to remove {}: {}", archive, e),
        }
    }

    Ok(removed)
}
