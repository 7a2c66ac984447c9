//! Online database snapshot through SQLite's backup API.

use super::DbSnapshotter;
use crate::utils::errors::{ToolError, ToolResult};
use rusqlite::{Connection, DatabaseName, OpenFlags};
use std::path::Path;

/// Copies a live SQLite database page by page under SQLite's own locking,
/// so the copy never observes a partial write.
pub struct SqliteSnapshotter;

impl DbSnapshotter for SqliteSnapshotter {
    fn snapshot(&self, source: &Path, dest: &Path) -> ToolResult<()> {
        if !source.is_file() {
            return Err(ToolError::Unavailable(format!(
                "database {} does not exist",
                source.display()
            )));
        }

        let conn = Connection::open_with_flags(
            source,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.backup(DatabaseName::Main, dest, None)?;
        Ok(())
    }
}
