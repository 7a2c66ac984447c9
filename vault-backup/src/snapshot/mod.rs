//! Archive capture.
//!
//! One build produces one archive: a consistent database snapshot plus
//! whichever optional state components exist, packed into a single gzip
//! tarball and, when a key is configured, encrypted before it ever reaches
//! disk. The archive is written under a hidden `.partial` name and renamed
//! into place only once complete, so a failed build leaves nothing behind.

pub mod retention;

use crate::archive::components::{component_table, Component, PackEntry, DATABASE_ENTRY};
use crate::archive::manifest::{Manifest, MANIFEST_ENTRY};
use crate::archive::{Archive, ArchiveName};
use crate::config::Config;
use crate::tools::Tools;
use crate::utils::errors::{BackupError, Result, ToolError, ToolResult};
use chrono::Local;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct SnapshotBuilder<'a> {
    config: &'a Config,
    tools: &'a Tools,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(config: &'a Config, tools: &'a Tools) -> Self {
        Self { config, tools }
    }

    /// Capture a new archive, then apply retention to the backup directory.
    pub fn build(&self) -> Result<Archive> {
        let archive = self.build_unpruned()?;
        self.prune();
        Ok(archive)
    }

    /// Capture a new archive without touching existing ones.
    pub fn build_unpruned(&self) -> Result<Archive> {
        let backup_dir = self.config.backup_dir();
        fs::create_dir_all(&backup_dir).map_err(|e| {
            BackupError::Snapshot(format!(
                "cannot create backup directory {}: {}",
                backup_dir.display(),
                e
            ))
        })?;

        let key = self.config.encryption_key();
        let name = ArchiveName::now(&self.config.backup.prefix, key.is_some());
        let archive_path = backup_dir.join(name.to_string());
        info!(
            "Creating backup {} ({})",
            name,
            if key.is_some() { "encrypted" } else { "unencrypted" }
        );

        let scratch = tempfile::Builder::new()
            .prefix(".snapshot-")
            .tempdir_in(&backup_dir)
            .map_err(|e| BackupError::Snapshot(format!("cannot create scratch directory: {}", e)))?;

        let result = self.capture(scratch.path(), &name, &archive_path, key);

        // The scratch copy of the database goes away whatever happened above
        if let Err(e) = scratch.close() {
            warn!("Failed to remove snapshot scratch directory: {}", e);
        }

        let archive = result?;
        match archive.size() {
            Ok(size) => info!("Backup created: {} ({} bytes)", archive, size),
            Err(_) => info!("Backup created: {}", archive),
        }
        Ok(archive)
    }

    fn capture(
        &self,
        scratch: &Path,
        name: &ArchiveName,
        archive_path: &Path,
        key: Option<&str>,
    ) -> Result<Archive> {
        let live_db = self.config.vault.database_path();
        let db_snapshot = scratch.join(DATABASE_ENTRY);
        self.tools
            .snapshotter
            .snapshot(&live_db, &db_snapshot)
            .map_err(|e| {
                BackupError::Snapshot(format!(
                    "database snapshot of {} failed: {}",
                    live_db.display(),
                    e
                ))
            })?;
        debug!("Database snapshot written to {}", db_snapshot.display());

        let entries = self.collect_entries(scratch, name, &db_snapshot).map_err(|e| {
            BackupError::Snapshot(format!("failed to inventory vault state: {}", e))
        })?;

        self.write_archive(&entries, archive_path, key)?;

        Ok(Archive {
            path: archive_path.to_path_buf(),
            encrypted: key.is_some(),
        })
    }

    /// Database snapshot, present components and the manifest describing them.
    fn collect_entries(
        &self,
        scratch: &Path,
        name: &ArchiveName,
        db_snapshot: &Path,
    ) -> std::io::Result<Vec<PackEntry>> {
        let mut manifest = Manifest::new(
            &name.prefix,
            name.created.format("%Y-%m-%dT%H:%M:%S").to_string(),
        );

        let db_entry = PackEntry::file(db_snapshot, DATABASE_ENTRY);
        manifest.record(Component::Database, &db_entry)?;
        let mut entries = vec![db_entry];

        for spec in component_table(self.config) {
            let found = spec.collect_live();
            if found.is_empty() {
                debug!("Skipping {}: not present", spec.component);
                continue;
            }
            for entry in found {
                manifest.record(spec.component, &entry)?;
                entries.push(entry);
            }
            info!("Including {}", spec.component);
        }

        let manifest_path = scratch.join(MANIFEST_ENTRY);
        manifest.write_to(&manifest_path)?;
        entries.push(PackEntry::file(manifest_path, MANIFEST_ENTRY));

        Ok(entries)
    }

    fn write_archive(&self, entries: &[PackEntry], path: &Path, key: Option<&str>) -> Result<()> {
        let partial = partial_path(path);

        let written = File::create(&partial)
            .map_err(ToolError::from)
            .and_then(|mut file| -> ToolResult<()> {
                self.pack_into(entries, &mut file, key)?;
                file.sync_all()?;
                Ok(())
            })
            .and_then(|()| fs::rename(&partial, path).map_err(ToolError::from));

        written.map_err(|e| {
            let _ = fs::remove_file(&partial);
            BackupError::Snapshot(format!("failed to write archive {}: {}", path.display(), e))
        })
    }

    /// Pack straight into the file, through the cipher when a key is set,
    /// so plaintext never lands on disk.
    fn pack_into(&self, entries: &[PackEntry], file: &mut File, key: Option<&str>) -> ToolResult<()> {
        let mut writer = BufWriter::new(file);
        match key {
            Some(key) => {
                let mut sealer = self.tools.cipher.encrypt_to(&mut writer, key)?;
                self.tools.archiver.pack(entries, &mut sealer)?;
                sealer.finish()?;
            }
            None => self.tools.archiver.pack(entries, &mut writer)?,
        }
        writer.flush()?;
        Ok(())
    }

    /// Apply retention; failures here never fail the build.
    pub fn prune(&self) -> Vec<PathBuf> {
        let backup_dir = self.config.backup_dir();
        match retention::sweep(
            &backup_dir,
            &self.config.backup.prefix,
            self.config.backup.retention_days,
            Local::now().naive_local(),
        ) {
            Ok(removed) => {
                if !removed.is_empty() {
                    info!(
                        "Removed {} backup(s) older than {} days",
                        removed.len(),
                        self.config.backup.retention_days
                    );
                }
                removed
            }
            Err(e) => {
                warn!("Retention sweep of {} failed: {}", backup_dir.display(), e);
                Vec::new()
            }
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", file_name))
}
