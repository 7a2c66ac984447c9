//! Restore of a previously built archive into the live vault.
//!
//! The sequence is linear: validate, resolve the key, extract to a scratch
//! directory, take a safety snapshot, stop the service, replace state one
//! component at a time, clean up, start the service again.
//!
//! Only a missing or unreadable archive, a missing key, a failed extraction
//! and a failed database replacement abort the restore. Everything else is
//! recorded as a `SoftFailure` and the restore carries on.

use crate::archive::components::{component_table, Component, ComponentSpec, Shape, DATABASE_ENTRY};
use crate::archive::manifest::Manifest;
use crate::archive::Archive;
use crate::config::Config;
use crate::fs::metadata::FileMetadata;
use crate::fs::walker::{copy_tree, remove_path};
use crate::notify::Notifier;
use crate::snapshot::SnapshotBuilder;
use crate::tools::Tools;
use crate::utils::errors::{BackupError, Result, ToolResult};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Suffix of the side copy written for a restored environment file.
pub const RESTORED_ENV_SUFFIX: &str = ".restored";

const SQLITE_SIDECARS: [&str; 2] = ["-wal", "-shm"];
const KEY_ATTEMPTS: usize = 3;

/// A step that failed without aborting the restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    pub step: String,
    pub detail: String,
}

impl fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.detail)
    }
}

#[derive(Debug)]
pub struct RestoreReport {
    pub archive: Archive,
    pub manifest: Option<Manifest>,
    /// Components replaced, in order
    pub restored: Vec<Component>,
    pub warnings: Vec<SoftFailure>,
    /// Archive taken of the live state before it was replaced
    pub safety_archive: Option<Archive>,
    /// Side copy of the environment file awaiting a manual merge
    pub env_side_copy: Option<PathBuf>,
}

impl RestoreReport {
    fn new(archive: Archive) -> Self {
        Self {
            archive,
            manifest: None,
            restored: Vec::new(),
            warnings: Vec::new(),
            safety_archive: None,
            env_side_copy: None,
        }
    }

    fn warn(&mut self, step: impl Into<String>, detail: impl fmt::Display) {
        let failure = SoftFailure {
            step: step.into(),
            detail: detail.to_string(),
        };
        warn!("[Restore] {}", failure);
        self.warnings.push(failure);
    }

    fn summary(&self) -> String {
        let mut body = format!("Archive: {}\n", self.archive);
        if let Some(safety) = &self.safety_archive {
            body.push_str(&format!("Safety backup: {}\n", safety));
        }
        let restored: Vec<String> = self.restored.iter().map(ToString::to_string).collect();
        body.push_str(&format!("Restored: {}\n", restored.join(", ")));
        if let Some(side_copy) = &self.env_side_copy {
            body.push_str(&format!(
                "Environment file written to {} for manual merge\n",
                side_copy.display()
            ));
        }
        if !self.warnings.is_empty() {
            body.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                body.push_str(&format!("  - {}\n", warning));
            }
        }
        body
    }
}

pub struct RestoreOrchestrator<'a> {
    config: &'a Config,
    tools: &'a Tools,
    notifier: Notifier<'a>,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(config: &'a Config, tools: &'a Tools) -> Self {
        Self {
            config,
            tools,
            notifier: Notifier::new(&config.notify, tools),
        }
    }

    /// Restore `path` into the live vault. A bare file name is also looked
    /// up in the backup directory.
    pub fn restore(&self, path: &Path) -> Result<RestoreReport> {
        match self.execute(path) {
            Ok(report) => {
                if report.warnings.is_empty() {
                    info!("Restore of {} completed", report.archive);
                    self.notifier.success("Restore completed", &report.summary());
                } else {
                    warn!(
                        "Restore of {} completed with {} warning(s)",
                        report.archive,
                        report.warnings.len()
                    );
                    self.notifier
                        .failure("Restore completed with warnings", &report.summary());
                }
                Ok(report)
            }
            Err(e) => {
                error!("Restore of {} failed: {}", path.display(), e);
                self.notifier.failure(
                    "Restore failed",
                    &format!("Restore of {} failed.\n\n{}\n", path.display(), e),
                );
                Err(e)
            }
        }
    }

    fn execute(&self, path: &Path) -> Result<RestoreReport> {
        let archive = self.resolve_archive(path)?;
        info!("Restoring from {}", archive);
        let mut report = RestoreReport::new(archive);

        let key = self.resolve_key(&report.archive)?;
        let staging = self.extract(&report.archive, key.as_deref())?;

        let staged_db = staging.path().join(DATABASE_ENTRY);
        if !staged_db.is_file() {
            return Err(BackupError::RestoreFatal(format!(
                "{} contains no database snapshot",
                report.archive
            )));
        }

        report.manifest = Manifest::read_from(staging.path());
        match &report.manifest {
            Some(manifest) => {
                let components: Vec<String> =
                    manifest.components.iter().map(|e| e.path.clone()).collect();
                info!(
                    "Archive captured {} by {} (v{}): {}",
                    manifest.created_at,
                    manifest.prefix,
                    manifest.tool_version,
                    components.join(", ")
                );
            }
            None => debug!("Archive has no manifest"),
        }

        self.safety_snapshot(&mut report);
        let stopped = self.quiesce(&mut report);

        if let Err(e) = self.replace_database(&staged_db, &mut report) {
            self.cleanup(staging);
            self.resume(stopped, &mut report);
            return Err(e);
        }
        report.restored.push(Component::Database);

        for spec in component_table(self.config) {
            self.replace_component(&spec, staging.path(), &mut report);
        }

        self.cleanup(staging);
        self.resume(stopped, &mut report);

        Ok(report)
    }

    fn resolve_archive(&self, path: &Path) -> Result<Archive> {
        let mut candidates = vec![path.to_path_buf()];
        if path.is_relative() {
            candidates.push(self.config.backup_dir().join(path));
        }

        for candidate in &candidates {
            match fs::metadata(candidate) {
                Ok(meta) if meta.is_file() => return Ok(Archive::from_path(candidate)),
                Ok(_) => {
                    return Err(BackupError::RestoreFatal(format!(
                        "{} is not a regular file",
                        candidate.display()
                    )))
                }
                Err(_) => continue,
            }
        }

        Err(BackupError::RestoreFatal(format!(
            "archive {} not found",
            path.display()
        )))
    }

    fn resolve_key(&self, archive: &Archive) -> Result<Option<String>> {
        if !archive.encrypted {
            return Ok(None);
        }
        if let Some(key) = self.config.encryption_key() {
            debug!("Using configured encryption key");
            return Ok(Some(key.to_string()));
        }

        let input = &self.tools.input;
        if !input.is_interactive() {
            return Err(BackupError::RestoreFatal(
                "archive is encrypted, no encryption key is configured and cannot prompt for one"
                    .into(),
            ));
        }

        for attempt in 1..=KEY_ATTEMPTS {
            let key = input.read_secret("Encryption key: ").map_err(|e| {
                BackupError::RestoreFatal(format!("cannot read encryption key: {}", e))
            })?;
            if !key.is_empty() {
                return Ok(Some(key));
            }
            warn!("Encryption key must not be empty ({}/{})", attempt, KEY_ATTEMPTS);
        }

        Err(BackupError::RestoreFatal(format!(
            "no encryption key entered after {} attempts",
            KEY_ATTEMPTS
        )))
    }

    /// Decrypt if needed and unpack into a fresh scratch directory, which
    /// is removed again on failure.
    fn extract(&self, archive: &Archive, key: Option<&str>) -> Result<TempDir> {
        let scratch_root = self.config.backup_dir();
        let staging = fs::create_dir_all(&scratch_root)
            .and_then(|()| {
                tempfile::Builder::new()
                    .prefix(".restore-")
                    .tempdir_in(&scratch_root)
            })
            .map_err(|e| {
                BackupError::RestoreFatal(format!(
                    "cannot create scratch directory in {}: {}",
                    scratch_root.display(),
                    e
                ))
            })?;

        match self.unpack(archive, key, staging.path()) {
            Ok(()) => {
                debug!("Extracted {} into {}", archive, staging.path().display());
                Ok(staging)
            }
            Err(e) => {
                self.cleanup(staging);
                Err(BackupError::RestoreFatal(format!(
                    "cannot extract {}: {}",
                    archive, e
                )))
            }
        }
    }

    fn unpack(&self, archive: &Archive, key: Option<&str>, dest: &Path) -> ToolResult<()> {
        let mut reader = BufReader::new(File::open(&archive.path)?);
        match key {
            Some(key) => {
                let mut plain = self.tools.cipher.decrypt_from(&mut reader, key)?;
                self.tools.archiver.unpack(&mut plain, dest)?;
                // Read on to the last sealed chunk so a truncated archive fails
                io::copy(&mut plain, &mut io::sink())?;
                Ok(())
            }
            None => self.tools.archiver.unpack(&mut reader, dest),
        }
    }

    fn safety_snapshot(&self, report: &mut RestoreReport) {
        if !self.config.vault.database_path().exists() {
            info!("No live database, skipping safety backup");
            return;
        }

        // No retention sweep here: it could remove the archive being restored
        info!("Taking safety backup of the current state");
        match SnapshotBuilder::new(self.config, self.tools).build_unpruned() {
            Ok(archive) => {
                info!("Safety backup written to {}", archive);
                report.safety_archive = Some(archive);
            }
            Err(e) => report.warn("safety backup", e),
        }
    }

    /// Stop the service if a controller is available. Returns whether it
    /// was stopped and therefore has to be started again.
    fn quiesce(&self, report: &mut RestoreReport) -> bool {
        let service = &self.config.service.name;
        if !self.tools.service.is_available() {
            warn!(
                "No service controller available, restoring while {} may be running",
                service
            );
            return false;
        }

        match self.tools.service.stop(service) {
            Ok(()) => {
                info!("Stopped {}", service);
                true
            }
            Err(e) => {
                report.warn(format!("stop {}", service), e);
                false
            }
        }
    }

    fn resume(&self, stopped: bool, report: &mut RestoreReport) {
        if !stopped {
            return;
        }
        let service = &self.config.service.name;
        match self.tools.service.start(service) {
            Ok(()) => info!("Started {}", service),
            Err(e) => report.warn(
                format!("start {}", service),
                format!("{} (start it manually)", e),
            ),
        }
    }

    fn cleanup(&self, staging: TempDir) {
        let path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!("Failed to remove restore scratch directory {}: {}", path.display(), e);
        }
    }

    /// Stage the database next to the live file and rename it over the
    /// live one, so the live file is only replaced by a complete copy.
    fn replace_database(&self, staged_db: &Path, report: &mut RestoreReport) -> Result<()> {
        let live = self.config.vault.database_path();
        let fatal = |e: std::io::Error| {
            BackupError::RestoreFatal(format!(
                "cannot replace database {}: {}",
                live.display(),
                e
            ))
        };

        if let Some(parent) = live.parent() {
            fs::create_dir_all(parent).map_err(fatal)?;
        }
        let metadata = FileMetadata::from_path_or_default(&live);
        let incoming = sibling(&live, ".", ".restore");

        let staged = fs::copy(staged_db, &incoming)
            .and_then(|_| File::open(&incoming)?.sync_all())
            .and_then(|()| swap_in(&incoming, &live));
        if let Err(e) = staged {
            let _ = fs::remove_file(&incoming);
            return Err(fatal(e));
        }
        info!("Restored {}", Component::Database);

        if let Err(e) = metadata.apply_to_path(&live) {
            report.warn("database permissions", e);
        }
        Ok(())
    }

    fn replace_component(&self, spec: &ComponentSpec, staging: &Path, report: &mut RestoreReport) {
        let staged = spec.staged_paths(staging);
        if staged.is_empty() {
            debug!("{} not in archive, skipping", spec.component);
            return;
        }

        let result = match (&spec.component, &spec.shape) {
            (Component::EnvFile, _) => self.stage_env_file(&staged[0], &spec.live, report),
            (_, Shape::FilesWithPrefix(_)) => {
                self.replace_files(spec, &staged, report);
                return;
            }
            (_, Shape::Dir) => replace_dir(&staged[0], &spec.live),
            (_, Shape::File) => replace_file(&staged[0], &spec.live),
        };

        match result {
            Ok(()) => {
                info!("Restored {}", spec.component);
                report.restored.push(spec.component);
            }
            Err(e) => report.warn(spec.component.to_string(), e),
        }
    }

    /// Files restored individually; one failing does not stop the others.
    fn replace_files(&self, spec: &ComponentSpec, staged: &[PathBuf], report: &mut RestoreReport) {
        let mut any = false;
        for source in staged {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = spec.live.join(name);
            match replace_file(source, &target) {
                Ok(()) => any = true,
                Err(e) => report.warn(format!("{} {}", spec.component, target.display()), e),
            }
        }
        if any {
            info!("Restored {}", spec.component);
            report.restored.push(spec.component);
        }
    }

    /// The live environment file is never overwritten; the archived copy
    /// is written beside it for an operator to merge.
    fn stage_env_file(
        &self,
        source: &Path,
        live: &Path,
        report: &mut RestoreReport,
    ) -> std::io::Result<()> {
        let side_copy = sibling(live, "", RESTORED_ENV_SUFFIX);
        if let Some(parent) = side_copy.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &side_copy)?;

        warn!(
            "Environment file restored to {}; the live {} was left untouched",
            side_copy.display(),
            live.display()
        );
        warn!(
            "Compare the two files, merge the settings you need into {}, then restart the container",
            live.display()
        );
        report.env_side_copy = Some(side_copy);
        Ok(())
    }
}

/// Rename `incoming` over `live`. The live journal files are moved aside
/// first and put back if the rename fails; they are dropped once it succeeds.
fn swap_in(incoming: &Path, live: &Path) -> io::Result<()> {
    let mut moved = Vec::new();
    for suffix in SQLITE_SIDECARS {
        let sidecar = sibling(live, "", suffix);
        if fs::symlink_metadata(&sidecar).is_err() {
            continue;
        }
        let aside = sibling(live, ".", &format!("{}.aside", suffix));
        if let Err(e) = fs::rename(&sidecar, &aside) {
            put_back(&moved);
            return Err(e);
        }
        moved.push((sidecar, aside));
    }

    if let Err(e) = fs::rename(incoming, live) {
        put_back(&moved);
        return Err(e);
    }
    for (_, aside) in &moved {
        if let Err(e) = remove_path(aside) {
            warn!("Failed to remove old journal {}: {}", aside.display(), e);
        }
    }
    Ok(())
}

fn put_back(moved: &[(PathBuf, PathBuf)]) {
    for (original, aside) in moved {
        if let Err(e) = fs::rename(aside, original) {
            error!("Failed to put {} back: {}", original.display(), e);
        }
    }
}

fn replace_dir(source: &Path, live: &Path) -> std::io::Result<()> {
    remove_path(live)?;
    copy_tree(source, live)?;
    Ok(())
}

/// A directory in place of a file is left alone rather than deleted.
fn replace_file(source: &Path, live: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(live).map(|m| m.is_dir()).unwrap_or(false) {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} is a directory", live.display()),
        ));
    }
    remove_path(live)?;
    if let Some(parent) = live.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, live)?;
    Ok(())
}

/// `<dir>/<before><name><after>` for a path `<dir>/<name>`.
fn sibling(path: &Path, before: &str, after: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}{}", before, name, after))
}
