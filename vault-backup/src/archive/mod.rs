//! Archive artifacts and their on-disk naming.
//!
//! Archives are named `<prefix>_<YYYY-MM-DD-HHMMSS>.tar.gz`, with an extra
//! `.aes256` suffix when the packed stream went through the cipher.

pub mod components;
pub mod manifest;

use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";
pub const PLAIN_SUFFIX: &str = ".tar.gz";
pub const ENCRYPTED_SUFFIX: &str = ".aes256";

/// One backup artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub encrypted: bool,
}

/// Parsed archive file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub prefix: String,
    pub created: NaiveDateTime,
    pub encrypted: bool,
}

impl ArchiveName {
    pub fn new(prefix: &str, created: NaiveDateTime, encrypted: bool) -> Self {
        Self {
            prefix: prefix.to_string(),
            created,
            encrypted,
        }
    }

    /// Name for an archive captured now.
    pub fn now(prefix: &str, encrypted: bool) -> Self {
        Self::new(prefix, Local::now().naive_local(), encrypted)
    }

    /// Parse a file name; returns `None` for anything that is not an archive.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (rest, encrypted) = match file_name.strip_suffix(ENCRYPTED_SUFFIX) {
            Some(rest) => (rest, true),
            None => (file_name, false),
        };
        let stem = rest.strip_suffix(PLAIN_SUFFIX)?;
        let (prefix, stamp) = stem.rsplit_once('_')?;
        if prefix.is_empty() {
            return None;
        }
        let created = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(prefix, created, encrypted))
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}{}",
            self.prefix,
            self.created.format(TIMESTAMP_FORMAT),
            PLAIN_SUFFIX
        )?;
        if self.encrypted {
            f.write_str(ENCRYPTED_SUFFIX)?;
        }
        Ok(())
    }
}

impl Archive {
    /// Describe an existing file; encryption is inferred from the name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let encrypted = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(ENCRYPTED_SUFFIX))
            .unwrap_or(false);
        Self { path, encrypted }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<ArchiveName> {
        ArchiveName::parse(&self.file_name())
    }

    pub fn size(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Archives in `dir` carrying `prefix`, newest first.
pub fn list_archives(dir: &Path, prefix: &str) -> std::io::Result<Vec<(Archive, ArchiveName)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut archives: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = ArchiveName::parse(&e.file_name().to_string_lossy())?;
            (name.prefix == prefix).then(|| (Archive::from_path(e.path()), name))
        })
        .collect();

    archives.sort_by(|a, b| b.1.created.cmp(&a.1.created));
    Ok(archives)
}
