//! Ownership and permission capture for replaced state files.
//!
//! The live file's mode and owner are recorded before it is replaced and
//! applied to the restored copy.

use std::fs;
use std::path::Path;

/// Mode given to restored files that had no live predecessor.
pub const DEFAULT_MODE: u32 = 0o644;

/// Permission metadata of a live file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File permissions (Unix mode bits)
    pub mode: u32,

    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            uid: None,
            gid: None,
        }
    }
}

impl FileMetadata {
    /// Extract metadata from a file path
    #[cfg(unix)]
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let metadata = fs::metadata(path)?;
        Ok(Self {
            mode: metadata.mode() & 0o7777,
            uid: Some(metadata.uid()),
            gid: Some(metadata.gid()),
        })
    }

    #[cfg(not(unix))]
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        fs::metadata(path)?;
        Ok(Self::default())
    }

    /// Metadata of `path` if it exists, defaults otherwise.
    pub fn from_path_or_default(path: &Path) -> Self {
        Self::from_path(path).unwrap_or_default()
    }

    /// Apply this metadata to a file. Ownership is only changed when it
    /// differs from the current owner.
    #[cfg(unix)]
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        use nix::unistd::{chown, Gid, Uid};
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))?;

        let current = fs::metadata(path)?;
        let uid = self.uid.filter(|&uid| uid != current.uid()).map(Uid::from_raw);
        let gid = self.gid.filter(|&gid| gid != current.gid()).map(Gid::from_raw);
        if uid.is_some() || gid.is_some() {
            chown(path, uid, gid).map_err(std::io::Error::from)?;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply_to_path(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}
