//! Manifest stored at the root of every archive.
//!
//! Records what was captured so a restore can report it before touching
//! live state. Archives without a manifest remain restorable.

use super::components::{Component, PackEntry};
use crate::fs::walker::tree_stats;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: String,
    pub prefix: String,
    pub tool_version: String,
    pub components: Vec<ManifestEntry>,
}

/// One captured component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub component: Component,
    pub path: String,
    pub files: usize,
    pub bytes: u64,
}

impl Manifest {
    pub fn new(prefix: &str, created_at: String) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at,
            prefix: prefix.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            components: Vec::new(),
        }
    }

    /// Record a packed entry with its file count and size.
    pub fn record(&mut self, component: Component, entry: &PackEntry) -> std::io::Result<()> {
        let (files, bytes) = if entry.is_dir {
            tree_stats(&entry.source)?
        } else {
            (1, std::fs::metadata(&entry.source)?.len())
        };
        self.components.push(ManifestEntry {
            component,
            path: entry.name.to_string_lossy().into_owned(),
            files,
            bytes,
        });
        Ok(())
    }

    pub fn contains(&self, component: Component) -> bool {
        self.components.iter().any(|e| e.component == component)
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Read a manifest from an extracted archive, if it has one.
    pub fn read_from(dir: &Path) -> Option<Self> {
        let data = std::fs::read(dir.join(MANIFEST_ENTRY)).ok()?;
        serde_json::from_slice(&data).ok()
    }
}
