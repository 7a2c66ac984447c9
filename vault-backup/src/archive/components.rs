//! The fixed set of state components that make up an archive.
//!
//! Each component is checked independently with an explicit predicate
//! instead of shell globbing; missing or unreadable components are left out.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Names used inside the archive, independent of the live layout.
pub const DATABASE_ENTRY: &str = "db.sqlite3";
pub const ATTACHMENTS_ENTRY: &str = "attachments";
pub const SENDS_ENTRY: &str = "sends";
pub const CONFIG_ENTRY: &str = "config.json";
pub const ENV_ENTRY: &str = ".env";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Database,
    Attachments,
    Sends,
    ConfigFile,
    RsaKeys,
    EnvFile,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Database => "database",
            Component::Attachments => "attachments",
            Component::Sends => "sends",
            Component::ConfigFile => "config file",
            Component::RsaKeys => "RSA keys",
            Component::EnvFile => "environment file",
        };
        f.write_str(name)
    }
}

/// How a component is laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    File,
    Dir,
    /// Regular files directly inside a directory whose names start with a prefix
    FilesWithPrefix(String),
}

/// One row of the component table.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub component: Component,
    pub shape: Shape,
    /// Live location (the containing directory for `FilesWithPrefix`)
    pub live: PathBuf,
    /// Entry name inside the archive (unused for `FilesWithPrefix`, whose
    /// files keep their own names at the archive root)
    pub entry: &'static str,
}

/// A file or directory to pack, and its name inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub source: PathBuf,
    pub name: PathBuf,
    pub is_dir: bool,
}

impl PackEntry {
    pub fn file(source: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(source: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            is_dir: true,
        }
    }
}

/// The optional components, in capture and restore order. The database is
/// handled separately because it is snapshotted rather than read directly.
pub fn component_table(config: &Config) -> Vec<ComponentSpec> {
    let vault = &config.vault;
    let mut table = vec![
        ComponentSpec {
            component: Component::Attachments,
            shape: Shape::Dir,
            live: vault.resolve(&vault.attachments),
            entry: ATTACHMENTS_ENTRY,
        },
        ComponentSpec {
            component: Component::Sends,
            shape: Shape::Dir,
            live: vault.resolve(&vault.sends),
            entry: SENDS_ENTRY,
        },
        ComponentSpec {
            component: Component::ConfigFile,
            shape: Shape::File,
            live: vault.resolve(&vault.config_file),
            entry: CONFIG_ENTRY,
        },
        ComponentSpec {
            component: Component::RsaKeys,
            shape: Shape::FilesWithPrefix(vault.rsa_key_prefix.clone()),
            live: vault.data_dir.clone(),
            entry: "",
        },
    ];

    if config.backup.include_env {
        table.push(ComponentSpec {
            component: Component::EnvFile,
            shape: Shape::File,
            live: vault.env_file_path(),
            entry: ENV_ENTRY,
        });
    }

    table
}

impl ComponentSpec {
    /// Entries to pack for this component; empty when it is absent.
    pub fn collect_live(&self) -> Vec<PackEntry> {
        match &self.shape {
            Shape::File if is_readable_file(&self.live) => {
                vec![PackEntry::file(&self.live, self.entry)]
            }
            Shape::Dir if is_readable_dir(&self.live) => {
                vec![PackEntry::dir(&self.live, self.entry)]
            }
            Shape::FilesWithPrefix(prefix) => files_with_prefix(&self.live, prefix)
                .into_iter()
                .filter(|path| is_readable_file(path))
                .filter_map(|path| {
                    let name = path.file_name()?.to_owned();
                    Some(PackEntry::file(path, name))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Staged paths for this component inside an extracted archive.
    pub fn staged_paths(&self, staging: &Path) -> Vec<PathBuf> {
        match &self.shape {
            Shape::FilesWithPrefix(prefix) => files_with_prefix(staging, prefix),
            Shape::File | Shape::Dir => {
                let path = staging.join(self.entry);
                if path.exists() {
                    vec![path]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Regular files directly in `dir` whose names start with `prefix`, sorted.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && fs::File::open(path).is_ok()
}

fn is_readable_dir(path: &Path) -> bool {
    path.is_dir() && fs::read_dir(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(data_dir: &Path, include_env: bool) -> Config {
        let mut config = Config::default();
        config.vault.data_dir = data_dir.to_path_buf();
        config.backup.include_env = include_env;
        config
    }

    #[test]
    fn test_empty_vault_collects_nothing() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config_for(temp_dir.path(), true);

        let entries: Vec<_> = component_table(&config)
            .iter()
            .flat_map(|spec| spec.collect_live())
            .collect();
        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn test_collects_present_components() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let data = temp_dir.path();
        fs::create_dir(data.join("attachments"))?;
        fs::write(data.join("attachments/a.bin"), b"x")?;
        fs::write(data.join("config.json"), b"{}")?;
        fs::write(data.join("rsa_key.pem"), b"private")?;
        fs::write(data.join("rsa_key.pub.pem"), b"public")?;
        fs::write(data.join("not_a_key.pem"), b"other")?;
        fs::write(data.join(".env"), b"A=1")?;

        let config = config_for(data, false);
        let entries: Vec<_> = component_table(&config)
            .iter()
            .flat_map(|spec| spec.collect_live())
            .collect();

        assert_eq!(
            entries,
            vec![
                PackEntry::dir(data.join("attachments"), "attachments"),
                PackEntry::file(data.join("config.json"), "config.json"),
                PackEntry::file(data.join("rsa_key.pem"), "rsa_key.pem"),
                PackEntry::file(data.join("rsa_key.pub.pem"), "rsa_key.pub.pem"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_env_file_is_opt_in() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".env"), b"A=1")?;

        let without: Vec<_> = component_table(&config_for(temp_dir.path(), false))
            .iter()
            .map(|spec| spec.component)
            .collect();
        assert!(!without.contains(&Component::EnvFile));

        let with = component_table(&config_for(temp_dir.path(), true));
        let env = with
            .iter()
            .find(|spec| spec.component == Component::EnvFile)
            .unwrap();
        assert_eq!(env.collect_live(), vec![PackEntry::file(temp_dir.path().join(".env"), ".env")]);
        Ok(())
    }

    #[test]
    fn test_staged_paths() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let staging = temp_dir.path();
        fs::create_dir(staging.join("sends"))?;
        fs::write(staging.join("rsa_key.pem"), b"k")?;

        let config = config_for(Path::new("/data"), false);
        let table = component_table(&config);
        let staged = |component| {
            table
                .iter()
                .find(|spec| spec.component == component)
                .unwrap()
                .staged_paths(staging)
        };

        assert_eq!(staged(Component::Sends), vec![staging.join("sends")]);
        assert!(staged(Component::Attachments).is_empty());
        assert_eq!(staged(Component::RsaKeys), vec![staging.join("rsa_key.pem")]);
        Ok(())
    }
}
