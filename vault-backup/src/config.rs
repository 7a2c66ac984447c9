//! Configuration management for the backup agent.
//!
//! Defaults, then an optional TOML file, then `VAULT_BACKUP_*` environment
//! variables (`__` separates section and key).

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "VAULT_BACKUP";

const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vault: VaultConfig,
    pub backup: BackupConfig,
    pub log: LogConfig,
    pub notify: NotifyConfig,
    pub mail: MailConfig,
    pub remote: RemoteConfig,
    pub service: ServiceConfig,
}

/// Location of the vault's persisted state. Relative paths resolve against
/// `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub attachments: PathBuf,
    pub sends: PathBuf,
    pub config_file: PathBuf,
    /// RSA key files are every regular file in `data_dir` starting with this.
    pub rsa_key_prefix: String,
    pub env_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Defaults to `<data_dir>/backups`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Archive file name prefix
    pub prefix: String,

    /// Archives older than this many days are pruned (0 disables pruning)
    pub retention_days: u32,

    /// Enables encryption of new archives when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    /// Include the environment file in archives and restores
    pub include_env: bool,

    /// Methods used by `run` when none are given on the command line
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Defaults to `<data_dir>/backup.log`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub on_failure_only: bool,

    /// Heartbeat URL requested after every run; `/fail` is appended on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    #[default]
    Starttls,
    Tls,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub security: SmtpSecurity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Largest archive sent as an attachment, in MiB
    pub max_attachment_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Sync tool executable
    pub binary: String,

    /// Sync tool configuration; remote sync is skipped when it is missing
    pub config_path: PathBuf,

    /// Destination path inside every remote
    pub path_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Lifecycle controller invoked as `<controller> stop|start <name>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    pub name: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            database: PathBuf::from("db.sqlite3"),
            attachments: PathBuf::from("attachments"),
            sends: PathBuf::from("sends"),
            config_file: PathBuf::from("config.json"),
            rsa_key_prefix: "rsa_key".to_string(),
            env_file: PathBuf::from(".env"),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "vault".to_string(),
            retention_days: 30,
            encryption_key: None,
            include_env: false,
            methods: vec!["local".to_string()],
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender_name: "Vault Backup".to_string(),
            sender_address: None,
            recipient: None,
            smtp_host: None,
            smtp_port: 587,
            security: SmtpSecurity::default(),
            username: None,
            password: None,
            max_attachment_mb: 25,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            binary: "rclone".to_string(),
            config_path: PathBuf::from("/config/rclone/rclone.conf"),
            path_suffix: "vault-backups".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            controller: Some("supervisorctl".to_string()),
            name: "vault".to_string(),
        }
    }
}

impl VaultConfig {
    /// Resolve a state path against the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database)
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.resolve(&self.env_file)
    }
}

impl MailConfig {
    /// Mail is usable only with a host, a sender and a recipient.
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.sender_address.is_some() && self.recipient.is_some()
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let environment = ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("backup.methods")
            .try_parsing(true);
        Self::load_with(path, environment)
    }

    fn load_with(path: Option<&Path>, environment: ::config::Environment) -> Result<Self> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backup.prefix.is_empty() || self.backup.prefix.contains('/') {
            return Err(BackupError::Config(format!(
                "invalid archive prefix '{}'",
                self.backup.prefix
            )));
        }
        if self.vault.rsa_key_prefix.is_empty() {
            return Err(BackupError::Config("rsa_key_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Directory holding the archives.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.dir {
            Some(dir) => self.vault.resolve(dir),
            None => self.vault.data_dir.join("backups"),
        }
    }

    pub fn log_file(&self) -> PathBuf {
        match &self.log.file {
            Some(file) => self.vault.resolve(file),
            None => self.vault.data_dir.join("backup.log"),
        }
    }

    /// Encryption key, ignoring empty values.
    pub fn encryption_key(&self) -> Option<&str> {
        self.backup
            .encryption_key
            .as_deref()
            .filter(|key| !key.is_empty())
    }

    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.backup.encryption_key.is_some() {
            config.backup.encryption_key = Some(REDACTED.to_string());
        }
        if config.mail.password.is_some() {
            config.mail.password = Some(REDACTED.to_string());
        }
        config
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BackupError::Config(e.to_string()))
    }
}
