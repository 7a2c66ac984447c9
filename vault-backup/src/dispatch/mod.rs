//! Delivery of a built archive to the requested destinations.
//!
//! Every method gets the same archive. Each delivery is independent and
//! yields a `DeliveryOutcome`; nothing here aborts a sibling delivery.

use crate::archive::Archive;
use crate::config::Config;
use crate::notify::Notifier;
use crate::tools::Tools;
use crate::utils::errors::{BackupError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Local,
    Email,
    Remote,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Local => "local",
            Method::Email => "email",
            Method::Remote => "remote",
        }
    }
}

impl FromStr for Method {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Method::Local),
            "email" => Ok(Method::Email),
            "remote" => Ok(Method::Remote),
            other => Err(BackupError::Validation(format!(
                "unknown method '{}' (expected one of: local, email, remote)",
                other
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free set of requested methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    methods: Vec<Method>,
}

impl BackupRequest {
    /// Parse command-line method arguments. Each argument may itself be a
    /// comma-separated list. Any unknown method rejects the whole request.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut methods = Vec::new();
        for token in split_methods(args) {
            push_unique(&mut methods, token.parse()?);
        }
        Self::from_methods(methods)
    }

    /// Parse configured defaults, dropping unknown entries with a warning.
    pub fn parse_lenient<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut methods = Vec::new();
        for token in split_methods(args) {
            match token.parse() {
                Ok(method) => push_unique(&mut methods, method),
                Err(e) => warn!("Ignoring configured method: {}", e),
            }
        }
        Self::from_methods(methods)
    }

    fn from_methods(methods: Vec<Method>) -> Result<Self> {
        if methods.is_empty() {
            return Err(BackupError::Validation("no backup method given".into()));
        }
        Ok(Self { methods })
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

fn split_methods<S: AsRef<str>>(args: &[S]) -> Vec<&str> {
    args.iter()
        .flat_map(|arg| arg.as_ref().split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

fn push_unique(methods: &mut Vec<Method>, method: Method) {
    if !methods.contains(&method) {
        methods.push(method);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    /// Some remotes failed while others succeeded
    Degraded {
        succeeded: usize,
        total: usize,
        failed: Vec<String>,
    },
    /// Destination not set up; not counted as a failure
    Skipped(String),
    Failed(String),
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Delivered => f.write_str("delivered"),
            DeliveryStatus::Degraded {
                succeeded,
                total,
                failed,
            } => write!(
                f,
                "partial failure ({} of {} succeeded; failed: {})",
                succeeded,
                total,
                failed.join(", ")
            ),
            DeliveryStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
            DeliveryStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub method: Method,
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, DeliveryStatus::Failed(_))
    }

    /// Anything short of a clean delivery or a deliberate skip.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Failed(_) | DeliveryStatus::Degraded { .. }
        )
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.status)
    }
}

pub struct DestinationDispatcher<'a> {
    config: &'a Config,
    tools: &'a Tools,
    notifier: &'a Notifier<'a>,
}

impl<'a> DestinationDispatcher<'a> {
    pub fn new(config: &'a Config, tools: &'a Tools, notifier: &'a Notifier<'a>) -> Self {
        Self {
            config,
            tools,
            notifier,
        }
    }

    pub fn deliver(&self, method: Method, archive: &Archive) -> DeliveryOutcome {
        let status = match method {
            Method::Local => {
                info!("[Local] Backup stored at {}", archive);
                DeliveryStatus::Delivered
            }
            Method::Email => self.deliver_email(archive),
            Method::Remote => self.deliver_remote(),
        };

        match &status {
            DeliveryStatus::Failed(reason) => warn!(method = %method, "Delivery failed: {}", reason),
            DeliveryStatus::Degraded { .. } => warn!(method = %method, "Delivery {}", status),
            _ => info!(method = %method, "Delivery {}", status),
        }

        DeliveryOutcome { method, status }
    }

    fn deliver_email(&self, archive: &Archive) -> DeliveryStatus {
        let subject = format!("Backup {}", archive.file_name());
        let body = restore_instructions(archive);
        info!("[Email] Sending {} to {}", archive.file_name(), self.recipient());

        match self.notifier.send_archive(&subject, &body, &archive.path) {
            Ok(()) => DeliveryStatus::Delivered,
            Err(e) => DeliveryStatus::Failed(e.to_string()),
        }
    }

    fn recipient(&self) -> &str {
        self.config.mail.recipient.as_deref().unwrap_or("(unset)")
    }

    /// Sync the whole backup directory to every configured remote in turn.
    fn deliver_remote(&self) -> DeliveryStatus {
        let sync = &self.tools.sync;
        if !sync.is_configured() {
            info!(
                "[Remote] No sync configuration at {}, skipping",
                self.config.remote.config_path.display()
            );
            return DeliveryStatus::Skipped("no remote sync configuration".into());
        }

        let remotes = match sync.list_remotes() {
            Ok(remotes) => remotes,
            Err(e) => return DeliveryStatus::Failed(format!("cannot list remotes: {}", e)),
        };
        if remotes.is_empty() {
            info!("[Remote] Sync configuration lists no remotes, skipping");
            return DeliveryStatus::Skipped("no remotes configured".into());
        }

        let backup_dir = self.config.backup_dir();
        let mut failures = Vec::new();
        for remote in &remotes {
            info!(remote = %remote, "[Remote] Syncing {}", backup_dir.display());
            match sync.sync(&backup_dir, remote) {
                Ok(()) => info!(remote = %remote, "[Remote] Sync complete"),
                Err(e) => {
                    warn!(remote = %remote, "[Remote] Sync failed: {}", e);
                    failures.push((remote.clone(), e.to_string()));
                }
            }
        }

        let total = remotes.len();
        let succeeded = total - failures.len();
        if failures.is_empty() {
            return DeliveryStatus::Delivered;
        }
        if succeeded == 0 {
            return DeliveryStatus::Failed(format!(
                "all {} remotes failed: {}",
                total,
                describe_failures(&failures)
            ));
        }

        self.notifier.failure(
            &format!("Remote sync partially failed ({} of {} succeeded)", succeeded, total),
            &format!(
                "Backups in {} could not be synced to:\n\n{}\n",
                backup_dir.display(),
                failures
                    .iter()
                    .map(|(remote, error)| format!("  - {}: {}", remote, error))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        );

        DeliveryStatus::Degraded {
            succeeded,
            total,
            failed: failures.into_iter().map(|(remote, _)| remote).collect(),
        }
    }
}

fn describe_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(remote, error)| format!("{} ({})", remote, error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Body of the mail carrying an archive.
pub fn restore_instructions(archive: &Archive) -> String {
    let file_name = archive.file_name();
    let mut body = format!(
        "Attached is the vault backup {}.\n\n\
         To restore it, copy the file into the backup directory of the vault\n\
         host and run:\n\n    vault-backup restore {}\n\n\
         The service is stopped during the restore and started again afterwards.\n\
         A safety backup of the current state is taken first.\n",
        file_name, file_name
    );

    if archive.encrypted {
        body.push_str(
            "\nThis archive is encrypted (AES-256-GCM). The restore uses the configured\n\
             encryption key, or prompts for it when run from a terminal. Without the\n\
             key the archive cannot be recovered.\n",
        );
    }

    body
}
