//! External collaborators behind narrow traits.
//!
//! Components only talk to these traits; `Tools::from_config` wires up the
//! production implementations and tests substitute fakes.

pub mod cipher;
pub mod mail;
pub mod prompt;
pub mod rclone;
pub mod service;
pub mod sqlite;
pub mod tarball;

#[cfg(test)]
pub(crate) mod testing;

use crate::archive::components::PackEntry;
use crate::config::Config;
use crate::utils::errors::{ToolError, ToolResult};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::warn;

/// Consistent copy of a live database.
pub trait DbSnapshotter {
    fn snapshot(&self, source: &Path, dest: &Path) -> ToolResult<()>;
}

/// Packs files into one compressed stream and back.
pub trait Archiver {
    fn pack(&self, entries: &[PackEntry], out: &mut dyn Write) -> ToolResult<()>;
    fn unpack(&self, input: &mut dyn Read, dest: &Path) -> ToolResult<()>;
}

/// Streaming symmetric encryption keyed by a passphrase.
pub trait Cipher {
    /// Writer that encrypts into `out`; `finish` must be called to seal it.
    fn encrypt_to<'a>(
        &self,
        out: &'a mut dyn Write,
        key: &str,
    ) -> ToolResult<Box<dyn SealingWrite + 'a>>;
    /// Reader yielding the plaintext of `input`. Fails early on a wrong key.
    fn decrypt_from<'a>(&self, input: &'a mut dyn Read, key: &str) -> ToolResult<Box<dyn Read + 'a>>;
}

/// An encrypting writer whose output is incomplete until finished.
pub trait SealingWrite: Write {
    fn finish(self: Box<Self>) -> ToolResult<()>;
}

/// An outgoing message.
#[derive(Debug, Clone)]
pub struct Mail<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub attachment: Option<&'a Path>,
}

pub trait MailTransport {
    fn send(&self, mail: &Mail<'_>) -> ToolResult<()>;
}

/// Directory sync to named remotes.
pub trait RemoteSync {
    /// Whether a sync configuration is present at all.
    fn is_configured(&self) -> bool;
    fn list_remotes(&self) -> ToolResult<Vec<String>>;
    fn sync(&self, local_dir: &Path, remote: &str) -> ToolResult<()>;
}

/// Stops and starts the vault service.
pub trait ServiceController {
    fn is_available(&self) -> bool;
    fn stop(&self, service: &str) -> ToolResult<()>;
    fn start(&self, service: &str) -> ToolResult<()>;
}

/// Source of secrets typed by an operator.
pub trait SecretInput {
    fn is_interactive(&self) -> bool;
    fn read_secret(&self, prompt: &str) -> ToolResult<String>;
}

/// The set of collaborators handed to every component.
pub struct Tools {
    pub snapshotter: Box<dyn DbSnapshotter>,
    pub archiver: Box<dyn Archiver>,
    pub cipher: Box<dyn Cipher>,
    pub mail: Option<Box<dyn MailTransport>>,
    pub sync: Box<dyn RemoteSync>,
    pub service: Box<dyn ServiceController>,
    pub input: Box<dyn SecretInput>,
}

impl Tools {
    /// Production collaborators for `config`. A mail setup that cannot be
    /// used leaves mail unconfigured instead of failing.
    pub fn from_config(config: &Config) -> Self {
        let mail: Option<Box<dyn MailTransport>> = if config.mail.is_configured() {
            match mail::SmtpMailer::from_config(&config.mail) {
                Ok(mailer) => Some(Box::new(mailer)),
                Err(e) => {
                    warn!("Mail disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let service: Box<dyn ServiceController> = match &config.service.controller {
            Some(program) if !program.is_empty() => {
                Box::new(service::CommandServiceController::new(program))
            }
            _ => Box::new(service::NoServiceController),
        };

        Self {
            snapshotter: Box::new(sqlite::SqliteSnapshotter),
            archiver: Box::new(tarball::TarGzArchiver),
            cipher: Box::new(cipher::AesGcmCipher),
            mail,
            sync: Box::new(rclone::RcloneSync::from_config(&config.remote)),
            service,
            input: Box::new(prompt::TerminalInput),
        }
    }
}

/// Run a command to completion, capturing its output. A non-zero exit
/// becomes `ToolError::Command` carrying the tail of stderr.
pub fn run_command(command: &mut Command) -> ToolResult<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!("Running {:?}", command);

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ToolError::Command {
        program,
        status: output.status.to_string(),
        stderr: tail_lines(stderr.trim(), 5),
    })
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unusable_mail_settings_leave_mail_off() {
        let mut config = Config::default();
        config.mail.smtp_host = Some("smtp.example.org".into());
        config.mail.sender_address = Some("backup@example.org".into());
        config.mail.recipient = Some("admin at example".into());
        assert!(config.mail.is_configured());

        let tools = Tools::from_config(&config);
        assert!(tools.mail.is_none());

        config.mail.recipient = Some("admin@example.org".into());
        assert!(Tools::from_config(&config).mail.is_some());
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }

    #[test]
    #[cfg(unix)]
    fn test_run_command_success_and_failure() {
        let output = run_command(Command::new("sh").args(["-c", "echo hello"])).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");

        let err = run_command(Command::new("sh").args(["-c", "echo oops >&2; exit 3"])).unwrap_err();
        match err {
            ToolError::Command { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_command_missing_program() {
        let err = run_command(&mut Command::new("definitely-not-a-real-program-xyz")).unwrap_err();
        assert!(matches!(err, ToolError::Io(_)));
    }
}
