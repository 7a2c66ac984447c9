//! Fake collaborators for unit tests.

use super::{
    cipher::AesGcmCipher, tarball::TarGzArchiver, Archiver, DbSnapshotter, Mail, MailTransport,
    RemoteSync, SecretInput, ServiceController, Tools,
};
use crate::archive::components::PackEntry;
use crate::config::Config;
use crate::utils::errors::{ToolError, ToolResult};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const DB_BYTES: &[u8] = b"SQLite format 3\0 live vault rows";
pub const ATTACHMENT_BYTES: &[u8] = b"encrypted attachment blob";

/// Config rooted in a scratch directory: data under `data/`, archives
/// under `backups/`.
pub fn vault_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.vault.data_dir = root.join("data");
    config.backup.dir = Some(root.join("backups"));
    config.log.file = Some(root.join("backup.log"));
    config
}

/// Populate every component of the vault described by `config`.
pub fn seed_vault(config: &Config) -> std::io::Result<()> {
    let data = &config.vault.data_dir;
    std::fs::create_dir_all(data.join("attachments/cipher-1"))?;
    std::fs::create_dir_all(data.join("sends/send-1"))?;
    std::fs::write(config.vault.database_path(), DB_BYTES)?;
    std::fs::write(data.join("attachments/cipher-1/file.bin"), ATTACHMENT_BYTES)?;
    std::fs::write(data.join("sends/send-1/blob"), b"send payload")?;
    std::fs::write(data.join("config.json"), br#"{"domain":"https://vault.example"}"#)?;
    std::fs::write(data.join("rsa_key.pem"), b"private key")?;
    std::fs::write(data.join("rsa_key.pub.pem"), b"public key")?;
    std::fs::write(data.join(".env"), b"ADMIN_TOKEN=abc\n")?;
    Ok(())
}

/// Byte-for-byte copy, so round trips can compare exact contents.
pub struct CopySnapshotter;

impl DbSnapshotter for CopySnapshotter {
    fn snapshot(&self, source: &Path, dest: &Path) -> ToolResult<()> {
        std::fs::copy(source, dest)?;
        Ok(())
    }
}

pub struct FailingSnapshotter;

impl DbSnapshotter for FailingSnapshotter {
    fn snapshot(&self, _source: &Path, _dest: &Path) -> ToolResult<()> {
        Err(ToolError::Unavailable("database is locked".into()))
    }
}

/// Writes a few bytes and then fails, like a packer dying mid-stream.
pub struct FailingArchiver;

impl Archiver for FailingArchiver {
    fn pack(&self, _entries: &[PackEntry], out: &mut dyn Write) -> ToolResult<()> {
        out.write_all(b"partial")?;
        Err(ToolError::Unavailable("disk full".into()))
    }

    fn unpack(&self, _input: &mut dyn Read, _dest: &Path) -> ToolResult<()> {
        Err(ToolError::Unavailable("corrupt stream".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

pub struct RecordingMailer {
    sent: Rc<RefCell<Vec<SentMail>>>,
    fail: bool,
}

impl MailTransport for RecordingMailer {
    fn send(&self, mail: &Mail<'_>) -> ToolResult<()> {
        if self.fail {
            return Err(ToolError::Mail("connection refused".into()));
        }
        self.sent.borrow_mut().push(SentMail {
            subject: mail.subject.to_string(),
            body: mail.body.to_string(),
            attachment: mail.attachment.map(Path::to_path_buf),
        });
        Ok(())
    }
}

pub struct ScriptedSync {
    configured: bool,
    remotes: Vec<String>,
    failing: Vec<String>,
    synced: Rc<RefCell<Vec<(PathBuf, String)>>>,
}

impl RemoteSync for ScriptedSync {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn list_remotes(&self) -> ToolResult<Vec<String>> {
        Ok(self.remotes.clone())
    }

    fn sync(&self, local_dir: &Path, remote: &str) -> ToolResult<()> {
        if self.failing.iter().any(|r| r == remote) {
            return Err(ToolError::Command {
                program: "rclone".into(),
                status: "exit status: 1".into(),
                stderr: format!("{}: access denied", remote),
            });
        }
        self.synced
            .borrow_mut()
            .push((local_dir.to_path_buf(), remote.to_string()));
        Ok(())
    }
}

pub struct ScriptedService {
    available: bool,
    fail_stop: bool,
    fail_start: bool,
    calls: Rc<RefCell<Vec<String>>>,
}

impl ServiceController for ScriptedService {
    fn is_available(&self) -> bool {
        self.available
    }

    fn stop(&self, service: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("stop {}", service));
        if self.fail_stop {
            return Err(ToolError::Unavailable("stop refused".into()));
        }
        Ok(())
    }

    fn start(&self, service: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("start {}", service));
        if self.fail_start {
            return Err(ToolError::Unavailable("start refused".into()));
        }
        Ok(())
    }
}

/// Answers prompts from a script, one entry per prompt.
pub struct ScriptedInput {
    interactive: bool,
    secrets: RefCell<VecDeque<String>>,
    prompts: Rc<Cell<usize>>,
}

impl SecretInput for ScriptedInput {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn read_secret(&self, _prompt: &str) -> ToolResult<String> {
        if !self.interactive {
            return Err(ToolError::Unavailable("not interactive".into()));
        }
        self.prompts.set(self.prompts.get() + 1);
        self.secrets
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ToolError::Unavailable("end of input".into()))
    }
}

/// Shared handles to what the fakes observed.
#[derive(Clone, Default)]
pub struct Probes {
    pub mails: Rc<RefCell<Vec<SentMail>>>,
    pub synced: Rc<RefCell<Vec<(PathBuf, String)>>>,
    pub service_calls: Rc<RefCell<Vec<String>>>,
    pub prompts: Rc<Cell<usize>>,
}

/// Builder for a `Tools` made of fakes. Archiving and encryption use the
/// real pure-Rust implementations.
pub struct FakeTools {
    pub snapshotter: Box<dyn DbSnapshotter>,
    pub archiver: Box<dyn Archiver>,
    pub mail: bool,
    pub mail_fails: bool,
    pub sync_configured: bool,
    pub remotes: Vec<&'static str>,
    pub failing_remotes: Vec<&'static str>,
    pub service_available: bool,
    pub service_stop_fails: bool,
    pub service_start_fails: bool,
    pub interactive: bool,
    pub typed_secrets: Vec<&'static str>,
}

impl Default for FakeTools {
    fn default() -> Self {
        Self {
            snapshotter: Box::new(CopySnapshotter),
            archiver: Box::new(TarGzArchiver),
            mail: true,
            mail_fails: false,
            sync_configured: true,
            remotes: Vec::new(),
            failing_remotes: Vec::new(),
            service_available: true,
            service_stop_fails: false,
            service_start_fails: false,
            interactive: false,
            typed_secrets: Vec::new(),
        }
    }
}

impl FakeTools {
    pub fn build(self) -> (Tools, Probes) {
        let probes = Probes::default();
        let owned = |names: Vec<&'static str>| names.into_iter().map(str::to_string).collect();

        let mail: Option<Box<dyn MailTransport>> = if self.mail {
            Some(Box::new(RecordingMailer {
                sent: probes.mails.clone(),
                fail: self.mail_fails,
            }))
        } else {
            None
        };

        let tools = Tools {
            snapshotter: self.snapshotter,
            archiver: self.archiver,
            cipher: Box::new(AesGcmCipher),
            mail,
            sync: Box::new(ScriptedSync {
                configured: self.sync_configured,
                remotes: owned(self.remotes),
                failing: owned(self.failing_remotes),
                synced: probes.synced.clone(),
            }),
            service: Box::new(ScriptedService {
                available: self.service_available,
                fail_stop: self.service_stop_fails,
                fail_start: self.service_start_fails,
                calls: probes.service_calls.clone(),
            }),
            input: Box::new(ScriptedInput {
                interactive: self.interactive,
                secrets: RefCell::new(self.typed_secrets.into_iter().map(str::to_string).collect()),
                prompts: probes.prompts.clone(),
            }),
        };

        (tools, probes)
    }
}
