//! Status e-mails and heartbeat pings.
//!
//! Notifications never fail the operation that triggered them: transport
//! errors are logged as warnings and reported back as `false`.

pub mod ping;

use crate::config::NotifyConfig;
use crate::tools::{Mail, MailTransport, Tools};
use crate::utils::errors::{ToolError, ToolResult};
use std::path::Path;
use tracing::{debug, info, warn};

pub struct Notifier<'a> {
    settings: &'a NotifyConfig,
    transport: Option<&'a dyn MailTransport>,
    host: String,
}

impl<'a> Notifier<'a> {
    pub fn new(settings: &'a NotifyConfig, tools: &'a Tools) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "vault".to_string());

        Self {
            settings,
            transport: tools.mail.as_deref(),
            host,
        }
    }

    fn subject(&self, text: &str) -> String {
        format!("[vault-backup@{}] {}", self.host, text)
    }

    /// Success notice; suppressed when disabled or failure-only.
    pub fn success(&self, subject: &str, body: &str) -> bool {
        if !self.settings.enabled || self.settings.on_failure_only {
            debug!("Success notification suppressed: {}", subject);
            return false;
        }
        self.deliver(subject, body)
    }

    /// Failure notice; sent whenever notifications are enabled.
    pub fn failure(&self, subject: &str, body: &str) -> bool {
        if !self.settings.enabled {
            debug!("Failure notification suppressed: {}", subject);
            return false;
        }
        self.deliver(subject, body)
    }

    fn deliver(&self, subject: &str, body: &str) -> bool {
        let subject = self.subject(subject);
        match self.send(&subject, body, None) {
            Ok(()) => {
                info!("Notification sent: {}", subject);
                true
            }
            Err(e) => {
                warn!("Failed to send notification '{}': {}", subject, e);
                false
            }
        }
    }

    /// Send an archive by mail. Not gated by the notification toggles.
    pub fn send_archive(&self, subject: &str, body: &str, archive: &Path) -> ToolResult<()> {
        self.send(&self.subject(subject), body, Some(archive))
    }

    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>) -> ToolResult<()> {
        let transport = self
            .transport
            .ok_or_else(|| ToolError::Unavailable("mail is not configured".into()))?;
        transport.send(&Mail {
            subject,
            body,
            attachment,
        })
    }

    /// Heartbeat for the end of a run.
    pub fn ping(&self, success: bool) {
        if let Some(url) = &self.settings.ping_url {
            if let Err(e) = ping::send(url, success) {
                warn!("Heartbeat ping failed: {}", e);
            }
        }
    }
}
