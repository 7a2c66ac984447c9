//! SMTP delivery of notifications and archives.

use super::{Mail, MailTransport};
use crate::config::{MailConfig, SmtpSecurity};
use crate::utils::errors::{BackupError, ToolError, ToolResult};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

pub struct SmtpMailer {
    from: Mailbox,
    to: Mailbox,
    host: String,
    port: u16,
    security: SmtpSecurity,
    credentials: Option<Credentials>,
    max_attachment_bytes: u64,
}

impl SmtpMailer {
    /// Build a mailer; addresses are validated here so a bad configuration
    /// is reported at startup instead of at the first send.
    pub fn from_config(config: &MailConfig) -> Result<Self, BackupError> {
        let missing = |field: &str| BackupError::Config(format!("mail.{} is not set", field));
        let host = config.smtp_host.clone().ok_or_else(|| missing("smtp_host"))?;
        let sender = config.sender_address.as_deref().ok_or_else(|| missing("sender_address"))?;
        let recipient = config.recipient.as_deref().ok_or_else(|| missing("recipient"))?;

        let from = Mailbox::new(
            Some(config.sender_name.clone()),
            sender
                .parse()
                .map_err(|e| BackupError::Config(format!("invalid sender address: {}", e)))?,
        );
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| BackupError::Config(format!("invalid recipient address: {}", e)))?;

        let credentials = config
            .username
            .as_ref()
            .map(|user| Credentials::new(user.clone(), config.password.clone().unwrap_or_default()));

        Ok(Self {
            from,
            to,
            host,
            port: config.smtp_port,
            security: config.security,
            credentials,
            max_attachment_bytes: config.max_attachment_mb.saturating_mul(1024 * 1024),
        })
    }

    fn build_message(&self, mail: &Mail<'_>) -> ToolResult<Message> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(mail.subject);

        let message = match mail.attachment {
            Some(path) => {
                // The message is built in memory, so large archives are refused
                let size = std::fs::metadata(path)?.len();
                if size > self.max_attachment_bytes {
                    return Err(ToolError::Mail(format!(
                        "{} is {} bytes, over the {} byte attachment limit",
                        path.display(),
                        size,
                        self.max_attachment_bytes
                    )));
                }
                let bytes = std::fs::read(path)?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "backup".to_string());
                let content_type = ContentType::parse("application/octet-stream")
                    .map_err(|e| ToolError::Mail(e.to_string()))?;

                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(mail.body.to_string()))
                        .singlepart(Attachment::new(filename).body(bytes, content_type)),
                )
            }
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(mail.body.to_string()),
        };

        message.map_err(|e| ToolError::Mail(e.to_string()))
    }

    fn transport(&self) -> ToolResult<SmtpTransport> {
        let builder = match self.security {
            SmtpSecurity::Starttls => SmtpTransport::starttls_relay(&self.host)
                .map_err(|e| ToolError::Mail(e.to_string()))?,
            SmtpSecurity::Tls => {
                SmtpTransport::relay(&self.host).map_err(|e| ToolError::Mail(e.to_string()))?
            }
            SmtpSecurity::None => SmtpTransport::builder_dangerous(&self.host),
        };

        let builder = builder.port(self.port);
        let builder = match &self.credentials {
            Some(credentials) => builder.credentials(credentials.clone()),
            None => builder,
        };
        Ok(builder.build())
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &Mail<'_>) -> ToolResult<()> {
        let message = self.build_message(mail)?;
        self.transport()?
            .send(&message)
            .map_err(|e| ToolError::Mail(e.to_string()))?;
        Ok(())
    }
}
