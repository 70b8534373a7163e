use crate::channels::{ChatPlatform, MailTransport};
use crate::commands::{parse_command, Command};
use crate::config::IntakeSettings;
use crate::error::{BridgeError, Result};
use crate::naming::{build_subject, help_message};
use crate::types::{ChatDocument, ChatMessage, OutboundAttachment, OutboundEmail, PhotoSize};
use std::sync::Arc;
use tracing::{error, info};

pub const DELIVERED_TEXT: &str = "Delivered to Kindle ✅";
pub const DELIVERED_ATTACHMENT: &str = "Delivered to Kindle ✅ (attachment)";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Use /send <text> to forward to Kindle.";
pub const FAILURE_NOTICE: &str = "Sorry, failed to deliver. Please try again.";
pub const DEFAULT_CAPTION: &str = "Forwarded from Telegram";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Something was emailed to the Kindle and acknowledged.
    Delivered,
    /// Help or hint text was sent back; nothing left the chat.
    Replied,
    /// Message had nothing to act on.
    Ignored,
}

/// Sends email to the configured Kindle intake address.
#[derive(Clone)]
pub struct KindleIntake {
    transport: Arc<dyn MailTransport>,
    settings: IntakeSettings,
}

impl KindleIntake {
    pub fn new(transport: Arc<dyn MailTransport>, settings: IntakeSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub async fn deliver(
        &self,
        subject: String,
        text: String,
        attachments: Vec<OutboundAttachment>,
    ) -> Result<()> {
        self.transport
            .send(OutboundEmail {
                to: self.settings.kindle_email.clone(),
                from: self.settings.from_email.clone(),
                subject,
                text,
                attachments,
            })
            .await
    }
}

/// A file the message carries, before it is downloaded.
enum AttachmentSource<'a> {
    Document(&'a ChatDocument),
    Photo(&'a PhotoSize),
}

impl<'a> AttachmentSource<'a> {
    /// The document wins over photos; of the photo sizes the last is largest.
    fn of(message: &'a ChatMessage) -> Option<Self> {
        if let Some(document) = &message.document {
            return Some(Self::Document(document));
        }
        message
            .photo
            .as_deref()
            .and_then(|photos| photos.last())
            .map(Self::Photo)
    }
}

/// Routes chat messages. Without an intake only replies that stay in the
/// chat (`/start`, unknown commands) succeed.
pub struct ChatDispatcher {
    chat: Arc<dyn ChatPlatform>,
    intake: Option<KindleIntake>,
}

impl ChatDispatcher {
    pub fn new(chat: Arc<dyn ChatPlatform>, intake: Option<KindleIntake>) -> Self {
        Self { chat, intake }
    }

    fn intake(&self) -> Result<&KindleIntake> {
        self.intake.as_ref().ok_or_else(|| {
            BridgeError::Configuration("KINDLE_EMAIL, FROM_EMAIL or SMTP settings".to_string())
        })
    }

    /// Dispatches `message` and, on failure, tells the chat once.
    ///
    /// The returned error is always the dispatch error; a failed notice is
    /// only logged.
    pub async fn handle(&self, update_id: i64, message: &ChatMessage) -> Result<DispatchOutcome> {
        match self.dispatch(message).await {
            Ok(outcome) => {
                info!(update_id, message_id = message.message_id, ?outcome, "update handled");
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    update_id,
                    message_id = message.message_id,
                    "telegram dispatch failed: {err}"
                );
                if let Err(notify_err) = self.notify_failure(message).await {
                    error!(
                        update_id,
                        message_id = message.message_id,
                        "failed to notify chat about dispatch failure: {notify_err}"
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn dispatch(&self, message: &ChatMessage) -> Result<DispatchOutcome> {
        let chat_id = message.chat.id.to_string();

        if let Some(source) = AttachmentSource::of(message) {
            let intake = self.intake()?;
            let attachment = match source {
                AttachmentSource::Document(document) => self.document_attachment(document).await?,
                AttachmentSource::Photo(photo) => self.photo_attachment(photo).await?,
            };
            let caption = message
                .caption
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CAPTION.to_string());
            intake
                .deliver(build_subject(message), caption, vec![attachment])
                .await?;
            self.chat.send_text(&chat_id, DELIVERED_ATTACHMENT).await?;
            return Ok(DispatchOutcome::Delivered);
        }

        let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(DispatchOutcome::Ignored);
        };

        match parse_command(text) {
            Command::Start => {
                self.chat.send_text(&chat_id, &help_message()).await?;
                Ok(DispatchOutcome::Replied)
            }
            Command::Send { text } => {
                self.intake()?
                    .deliver(build_subject(message), text, Vec::new())
                    .await?;
                self.chat.send_text(&chat_id, DELIVERED_TEXT).await?;
                Ok(DispatchOutcome::Delivered)
            }
            Command::Unknown { .. } => {
                self.chat.send_text(&chat_id, UNKNOWN_COMMAND).await?;
                Ok(DispatchOutcome::Replied)
            }
        }
    }

    async fn notify_failure(&self, message: &ChatMessage) -> Result<()> {
        self.chat
            .send_text(&message.chat.id.to_string(), FAILURE_NOTICE)
            .await
    }

    async fn document_attachment(&self, document: &ChatDocument) -> Result<OutboundAttachment> {
        let content = self.fetch(&document.file_id, "document").await?;
        let filename = document
            .file_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("document-{}", document.file_id));
        Ok(OutboundAttachment {
            filename,
            content,
            content_type: document.mime_type.clone(),
        })
    }

    async fn photo_attachment(&self, photo: &PhotoSize) -> Result<OutboundAttachment> {
        let content = self.fetch(&photo.file_id, "photo").await?;
        Ok(OutboundAttachment {
            filename: format!("photo-{}.jpg", photo.file_id),
            content,
            content_type: Some("image/jpeg".to_string()),
        })
    }

    async fn fetch(&self, file_id: &str, kind: &str) -> Result<bytes::Bytes> {
        let file = self.chat.resolve_file(file_id).await?;
        let Some(path) = file.file_path.filter(|p| !p.is_empty()) else {
            return Err(BridgeError::Download(format!(
                "telegram did not return file_path for {kind}"
            )));
        };
        self.chat.download_file(&path).await
    }
}
