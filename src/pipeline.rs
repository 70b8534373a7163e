use crate::channels::{ChatPlatform, MailTransport, Mailbox};
use crate::config::ScanSettings;
use crate::error::Result;
use crate::naming::{markdown_filename, notes_caption, notes_subject};
use crate::notebook::{MarkdownSerializer, NotebookParser};
use crate::types::{
    DocumentUpload, InboundMailMessage, MailAttachment, OutboundAttachment, OutboundEmail,
};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

const MARKDOWN_MIME: &str = "text/markdown";
const NOTES_BODY: &str = "Converted from Kindle notebook attachment.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageOutcome {
    Delivered { attachments: usize },
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<(String, MessageOutcome)>,
}

impl ScanReport {
    fn record(&mut self, message_id: &str, outcome: MessageOutcome) {
        match &outcome {
            MessageOutcome::Delivered { .. } => self.processed += 1,
            MessageOutcome::Skipped => self.skipped += 1,
            MessageOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push((message_id.to_string(), outcome));
    }
}

/// Optional second destination for converted notes.
#[derive(Clone)]
pub struct NoteInbox {
    pub transport: Arc<dyn MailTransport>,
    pub to: String,
    pub from: String,
}

pub struct MailIngestionPipeline {
    mailbox: Arc<dyn Mailbox>,
    parser: Arc<dyn NotebookParser>,
    serializer: Arc<dyn MarkdownSerializer>,
    chat: Arc<dyn ChatPlatform>,
    notes: Option<NoteInbox>,
    settings: ScanSettings,
}

impl MailIngestionPipeline {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        parser: Arc<dyn NotebookParser>,
        serializer: Arc<dyn MarkdownSerializer>,
        chat: Arc<dyn ChatPlatform>,
        notes: Option<NoteInbox>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            mailbox,
            parser,
            serializer,
            chat,
            notes,
            settings,
        }
    }

    pub fn owner(&self) -> &str {
        &self.settings.owner
    }

    /// Runs one scan. Listing or label resolution errors abort the scan;
    /// anything after that is captured per message in the report.
    pub async fn run(&self, scan_id: &str) -> Result<ScanReport> {
        let owner = self.settings.owner.as_str();
        let label_name = self.settings.processed_label.as_str();

        let messages = self.mailbox.list_candidates(owner, label_name).await?;
        let mut report = ScanReport::default();
        if messages.is_empty() {
            info!(scan_id, "no unprocessed kindle exports");
            return Ok(report);
        }

        let label_id = self.mailbox.get_or_create_label(owner, label_name).await?;

        for message in &messages {
            if !self.is_trusted(message) {
                warn!(
                    scan_id,
                    message_id = %message.id,
                    from = %message.sender_header,
                    "skip untrusted sender"
                );
                report.record(&message.id, MessageOutcome::Skipped);
                continue;
            }

            let outcome = match self.process_message(message, &label_id).await {
                Ok(count) => MessageOutcome::Delivered { attachments: count },
                Err(err) => {
                    error!(scan_id, message_id = %message.id, "kindle export failed: {err}");
                    MessageOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            report.record(&message.id, outcome);
        }

        info!(
            scan_id,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "mail scan finished"
        );
        Ok(report)
    }

    fn is_trusted(&self, message: &InboundMailMessage) -> bool {
        message.sender_address.trim().to_lowercase()
            == self.settings.trusted_sender.trim().to_lowercase()
    }

    /// Delivers every attachment in order, then labels the message once.
    async fn process_message(&self, message: &InboundMailMessage, label_id: &str) -> Result<usize> {
        for attachment in &message.attachments {
            self.deliver_attachment(attachment).await?;
        }
        self.mailbox
            .mark_processed(&self.settings.owner, &message.id, label_id)
            .await?;
        Ok(message.attachments.len())
    }

    async fn deliver_attachment(&self, attachment: &MailAttachment) -> Result<()> {
        let html = String::from_utf8_lossy(&attachment.data);
        let notebook = self.parser.parse(&html);
        let markdown = Bytes::from(self.serializer.serialize(&notebook));
        let filename = markdown_filename(&notebook.title, &attachment.filename);

        self.chat
            .send_document(
                &self.settings.owner_chat_id,
                DocumentUpload {
                    filename: filename.clone(),
                    content: markdown.clone(),
                    content_type: MARKDOWN_MIME.to_string(),
                    caption: Some(notes_caption(&notebook.title)),
                },
            )
            .await?;

        if let Some(notes) = &self.notes {
            notes
                .transport
                .send(OutboundEmail {
                    to: notes.to.clone(),
                    from: notes.from.clone(),
                    subject: notes_subject(&notebook.title),
                    text: NOTES_BODY.to_string(),
                    attachments: vec![OutboundAttachment {
                        filename,
                        content: markdown,
                        content_type: Some(MARKDOWN_MIME.to_string()),
                    }],
                })
                .await?;
        }
        Ok(())
    }
}

/// One async mutex per owner mailbox so overlapping scans run one at a time.
#[derive(Clone, Default)]
pub struct ScanLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ScanLocks {
    pub async fn acquire(&self, owner: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.locks.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(owner.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
