pub mod gmail;
pub mod smtp;
pub mod telegram;

use crate::error::Result;
use crate::types::{DocumentUpload, InboundMailMessage, OutboundEmail, TelegramFile};
use async_trait::async_trait;
use bytes::Bytes;

/// Mailbox provider holding the Kindle exports.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Messages with an HTML attachment that do not carry `label_name` yet.
    async fn list_candidates(&self, owner: &str, label_name: &str)
        -> Result<Vec<InboundMailMessage>>;

    async fn get_or_create_label(&self, owner: &str, label_name: &str) -> Result<String>;

    async fn mark_processed(&self, owner: &str, message_id: &str, label_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;

    async fn send_document(&self, chat_id: &str, document: DocumentUpload) -> Result<()>;

    async fn resolve_file(&self, file_id: &str) -> Result<TelegramFile>;

    async fn download_file(&self, file_path: &str) -> Result<Bytes>;
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<()>;
}
