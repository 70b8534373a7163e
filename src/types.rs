use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One mailbox message as seen at scan time.
#[derive(Debug, Clone)]
pub struct InboundMailMessage {
    pub id: String,
    pub sender_address: String,
    pub sender_header: String,
    pub attachments: Vec<MailAttachment>,
}

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub data: Bytes,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub title: String,
    pub authors: Option<String>,
    pub sections: Vec<NotebookSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookSection {
    pub heading: Option<String>,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub heading: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub update_id: i64,
    pub message: Option<ChatMessage>,
    pub edited_message: Option<ChatMessage>,
}

impl ChatUpdate {
    /// The message to act on; edits are handled like fresh messages.
    pub fn effective_message(&self) -> Option<&ChatMessage> {
        self.message.as_ref().or(self.edited_message.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<ChatUser>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub document: Option<ChatDocument>,
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDocument {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
    pub file_size: Option<i64>,
}

/// Result of the platform's file lookup step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    pub file_unique_id: Option<String>,
    pub file_size: Option<i64>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    pub content: Bytes,
    pub content_type: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
    pub attachments: Vec<OutboundAttachment>,
}

#[derive(Debug, Clone)]
pub struct OutboundAttachment {
    pub filename: String,
    pub content: Bytes,
    pub content_type: Option<String>,
}
