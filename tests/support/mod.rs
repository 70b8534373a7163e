#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use kindle_bridge::channels::{ChatPlatform, MailTransport, Mailbox};
use kindle_bridge::error::{BridgeError, Result};
use kindle_bridge::types::{
    ChatMessage, DocumentUpload, InboundMailMessage, MailAttachment, OutboundEmail, TelegramFile,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeMailbox {
    pub messages: Mutex<Vec<InboundMailMessage>>,
    pub labeled: Mutex<Vec<String>>,
    pub label_lookups: Mutex<usize>,
    pub fail_listing: bool,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<InboundMailMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
            ..Self::default()
        }
    }

    pub fn labeled(&self) -> Vec<String> {
        self.labeled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_candidates(&self, _owner: &str, _label: &str) -> Result<Vec<InboundMailMessage>> {
        if self.fail_listing {
            return Err(BridgeError::upstream("gmail", "listing failed"));
        }
        let labeled: HashSet<String> = self.labeled.lock().unwrap().iter().cloned().collect();
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !labeled.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn get_or_create_label(&self, _owner: &str, _label: &str) -> Result<String> {
        *self.label_lookups.lock().unwrap() += 1;
        Ok("Label_1".to_string())
    }

    async fn mark_processed(&self, _owner: &str, message_id: &str, label_id: &str) -> Result<()> {
        assert_eq!(label_id, "Label_1");
        self.labeled.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentDocument {
    pub chat_id: String,
    pub filename: String,
    pub content: String,
    pub content_type: String,
    pub caption: Option<String>,
}

#[derive(Default)]
pub struct FakeChat {
    pub texts: Mutex<Vec<(String, String)>>,
    pub documents: Mutex<Vec<SentDocument>>,
    pub resolved: Mutex<Vec<String>>,
    pub downloaded: Mutex<Vec<String>>,
    /// file id -> file path; ids without an entry resolve with no path.
    pub file_paths: HashMap<String, String>,
    /// Documents whose filename contains this fail to send.
    pub fail_documents_named: Option<String>,
    pub fail_texts: bool,
}

impl FakeChat {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            file_paths: files
                .iter()
                .map(|(id, path)| (id.to_string(), path.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<(String, String)> {
        self.texts.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<SentDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        if self.fail_texts {
            return Err(BridgeError::upstream("telegram", "sendMessage failed: 502"));
        }
        self.texts
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_document(&self, chat_id: &str, document: DocumentUpload) -> Result<()> {
        if let Some(needle) = &self.fail_documents_named {
            if document.filename.contains(needle.as_str()) {
                return Err(BridgeError::upstream("telegram", "sendDocument failed: 500"));
            }
        }
        self.documents.lock().unwrap().push(SentDocument {
            chat_id: chat_id.to_string(),
            filename: document.filename,
            content: String::from_utf8_lossy(&document.content).to_string(),
            content_type: document.content_type,
            caption: document.caption,
        });
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<TelegramFile> {
        self.resolved.lock().unwrap().push(file_id.to_string());
        Ok(TelegramFile {
            file_id: file_id.to_string(),
            file_unique_id: None,
            file_size: None,
            file_path: self.file_paths.get(file_id).cloned(),
        })
    }

    async fn download_file(&self, file_path: &str) -> Result<Bytes> {
        self.downloaded.lock().unwrap().push(file_path.to_string());
        Ok(Bytes::from(format!("bytes of {file_path}")))
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub fail: bool,
}

impl FakeTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        if self.fail {
            return Err(BridgeError::upstream("smtp", "connection refused"));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub fn kindle_export(title: &str) -> String {
    format!(
        r#"<html><body>
<div class="bookTitle">{title}</div>
<div class="authors">Frank Herbert</div>
<div class="sectionHeading">Book One</div>
<div class="noteHeading">Highlight (yellow) - Page 5</div>
<div class="noteText">Fear is the mind-killer.</div>
</body></html>"#
    )
}

pub fn mail_message(id: &str, from: &str, attachments: &[(&str, &str)]) -> InboundMailMessage {
    InboundMailMessage {
        id: id.to_string(),
        sender_address: from.to_lowercase(),
        sender_header: format!("Reader <{from}>"),
        attachments: attachments
            .iter()
            .map(|(name, html)| MailAttachment {
                filename: name.to_string(),
                data: Bytes::from(html.to_string()),
                mime_type: Some("text/html".to_string()),
            })
            .collect(),
    }
}

pub fn chat_message(value: serde_json::Value) -> ChatMessage {
    let mut base = json!({
        "message_id": 7,
        "chat": {"id": 42, "type": "private"},
        "from": {"id": 42, "first_name": "Ann"}
    });
    if let (Some(base_obj), Some(extra)) = (base.as_object_mut(), value.as_object()) {
        for (key, val) in extra {
            base_obj.insert(key.clone(), val.clone());
        }
    }
    serde_json::from_value(base).unwrap()
}
