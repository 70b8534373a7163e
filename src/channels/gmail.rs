use super::Mailbox;
use crate::error::{BridgeError, Result};
use crate::types::{InboundMailMessage, MailAttachment};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const LIST_PAGE_SIZE: &str = "50";
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct GmailMessage {
    pub id: String,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    pub attachment_id: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

/// Gmail REST client authenticated with an OAuth refresh token.
pub struct GmailClient {
    http: Client,
    api_base: String,
    token_url: String,
    credentials: GmailCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl GmailClient {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
        credentials: GmailCredentials,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            credentials,
            token: Mutex::new(None),
        }
    }

    fn user_url(&self, owner: &str, rest: &str) -> String {
        format!("{}/gmail/v1/users/{}/{}", self.api_base, owner, rest)
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BridgeError::upstream(
                "gmail",
                format!("token refresh failed: {}", resp.status()),
            ));
        }
        let token: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_SLACK),
        });
        Ok(token.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.access_token().await?;
        let resp = self.http.get(url).bearer_auth(token).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::upstream("gmail", format!("GET {status} {body}")));
        }
        Ok(resp.json().await?)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let token = self.access_token().await?;
        let resp = self.http.post(url).bearer_auth(token).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::upstream("gmail", format!("POST {status} {body}")));
        }
        Ok(resp.json().await?)
    }

    async fn fetch_message(&self, owner: &str, id: &str) -> Result<InboundMailMessage> {
        let message: GmailMessage = self
            .get_json(&self.user_url(owner, &format!("messages/{id}")), &[("format", "full")])
            .await?;
        let Some(payload) = message.payload else {
            return Err(BridgeError::upstream("gmail", format!("message {id} has no payload")));
        };

        let sender_header = header_value(&payload, "From").unwrap_or_default().to_string();
        let mut parts = Vec::new();
        collect_html_parts(&payload, &mut parts);

        let mut attachments = Vec::with_capacity(parts.len());
        for part in parts {
            let filename = part.filename.clone().unwrap_or_default();
            let encoded = match part.body.as_ref() {
                Some(PartBody { data: Some(data), .. }) => data.clone(),
                Some(PartBody {
                    attachment_id: Some(attachment_id),
                    ..
                }) => {
                    let body: PartBody = self
                        .get_json(
                            &self.user_url(
                                owner,
                                &format!("messages/{id}/attachments/{attachment_id}"),
                            ),
                            &[],
                        )
                        .await?;
                    body.data.unwrap_or_default()
                }
                _ => continue,
            };
            attachments.push(MailAttachment {
                filename,
                data: decode_base64url(&encoded)?,
                mime_type: part.mime_type.clone(),
            });
        }

        Ok(InboundMailMessage {
            id: message.id,
            sender_address: parse_sender_address(&sender_header),
            sender_header,
            attachments,
        })
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_candidates(
        &self,
        owner: &str,
        label_name: &str,
    ) -> Result<Vec<InboundMailMessage>> {
        let query = candidate_query(label_name);
        let list: MessageList = self
            .get_json(
                &self.user_url(owner, "messages"),
                &[("q", query.as_str()), ("maxResults", LIST_PAGE_SIZE)],
            )
            .await?;
        debug!(count = list.messages.len(), "gmail candidates listed");

        let mut messages = Vec::with_capacity(list.messages.len());
        for item in list.messages {
            messages.push(self.fetch_message(owner, &item.id).await?);
        }
        Ok(messages)
    }

    async fn get_or_create_label(&self, owner: &str, label_name: &str) -> Result<String> {
        let labels: LabelList = self.get_json(&self.user_url(owner, "labels"), &[]).await?;
        if let Some(label) = labels.labels.into_iter().find(|l| l.name == label_name) {
            return Ok(label.id);
        }
        let created: Label = self
            .post_json(
                &self.user_url(owner, "labels"),
                &json!({
                    "name": label_name,
                    "labelListVisibility": "labelShow",
                    "messageListVisibility": "show",
                }),
            )
            .await?;
        debug!(label = %created.name, id = %created.id, "created processed label");
        Ok(created.id)
    }

    async fn mark_processed(&self, owner: &str, message_id: &str, label_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                &self.user_url(owner, &format!("messages/{message_id}/modify")),
                &json!({"addLabelIds": [label_id]}),
            )
            .await?;
        Ok(())
    }
}

/// Gmail search for unprocessed messages carrying an HTML export.
pub fn candidate_query(label_name: &str) -> String {
    let label = label_name.trim().replace(' ', "-");
    format!("has:attachment (filename:html OR filename:htm) -label:{label}")
}

/// Lower-cased bare address from a `From` header such as `Ann <ann@x.com>`.
pub fn parse_sender_address(header: &str) -> String {
    let address = match (header.rfind('<'), header.rfind('>')) {
        (Some(start), Some(end)) if start < end => &header[start + 1..end],
        _ => header,
    };
    address.trim().to_lowercase()
}

fn header_value<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn is_html_attachment(part: &MessagePart) -> bool {
    let Some(filename) = part.filename.as_deref().filter(|f| !f.is_empty()) else {
        return false;
    };
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

fn collect_html_parts<'a>(part: &'a MessagePart, out: &mut Vec<&'a MessagePart>) {
    if is_html_attachment(part) {
        out.push(part);
    }
    for child in &part.parts {
        collect_html_parts(child, out);
    }
}

fn decode_base64url(data: &str) -> Result<Bytes> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map(Bytes::from)
        .map_err(|err| BridgeError::upstream("gmail", format!("attachment decode: {err}")))
}
