use super::ChatPlatform;
use crate::error::{BridgeError, Result};
use crate::types::{DocumentUpload, TelegramFile};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Bot API client. `api_base` is `https://api.telegram.org` in production.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(http: Client, api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let resp = self.http.post(self.method_url(method)).json(body).send().await?;
        Self::unwrap_response(method, resp).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        resp: reqwest::Response,
    ) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::upstream(
                "telegram",
                format!("{method} failed: {status} {body}"),
            ));
        }
        let parsed: ApiResponse<T> = resp.json().await?;
        if !parsed.ok {
            return Err(BridgeError::upstream(
                "telegram",
                format!(
                    "{method} error: {}",
                    parsed.description.as_deref().unwrap_or("unknown error")
                ),
            ));
        }
        parsed
            .result
            .ok_or_else(|| {
                BridgeError::upstream("telegram", format!("{method} returned no result"))
            })
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let _: Value = self
            .call("sendMessage", &json!({"chat_id": chat_id, "text": text}))
            .await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: &str, document: DocumentUpload) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(document.content.to_vec())
            .file_name(document.filename)
            .mime_str(&document.content_type)?;
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = document.caption {
            form = form.text("caption", caption);
        }
        let resp = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        let _: Value = Self::unwrap_response("sendDocument", resp).await?;
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<TelegramFile> {
        self.call("getFile", &json!({"file_id": file_id})).await
    }

    async fn download_file(&self, file_path: &str) -> Result<Bytes> {
        let resp = self.http.get(self.file_url(file_path)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BridgeError::Download(format!(
                "file fetch returned {status}"
            )));
        }
        Ok(resp.bytes().await?)
    }
}
