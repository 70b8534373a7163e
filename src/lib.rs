pub mod channels;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod naming;
pub mod notebook;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use error::BridgeError;

use self::channels::gmail::{GmailClient, GmailCredentials};
use self::channels::smtp::SmtpMailer;
use self::channels::telegram::TelegramClient;
use self::channels::{ChatPlatform, MailTransport};
use self::config::{load_config, IntakeSettings, ScanSettings};
use self::dispatcher::{ChatDispatcher, DispatchOutcome, KindleIntake};
use self::notebook::{KindleHtmlParser, MarkdownRenderer};
use self::pipeline::{MailIngestionPipeline, NoteInbox, ScanLocks};
use self::types::ChatUpdate;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Option<Arc<MailIngestionPipeline>>,
    pub dispatcher: Option<Arc<ChatDispatcher>>,
    pub scan_locks: ScanLocks,
}

impl AppState {
    pub fn new(
        config: Config,
        pipeline: Option<Arc<MailIngestionPipeline>>,
        dispatcher: Option<Arc<ChatDispatcher>>,
    ) -> Self {
        Self {
            config,
            pipeline,
            dispatcher,
            scan_locks: ScanLocks::default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub ok: bool,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Builds the real collaborators from `config`.
///
/// A flow whose settings are incomplete is left out; its endpoint then
/// answers with a configuration error.
pub async fn create_app() -> anyhow::Result<(AppState, Router)> {
    let config = load_config();
    let http = reqwest::Client::new();

    let chat: Option<Arc<dyn ChatPlatform>> = config.telegram.bot_token.as_ref().map(|token| {
        Arc::new(TelegramClient::new(
            http.clone(),
            config.telegram.api_base.clone(),
            token.clone(),
        )) as Arc<dyn ChatPlatform>
    });

    let mailer: Option<Arc<dyn MailTransport>> = match SmtpMailer::from_config(&config.smtp) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(err) => {
            warn!("smtp disabled: {err}");
            None
        }
    };

    let pipeline = build_pipeline(&config, &http, chat.clone(), mailer.clone());
    let dispatcher = build_dispatcher(&config, chat, mailer);

    let state = AppState::new(config, pipeline, dispatcher);
    let app = build_router(state.clone());
    Ok((state, app))
}

fn build_pipeline(
    config: &Config,
    http: &reqwest::Client,
    chat: Option<Arc<dyn ChatPlatform>>,
    mailer: Option<Arc<dyn MailTransport>>,
) -> Option<Arc<MailIngestionPipeline>> {
    let settings = match ScanSettings::from_config(config) {
        Ok(settings) => settings,
        Err(err) => {
            warn!("mail scan disabled: {err}");
            return None;
        }
    };
    let Some(chat) = chat else {
        warn!("mail scan disabled: missing TELEGRAM_BOT_TOKEN");
        return None;
    };
    let mailbox = &config.mailbox;
    let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
        mailbox.client_id.clone(),
        mailbox.client_secret.clone(),
        mailbox.refresh_token.clone(),
    ) else {
        warn!("mail scan disabled: missing Gmail OAuth credentials");
        return None;
    };
    let gmail = GmailClient::new(
        http.clone(),
        mailbox.api_base.clone(),
        mailbox.token_url.clone(),
        GmailCredentials {
            client_id,
            client_secret,
            refresh_token,
        },
    );

    let notes = match (
        config.delivery.notes_inbox.clone(),
        config.delivery.from_email.clone(),
        mailer,
    ) {
        (Some(to), Some(from), Some(transport)) => Some(NoteInbox { transport, to, from }),
        (Some(_), _, _) => {
            warn!("note inbox configured but FROM_EMAIL or SMTP is missing; notes go to chat only");
            None
        }
        _ => None,
    };

    Some(Arc::new(MailIngestionPipeline::new(
        Arc::new(gmail),
        Arc::new(KindleHtmlParser),
        Arc::new(MarkdownRenderer),
        chat,
        notes,
        settings,
    )))
}

fn build_dispatcher(
    config: &Config,
    chat: Option<Arc<dyn ChatPlatform>>,
    mailer: Option<Arc<dyn MailTransport>>,
) -> Option<Arc<ChatDispatcher>> {
    let Some(chat) = chat else {
        warn!("telegram webhook disabled: missing TELEGRAM_BOT_TOKEN");
        return None;
    };
    let intake = match (IntakeSettings::from_config(config), mailer) {
        (Ok(settings), Some(mailer)) => Some(KindleIntake::new(mailer, settings)),
        (Err(err), _) => {
            warn!("kindle forwarding disabled: {err}");
            None
        }
        (Ok(_), None) => {
            warn!("kindle forwarding disabled: missing SMTP settings");
            None
        }
    };
    Some(Arc::new(ChatDispatcher::new(chat, intake)))
}

pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.config.telegram.webhook_path.clone();
    Router::new()
        .route("/v1/health", get(health))
        .route("/api/check-mail", get(check_mail))
        .route(&webhook_path, get(webhook_liveness).post(telegram_webhook))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn webhook_liveness() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Maps `err` to its status code with a fixed public body; the detail
/// stays in the logs.
fn error_response(err: &BridgeError, message: &str) -> Response {
    (err.status_code(), Json(json!({"ok": false, "error": message}))).into_response()
}

async fn check_mail(State(state): State<AppState>) -> Response {
    let Some(pipeline) = state.pipeline.clone() else {
        let err = BridgeError::Configuration(
            "BOT_INBOX_EMAIL, TRUSTED_SENDER_EMAIL, OWNER_CHAT_ID or Gmail credentials".to_string(),
        );
        error!("/api/check-mail unavailable: {err}");
        return error_response(
            &err,
            "Missing BOT_INBOX_EMAIL, TRUSTED_SENDER_EMAIL, or OWNER_CHAT_ID",
        );
    };

    let _guard = state.scan_locks.acquire(pipeline.owner()).await;
    let scan_id = uuid::Uuid::new_v4().to_string();

    match pipeline.run(&scan_id).await {
        Ok(report) => Json(ScanResponse {
            ok: true,
            processed: report.processed,
            skipped: report.skipped,
            failed: report.failed,
        })
        .into_response(),
        Err(err) => {
            error!(scan_id = %scan_id, "/api/check-mail failed: {err}");
            error_response(&err, "Internal error")
        }
    }
}

/// Checks the shared-secret header when a secret is configured.
fn verify_secret(expected: Option<&str>, headers: &HeaderMap) -> Result<(), BridgeError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let received = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if received == Some(expected) {
        Ok(())
    } else {
        Err(BridgeError::Unauthorized)
    }
}

fn parse_update(body: &[u8]) -> Result<ChatUpdate, BridgeError> {
    serde_json::from_slice(body).map_err(|err| BridgeError::MalformedInput(err.to_string()))
}

async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = verify_secret(state.config.telegram.webhook_secret.as_deref(), &headers) {
        warn!("telegram webhook rejected: {err}");
        return error_response(&err, "unauthorized");
    }

    let update = match parse_update(&body) {
        Ok(update) => update,
        Err(err) => {
            error!("invalid telegram webhook payload: {err}");
            return error_response(&err, "invalid JSON");
        }
    };

    let Some(message) = update.effective_message() else {
        info!(update_id = update.update_id, "update without message ignored");
        return Json(json!({"ok": true, "ignored": true})).into_response();
    };

    let Some(dispatcher) = state.dispatcher.clone() else {
        let err = BridgeError::Configuration("TELEGRAM_BOT_TOKEN".to_string());
        error!(update_id = update.update_id, "telegram webhook unavailable: {err}");
        return error_response(&err, "delivery failed");
    };

    match dispatcher.handle(update.update_id, message).await {
        Ok(DispatchOutcome::Ignored) => Json(json!({"ok": true, "ignored": true})).into_response(),
        Ok(_) => Json(json!({"ok": true})).into_response(),
        Err(err) => error_response(&err, "delivery failed"),
    }
}
