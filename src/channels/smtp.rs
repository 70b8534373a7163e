use super::MailTransport;
use crate::config::SmtpConfig;
use crate::error::{BridgeError, Result};
use crate::types::OutboundEmail;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP sender built once at startup and shared by every delivery.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self> {
        let (Some(host), Some(user), Some(pass)) = (
            cfg.host.as_deref(),
            cfg.user.as_deref(),
            cfg.pass.as_deref(),
        ) else {
            return Err(BridgeError::Configuration(
                "SMTP configuration (host, port, user, pass)".to_string(),
            ));
        };

        // `secure` means implicit TLS (port 465); otherwise STARTTLS is used
        // when the server offers it.
        let builder = if cfg.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|err| BridgeError::upstream("smtp", err.to_string()))?
        } else {
            let tls = TlsParameters::new(host.to_string())
                .map_err(|err| BridgeError::upstream("smtp", err.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Opportunistic(tls))
        };

        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();
        Ok(Self { transport })
    }
}

pub fn build_message(email: &OutboundEmail) -> Result<Message> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|err| BridgeError::upstream("smtp", format!("invalid from address: {err}")))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|err| BridgeError::upstream("smtp", format!("invalid to address: {err}")))?;

    let builder = Message::builder().from(from).to(to).subject(email.subject.clone());

    let built = if email.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.text.clone())
    } else {
        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(email.text.clone()));
        for attachment in &email.attachments {
            let content_type = attachment
                .content_type
                .as_deref()
                .and_then(|ct| ContentType::parse(ct).ok())
                .unwrap_or_else(|| {
                    ContentType::parse("application/octet-stream")
                        .unwrap_or(ContentType::TEXT_PLAIN)
                });
            multipart = multipart.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.content.to_vec(), content_type),
            );
        }
        builder.multipart(multipart)
    };

    built.map_err(|err| BridgeError::upstream("smtp", format!("building message: {err}")))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        let message = build_message(&email)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| BridgeError::upstream("smtp", err.to_string()))?;
        Ok(())
    }
}
