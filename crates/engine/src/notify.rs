//! Envio de alertas para o contato de emergência.
//!
//! Backends: Telegram, Discord (webhook), ntfy ou apenas log.
//! Best-effort: falhas são retornadas ao worker, que loga e segue.

use reqwest::blocking::Client;
use serde_json::json;
use std::time::Duration;
use tracker_core::config::NotifyConfig;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Erro HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend de notificação desconhecido: {0:?}")]
    UnknownBackend(String),
}

/// `send(text) -> sucesso | falha`.
pub trait Notifier: Send + Sync {
    fn send(&self, text: &str) -> Result<(), NotifyError>;

    /// Nome do backend para logs.
    fn name(&self) -> &'static str;
}

/// Apenas registra a mensagem no log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!("ALERTA:\n{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

enum WebhookTarget {
    Telegram { token: String, chat_id: String },
    Discord { url: String },
    Ntfy { server: String, topic: String },
}

/// Notificador HTTP para Telegram, Discord e ntfy.
pub struct WebhookNotifier {
    client: Client,
    target: WebhookTarget,
}

impl WebhookNotifier {
    fn new(target: WebhookTarget, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, target })
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, text: &str) -> Result<(), NotifyError> {
        let request = match &self.target {
            WebhookTarget::Telegram { token, chat_id } => self
                .client
                .post(format!("https://api.telegram.org/bot{token}/sendMessage"))
                .json(&json!({ "chat_id": chat_id, "text": text })),
            WebhookTarget::Discord { url } => {
                self.client.post(url).json(&json!({ "content": text }))
            }
            WebhookTarget::Ntfy { server, topic } => self
                .client
                .post(format!("{}/{}", server.trim_end_matches('/'), topic))
                .header("Title", "SOS Tracker")
                .header("Priority", "urgent")
                .body(text.to_owned()),
        };

        request.send()?.error_for_status()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.target {
            WebhookTarget::Telegram { .. } => "telegram",
            WebhookTarget::Discord { .. } => "discord",
            WebhookTarget::Ntfy { .. } => "ntfy",
        }
    }
}

/// Cria o notificador descrito em `[notify]`.
pub fn build_notifier(config: &NotifyConfig) -> Result<Box<dyn Notifier>, NotifyError> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let target = match config.backend.as_str() {
        "log" => return Ok(Box::new(LogNotifier)),
        "telegram" => WebhookTarget::Telegram {
            token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        },
        "discord" => WebhookTarget::Discord {
            url: config.discord_webhook_url.clone(),
        },
        "ntfy" => WebhookTarget::Ntfy {
            server: config.ntfy_server.clone(),
            topic: config.ntfy_topic.clone(),
        },
        other => return Err(NotifyError::UnknownBackend(other.to_string())),
    };
    Ok(Box::new(WebhookNotifier::new(target, timeout)?))
}
