//! Configuração unificada via TOML.
//!
//! Um único `config.toml` cobre broker MQTT, store do dashboard, histórico,
//! notificações e geocodificação. Constantes físicas (histerese, limite de
//! offline, backoff) não são configuráveis e vivem em [`crate::engine`] e
//! [`crate::backoff`].

use crate::types::GeofenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Variável de ambiente que sobrescreve o caminho do config.
pub const CONFIG_PATH_ENV: &str = "TRACKER_CONFIG";

/// Erros ao gravar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao serializar config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro de I/O em {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Conexão com o broker MQTT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Tópico publicado pelo dispositivo
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
            topic: "sos/device/001".into(),
            client_id: "sos-tracker-engine".into(),
            keep_alive_secs: 60,
        }
    }
}

/// Key/value store lido pelo dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://` ou `rediss://`; vazio = store em memória
    pub redis_url: String,
}

/// Histórico durável.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub sqlite_path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sqlite_path: "history.db".into(),
        }
    }
}

/// Canal de notificação (Telegram, Discord, ntfy ou apenas log).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// "log", "telegram", "discord" ou "ntfy"
    pub backend: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub discord_webhook_url: String,
    pub ntfy_topic: String,
    pub ntfy_server: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backend: "log".into(),
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            discord_webhook_url: String::new(),
            ntfy_topic: String::new(),
            ntfy_server: "https://ntfy.sh".into(),
            timeout_secs: 10,
        }
    }
}

/// Geocodificação reversa (Nominatim).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://nominatim.openstreetmap.org".into(),
            user_agent: "sos_pro_engine".into(),
            timeout_secs: 5,
        }
    }
}

/// Filas e workers de tarefas em segundo plano.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Threads enviando notificações
    pub notify_workers: usize,
    /// Capacidade de cada fila (excedente é descartado)
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            notify_workers: 2,
            queue_capacity: 64,
        }
    }
}

/// Configuração raiz do engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub store: StoreConfig,
    /// Geofence usada quando o store não tem valores
    pub geofence: GeofenceConfig,
    pub history: HistoryConfig,
    pub notify: NotifyConfig,
    pub geocoder: GeocoderConfig,
    pub dispatcher: DispatcherConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho do config: `$TRACKER_CONFIG` ou `config.toml` ao lado do executável.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.mqtt.host.is_empty() {
            errors.push("Host MQTT não pode ser vazio".into());
        }
        if self.mqtt.port == 0 {
            errors.push("Porta MQTT não pode ser 0".into());
        }
        if self.mqtt.topic.is_empty() {
            errors.push("Tópico MQTT não pode ser vazio".into());
        }

        let fence = &self.geofence;
        if !(fence.radius_meters.is_finite() && fence.radius_meters > 0.0) {
            errors.push(format!("Raio inválido: {} m", fence.radius_meters));
        }
        if !(-90.0..=90.0).contains(&fence.center_lat) || !(-180.0..=180.0).contains(&fence.center_lon) {
            errors.push(format!(
                "Centro da geofence inválido: ({}, {})",
                fence.center_lat, fence.center_lon
            ));
        }

        if self.history.enabled && self.history.sqlite_path.is_empty() {
            errors.push("Caminho do SQLite não pode ser vazio".into());
        }

        let notify = &self.notify;
        match notify.backend.as_str() {
            "log" => {}
            "telegram" => {
                if notify.telegram_bot_token.is_empty() || notify.telegram_chat_id.is_empty() {
                    errors.push("Telegram requer telegram_bot_token e telegram_chat_id".into());
                }
            }
            "discord" => {
                if notify.discord_webhook_url.is_empty() {
                    errors.push("Discord requer discord_webhook_url".into());
                }
            }
            "ntfy" => {
                if notify.ntfy_topic.is_empty() {
                    errors.push("ntfy requer ntfy_topic".into());
                }
            }
            other => errors.push(format!("Backend de notificação desconhecido: {other:?}")),
        }

        if self.geocoder.enabled && self.geocoder.timeout_secs == 0 {
            errors.push("Timeout do geocoder não pode ser 0".into());
        }
        if self.dispatcher.notify_workers == 0 {
            errors.push("notify_workers deve ser ≥ 1".into());
        }
        if self.dispatcher.queue_capacity == 0 {
            errors.push("queue_capacity deve ser ≥ 1".into());
        }

        errors
    }
}
