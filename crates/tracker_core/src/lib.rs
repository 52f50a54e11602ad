//! # Tracker Core
//!
//! Crate compartilhada do rastreador SOS: tipos, parser do frame do
//! dispositivo, distância geodésica, máquina de estados (geofence com
//! histerese, SOS e offline), textos de alerta e configuração TOML.
//!
//! Nada aqui faz I/O de rede; o engine (`tracker_engine`) injeta relógio,
//! transporte e backends.
//!
//! ## Módulos
//! - [`types`] – Leitura, geofence, status e histórico
//! - [`protocol`] – Parser do frame `TYPE|LAT|LON|BATTERY_<n>%`
//! - [`geo`] – Distância haversine
//! - [`engine`] – Avaliação de leituras e watchdog de offline
//! - [`alerts`] – Tipos e texto dos alertas
//! - [`backoff`] – Política de reconexão
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod geo;
pub mod engine;
pub mod alerts;
pub mod backoff;
pub mod config;

// Re-exports convenientes
pub use types::{DeviceState, DeviceStatus, GeofenceConfig, HistoryRecord, TelemetryReading};
pub use protocol::{parse_frame, ProtocolError};
pub use engine::{check_offline, evaluate, Evaluation, OfflineCheck};
pub use config::AppConfig;
