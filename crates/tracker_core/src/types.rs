//! Tipos do rastreador: leitura de telemetria, geofence, status e histórico.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ──────────────────────────────────────────────
// Leitura
// ──────────────────────────────────────────────

/// Tipo de frame enviado pelo dispositivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingKind {
    Normal,
    Sos,
}

/// Uma leitura de posição/bateria já validada pelo parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Bateria reportada (0–100%)
    pub battery_percent: u8,
    pub kind: ReadingKind,
    /// Instante em que o frame chegou ao engine
    pub received_at: SystemTime,
}

// ──────────────────────────────────────────────
// Geofence
// ──────────────────────────────────────────────

/// Cerca circular. Snapshot imutável tirado uma vez por leitura.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_meters: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            center_lat: 18.67625,
            center_lon: 105.66854,
            radius_meters: 1000.0,
        }
    }
}

// ──────────────────────────────────────────────
// Status
// ──────────────────────────────────────────────

/// Status derivado do dispositivo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Safe,
    Danger,
    Sos,
    Offline,
    #[default]
    Unknown,
}

impl DeviceStatus {
    /// Representação usada no key/value store e no histórico.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Safe => "SAFE",
            DeviceStatus::Danger => "DANGER",
            DeviceStatus::Sos => "SOS",
            DeviceStatus::Offline => "OFFLINE",
            DeviceStatus::Unknown => "UNKNOWN",
        }
    }

    /// Inverso de [`DeviceStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SAFE" => Some(DeviceStatus::Safe),
            "DANGER" => Some(DeviceStatus::Danger),
            "SOS" => Some(DeviceStatus::Sos),
            "OFFLINE" => Some(DeviceStatus::Offline),
            "UNKNOWN" => Some(DeviceStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado autoritativo do dispositivo.
///
/// Pertence exclusivamente ao tracker (ingestão + watchdog no mesmo loop),
/// portanto nunca é acessado concorrentemente.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub status: DeviceStatus,
    /// `None` = dispositivo nunca visto
    pub last_seen_at: Option<SystemTime>,
    /// Alerta de offline já enviado para o período de silêncio atual
    pub offline_alert_sent: bool,
    /// Último status calculado a partir de uma leitura (nunca OFFLINE).
    /// É o valor "inalterado" usado dentro da faixa de histerese.
    pub last_fix_status: DeviceStatus,
}

// ──────────────────────────────────────────────
// Saída para persistência / dashboard
// ──────────────────────────────────────────────

/// Linha append-only do histórico.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub battery_percent: u8,
    pub status: DeviceStatus,
    /// Segundos desde a epoch Unix
    pub timestamp: f64,
}

impl HistoryRecord {
    pub fn from_reading(reading: &TelemetryReading, status: DeviceStatus) -> Self {
        Self {
            latitude: reading.latitude,
            longitude: reading.longitude,
            battery_percent: reading.battery_percent,
            status,
            timestamp: epoch_secs(reading.received_at),
        }
    }
}

/// Estado atual publicado para o dashboard após cada leitura aceita.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub battery_percent: u8,
    pub status: DeviceStatus,
    pub last_seen: f64,
}

/// Converte para segundos desde a epoch (relógios antes de 1970 viram 0).
pub fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_unknown_and_unseen() {
        let state = DeviceState::default();
        assert_eq!(state.status, DeviceStatus::Unknown);
        assert_eq!(state.last_seen_at, None);
        assert!(!state.offline_alert_sent);
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            DeviceStatus::Safe,
            DeviceStatus::Danger,
            DeviceStatus::Sos,
            DeviceStatus::Offline,
            DeviceStatus::Unknown,
        ] {
            assert_eq!(DeviceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeviceStatus::parse("safe"), None);
    }

    #[test]
    fn history_record_uses_receipt_time() {
        let reading = TelemetryReading {
            latitude: 18.6763,
            longitude: 105.6685,
            battery_percent: 87,
            kind: ReadingKind::Normal,
            received_at: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        };
        let record = HistoryRecord::from_reading(&reading, DeviceStatus::Safe);
        assert_eq!(record.timestamp, 1_700_000_000.0);
        assert_eq!(record.battery_percent, 87);
        assert_eq!(record.status, DeviceStatus::Safe);
    }
}
