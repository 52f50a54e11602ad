//! Key/value store compartilhado com o dashboard.
//!
//! O engine publica aqui o estado atual e lê a geofence configurada pelo
//! dashboard. Backends: Redis ou memória (sem dashboard).

use redis::Commands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracker_core::types::{DeviceStatus, GeofenceConfig, StateSnapshot};
use tracing::{debug, info};

pub const KEY_LAT: &str = "sos_lat";
pub const KEY_LON: &str = "sos_lon";
pub const KEY_BATTERY: &str = "sos_battery";
pub const KEY_STATUS: &str = "sos_status";
pub const KEY_LAST_SEEN: &str = "sos_last_seen";
pub const KEY_CONN_STATUS: &str = "sos_conn_status";
pub const KEY_CONFIG_LAT: &str = "config_lat";
pub const KEY_CONFIG_LON: &str = "config_lon";
pub const KEY_CONFIG_RADIUS: &str = "config_radius";

const REDIS_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Erro Redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Interface get/set do store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Grava vários pares; backends podem fazer isso atomicamente.
    fn set_many(&self, pairs: &[(&str, String)]) -> Result<(), StoreError> {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Operações do engine sobre o store
// ──────────────────────────────────────────────

/// Publica posição, bateria, status e last-seen de uma leitura aceita.
pub fn publish_snapshot(store: &dyn KvStore, snapshot: &StateSnapshot) -> Result<(), StoreError> {
    store.set_many(&[
        (KEY_LAST_SEEN, snapshot.last_seen.to_string()),
        (KEY_CONN_STATUS, "ONLINE".to_string()),
        (KEY_LAT, snapshot.latitude.to_string()),
        (KEY_LON, snapshot.longitude.to_string()),
        (KEY_BATTERY, snapshot.battery_percent.to_string()),
        (KEY_STATUS, snapshot.status.as_str().to_string()),
    ])
}

/// Publica apenas o status (usado pelo watchdog).
pub fn publish_status(store: &dyn KvStore, status: DeviceStatus) -> Result<(), StoreError> {
    store.set(KEY_STATUS, status.as_str())
}

/// Lê a geofence do store. Campos ausentes ou inválidos usam `defaults`.
pub fn read_geofence(store: &dyn KvStore, defaults: &GeofenceConfig) -> Result<GeofenceConfig, StoreError> {
    let field = |key: &str, fallback: f64| -> Result<f64, StoreError> {
        let value = store
            .get(key)?
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        if value.is_none() {
            debug!("{key} ausente ou inválido no store, usando {fallback}");
        }
        Ok(value.unwrap_or(fallback))
    };

    Ok(GeofenceConfig {
        center_lat: field(KEY_CONFIG_LAT, defaults.center_lat)?,
        center_lon: field(KEY_CONFIG_LON, defaults.center_lon)?,
        radius_meters: field(KEY_CONFIG_RADIUS, defaults.radius_meters)?,
    })
}

// ──────────────────────────────────────────────
// Redis
// ──────────────────────────────────────────────

/// Backend Redis com uma conexão reaproveitada (reaberta após erro).
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        info!("Redis configurado");
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, StoreError> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let result = op(&mut conn);
        // Após erro a conexão é descartada e reaberta na próxima chamada
        if result.is_ok() {
            *guard = Some(conn);
        }
        Ok(result?)
    }

    fn connect(&self) -> Result<redis::Connection, StoreError> {
        let conn = self.client.get_connection_with_timeout(REDIS_TIMEOUT)?;
        conn.set_read_timeout(Some(REDIS_TIMEOUT))?;
        conn.set_write_timeout(Some(REDIS_TIMEOUT))?;
        debug!("Conexão Redis aberta");
        Ok(conn)
    }
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| conn.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.set(key, value))
    }

    fn set_many(&self, pairs: &[(&str, String)]) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in pairs {
            pipe.set(*key, value).ignore();
        }
        self.with_conn(|conn| pipe.query(conn))
    }
}

// ──────────────────────────────────────────────
// Memória
// ──────────────────────────────────────────────

/// Store local, usado quando não há Redis configurado.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
