//! Histórico durável de leituras (SQLite).
//!
//! Append-only; consultas em ordem decrescente (lista) e crescente
//! (playback no mapa).

use rusqlite::{params, Connection};
use std::path::Path;
use tracker_core::types::{DeviceStatus, HistoryRecord};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Erro SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Status desconhecido no histórico: {0:?}")]
    UnknownStatus(String),
}

/// Interface append/query do histórico.
pub trait HistoryStore: Send {
    fn append(&mut self, record: &HistoryRecord) -> Result<(), HistoryError>;

    /// Registros mais recentes primeiro; `limit = None` retorna todos.
    fn recent(&self, limit: Option<usize>) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Todos os registros do mais antigo ao mais recente.
    fn playback(&self) -> Result<Vec<HistoryRecord>, HistoryError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gps_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude    REAL    NOT NULL,
    longitude   REAL    NOT NULL,
    battery     INTEGER NOT NULL,
    status      TEXT    NOT NULL,
    created_at  REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_gps_history_created_at ON gps_history (created_at);
";

pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        info!("Histórico SQLite em {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn query(&self, sql: &str, limit: i64) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (latitude, longitude, battery, status, timestamp) = row?;
            let status =
                DeviceStatus::parse(&status).ok_or(HistoryError::UnknownStatus(status))?;
            records.push(HistoryRecord {
                latitude,
                longitude,
                battery_percent: battery.clamp(0, u8::MAX as i64) as u8,
                status,
                timestamp,
            });
        }
        Ok(records)
    }
}

impl HistoryStore for SqliteHistory {
    fn append(&mut self, record: &HistoryRecord) -> Result<(), HistoryError> {
        self.conn.execute(
            "INSERT INTO gps_history (latitude, longitude, battery, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.latitude,
                record.longitude,
                record.battery_percent,
                record.status.as_str(),
                record.timestamp,
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: Option<usize>) -> Result<Vec<HistoryRecord>, HistoryError> {
        // LIMIT -1 = sem limite no SQLite
        let limit = limit.map_or(-1, |n| n.min(i64::MAX as usize) as i64);
        self.query(
            "SELECT latitude, longitude, battery, status, created_at
             FROM gps_history ORDER BY created_at DESC, id DESC LIMIT ?1",
            limit,
        )
    }

    fn playback(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.query(
            "SELECT latitude, longitude, battery, status, created_at
             FROM gps_history ORDER BY created_at ASC, id ASC LIMIT ?1",
            -1,
        )
    }
}
