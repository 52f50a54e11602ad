//! Protocolo texto do dispositivo.
//!
//! Formato do frame (UTF-8, campos separados por `|`):
//!
//! ```text
//! ┌──────┬─────┬─────┬──────────────┐
//! │ TYPE │ LAT │ LON │ BATTERY_<n>% │
//! └──────┴─────┴─────┴──────────────┘
//! ```
//!
//! - `TYPE` = `SOS` dispara emergência; qualquer outro valor é leitura normal
//! - Campos extras após o quarto são ignorados

use crate::types::{ReadingKind, TelemetryReading};
use std::time::SystemTime;

/// Separador de campos.
pub const FIELD_SEPARATOR: char = '|';

/// Prefixo do campo de bateria.
pub const BATTERY_PREFIX: &str = "BATTERY_";

/// Sufixo do campo de bateria.
pub const BATTERY_SUFFIX: &str = "%";

/// Número mínimo de campos.
const MIN_FIELDS: usize = 4;

/// Frame rejeitado pelo parser.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error("Frame não é UTF-8 válido")]
    NotUtf8,

    #[error("Frame com {0} campos (mínimo {MIN_FIELDS})")]
    TooFewFields(usize),

    #[error("Latitude inválida: {0:?}")]
    InvalidLatitude(String),

    #[error("Longitude inválida: {0:?}")]
    InvalidLongitude(String),

    #[error("Bateria inválida: {0:?}")]
    InvalidBattery(String),
}

/// Decodifica um frame bruto em [`TelemetryReading`].
///
/// Nunca entra em pânico: qualquer problema vira [`ProtocolError`] e o
/// chamador decide (loga e descarta).
pub fn parse_frame(raw: &[u8], received_at: SystemTime) -> Result<TelemetryReading, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::NotUtf8)?;
    let fields: Vec<&str> = text.trim().split(FIELD_SEPARATOR).map(str::trim).collect();

    if fields.len() < MIN_FIELDS {
        return Err(ProtocolError::TooFewFields(fields.len()));
    }

    let kind = if fields[0] == "SOS" {
        ReadingKind::Sos
    } else {
        ReadingKind::Normal
    };

    let latitude = parse_coordinate(fields[1], 90.0)
        .ok_or_else(|| ProtocolError::InvalidLatitude(fields[1].into()))?;
    let longitude = parse_coordinate(fields[2], 180.0)
        .ok_or_else(|| ProtocolError::InvalidLongitude(fields[2].into()))?;
    let battery_percent = parse_battery(fields[3])
        .ok_or_else(|| ProtocolError::InvalidBattery(fields[3].into()))?;

    Ok(TelemetryReading {
        latitude,
        longitude,
        battery_percent,
        kind,
        received_at,
    })
}

fn parse_coordinate(field: &str, limit: f64) -> Option<f64> {
    let value: f64 = field.parse().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

/// `"BATTERY_87%"` → `87`. Prefixo e sufixo são opcionais; valores fora
/// de 0..=100 são saturados.
fn parse_battery(field: &str) -> Option<u8> {
    let digits = field.strip_prefix(BATTERY_PREFIX).unwrap_or(field);
    let digits = digits.strip_suffix(BATTERY_SUFFIX).unwrap_or(digits);
    let value: i64 = digits.trim().parse().ok()?;
    u8::try_from(value.clamp(0, 100)).ok()
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn at() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_000)
    }

    #[test]
    fn parses_normal_frame() {
        let reading = parse_frame(b"NORMAL|18.6763|105.6685|BATTERY_87%", at()).unwrap();
        assert_eq!(reading.kind, ReadingKind::Normal);
        assert_eq!(reading.latitude, 18.6763);
        assert_eq!(reading.longitude, 105.6685);
        assert_eq!(reading.battery_percent, 87);
        assert_eq!(reading.received_at, at());
    }

    #[test]
    fn parses_sos_frame() {
        let reading = parse_frame(b"SOS|18.6763|105.6685|BATTERY_54%", at()).unwrap();
        assert_eq!(reading.kind, ReadingKind::Sos);
        assert_eq!(reading.battery_percent, 54);
    }

    #[test]
    fn unknown_type_is_normal() {
        let reading = parse_frame(b"PING|1.0|2.0|BATTERY_5%", at()).unwrap();
        assert_eq!(reading.kind, ReadingKind::Normal);
    }

    #[test]
    fn tolerates_whitespace_and_trailing_fields() {
        let reading = parse_frame(b" SOS | 18.5 | 105.5 | BATTERY_ 9 % \n", at()).unwrap();
        assert_eq!(reading.kind, ReadingKind::Sos);
        assert_eq!(reading.battery_percent, 9);

        let reading = parse_frame(b"SOS|18.5|105.5|BATTERY_9%|extra", at()).unwrap();
        assert_eq!(reading.kind, ReadingKind::Sos);
        assert_eq!(reading.battery_percent, 9);
    }

    #[test]
    fn rejects_non_numeric_latitude() {
        assert_eq!(
            parse_frame(b"NORMAL|notanumber|105.6|BATTERY_50%", at()),
            Err(ProtocolError::InvalidLatitude("notanumber".into()))
        );
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(matches!(
            parse_frame(b"NORMAL|91.0|105.6|BATTERY_50%", at()),
            Err(ProtocolError::InvalidLatitude(_))
        ));
        assert!(matches!(
            parse_frame(b"NORMAL|18.0|NaN|BATTERY_50%", at()),
            Err(ProtocolError::InvalidLongitude(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_battery() {
        assert!(matches!(
            parse_frame(b"NORMAL|18.0|105.6|BATTERY_full%", at()),
            Err(ProtocolError::InvalidBattery(_))
        ));
    }

    #[test]
    fn out_of_range_battery_is_clamped() {
        let reading = parse_frame(b"NORMAL|18.6|105.6|BATTERY_300%", at()).unwrap();
        assert_eq!(reading.battery_percent, 100);
        assert_eq!(reading.latitude, 18.6);

        let reading = parse_frame(b"NORMAL|18.6|105.6|BATTERY_-4%", at()).unwrap();
        assert_eq!(reading.battery_percent, 0);
    }

    #[test]
    fn rejects_short_frame() {
        assert_eq!(
            parse_frame(b"NORMAL|18.0|105.6", at()),
            Err(ProtocolError::TooFewFields(3))
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(parse_frame(&[0xFF, 0xFE, b'|'], at()), Err(ProtocolError::NotUtf8));
    }
}
