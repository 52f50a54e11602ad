//! Máquina de estados do dispositivo.
//!
//! Duas funções puras compartilham o mesmo [`DeviceState`]:
//! - [`evaluate`] – chamada a cada leitura aceita (geofence + SOS)
//! - [`check_offline`] – chamada a cada tick do watchdog
//!
//! Nenhuma delas faz I/O; quem chama aplica o novo estado e dispara
//! notificações/persistência.

use crate::geo::distance_meters;
use crate::types::{DeviceState, DeviceStatus, GeofenceConfig, ReadingKind, TelemetryReading};
use std::time::{Duration, SystemTime};

/// Margem de histerese em torno do raio (m). Faixa total = 2 × margem.
pub const HYSTERESIS_M: f64 = 50.0;

/// Silêncio após o qual o dispositivo é considerado OFFLINE.
pub const OFFLINE_AFTER: Duration = Duration::from_secs(600);

/// Período do watchdog.
pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(30);

/// Resultado de [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub state: DeviceState,
    pub previous: DeviceStatus,
    /// Status mudou em relação ao anterior
    pub transitioned: bool,
    /// Deve disparar alerta (SOS sempre, DANGER só na borda)
    pub should_alert: bool,
    /// Distância ao centro; `None` para SOS
    pub distance_m: Option<f64>,
}

/// Avalia uma leitura contra a geofence e o estado atual.
pub fn evaluate(
    reading: &TelemetryReading,
    config: &GeofenceConfig,
    current: &DeviceState,
) -> Evaluation {
    let previous = current.status;

    let (status, distance_m) = match reading.kind {
        ReadingKind::Sos => (DeviceStatus::Sos, None),
        ReadingKind::Normal => {
            let d = distance_meters(
                reading.latitude,
                reading.longitude,
                config.center_lat,
                config.center_lon,
            );
            let status = if d > config.radius_meters + HYSTERESIS_M {
                DeviceStatus::Danger
            } else if d < config.radius_meters - HYSTERESIS_M {
                DeviceStatus::Safe
            } else {
                // Faixa de histerese: mantém o último status vindo de leitura
                current.last_fix_status
            };
            (status, Some(d))
        }
    };

    // SOS alerta por leitura SOS; leitura normal na faixa não realerta
    let should_alert = match (reading.kind, status) {
        (ReadingKind::Sos, _) => true,
        (ReadingKind::Normal, DeviceStatus::Danger) => previous != DeviceStatus::Danger,
        _ => false,
    };

    let state = DeviceState {
        status,
        last_seen_at: Some(reading.received_at),
        offline_alert_sent: false,
        last_fix_status: status,
    };

    Evaluation {
        state,
        previous,
        transitioned: status != previous,
        should_alert,
        distance_m,
    }
}

/// Resultado de [`check_offline`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineCheck {
    pub state: DeviceState,
    /// Status passou a OFFLINE neste tick
    pub went_offline: bool,
    /// Enviar o (único) alerta de offline
    pub send_alert: bool,
    /// Tempo desde a última leitura; `None` se nunca visto
    pub silence: Option<Duration>,
}

/// Tick do watchdog: declara OFFLINE após [`OFFLINE_AFTER`] de silêncio.
pub fn check_offline(current: &DeviceState, now: SystemTime) -> OfflineCheck {
    let mut state = *current;
    let mut went_offline = false;
    let mut send_alert = false;

    let Some(last_seen) = current.last_seen_at else {
        return OfflineCheck {
            state,
            went_offline,
            send_alert,
            silence: None,
        };
    };

    // Relógio andou para trás: trata como leitura recente
    let silence = now.duration_since(last_seen).unwrap_or(Duration::ZERO);

    if silence > OFFLINE_AFTER {
        if state.status != DeviceStatus::Offline {
            state.status = DeviceStatus::Offline;
            went_offline = true;
            if !state.offline_alert_sent {
                state.offline_alert_sent = true;
                send_alert = true;
            }
        }
    } else {
        state.offline_alert_sent = false;
    }

    OfflineCheck {
        state,
        went_offline,
        send_alert,
        silence: Some(silence),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    const T0: u64 = 1_700_000_000;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn fence() -> GeofenceConfig {
        GeofenceConfig {
            center_lat: 18.67625,
            center_lon: 105.66854,
            radius_meters: 1000.0,
        }
    }

    fn reading(kind: ReadingKind, lat: f64, lon: f64, secs: u64) -> TelemetryReading {
        TelemetryReading {
            latitude: lat,
            longitude: lon,
            battery_percent: 80,
            kind,
            received_at: at(secs),
        }
    }

    fn normal(lat: f64, lon: f64) -> TelemetryReading {
        reading(ReadingKind::Normal, lat, lon, T0)
    }

    fn with_status(status: DeviceStatus) -> DeviceState {
        DeviceState {
            status,
            last_seen_at: Some(at(T0 - 10)),
            offline_alert_sent: false,
            last_fix_status: status,
        }
    }

    /// Ponto ao norte do centro a `meters` de distância.
    fn north_of_center(meters: f64) -> (f64, f64) {
        let fence = fence();
        let dlat = (meters / EARTH_RADIUS).to_degrees();
        (fence.center_lat + dlat, fence.center_lon)
    }

    const EARTH_RADIUS: f64 = crate::geo::EARTH_RADIUS_M;

    #[test]
    fn inside_inner_ring_is_safe_from_any_status() {
        let (lat, lon) = north_of_center(900.0);
        for prior in [
            DeviceStatus::Unknown,
            DeviceStatus::Safe,
            DeviceStatus::Danger,
            DeviceStatus::Sos,
            DeviceStatus::Offline,
        ] {
            let eval = evaluate(&normal(lat, lon), &fence(), &with_status(prior));
            assert_eq!(eval.state.status, DeviceStatus::Safe, "prior {prior}");
            assert!(!eval.should_alert);
        }
    }

    #[test]
    fn outside_outer_ring_is_danger_from_any_status() {
        let (lat, lon) = north_of_center(1100.0);
        for prior in [
            DeviceStatus::Unknown,
            DeviceStatus::Safe,
            DeviceStatus::Sos,
            DeviceStatus::Offline,
        ] {
            let eval = evaluate(&normal(lat, lon), &fence(), &with_status(prior));
            assert_eq!(eval.state.status, DeviceStatus::Danger, "prior {prior}");
            assert!(eval.should_alert);
            assert!(eval.transitioned);
        }
    }

    #[test]
    fn hysteresis_band_keeps_prior_status() {
        for meters in [960.0, 1000.0, 1040.0] {
            let (lat, lon) = north_of_center(meters);
            for prior in [DeviceStatus::Safe, DeviceStatus::Danger, DeviceStatus::Unknown] {
                let eval = evaluate(&normal(lat, lon), &fence(), &with_status(prior));
                assert_eq!(eval.state.status, prior, "{meters} m, prior {prior}");
                assert!(!eval.transitioned);
                assert!(!eval.should_alert);
            }
        }
    }

    #[test]
    fn band_reading_after_sos_keeps_sos_without_alert() {
        let (lat, lon) = north_of_center(1000.0);
        let first = evaluate(&normal(lat, lon), &fence(), &with_status(DeviceStatus::Sos));
        assert_eq!(first.state.status, DeviceStatus::Sos);
        assert!(!first.transitioned);
        assert!(!first.should_alert);

        let second = evaluate(&normal(lat, lon), &fence(), &first.state);
        assert_eq!(second.state.status, DeviceStatus::Sos);
        assert!(!second.should_alert);
    }

    #[test]
    fn band_after_offline_restores_last_fix_status() {
        let (lat, lon) = north_of_center(1000.0);
        let current = DeviceState {
            status: DeviceStatus::Offline,
            last_seen_at: Some(at(T0 - 700)),
            offline_alert_sent: true,
            last_fix_status: DeviceStatus::Safe,
        };
        let eval = evaluate(&normal(lat, lon), &fence(), &current);
        assert_eq!(eval.state.status, DeviceStatus::Safe);
        assert!(!eval.state.offline_alert_sent);
        assert!(eval.transitioned);
    }

    #[test]
    fn danger_alert_is_edge_triggered() {
        let first = evaluate(&normal(18.690, 105.690), &fence(), &with_status(DeviceStatus::Safe));
        assert_eq!(first.state.status, DeviceStatus::Danger);
        assert!(first.should_alert);

        let second = evaluate(&normal(18.690, 105.690), &fence(), &first.state);
        assert_eq!(second.state.status, DeviceStatus::Danger);
        assert!(!second.should_alert);
        assert!(!second.transitioned);
    }

    #[test]
    fn sos_always_alerts() {
        let sos = reading(ReadingKind::Sos, 18.690, 105.690, T0);

        let from_danger = evaluate(&sos, &fence(), &with_status(DeviceStatus::Danger));
        assert_eq!(from_danger.state.status, DeviceStatus::Sos);
        assert!(from_danger.should_alert);
        assert_eq!(from_danger.distance_m, None);

        let repeated = evaluate(&sos, &fence(), &from_danger.state);
        assert_eq!(repeated.state.status, DeviceStatus::Sos);
        assert!(repeated.should_alert);
    }

    #[test]
    fn sos_is_overwritten_by_next_normal_reading() {
        let sos_state = with_status(DeviceStatus::Sos);
        let eval = evaluate(&normal(18.677, 105.669), &fence(), &sos_state);
        assert_eq!(eval.state.status, DeviceStatus::Safe);
    }

    #[test]
    fn reading_refreshes_last_seen_and_clears_guard() {
        let current = DeviceState {
            status: DeviceStatus::Offline,
            last_seen_at: Some(at(T0 - 900)),
            offline_alert_sent: true,
            last_fix_status: DeviceStatus::Danger,
        };
        let r = reading(ReadingKind::Normal, 18.690, 105.690, T0 + 5);
        let eval = evaluate(&r, &fence(), &current);
        assert_eq!(eval.state.last_seen_at, Some(at(T0 + 5)));
        assert!(!eval.state.offline_alert_sent);
        // Voltou de OFFLINE para fora da cerca: DANGER recalculado e alertado
        assert_eq!(eval.state.status, DeviceStatus::Danger);
        assert!(eval.should_alert);
    }

    #[test]
    fn scenario_safe_then_danger_then_sos() {
        let state = DeviceState::default();

        let safe = evaluate(&normal(18.677, 105.669), &fence(), &state);
        assert_eq!(safe.state.status, DeviceStatus::Safe);
        assert!(!safe.should_alert);

        let danger = evaluate(&normal(18.690, 105.690), &fence(), &safe.state);
        assert_eq!(danger.state.status, DeviceStatus::Danger);
        assert!(danger.should_alert);
        assert!(danger.distance_m.unwrap() > 1050.0);

        let again = evaluate(&normal(18.690, 105.690), &fence(), &danger.state);
        assert!(!again.should_alert);

        let sos = evaluate(&reading(ReadingKind::Sos, 18.690, 105.690, T0), &fence(), &again.state);
        assert_eq!(sos.state.status, DeviceStatus::Sos);
        assert!(sos.should_alert);
    }

    // ── Watchdog ──

    fn seen_at(secs: u64, status: DeviceStatus) -> DeviceState {
        DeviceState {
            status,
            last_seen_at: Some(at(secs)),
            offline_alert_sent: false,
            last_fix_status: status,
        }
    }

    #[test]
    fn never_seen_stays_unknown() {
        let check = check_offline(&DeviceState::default(), at(T0));
        assert_eq!(check.state.status, DeviceStatus::Unknown);
        assert!(!check.went_offline);
        assert!(!check.send_alert);
        assert_eq!(check.silence, None);
    }

    #[test]
    fn under_threshold_leaves_status() {
        let state = seen_at(T0, DeviceStatus::Danger);
        let check = check_offline(&state, at(T0 + 599));
        assert_eq!(check.state.status, DeviceStatus::Danger);
        assert!(!check.send_alert);

        let exact = check_offline(&state, at(T0 + 600));
        assert_eq!(exact.state.status, DeviceStatus::Danger);
    }

    #[test]
    fn offline_alert_sent_exactly_once() {
        let state = seen_at(T0, DeviceStatus::Safe);

        let first = check_offline(&state, at(T0 + 601));
        assert_eq!(first.state.status, DeviceStatus::Offline);
        assert!(first.went_offline);
        assert!(first.send_alert);
        assert!(first.state.offline_alert_sent);
        assert_eq!(first.state.last_fix_status, DeviceStatus::Safe);

        let mut current = first.state;
        for tick in 1..10 {
            let check = check_offline(&current, at(T0 + 601 + tick * 30));
            assert_eq!(check.state.status, DeviceStatus::Offline);
            assert!(!check.send_alert);
            assert!(!check.went_offline);
            current = check.state;
        }
    }

    #[test]
    fn fresh_reading_rearms_offline_alert() {
        let offline = check_offline(&seen_at(T0, DeviceStatus::Safe), at(T0 + 601)).state;

        let r = reading(ReadingKind::Normal, 18.677, 105.669, T0 + 700);
        let back = evaluate(&r, &fence(), &offline).state;
        assert_eq!(back.status, DeviceStatus::Safe);
        assert!(!back.offline_alert_sent);

        let quiet = check_offline(&back, at(T0 + 710));
        assert_eq!(quiet.state.status, DeviceStatus::Safe);

        let again = check_offline(&back, at(T0 + 700 + 601));
        assert!(again.send_alert);
    }

    #[test]
    fn clock_going_backwards_is_not_silence() {
        let state = seen_at(T0, DeviceStatus::Safe);
        let check = check_offline(&state, at(T0 - 1000));
        assert_eq!(check.silence, Some(Duration::ZERO));
        assert_eq!(check.state.status, DeviceStatus::Safe);
    }
}
