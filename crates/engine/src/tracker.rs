//! Dono único do [`DeviceState`].
//!
//! Frames do transporte e ticks do watchdog chegam no mesmo `select!`,
//! então ingestão e watchdog nunca rodam ao mesmo tempo e o estado não
//! precisa de lock. Todo I/O lento vai para o [`Dispatcher`].

use crate::dispatcher::{Dispatcher, PersistJob};
use crate::store::{self, KvStore};
use crate::transport::InboundFrame;
use crossbeam_channel::{select, tick, Receiver};
use std::sync::Arc;
use std::time::SystemTime;
use tracker_core::alerts::{Alert, AlertKind, AlertLocation};
use tracker_core::engine::{check_offline, evaluate, WATCHDOG_PERIOD};
use tracker_core::protocol::parse_frame;
use tracker_core::types::{
    epoch_secs, DeviceState, DeviceStatus, GeofenceConfig, HistoryRecord, ReadingKind, StateSnapshot,
};
use tracing::{debug, info, warn};

pub struct Tracker {
    state: DeviceState,
    store: Arc<dyn KvStore>,
    /// Geofence do config.toml, usada campo a campo quando o store não tem valor
    fence_defaults: GeofenceConfig,
    /// Última geofence lida com sucesso (fallback se o store falhar)
    last_fence: GeofenceConfig,
    dispatcher: Dispatcher,
}

impl Tracker {
    pub fn new(store: Arc<dyn KvStore>, fence_defaults: GeofenceConfig, dispatcher: Dispatcher) -> Self {
        Self {
            state: DeviceState::default(),
            store,
            fence_defaults,
            last_fence: fence_defaults,
            dispatcher,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Loop principal. Termina quando `shutdown` recebe (ou é descartado)
    /// ou quando o transporte fecha o canal de frames.
    pub fn run(mut self, frames: Receiver<InboundFrame>, shutdown: Receiver<()>) {
        let ticker = tick(WATCHDOG_PERIOD);
        info!("Tracker ativo (watchdog a cada {}s)", WATCHDOG_PERIOD.as_secs());

        loop {
            select! {
                recv(frames) -> msg => match msg {
                    Ok(frame) => self.handle_frame(&frame),
                    Err(_) => {
                        warn!("Canal de frames fechado");
                        break;
                    }
                },
                recv(ticker) -> _ => self.on_tick(SystemTime::now()),
                recv(shutdown) -> _ => break,
            }
        }

        info!("Tracker encerrado (status final {})", self.state().status);
    }

    /// Processa um frame: parse, avaliação, commit e enfileiramento.
    /// Frame inválido é logado e descartado sem tocar no estado.
    pub fn handle_frame(&mut self, frame: &InboundFrame) {
        let reading = match parse_frame(&frame.payload, frame.received_at) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(
                    "Frame inválido descartado ({e}): {:?}",
                    String::from_utf8_lossy(&frame.payload)
                );
                return;
            }
        };

        let fence = self.geofence();
        let eval = evaluate(&reading, &fence, &self.state);
        self.state = eval.state;

        let status = eval.state.status;
        match eval.distance_m {
            Some(d) if eval.transitioned => {
                info!("{} → {status} | {d:.1} m | Bateria {}%", eval.previous, reading.battery_percent)
            }
            Some(d) => debug!("[{status}] {d:.1} m | Bateria {}%", reading.battery_percent),
            None => warn!("SOS acionado | Bateria {}%", reading.battery_percent),
        }

        self.dispatcher.persist(PersistJob::Snapshot(StateSnapshot {
            latitude: reading.latitude,
            longitude: reading.longitude,
            battery_percent: reading.battery_percent,
            status,
            last_seen: epoch_secs(reading.received_at),
        }));
        self.dispatcher
            .persist(PersistJob::History(HistoryRecord::from_reading(&reading, status)));

        if eval.should_alert {
            let kind = match reading.kind {
                ReadingKind::Sos => AlertKind::Sos,
                ReadingKind::Normal => AlertKind::Danger,
            };
            self.dispatcher.notify(Alert {
                kind,
                location: Some(AlertLocation {
                    latitude: reading.latitude,
                    longitude: reading.longitude,
                    battery_percent: reading.battery_percent,
                }),
            });
        }
    }

    /// Tick do watchdog.
    pub fn on_tick(&mut self, now: SystemTime) {
        let check = check_offline(&self.state, now);
        self.state = check.state;

        if check.went_offline {
            let silence = check.silence.map_or(0, |s| s.as_secs());
            warn!("Dispositivo OFFLINE (sem dados há {silence}s)");
            self.dispatcher.persist(PersistJob::Status(DeviceStatus::Offline));
        }
        if check.send_alert {
            self.dispatcher.notify(Alert::offline());
        }
    }

    /// Snapshot da geofence para uma leitura.
    fn geofence(&mut self) -> GeofenceConfig {
        match store::read_geofence(self.store.as_ref(), &self.fence_defaults) {
            Ok(fence) => {
                self.last_fence = fence;
                fence
            }
            Err(e) => {
                warn!("Falha ao ler geofence do store ({e}), usando a última conhecida");
                self.last_fence
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
