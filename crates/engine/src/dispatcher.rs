//! Fan-out em segundo plano: notificações e persistência.
//!
//! O tracker só enfileira (`try_send`); nenhum I/O lento roda no loop de
//! ingestão nem atrasa o watchdog.
//!
//! - Alertas: pool fixo de workers (geocodificação + envio)
//! - Persistência: um único worker, preservando a ordem das escritas
//!   ("última leitura vence" no store do dashboard)

use crate::geocode::{address_or_placeholder, Geocoder};
use crate::history::HistoryStore;
use crate::notify::Notifier;
use crate::store::{self, KvStore};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use tracker_core::alerts::{format_alert, Alert};
use tracker_core::config::DispatcherConfig;
use tracker_core::types::{DeviceStatus, HistoryRecord, StateSnapshot};
use tracing::{debug, error, info, warn};

/// Escrita pendente no store/histórico.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    /// Estado completo após leitura aceita
    Snapshot(StateSnapshot),
    /// Apenas o status (transição do watchdog)
    Status(DeviceStatus),
    /// Nova linha de histórico
    History(HistoryRecord),
}

/// Lado produtor das filas. Clonável; os workers terminam quando todos os
/// clones são descartados.
#[derive(Clone)]
pub struct Dispatcher {
    alerts: Sender<Alert>,
    persist: Sender<PersistJob>,
}

impl Dispatcher {
    pub fn new(alerts: Sender<Alert>, persist: Sender<PersistJob>) -> Self {
        Self { alerts, persist }
    }

    /// Cria as filas e inicia os workers.
    pub fn spawn(
        config: &DispatcherConfig,
        notifier: Arc<dyn Notifier>,
        geocoder: Option<Arc<dyn Geocoder>>,
        store: Arc<dyn KvStore>,
        history: Option<Box<dyn HistoryStore>>,
    ) -> std::io::Result<Self> {
        let capacity = config.queue_capacity.max(1);
        let (alert_tx, alert_rx) = bounded::<Alert>(capacity);
        let (persist_tx, persist_rx) = bounded::<PersistJob>(capacity);

        for i in 0..config.notify_workers.max(1) {
            let rx = alert_rx.clone();
            let notifier = Arc::clone(&notifier);
            let geocoder = geocoder.clone();
            std::thread::Builder::new()
                .name(format!("notify-{i}"))
                .spawn(move || notify_worker(&rx, notifier.as_ref(), geocoder.as_deref()))?;
        }

        std::thread::Builder::new()
            .name("persist".into())
            .spawn(move || persist_worker(&persist_rx, store.as_ref(), history))?;

        info!(
            "Dispatcher: {} worker(s) de notificação, fila de {}",
            config.notify_workers.max(1),
            capacity
        );
        Ok(Self::new(alert_tx, persist_tx))
    }

    /// Enfileira um alerta. Fila cheia = alerta descartado (best-effort).
    pub fn notify(&self, alert: Alert) -> bool {
        match self.alerts.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!("Fila de alertas cheia, descartando alerta {:?}", alert.kind);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("Workers de notificação encerrados");
                false
            }
        }
    }

    /// Enfileira uma escrita. Fila cheia = escrita descartada.
    pub fn persist(&self, job: PersistJob) -> bool {
        match self.persist.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!("Fila de persistência cheia, descartando {job:?}");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("Worker de persistência encerrado");
                false
            }
        }
    }
}

// ──────────────────────────────────────────────
// Workers
// ──────────────────────────────────────────────

fn notify_worker(rx: &Receiver<Alert>, notifier: &dyn Notifier, geocoder: Option<&dyn Geocoder>) {
    for alert in rx.iter() {
        deliver_alert(&alert, notifier, geocoder);
    }
    debug!("Worker de notificação encerrado");
}

fn persist_worker(
    rx: &Receiver<PersistJob>,
    store: &dyn KvStore,
    mut history: Option<Box<dyn HistoryStore>>,
) {
    for job in rx.iter() {
        apply_persist(job, store, history.as_deref_mut());
    }
    debug!("Worker de persistência encerrado");
}

/// Resolve o endereço, formata e envia. Falhas são logadas e engolidas;
/// não há retry.
pub fn deliver_alert(alert: &Alert, notifier: &dyn Notifier, geocoder: Option<&dyn Geocoder>) -> bool {
    let address = match alert.location {
        Some(loc) => address_or_placeholder(geocoder, loc.latitude, loc.longitude),
        None => String::new(),
    };
    let text = format_alert(alert, &address);

    match notifier.send(&text) {
        Ok(()) => {
            info!("Alerta {:?} enviado via {}", alert.kind, notifier.name());
            true
        }
        Err(e) => {
            error!("Falha ao enviar alerta {:?} via {}: {e}", alert.kind, notifier.name());
            false
        }
    }
}

/// Executa uma escrita. Erros não interrompem o worker.
pub fn apply_persist(
    job: PersistJob,
    store: &dyn KvStore,
    history: Option<&mut (dyn HistoryStore + 'static)>,
) {
    match job {
        PersistJob::Snapshot(snapshot) => {
            if let Err(e) = store::publish_snapshot(store, &snapshot) {
                error!("Falha ao publicar estado: {e}");
            }
        }
        PersistJob::Status(status) => {
            if let Err(e) = store::publish_status(store, status) {
                error!("Falha ao publicar status {status}: {e}");
            }
        }
        PersistJob::History(record) => {
            let Some(history) = history else {
                debug!("Histórico desativado, registro ignorado");
                return;
            };
            if let Err(e) = history.append(&record) {
                error!("Falha ao gravar histórico: {e}");
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
