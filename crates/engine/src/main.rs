//! # SOS Tracker Engine
//!
//! Recebe telemetria do rastreador via MQTT, mantém o status derivado
//! (SAFE / DANGER / SOS / OFFLINE), publica o estado para o dashboard,
//! grava o histórico e envia alertas.
//!
//! ## Uso
//! ```bash
//! tracker_engine                # Engine
//! tracker_engine history [N]    # Últimos N registros (JSON, mais recentes primeiro)
//! tracker_engine playback       # Histórico completo em ordem cronológica
//! ```

mod dispatcher;
mod geocode;
mod history;
mod notify;
mod store;
mod tracker;
mod transport;

use dispatcher::Dispatcher;
use geocode::{Geocoder, NominatimGeocoder};
use history::{HistoryStore, SqliteHistory};
use notify::{build_notifier, Notifier};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use store::{KvStore, MemoryStore, RedisStore};
use tracker::Tracker;
use tracker_core::config::AppConfig;
use tracker_core::engine::{OFFLINE_AFTER, WATCHDOG_PERIOD};
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn Error>> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        return Err(format!("{} erro(s) em {}", errors.len(), config_path.display()).into());
    }

    // ── Subcomandos de consulta ──
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("history") => {
            let limit = args.get(1).and_then(|n| n.parse().ok());
            return print_history(&config, |h| h.recent(limit));
        }
        Some("playback") => return print_history(&config, |h| h.playback()),
        Some(other) => return Err(format!("Comando desconhecido: {other}").into()),
        None => {}
    }

    run_engine(&config)
}

fn run_engine(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    // ── Backends ──
    let store: Arc<dyn KvStore> = if config.store.redis_url.is_empty() {
        warn!("redis_url vazio: estado publicado apenas em memória");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::open(&config.store.redis_url)?)
    };

    let history: Option<Box<dyn HistoryStore>> = if config.history.enabled {
        Some(Box::new(SqliteHistory::open(Path::new(&config.history.sqlite_path))?))
    } else {
        info!("Histórico desativado");
        None
    };

    let notifier: Arc<dyn Notifier> = Arc::from(build_notifier(&config.notify)?);

    let geocoder: Option<Arc<dyn Geocoder>> = if config.geocoder.enabled {
        Some(Arc::new(NominatimGeocoder::new(&config.geocoder)?))
    } else {
        None
    };

    let notifier_name = notifier.name();
    let dispatcher = Dispatcher::spawn(
        &config.dispatcher,
        notifier,
        geocoder,
        Arc::clone(&store),
        history,
    )?;

    // ── Transporte + tracker ──
    let (mut transport, frames) = transport::spawn_transport_thread(&config.mqtt)?;
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

    let tracker = Tracker::new(store, config.geofence, dispatcher);
    let tracker_thread = std::thread::Builder::new()
        .name("tracker".into())
        .spawn(move || tracker.run(frames, shutdown_rx))?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🛰  SOS TRACKER ENGINE – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Broker:    {}:{}", config.mqtt.host, config.mqtt.port);
    println!("  Tópico:    {}", config.mqtt.topic);
    println!(
        "  Store:     {}",
        if config.store.redis_url.is_empty() { "memória" } else { "redis" }
    );
    println!(
        "  Histórico: {}",
        if config.history.enabled { config.history.sqlite_path.as_str() } else { "desativado" }
    );
    println!("  Alertas:   {notifier_name}");
    println!(
        "  Watchdog:  {}s (offline após {}s)",
        WATCHDOG_PERIOD.as_secs(),
        OFFLINE_AFTER.as_secs()
    );
    println!("══════════════════════════════════════════════");
    println!();

    // ── Aguarda Ctrl-C ──
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())?;

    // ── Encerramento: tarefas pendentes em segundo plano são abandonadas ──
    warn!("Encerrando...");
    let _ = shutdown_tx.send(());
    transport.shutdown();
    if tracker_thread.join().is_err() {
        error!("Thread do tracker terminou com pânico");
    }
    info!("Engine encerrado");
    Ok(())
}

/// Imprime o histórico como JSON, um registro por linha.
fn print_history(
    config: &AppConfig,
    query: impl FnOnce(&SqliteHistory) -> Result<Vec<tracker_core::HistoryRecord>, history::HistoryError>,
) -> Result<(), Box<dyn Error>> {
    let history = SqliteHistory::open(Path::new(&config.history.sqlite_path))?;
    for record in query(&history)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
