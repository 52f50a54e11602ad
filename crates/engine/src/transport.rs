//! Thread de transporte MQTT que entrega frames brutos ao tracker via channel.
//!
//! Reconexão: a cada erro de conexão espera o próximo passo do
//! [`Backoff`] (1 s … 15 s) antes de deixar o rumqttc tentar de novo.
//! O tópico é reassinado a cada ConnAck. Nada é bufferizado durante a
//! queda; o silêncio simplesmente aparece para o watchdog.

use crossbeam_channel::{after, bounded, select, Receiver, Sender, TrySendError};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracker_core::backoff::Backoff;
use tracker_core::config::MqttConfig;
use tracing::{debug, error, info, warn};

/// Capacidade da fila transporte → tracker.
const FRAME_QUEUE: usize = 64;

/// Capacidade da fila de requisições do cliente rumqttc.
const REQUEST_QUEUE: usize = 10;

/// Frame recebido do broker, ainda não decodificado.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: SystemTime,
}

/// Controle da thread de transporte.
pub struct TransportHandle {
    client: Client,
    running: Arc<AtomicBool>,
    /// Interrompe a espera do backoff
    stop: Sender<()>,
}

impl TransportHandle {
    /// Desconecta do broker. Não espera a thread terminar.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop.try_send(());
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect MQTT: {e}");
        }
    }
}

/// Inicia a thread de transporte. Retorna o handle e o receiver de frames.
pub fn spawn_transport_thread(
    config: &MqttConfig,
) -> std::io::Result<(TransportHandle, Receiver<InboundFrame>)> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

    let (client, connection) = Client::new(options, REQUEST_QUEUE);
    let (tx, rx) = bounded::<InboundFrame>(FRAME_QUEUE);
    let running = Arc::new(AtomicBool::new(true));
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let topic = config.topic.clone();
    let loop_client = client.clone();
    let loop_running = Arc::clone(&running);
    info!("Conectando em {}:{} (tópico {topic})", config.host, config.port);

    std::thread::Builder::new()
        .name("mqtt-transport".into())
        .spawn(move || transport_loop(connection, loop_client, &topic, &tx, &loop_running, &stop_rx))?;

    Ok((
        TransportHandle {
            client,
            running,
            stop: stop_tx,
        },
        rx,
    ))
}

fn transport_loop(
    mut connection: Connection,
    mut client: Client,
    topic: &str,
    tx: &Sender<InboundFrame>,
    running: &AtomicBool,
    stop: &Receiver<()>,
) {
    let mut backoff = Backoff::default();

    for event in connection.iter() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let frame = InboundFrame {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                    received_at: SystemTime::now(),
                };
                if !forward_frame(tx, frame) {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT conectado");
                backoff.reset();
                // Reassina a cada (re)conexão: a sessão pode ter sido perdida
                match client.try_subscribe(topic, QoS::AtLeastOnce) {
                    Ok(()) => info!("Assinado {topic}"),
                    Err(e) => error!("Falha ao assinar {topic}: {e}"),
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker encerrou a conexão");
            }
            Ok(_) => {}
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let delay = backoff.next_delay();
                warn!("Conexão MQTT perdida: {e}. Reconectando em {}s...", delay.as_secs());
                if !wait_or_stop(stop, delay) {
                    break;
                }
            }
        }
    }

    info!("Thread de transporte encerrada");
}

/// Espera `delay` antes de reconectar. Retorna `false` se o shutdown
/// chegou durante a espera.
fn wait_or_stop(stop: &Receiver<()>, delay: Duration) -> bool {
    select! {
        recv(stop) -> _ => false,
        recv(after(delay)) -> _ => true,
    }
}

/// Entrega o frame ao tracker sem bloquear. Retorna `false` se o tracker
/// não existe mais.
fn forward_frame(tx: &Sender<InboundFrame>, frame: InboundFrame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            // Tracker atrasado: descarta o frame mais novo
            warn!("Fila de frames cheia, descartando frame de {}", frame.topic);
            true
        }
        Err(TrySendError::Disconnected(_)) => {
            debug!("Tracker encerrado, parando transporte");
            false
        }
    }
}
