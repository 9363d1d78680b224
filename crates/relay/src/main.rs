use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use rumqttc::QoS;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use haptic_core::{parse_presence_topic, presence_wildcard};
use haptic_mqtt::{shutdown_signal, MqttConfig, MqttEvent, MqttService};
use haptic_relay::{
    status_channel, ConnectionStatus, MqttPeerLink, PeerRegistry, Relay, RelayConfig, RelayStatus, SocketEvent,
    SocketManager, SocketTransport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let relay_cfg = RelayConfig::from_env();
    let mqtt_cfg = MqttConfig::from_env();
    info!(host = %mqtt_cfg.host, port = mqtt_cfg.port, tls = mqtt_cfg.use_tls, "Configuring MQTT client");
    let mqtt = MqttService::connect(mqtt_cfg)
        .await
        .context("Failed to initialize MQTT")?;

    // Receivers exist before any subscription so no early message is missed
    let mqtt_events = mqtt.events();
    let socket = SocketManager::new();
    let socket_events = socket.events();

    for topic in [&relay_cfg.vibration_topic, &relay_cfg.direction_topic, &relay_cfg.command_topic] {
        if let Err(e) = mqtt.subscribe(topic, QoS::AtMostOnce).await {
            warn!(?e, %topic, "Failed to subscribe");
        }
    }
    let presence = presence_wildcard(&relay_cfg.peer_root);
    if let Err(e) = mqtt.subscribe(&presence, QoS::AtLeastOnce).await {
        warn!(?e, topic = %presence, "Failed to subscribe to peer presence");
    }

    let (status_tx, status_rx) = status_channel();
    let registry = PeerRegistry::default();
    let link = Arc::new(MqttPeerLink::new(mqtt.clone(), relay_cfg.peer_root.clone(), registry.clone()));
    let relay = Arc::new(Relay::new(
        relay_cfg.topics(),
        link,
        Arc::new(socket.clone()),
        status_tx.clone(),
        relay_cfg.socket_url.clone(),
    ));

    tokio::spawn(mqtt_consumer_loop(
        mqtt_events,
        relay.clone(),
        registry,
        relay_cfg.peer_root.clone(),
        status_tx.clone(),
    ));
    tokio::spawn(socket_consumer_loop(socket_events, relay.clone(), status_tx.clone()));
    tokio::spawn(status_reporter(status_rx));

    if let Some(url) = &relay_cfg.socket_url {
        socket.open(url).await;
    }

    shutdown_signal().await;
    info!("Shutting down relay");
    socket.close().await;
    if let Err(e) = mqtt.disconnect().await {
        warn!(?e, "MQTT disconnect failed");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rumqttc=warn,tungstenite=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn mqtt_consumer_loop(
    mut rx: broadcast::Receiver<MqttEvent>,
    relay: Arc<Relay>,
    registry: PeerRegistry,
    peer_root: String,
    status: watch::Sender<RelayStatus>,
) {
    loop {
        match rx.recv().await {
            Ok(MqttEvent::Connected) => status.send_modify(|s| s.broker = ConnectionStatus::connected()),
            Ok(MqttEvent::Disconnected) => {
                status.send_modify(|s| {
                    if s.broker.connected {
                        s.broker = ConnectionStatus::disconnected("Disconnected");
                    }
                });
            }
            Ok(MqttEvent::Error(reason)) => {
                status.send_modify(|s| s.broker = ConnectionStatus::disconnected(format!("Failed: {}", reason)));
            }
            Ok(MqttEvent::Publish { topic, payload }) => {
                if let Some(node) = parse_presence_topic(&peer_root, &topic) {
                    registry.observe(node, &payload).await;
                } else {
                    // Decode failures are already reported by the relay
                    let _ = relay.handle_mqtt(&topic, &payload).await;
                }
            }
            Ok(MqttEvent::PubAck(_)) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "MQTT consumer lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn socket_consumer_loop(
    mut rx: broadcast::Receiver<SocketEvent>,
    relay: Arc<Relay>,
    status: watch::Sender<RelayStatus>,
) {
    loop {
        match rx.recv().await {
            Ok(SocketEvent::Connected) => status.send_modify(|s| s.socket = ConnectionStatus::connected()),
            Ok(SocketEvent::Disconnected(reason)) => {
                status.send_modify(|s| s.socket = ConnectionStatus::disconnected(reason))
            }
            Ok(SocketEvent::Error(reason)) => {
                status.send_modify(|s| s.socket = ConnectionStatus::disconnected(format!("Error: {}", reason)))
            }
            Ok(SocketEvent::Message(payload)) => {
                let _ = relay.handle_socket(&payload).await;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "Socket consumer lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn status_reporter(mut rx: watch::Receiver<RelayStatus>) {
    let mut last = rx.borrow().clone();
    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();
        if current.broker != last.broker {
            info!(connected = current.broker.connected, "MQTT: {}", current.broker.label);
        }
        if current.socket != last.socket {
            info!(connected = current.socket.connected, "WebSocket: {}", current.socket.label);
        }
        if current.last_error != last.last_error {
            if let Some(err) = &current.last_error {
                warn!("Last error: {}", err);
            }
        }
        if current.last_vibration_payload != last.last_vibration_payload {
            debug!(payload = ?current.last_vibration_payload, "Vibration payload");
        }
        if current.last_direction_payload != last.last_direction_payload {
            debug!(payload = ?current.last_direction_payload, "Direction payload");
        }
        last = current;
    }
}
