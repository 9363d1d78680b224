use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use rumqttc::QoS;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use haptic_core::{parse_peer_topic, peer_wildcard, PRESENCE_OFFLINE};
use haptic_mqtt::{shutdown_signal, MqttConfig, MqttEvent, MqttService, Presence};
use haptic_wear::{PulseTranslator, WearConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let wear_cfg = WearConfig::from_env();
    let presence = Presence::for_node(&wear_cfg.peer_root, &wear_cfg.node_id);
    let mqtt_cfg = MqttConfig::from_env().with_presence(presence.clone());
    info!(
        node = %wear_cfg.node_id,
        policy = %wear_cfg.policy,
        vibrator = %wear_cfg.vibrator,
        host = %mqtt_cfg.host,
        port = mqtt_cfg.port,
        "Starting wearable"
    );

    let mqtt = MqttService::connect(mqtt_cfg)
        .await
        .context("Failed to initialize MQTT")?;
    let events = mqtt.events();

    let inbox = peer_wildcard(&wear_cfg.peer_root, &wear_cfg.node_id);
    if let Err(e) = mqtt.subscribe(&inbox, QoS::AtLeastOnce).await {
        warn!(?e, topic = %inbox, "Failed to subscribe to peer inbox");
    }

    let translator = Arc::new(PulseTranslator::new(wear_cfg.vibrator.build(), wear_cfg.policy));
    let consumer = tokio::spawn(peer_consumer_loop(events, translator.clone(), wear_cfg.clone()));

    shutdown_signal().await;
    info!("Shutting down wearable");
    consumer.abort();
    translator.cancel().await;
    // A clean disconnect suppresses the last will, so announce it ourselves
    if let Err(e) = mqtt.publish(&presence.topic, QoS::AtLeastOnce, true, PRESENCE_OFFLINE).await {
        warn!(?e, "Failed to publish offline presence");
    }
    if let Err(e) = mqtt.disconnect().await {
        warn!(?e, "MQTT disconnect failed");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rumqttc=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn peer_consumer_loop(
    mut rx: broadcast::Receiver<MqttEvent>,
    translator: Arc<PulseTranslator>,
    cfg: WearConfig,
) {
    loop {
        match rx.recv().await {
            Ok(MqttEvent::Connected) => info!(node = %cfg.node_id, "Paired channel up"),
            Ok(MqttEvent::Disconnected) => warn!("Paired channel down"),
            Ok(MqttEvent::Error(reason)) => debug!(%reason, "MQTT error"),
            Ok(MqttEvent::Publish { topic, payload }) => {
                match parse_peer_topic(&cfg.peer_root, &cfg.node_id, &topic) {
                    Some(path) => {
                        let _ = translator.handle_message(path, &payload).await;
                    }
                    None => debug!(%topic, "Ignoring message outside peer inbox"),
                }
            }
            Ok(MqttEvent::PubAck(_)) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "Peer consumer lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
