use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use rumqttc::QoS;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use haptic_core::{peer_topic, PeerCommand, PRESENCE_ONLINE};
use haptic_mqtt::MqttService;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("could not enumerate peers: {0}")]
    Enumerate(String),
    #[error("delivery to {peer} failed: {reason}")]
    Delivery { peer: String, reason: String },
    #[error("could not encode peer payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Point-to-point channel to paired wearables.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Peers reachable right now. Called once per dispatched command.
    async fn connected_peers(&self) -> Result<Vec<String>, PeerError>;

    async fn send_message(&self, peer: &str, path: &str, payload: &[u8]) -> Result<(), PeerError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub peers: usize,
    pub delivered: usize,
}

/// Sends `command` to every peer enumerated at call time. Each send is
/// independent; failures are logged and counted, never retried.
pub async fn dispatch(link: &dyn PeerLink, command: &PeerCommand) -> Result<DispatchReport, PeerError> {
    let payload = command.encode()?;
    let path = command.path();
    let peers = link.connected_peers().await?;
    if peers.is_empty() {
        debug!(path, "No connected peers; command not sent");
        return Ok(DispatchReport::default());
    }

    let payload = &payload;
    let results = join_all(peers.iter().map(|peer| async move {
        (peer, link.send_message(peer, path, payload).await)
    }))
    .await;

    let mut report = DispatchReport { peers: peers.len(), delivered: 0 };
    for (peer, result) in results {
        match result {
            Ok(()) => report.delivered += 1,
            Err(err) => warn!(%peer, path, %err, "Peer delivery failed"),
        }
    }
    Ok(report)
}

/// Wearables currently announcing themselves as online.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    nodes: Arc<RwLock<BTreeSet<String>>>,
}

impl PeerRegistry {
    /// Applies a presence payload; returns true when the set changed.
    pub async fn observe(&self, node_id: &str, payload: &[u8]) -> bool {
        let online = payload == PRESENCE_ONLINE.as_bytes();
        let mut nodes = self.nodes.write().await;
        let changed = if online {
            nodes.insert(node_id.to_string())
        } else {
            nodes.remove(node_id)
        };
        if changed {
            info!(node = node_id, online, "Peer presence changed");
        }
        changed
    }

    pub async fn online(&self) -> Vec<String> {
        self.nodes.read().await.iter().cloned().collect()
    }
}

/// Peer channel carried over the broker: `{root}/peer/{node}/{command}`.
#[derive(Clone)]
pub struct MqttPeerLink {
    mqtt: MqttService,
    root: String,
    registry: PeerRegistry,
}

impl MqttPeerLink {
    pub fn new(mqtt: MqttService, root: impl Into<String>, registry: PeerRegistry) -> Self {
        Self { mqtt, root: root.into(), registry }
    }
}

#[async_trait]
impl PeerLink for MqttPeerLink {
    async fn connected_peers(&self) -> Result<Vec<String>, PeerError> {
        Ok(self.registry.online().await)
    }

    async fn send_message(&self, peer: &str, path: &str, payload: &[u8]) -> Result<(), PeerError> {
        let topic = peer_topic(&self.root, peer, path);
        self.mqtt
            .publish(&topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| PeerError::Delivery { peer: peer.to_string(), reason: e.to_string() })
    }
}
