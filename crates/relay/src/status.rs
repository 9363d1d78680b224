//! Process-wide connection state, written by the transport consumers and read
//! by whatever presents it.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub label: String,
    pub connected: bool,
}

impl ConnectionStatus {
    pub fn new(label: impl Into<String>, connected: bool) -> Self {
        Self { label: label.into(), connected }
    }

    pub fn connected() -> Self {
        Self::new("Connected", true)
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::new(reason, false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayStatus {
    pub broker: ConnectionStatus,
    pub socket: ConnectionStatus,
    pub last_vibration_payload: Option<String>,
    pub last_direction_payload: Option<String>,
    pub last_error: Option<String>,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self {
            broker: ConnectionStatus::new("Connecting...", false),
            socket: ConnectionStatus::new("Not connected", false),
            last_vibration_payload: None,
            last_direction_payload: None,
            last_error: None,
        }
    }
}

pub fn status_channel() -> (watch::Sender<RelayStatus>, watch::Receiver<RelayStatus>) {
    watch::channel(RelayStatus::default())
}
