//! Phone-side command relay: decodes inbound payloads and turns them into peer
//! commands or socket directives.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use haptic_core::{
    decode_direction, decode_socket_directive, decode_vibration, DecodeError, PeerCommand, SocketDirective,
};

use crate::peers::{dispatch, PeerLink};
use crate::socket::SocketTransport;
use crate::status::RelayStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTopics {
    pub vibration: String,
    pub direction: String,
    pub command: String,
}

/// Which decoder applies to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Vibration,
    Direction,
    Control,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    Forward(PeerCommand),
    Socket(SocketDirective),
    Ignore,
}

impl RelayAction {
    pub fn decode(channel: Channel, payload: &[u8]) -> Result<Self, DecodeError> {
        let action = match channel {
            Channel::Vibration => decode_vibration(payload)?.map(RelayAction::Forward),
            Channel::Direction => decode_direction(payload)?.map(RelayAction::Forward),
            Channel::Control => decode_socket_directive(payload)?.map(RelayAction::Socket),
        };
        Ok(action.unwrap_or(RelayAction::Ignore))
    }
}

pub struct Relay {
    topics: RelayTopics,
    link: Arc<dyn PeerLink>,
    socket: Arc<dyn SocketTransport>,
    status: watch::Sender<RelayStatus>,
    default_socket_url: Option<String>,
}

impl Relay {
    pub fn new(
        topics: RelayTopics,
        link: Arc<dyn PeerLink>,
        socket: Arc<dyn SocketTransport>,
        status: watch::Sender<RelayStatus>,
        default_socket_url: Option<String>,
    ) -> Self {
        Self { topics, link, socket, status, default_socket_url }
    }

    pub fn channel_for(&self, topic: &str) -> Option<Channel> {
        if topic == self.topics.vibration {
            Some(Channel::Vibration)
        } else if topic == self.topics.direction {
            Some(Channel::Direction)
        } else if topic == self.topics.command {
            Some(Channel::Control)
        } else {
            None
        }
    }

    /// Handles one broker message. Topics the relay does not own are ignored.
    pub async fn handle_mqtt(&self, topic: &str, payload: &[u8]) -> Result<RelayAction, DecodeError> {
        match self.channel_for(topic) {
            Some(channel) => self.handle(channel, payload).await,
            None => {
                debug!(%topic, "Ignoring message on unrelated topic");
                Ok(RelayAction::Ignore)
            }
        }
    }

    /// Handles one socket frame; the socket speaks the vibration format.
    pub async fn handle_socket(&self, payload: &[u8]) -> Result<RelayAction, DecodeError> {
        self.handle(Channel::Vibration, payload).await
    }

    async fn handle(&self, channel: Channel, payload: &[u8]) -> Result<RelayAction, DecodeError> {
        let text = String::from_utf8_lossy(payload).into_owned();
        match channel {
            Channel::Vibration => self.status.send_modify(|s| s.last_vibration_payload = Some(text)),
            Channel::Direction => self.status.send_modify(|s| s.last_direction_payload = Some(text)),
            Channel::Control => debug!(payload = %text, "Control message received"),
        }

        match RelayAction::decode(channel, payload) {
            Ok(action) => {
                self.apply(&action).await;
                Ok(action)
            }
            Err(err) => {
                warn!(?channel, %err, "Dropping undecodable payload");
                self.status.send_modify(|s| s.last_error = Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn apply(&self, action: &RelayAction) {
        match action {
            RelayAction::Forward(command) => match dispatch(self.link.as_ref(), command).await {
                Ok(report) => debug!(
                    path = command.path(),
                    peers = report.peers,
                    delivered = report.delivered,
                    "Command dispatched"
                ),
                Err(err) => warn!(path = command.path(), %err, "Command not dispatched"),
            },
            RelayAction::Socket(SocketDirective::Connect(url)) => {
                match url.as_deref().or(self.default_socket_url.as_deref()) {
                    Some(url) => self.socket.open(url).await,
                    None => {
                        warn!("WebSocket connect requested without a URL and none is configured");
                        self.status.send_modify(|s| s.last_error = Some("no WebSocket URL".to_string()));
                    }
                }
            }
            RelayAction::Socket(SocketDirective::Disconnect) => {
                info!("WebSocket disconnect requested");
                self.socket.close().await;
            }
            RelayAction::Ignore => debug!("Payload carried no command"),
        }
    }
}
