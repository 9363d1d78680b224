pub mod config;
pub mod peers;
pub mod relay;
pub mod socket;
pub mod status;

pub use config::RelayConfig;
pub use peers::{dispatch, DispatchReport, MqttPeerLink, PeerError, PeerLink, PeerRegistry};
pub use relay::{Channel, Relay, RelayAction, RelayTopics};
pub use socket::{SocketEvent, SocketManager, SocketTransport};
pub use status::{status_channel, ConnectionStatus, RelayStatus};
