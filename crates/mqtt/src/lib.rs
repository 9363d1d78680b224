pub mod config;
pub mod client;
pub mod shutdown;

pub use config::{MqttConfig, Presence};
pub use client::{MqttEvent, MqttService};
pub use shutdown::shutdown_signal;
