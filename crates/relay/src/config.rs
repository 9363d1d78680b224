use std::env;

use haptic_core::{COMMAND_TOPIC, DIRECTION_TOPIC, PEER_ROOT, VIBRATION_TOPIC};

use crate::relay::RelayTopics;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub vibration_topic: String,
    pub direction_topic: String,
    pub command_topic: String,
    pub peer_root: String,
    /// Used by `connect` directives without a URL; opened at startup when set.
    pub socket_url: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            vibration_topic: VIBRATION_TOPIC.to_string(),
            direction_topic: DIRECTION_TOPIC.to_string(),
            command_topic: COMMAND_TOPIC.to_string(),
            peer_root: PEER_ROOT.to_string(),
            socket_url: None,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = RelayConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("HAPTIC_VIBRATION_TOPIC") {
            cfg.vibration_topic = v;
        }
        if let Some(v) = var("HAPTIC_DIRECTION_TOPIC") {
            cfg.direction_topic = v;
        }
        if let Some(v) = var("HAPTIC_COMMAND_TOPIC") {
            cfg.command_topic = v;
        }
        if let Some(v) = var("HAPTIC_PEER_ROOT") {
            cfg.peer_root = v;
        }
        cfg.socket_url = var("HAPTIC_SOCKET_URL");

        cfg
    }

    pub fn topics(&self) -> RelayTopics {
        RelayTopics {
            vibration: self.vibration_topic.clone(),
            direction: self.direction_topic.clone(),
            command: self.command_topic.clone(),
        }
    }
}
