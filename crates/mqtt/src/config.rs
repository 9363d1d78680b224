use hostname::get as get_hostname;
use std::env;
use std::time::Duration;

use haptic_core::{presence_topic, PRESENCE_OFFLINE, PRESENCE_ONLINE};

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub use_tls: bool,
    pub reconnect_delay: Duration,
    pub presence: Option<Presence>,
}

/// Retained presence announcement: `online` is published after every connect,
/// `offline` is registered as the last will.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub topic: String,
    pub online: String,
    pub offline: String,
}

impl Presence {
    pub fn for_node(root: &str, node_id: &str) -> Self {
        Self {
            topic: presence_topic(root, node_id),
            online: PRESENCE_ONLINE.to_string(),
            offline: PRESENCE_OFFLINE.to_string(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        let host = "localhost".to_string();
        let port = 1883;
        let client_id = default_client_id();
        let keep_alive_secs = 30;
        Self {
            host,
            port,
            client_id,
            username: None,
            password: None,
            keep_alive_secs,
            clean_session: true,
            use_tls: false,
            reconnect_delay: Duration::from_secs(3),
            presence: None,
        }
    }
}

impl MqttConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset, empty or unparsable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = MqttConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("MQTT_BROKER_HOST") {
            cfg.host = v;
        }
        if let Some(p) = var("MQTT_BROKER_PORT").and_then(|v| v.parse::<u16>().ok()) {
            cfg.port = p;
        }
        if let Some(v) = var("MQTT_CLIENT_ID") {
            cfg.client_id = v;
        }
        if let Some(v) = var("MQTT_USERNAME") {
            cfg.username = Some(v);
        }
        if let Some(v) = var("MQTT_PASSWORD") {
            cfg.password = Some(v);
        }
        if let Some(s) = var("MQTT_KEEP_ALIVE_SECS").and_then(|v| v.parse::<u16>().ok()) {
            cfg.keep_alive_secs = s;
        }
        if let Some(v) = var("MQTT_TLS") {
            cfg.use_tls = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        // Zero would spin against a broker that refuses outright
        if let Some(s) = var("MQTT_RECONNECT_DELAY_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            cfg.reconnect_delay = Duration::from_secs(s);
        }

        cfg
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = Some(presence);
        self
    }
}

pub fn local_hostname() -> String {
    get_hostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn default_client_id() -> String {
    let pid = std::process::id();
    format!("haptic-{}-{}", local_hostname(), pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = MqttConfig::from_lookup(|_| None);
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 1883);
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(3));
        assert!(!cfg.use_tls);
        assert!(cfg.client_id.starts_with("haptic-"));
        assert!(cfg.presence.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = MqttConfig::from_lookup(lookup(&[
            ("MQTT_BROKER_HOST", "broker.example"),
            ("MQTT_BROKER_PORT", "8883"),
            ("MQTT_USERNAME", "user"),
            ("MQTT_PASSWORD", "secret"),
            ("MQTT_TLS", "true"),
            ("MQTT_RECONNECT_DELAY_SECS", "5"),
        ]));
        assert_eq!(cfg.host, "broker.example");
        assert_eq!(cfg.port, 8883);
        assert_eq!(cfg.username.as_deref(), Some("user"));
        assert_eq!(cfg.password.as_deref(), Some("secret"));
        assert!(cfg.use_tls);
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = MqttConfig::from_lookup(lookup(&[
            ("MQTT_BROKER_HOST", ""),
            ("MQTT_BROKER_PORT", "not-a-port"),
            ("MQTT_KEEP_ALIVE_SECS", "-1"),
        ]));
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 1883);
        assert_eq!(cfg.keep_alive_secs, 30);
    }

    #[test]
    fn zero_reconnect_delay_keeps_default() {
        let cfg = MqttConfig::from_lookup(lookup(&[("MQTT_RECONNECT_DELAY_SECS", "0")]));
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(3));
    }

    #[test]
    fn presence_for_node() {
        let p = Presence::for_node("haptic", "watch-1");
        assert_eq!(p.topic, "haptic/nodes/watch-1");
        assert_eq!(p.online, "online");
        assert_eq!(p.offline, "offline");
    }
}
