use std::env;

use haptic_core::{PulsePolicy, PEER_ROOT};
use haptic_mqtt::config::local_hostname;
use tracing::warn;

use crate::vibrator::VibratorKind;

#[derive(Debug, Clone)]
pub struct WearConfig {
    pub node_id: String,
    pub peer_root: String,
    pub policy: PulsePolicy,
    pub vibrator: VibratorKind,
}

impl Default for WearConfig {
    fn default() -> Self {
        Self {
            node_id: local_hostname(),
            peer_root: PEER_ROOT.to_string(),
            policy: PulsePolicy::default(),
            vibrator: VibratorKind::default(),
        }
    }
}

impl WearConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = WearConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("HAPTIC_NODE_ID") {
            cfg.node_id = v;
        }
        if let Some(v) = var("HAPTIC_PEER_ROOT") {
            cfg.peer_root = v;
        }
        if let Some(v) = var("HAPTIC_PULSE_POLICY") {
            match v.parse() {
                Ok(policy) => cfg.policy = policy,
                Err(err) => warn!(%err, "Keeping default pulse policy"),
            }
        }
        if let Some(v) = var("HAPTIC_VIBRATOR") {
            match v.parse() {
                Ok(kind) => cfg.vibrator = kind,
                Err(err) => warn!(%err, "Keeping default vibrator"),
            }
        }

        cfg
    }
}
