use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::topics::{CANCEL_PATH, DIRECTION_PATH, VIBRATE_PATH};

/// Vibration request as it travels to the wearable. Amplitude is not clamped
/// here; the receiving side clamps it before touching hardware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VibrationCommand {
    pub amplitude: i64,
    pub ratio: f64,
}

/// Planar heading. `(0, 0)` means "no direction".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionCommand {
    pub x: f64,
    pub y: f64,
}

impl DirectionCommand {
    pub fn is_none(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Named command sent from the relay to each connected peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeerCommand {
    Vibrate(VibrationCommand),
    Direction(DirectionCommand),
    Cancel,
}

impl PeerCommand {
    pub fn path(&self) -> &'static str {
        match self {
            PeerCommand::Vibrate(_) => VIBRATE_PATH,
            PeerCommand::Direction(_) => DIRECTION_PATH,
            PeerCommand::Cancel => CANCEL_PATH,
        }
    }

    /// Peer payload for this command; `/cancel` carries no bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            PeerCommand::Vibrate(v) => serde_json::to_vec(v),
            PeerCommand::Direction(d) => serde_json::to_vec(d),
            PeerCommand::Cancel => Ok(Vec::new()),
        }
    }

    pub fn decode(path: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        match path {
            VIBRATE_PATH => Ok(PeerCommand::Vibrate(serde_json::from_slice(payload)?)),
            DIRECTION_PATH => Ok(PeerCommand::Direction(serde_json::from_slice(payload)?)),
            CANCEL_PATH => Ok(PeerCommand::Cancel),
            other => Err(DecodeError::UnknownPath(other.to_string())),
        }
    }
}
