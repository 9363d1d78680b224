// Vibration hardware seam

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

/// Hardware that can emit a single pulse. Calls must not block: a pulse is
/// started and the hardware runs it out on its own.
pub trait Vibrator: Send + Sync {
    /// `false` when no motor is present; pulses are then accepted and dropped.
    fn is_available(&self) -> bool {
        true
    }

    fn pulse(&self, duration: Duration, amplitude: u8);

    fn stop(&self);
}

/// Stand-in motor that reports every pulse through tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVibrator;

impl Vibrator for LogVibrator {
    fn pulse(&self, duration: Duration, amplitude: u8) {
        debug!(?duration, amplitude, "bzz");
    }

    fn stop(&self) {
        info!("Vibration stopped");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullVibrator;

impl Vibrator for NullVibrator {
    fn is_available(&self) -> bool {
        false
    }

    fn pulse(&self, _duration: Duration, _amplitude: u8) {}

    fn stop(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VibratorKind {
    #[default]
    Log,
    None,
}

impl VibratorKind {
    pub fn build(self) -> Arc<dyn Vibrator> {
        match self {
            VibratorKind::Log => Arc::new(LogVibrator),
            VibratorKind::None => Arc::new(NullVibrator),
        }
    }
}

impl FromStr for VibratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(VibratorKind::Log),
            "none" => Ok(VibratorKind::None),
            other => Err(format!("unknown vibrator `{}`", other)),
        }
    }
}

impl fmt::Display for VibratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VibratorKind::Log => f.write_str("log"),
            VibratorKind::None => f.write_str("none"),
        }
    }
}
