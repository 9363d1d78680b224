//! Translation of a vibration request into a repeating on/off pattern.
//!
//! Amplitude only ever sets pulse strength; timing is a function of the ratio
//! alone.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::commands::VibrationCommand;
use crate::error::ParsePolicyError;

pub const MIN_AMPLITUDE: u8 = 1;
pub const MAX_AMPLITUDE: u8 = 255;

const PROPORTIONAL_CYCLE_MS: u64 = 1000;

const THRESHOLD_RATIO: f64 = 85.0;
const DENSE_ON_MS: u64 = 500;
const DENSE_OFF_MS: u64 = 10;
const SPARSE_ON_MS: u64 = 50;
const SPARSE_OFF_SPAN_MS: f64 = 1000.0;
const SPARSE_OFF_FLOOR_MS: u64 = 50;

/// `None` for non-positive amplitudes, otherwise the value clamped to `[1, 255]`.
pub fn clamp_amplitude(raw: i64) -> Option<u8> {
    if raw <= 0 {
        None
    } else {
        Some(raw.min(MAX_AMPLITUDE as i64) as u8)
    }
}

/// Ratio as a percentage in `[0, 100]`; NaN reads as zero.
pub fn clamp_ratio(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 100.0)
    }
}

/// Parameters the pulse loop reads every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseParams {
    pub amplitude: u8,
    pub ratio: f64,
}

impl PulseParams {
    /// `None` when the command asks for no vibration at all.
    pub fn from_command(cmd: &VibrationCommand) -> Option<Self> {
        let amplitude = clamp_amplitude(cmd.amplitude)?;
        let ratio = clamp_ratio(cmd.ratio);
        if ratio <= 0.0 {
            return None;
        }
        Some(Self { amplitude, ratio })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    pub on: Duration,
    pub off: Duration,
}

impl PulseTiming {
    fn from_millis(on: u64, off: u64) -> Self {
        Self { on: Duration::from_millis(on), off: Duration::from_millis(off) }
    }

    pub fn cycle(&self) -> Duration {
        self.on + self.off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulsePolicy {
    /// Fixed 1 s cycle split by the ratio.
    Proportional,
    /// Near-continuous at or above 85%, short taps with a shrinking gap below.
    #[default]
    Threshold,
}

impl PulsePolicy {
    pub fn timing(self, ratio: f64) -> PulseTiming {
        let ratio = clamp_ratio(ratio);
        match self {
            PulsePolicy::Proportional => {
                let on = ((PROPORTIONAL_CYCLE_MS as f64) * ratio / 100.0) as u64;
                let on = on.min(PROPORTIONAL_CYCLE_MS);
                PulseTiming::from_millis(on, PROPORTIONAL_CYCLE_MS - on)
            }
            PulsePolicy::Threshold => {
                if ratio >= THRESHOLD_RATIO {
                    PulseTiming::from_millis(DENSE_ON_MS, DENSE_OFF_MS)
                } else {
                    let off = ((1.0 - ratio / THRESHOLD_RATIO) * SPARSE_OFF_SPAN_MS) as u64;
                    PulseTiming::from_millis(SPARSE_ON_MS, off.max(SPARSE_OFF_FLOOR_MS))
                }
            }
        }
    }
}

impl FromStr for PulsePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proportional" => Ok(PulsePolicy::Proportional),
            "threshold" => Ok(PulsePolicy::Threshold),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

impl fmt::Display for PulsePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulsePolicy::Proportional => f.write_str("proportional"),
            PulsePolicy::Threshold => f.write_str("threshold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn amplitude_is_clamped() {
        assert_eq!(clamp_amplitude(0), None);
        assert_eq!(clamp_amplitude(-20), None);
        assert_eq!(clamp_amplitude(1), Some(MIN_AMPLITUDE));
        assert_eq!(clamp_amplitude(150), Some(150));
        assert_eq!(clamp_amplitude(1000), Some(MAX_AMPLITUDE));
    }

    #[test]
    fn ratio_is_clamped() {
        assert_eq!(clamp_ratio(-3.0), 0.0);
        assert_eq!(clamp_ratio(140.0), 100.0);
        assert_eq!(clamp_ratio(f64::NAN), 0.0);
        assert_eq!(clamp_ratio(42.5), 42.5);
    }

    #[test]
    fn params_reject_silent_commands() {
        assert!(PulseParams::from_command(&VibrationCommand { amplitude: 0, ratio: 50.0 }).is_none());
        assert!(PulseParams::from_command(&VibrationCommand { amplitude: 10, ratio: 0.0 }).is_none());
        assert_eq!(
            PulseParams::from_command(&VibrationCommand { amplitude: 400, ratio: 120.0 }),
            Some(PulseParams { amplitude: 255, ratio: 100.0 })
        );
    }

    #[test]
    fn threshold_policy_values() {
        let p = PulsePolicy::Threshold;
        assert_eq!(p.timing(85.0), PulseTiming { on: ms(500), off: ms(10) });
        assert_eq!(p.timing(100.0), PulseTiming { on: ms(500), off: ms(10) });
        assert_eq!(p.timing(70.0), PulseTiming { on: ms(50), off: ms(176) });
        assert_eq!(p.timing(0.0), PulseTiming { on: ms(50), off: ms(1000) });
        // gap never drops below the floor just under the threshold
        assert_eq!(p.timing(84.0), PulseTiming { on: ms(50), off: ms(50) });
    }

    #[test]
    fn proportional_policy_values() {
        let p = PulsePolicy::Proportional;
        assert_eq!(p.timing(70.0), PulseTiming { on: ms(700), off: ms(300) });
        assert_eq!(p.timing(0.0), PulseTiming { on: ms(0), off: ms(1000) });
        assert_eq!(p.timing(100.0), PulseTiming { on: ms(1000), off: ms(0) });
    }

    #[test]
    fn every_ratio_gives_a_non_empty_cycle() {
        for policy in [PulsePolicy::Threshold, PulsePolicy::Proportional] {
            for step in 0..=200 {
                let ratio = step as f64 / 2.0;
                let timing = policy.timing(ratio);
                assert!(timing.cycle() > Duration::ZERO, "{} at {}", policy, ratio);
            }
        }
    }

    #[test]
    fn higher_ratio_never_lengthens_relative_gap() {
        for policy in [PulsePolicy::Threshold, PulsePolicy::Proportional] {
            let mut last = f64::INFINITY;
            for ratio in 1..=100 {
                let t = policy.timing(ratio as f64);
                let gap = t.off.as_secs_f64() / t.cycle().as_secs_f64();
                assert!(gap <= last + 1e-9, "{} at {}", policy, ratio);
                last = gap;
            }
        }
    }

    #[test]
    fn policy_parses_from_config() {
        assert_eq!("threshold".parse::<PulsePolicy>().unwrap(), PulsePolicy::Threshold);
        assert_eq!(" Proportional ".parse::<PulsePolicy>().unwrap(), PulsePolicy::Proportional);
        assert!("sine".parse::<PulsePolicy>().is_err());
        assert_eq!(PulsePolicy::default(), PulsePolicy::Threshold);
    }
}
