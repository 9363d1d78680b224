pub mod config;
pub mod translator;
pub mod vibrator;

pub use config::WearConfig;
pub use translator::PulseTranslator;
pub use vibrator::{LogVibrator, NullVibrator, Vibrator, VibratorKind};
