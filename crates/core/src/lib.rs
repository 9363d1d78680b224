pub mod commands;
pub mod error;
pub mod inbound;
pub mod pulse;
pub mod topics;

pub use commands::{DirectionCommand, PeerCommand, VibrationCommand};
pub use error::{DecodeError, ParsePolicyError};
pub use inbound::{decode_direction, decode_socket_directive, decode_vibration, SocketDirective};
pub use pulse::{clamp_amplitude, clamp_ratio, PulseParams, PulsePolicy, PulseTiming};
pub use topics::*;
