//! Wearable-side translator from peer commands to a repeating pulse loop.
//!
//! At most one pulse task exists. A new vibration request cancels the running
//! task, waits for it to exit and starts a fresh one; cancel or a silent
//! request leaves no task behind.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use haptic_core::{DecodeError, DirectionCommand, PeerCommand, PulseParams, PulsePolicy, VibrationCommand};

use crate::vibrator::Vibrator;

struct ActivePulse {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActivePulse {
    async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            warn!(?err, "Pulse task ended abnormally");
        }
    }
}

pub struct PulseTranslator {
    vibrator: Arc<dyn Vibrator>,
    policy: PulsePolicy,
    active: Mutex<Option<ActivePulse>>,
    params_tx: watch::Sender<PulseParams>,
    direction_tx: watch::Sender<Option<DirectionCommand>>,
}

impl PulseTranslator {
    pub fn new(vibrator: Arc<dyn Vibrator>, policy: PulsePolicy) -> Self {
        let (params_tx, _) = watch::channel(PulseParams { amplitude: 0, ratio: 0.0 });
        let (direction_tx, _) = watch::channel(None);
        Self {
            vibrator,
            policy,
            active: Mutex::new(None),
            params_tx,
            direction_tx,
        }
    }

    pub fn policy(&self) -> PulsePolicy {
        self.policy
    }

    /// Latest heading; `None` until one arrives or after a `(0, 0)` heading.
    pub fn direction(&self) -> watch::Receiver<Option<DirectionCommand>> {
        self.direction_tx.subscribe()
    }

    /// Decodes a peer message and applies it. Undecodable messages are logged
    /// and leave the state untouched.
    pub async fn handle_message(&self, path: &str, payload: &[u8]) -> Result<(), DecodeError> {
        match PeerCommand::decode(path, payload) {
            Ok(command) => {
                self.handle(command).await;
                Ok(())
            }
            Err(err) => {
                warn!(%path, %err, "Invalid peer payload");
                Err(err)
            }
        }
    }

    pub async fn handle(&self, command: PeerCommand) {
        match command {
            PeerCommand::Vibrate(cmd) => self.vibrate(cmd).await,
            PeerCommand::Direction(d) => self.set_direction(d),
            PeerCommand::Cancel => self.cancel().await,
        }
    }

    pub async fn vibrate(&self, cmd: VibrationCommand) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.stop().await;
        }

        let Some(params) = PulseParams::from_command(&cmd) else {
            info!(amplitude = cmd.amplitude, ratio = cmd.ratio, "Silent vibration request; idle");
            return;
        };

        if !self.vibrator.is_available() {
            warn!("No vibrator present; pulses will have no physical effect");
        }
        let timing = self.policy.timing(params.ratio);
        info!(amplitude = params.amplitude, ratio = params.ratio, on = ?timing.on, off = ?timing.off, "Pulsing");

        self.params_tx.send_replace(params);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_pulse(
            self.vibrator.clone(),
            self.policy,
            self.params_tx.subscribe(),
            token.clone(),
        ));
        *active = Some(ActivePulse { token, handle });
    }

    pub async fn cancel(&self) {
        let previous = self.active.lock().await.take();
        match previous {
            Some(previous) => {
                previous.stop().await;
                info!("Pulsing canceled");
            }
            None => debug!("Cancel while idle"),
        }
    }

    pub async fn is_pulsing(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(false, |a| !a.handle.is_finished())
    }

    /// Parameters of the running task, if any.
    pub async fn current_params(&self) -> Option<PulseParams> {
        if self.is_pulsing().await {
            Some(*self.params_tx.borrow())
        } else {
            None
        }
    }

    fn set_direction(&self, direction: DirectionCommand) {
        let heading = if direction.is_none() { None } else { Some(direction) };
        info!(x = direction.x, y = direction.y, "Direction");
        self.direction_tx.send_replace(heading);
    }
}

async fn run_pulse(
    vibrator: Arc<dyn Vibrator>,
    policy: PulsePolicy,
    params: watch::Receiver<PulseParams>,
    token: CancellationToken,
) {
    loop {
        let current = *params.borrow();
        let timing = policy.timing(current.ratio);
        if !timing.on.is_zero() {
            vibrator.pulse(timing.on, current.amplitude);
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(timing.cycle()) => {}
        }
    }
    vibrator.stop();
    debug!("Pulse task exited");
}
