//! Joystick input handling.
//!
//! A [`Joystick`] handle accepts raw pointer movement at whatever rate the
//! UI produces it; a pump task coalesces that into rate-limited control
//! commands on a [`CommandSink`]. The contract:
//!
//! - commands are spaced at least [`MIN_SEND_INTERVAL`](throttle::MIN_SEND_INTERVAL) apart
//! - a newer movement replaces the one pending scheduled command
//! - movement within the dead-zone of the last accepted vector is jitter
//! - release always delivers an explicit stop command, bypassing the gate
//! - transport failures are logged, never retried, and never block input

pub(crate) mod throttle;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Result;
use crate::types::JoystickVector;
use throttle::{Outcome, PumpState};

pub use throttle::MIN_SEND_INTERVAL;

/// Best-effort transport for control commands.
#[async_trait::async_trait]
pub trait CommandSink: Send + Sync + 'static {
    /// Deliver one joystick command.
    async fn send(&self, vector: JoystickVector) -> Result<()>;
}

enum InputEvent {
    Move(JoystickVector),
    Release,
}

/// Handle for feeding pointer input into the command pump.
///
/// Cheap to clone; dropping every handle ends the pump task.
#[derive(Clone)]
pub struct Joystick {
    events: mpsc::UnboundedSender<InputEvent>,
}

impl Joystick {
    /// Feed a pointer movement. Dead-zone and throttling are applied by the
    /// pump; callers just forward positions.
    pub fn submit(&self, vector: JoystickVector) {
        let _ = self.events.send(InputEvent::Move(vector));
    }

    /// Feed a pointer release or cancel. Guarantees the device receives an
    /// explicit stop command if the stick was deflected.
    pub fn release(&self) {
        let _ = self.events.send(InputEvent::Release);
    }
}

/// Spawn the command pump for one joystick session.
pub(crate) fn spawn_pump(
    sink: Arc<dyn CommandSink>,
    min_interval: Duration,
    cancel: CancellationToken,
) -> Joystick {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump_task(sink, min_interval, cancel, rx));
    Joystick { events: tx }
}

async fn pump_task(
    sink: Arc<dyn CommandSink>,
    min_interval: Duration,
    cancel: CancellationToken,
    mut events: mpsc::UnboundedReceiver<InputEvent>,
) {
    let mut state = PumpState::new(min_interval);

    loop {
        let deadline = state.pending_deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Joystick pump cancelled");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Joystick handles dropped, pump ending");
                    break;
                };
                let outcome = match event {
                    InputEvent::Move(vector) => state.on_move(Instant::now(), vector),
                    InputEvent::Release => state.on_release(Instant::now()),
                };
                if let Outcome::Send(vector) = outcome {
                    dispatch(&sink, vector);
                }
            }
            // The dummy deadline is never polled; the branch is disabled
            // whenever no send is pending.
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                if let Some(vector) = state.take_due(Instant::now()) {
                    dispatch(&sink, vector);
                }
            }
        }
    }
}

/// Initiate one send without blocking the input loop. Initiation order is
/// submission order; completion is the network's business.
fn dispatch(sink: &Arc<dyn CommandSink>, vector: JoystickVector) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        if let Err(e) = sink.send(vector).await {
            warn!("Control command {vector} failed: {e}");
        }
    });
}
