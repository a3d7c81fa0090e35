//! Command-rate gating and input coalescing state.
//!
//! The state here is pure and synchronous: the async pump in the parent
//! module feeds it timestamps and events and performs whatever sends it
//! decides on. That keeps the throttling contract testable without timers.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::JoystickVector;

/// Minimum spacing between outbound control commands (10 per second).
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(100);

/// What the gate says to do with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Send immediately and stamp the send time.
    Send,
    /// Too soon: schedule for this deadline instead.
    Defer(Instant),
}

/// Minimum-interval gate over actually-performed sends.
#[derive(Debug)]
pub(crate) struct SendGate {
    min_interval: Duration,
    last_send: Option<Instant>,
}

impl SendGate {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_send: None }
    }

    /// Decide whether a submission at `now` may go out immediately.
    /// Forced submissions always may.
    pub(crate) fn decide(&self, now: Instant, forced: bool) -> Decision {
        if forced {
            return Decision::Send;
        }
        match self.last_send {
            None => Decision::Send,
            Some(last) if now.duration_since(last) >= self.min_interval => Decision::Send,
            Some(last) => Decision::Defer(last + self.min_interval),
        }
    }

    pub(crate) fn mark_sent(&mut self, now: Instant) {
        self.last_send = Some(now);
    }
}

/// Result of feeding one input event to the pump state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Dispatch this vector now.
    Send(JoystickVector),
    /// A pending send was (re)scheduled for this deadline.
    Scheduled(Instant),
    /// Below the dead-zone, or a release at rest: nothing to do.
    Ignored,
}

/// Coalescing state for one joystick session.
///
/// Holds the last accepted vector (dead-zone reference) and at most one
/// pending scheduled send; a newer movement replaces the pending send,
/// never queues behind it.
#[derive(Debug)]
pub(crate) struct PumpState {
    gate: SendGate,
    current: JoystickVector,
    pending: Option<(JoystickVector, Instant)>,
}

impl PumpState {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self { gate: SendGate::new(min_interval), current: JoystickVector::ZERO, pending: None }
    }

    /// Feed a pointer movement.
    pub(crate) fn on_move(&mut self, now: Instant, vector: JoystickVector) -> Outcome {
        if !self.current.exceeds_dead_zone(vector) {
            return Outcome::Ignored;
        }
        self.current = vector;
        self.submit(now, vector, false)
    }

    /// Feed a pointer release or cancel.
    ///
    /// Always drops any pending send; emits a forced stop command unless
    /// the stick is already at rest.
    pub(crate) fn on_release(&mut self, now: Instant) -> Outcome {
        self.pending = None;
        if self.current.is_zero() {
            return Outcome::Ignored;
        }
        self.current = JoystickVector::ZERO;
        self.submit(now, JoystickVector::ZERO, true)
    }

    fn submit(&mut self, now: Instant, vector: JoystickVector, forced: bool) -> Outcome {
        match self.gate.decide(now, forced) {
            Decision::Send => {
                self.pending = None;
                self.gate.mark_sent(now);
                Outcome::Send(vector)
            }
            Decision::Defer(deadline) => {
                self.pending = Some((vector, deadline));
                Outcome::Scheduled(deadline)
            }
        }
    }

    /// Deadline of the pending send, if one is scheduled.
    pub(crate) fn pending_deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    /// Claim the pending vector once its deadline has passed.
    pub(crate) fn take_due(&mut self, now: Instant) -> Option<JoystickVector> {
        match self.pending {
            Some((vector, deadline)) if deadline <= now => {
                self.pending = None;
                self.gate.mark_sent(now);
                Some(vector)
            }
            _ => None,
        }
    }
}
