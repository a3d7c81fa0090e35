//! Update rate control for frame subscriptions

use serde::{Deserialize, Serialize};

/// Update rate for frame subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Full speed from the camera (whatever the device produces)
    Native,

    /// Paced to at most this many frames per second
    /// If the requested rate exceeds the camera's nominal rate, Native is used
    Max(u32),
}

impl UpdateRate {
    /// Normalize rate against the camera's nominal frame rate
    /// Returns effective rate to use
    pub fn normalize(self, nominal_fps: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(fps) if fps as f64 >= nominal_fps => UpdateRate::Native,
            UpdateRate::Max(fps) => UpdateRate::Max(fps),
        }
    }

    /// Get pacing interval if needed
    pub fn pace_interval(self, nominal_fps: f64) -> Option<std::time::Duration> {
        match self.normalize(nominal_fps) {
            UpdateRate::Native => None,
            UpdateRate::Max(fps) => Some(std::time::Duration::from_secs_f64(1.0 / fps as f64)),
        }
    }
}
