//! Render pacing for decoded video subscriptions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a subscriber wants to see decoded frames.
///
/// Video has no backlog semantics: whatever rate is chosen, a subscriber only
/// ever sees the newest decoded image at the moment it is paced out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every decoded frame, as soon as it is published
    Native,

    /// At most `hz` frames per second (e.g. display refresh)
    Max(u32),
}

impl UpdateRate {
    /// Resolve against the stream frame rate; a cap at or above it is a no-op.
    pub fn normalize(self, frame_rate: f64) -> Self {
        match self {
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if f64::from(hz) >= frame_rate => UpdateRate::Native,
            other => other,
        }
    }

    /// Minimum spacing between emitted frames, if any.
    pub fn pacing_interval(self, frame_rate: f64) -> Option<Duration> {
        match self.normalize(frame_rate) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_above_frame_rate_is_native() {
        assert_eq!(UpdateRate::Max(60).normalize(30.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(30).normalize(30.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(0).normalize(30.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(10).normalize(30.0), UpdateRate::Max(10));
    }

    #[test]
    fn pacing_interval_for_cap() {
        assert_eq!(UpdateRate::Native.pacing_interval(30.0), None);
        assert_eq!(UpdateRate::Max(10).pacing_interval(30.0), Some(Duration::from_millis(100)));
    }
}
