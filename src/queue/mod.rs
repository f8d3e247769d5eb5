//! Per-stream playout queues
//!
//! A [`PlayoutQueue`] buffers units between the receive path and the render
//! driver and applies the backpressure policy:
//!
//! - timed units stay sorted by PTS, untimed units (PTS 0) go to the tail and
//!   are never gated
//! - the head is gated by the shared [`SyncClock`](crate::clock::SyncClock)
//! - stale heads are dropped (or partially skipped)
//! - the buffered span is capped by evicting from the head
//! - a head blocked for too long with a deep queue behind it is released anyway
//!
//! The queue itself is a plain value; each player wraps its queue in one mutex.

mod playout;
mod stats;

pub use playout::PlayoutQueue;
pub use stats::QueueStats;

use crate::types::EncodedUnit;

/// Anything that can sit in a playout queue.
pub trait Timed {
    /// Effective presentation timestamp; 0 means untimed.
    fn pts_us(&self) -> u64;

    /// Unplayed duration, for units consumed incrementally.
    fn remaining_us(&self) -> u64 {
        0
    }

    /// Whether the unit can anchor the clock under [`AnchorRule::KeyframeOnly`].
    fn is_keyframe(&self) -> bool {
        true
    }

    /// Advance past `us` of content. Returns `false` when nothing is left, in
    /// which case the queue drops the unit. Units that can't be partially
    /// consumed return `false`.
    fn skip_us(&mut self, _us: u64) -> bool {
        false
    }

    /// Whether a released unit is finished and can leave the queue.
    fn is_consumed(&self) -> bool {
        true
    }
}

impl Timed for EncodedUnit {
    fn pts_us(&self) -> u64 {
        EncodedUnit::pts_us(self)
    }

    fn is_keyframe(&self) -> bool {
        EncodedUnit::is_keyframe(self)
    }
}

/// Which head units may anchor an unanchored clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorRule {
    /// Any timed unit anchors (audio).
    AnyUnit,
    /// Only keyframes anchor; earlier units are undecodable and dropped (video).
    KeyframeOnly,
}
