//! Shared playback clock
//!
//! Anchored once per playback session by whichever stream produces its first
//! usable unit, then advanced purely by local monotonic time. Later remote
//! timestamps never move the anchor, so bursty delivery cannot drift it.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

/// Local monotonic time in microseconds.
pub trait TimeSource: Send + Sync + 'static {
    fn now_us(&self) -> u64;
}

/// Wall-independent time source backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeSource {
    epoch: Instant,
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Remote PTS paired with the local instant it was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncAnchor {
    pub remote_pts_us: u64,
    pub local_monotonic_us: u64,
}

/// Playback clock shared by the audio and video drivers.
///
/// All operations take one short lock; callers need no further
/// synchronization.
pub struct SyncClock {
    anchor: Mutex<Option<SyncAnchor>>,
    time: Arc<dyn TimeSource>,
    target_latency_us: u64,
}

impl std::fmt::Debug for SyncClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClock")
            .field("anchor", &*self.anchor.lock())
            .field("target_latency_us", &self.target_latency_us)
            .finish()
    }
}

impl SyncClock {
    pub fn new(target_latency_us: u64) -> Self {
        Self::with_time_source(target_latency_us, Arc::new(MonotonicTimeSource::default()))
    }

    pub fn with_time_source(target_latency_us: u64, time: Arc<dyn TimeSource>) -> Self {
        Self { anchor: Mutex::new(None), time, target_latency_us }
    }

    /// Anchor to `remote_pts_us` unless already anchored.
    ///
    /// A zero PTS never anchors. Returns `true` if this call set the anchor.
    pub fn anchor_if_needed(&self, remote_pts_us: u64, source: &str) -> bool {
        if remote_pts_us == 0 {
            return false;
        }

        let mut anchor = self.anchor.lock();
        if anchor.is_some() {
            return false;
        }

        *anchor = Some(SyncAnchor { remote_pts_us, local_monotonic_us: self.time.now_us() });
        info!(
            remote_pts_us,
            source,
            target_latency_us = self.target_latency_us,
            "playback clock anchored"
        );
        true
    }

    /// Highest PTS any stream may render now, or `None` before anchoring.
    pub fn playable_pts_upper_bound(&self) -> Option<u64> {
        let anchor = (*self.anchor.lock())?;
        let elapsed = self.time.now_us().saturating_sub(anchor.local_monotonic_us);
        Some(anchor.remote_pts_us.saturating_add(elapsed).saturating_add(self.target_latency_us))
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor.lock().is_some()
    }

    pub fn anchor(&self) -> Option<SyncAnchor> {
        *self.anchor.lock()
    }

    /// Forget the anchor; the next usable unit re-anchors.
    pub fn reset(&self) {
        if self.anchor.lock().take().is_some() {
            info!("playback clock reset");
        }
    }

    pub fn now_us(&self) -> u64 {
        self.time.now_us()
    }

    pub fn target_latency_us(&self) -> u64 {
        self.target_latency_us
    }
}
