use serde::Serialize;

/// Lifetime counters of one playout queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct QueueStats {
    pub inserted: u64,
    pub rendered: u64,
    pub dropped_stale: u64,
    /// Heads advanced past their stale portion instead of being dropped
    pub partially_skipped: u64,
    pub dropped_pre_anchor: u64,
    pub trimmed: u64,
    pub bypassed: u64,
}

impl QueueStats {
    /// Units removed without being rendered.
    pub fn dropped(&self) -> u64 {
        self.dropped_stale + self.dropped_pre_anchor + self.trimmed
    }
}
