use std::collections::VecDeque;

use tracing::{debug, trace};

use super::{AnchorRule, QueueStats, Timed};
use crate::clock::SyncClock;
use crate::types::QueuePolicy;

/// PTS-ordered buffer gated by the shared playback clock.
///
/// Timed entries are kept in non-decreasing PTS order; untimed entries (PTS 0)
/// keep arrival order at the tail. Every policy action (stale drop, span trim,
/// stall bypass, pre-anchor drop) is counted in [`QueueStats`] and logged at
/// `debug`.
#[derive(Debug)]
pub struct PlayoutQueue<T> {
    name: &'static str,
    entries: VecDeque<T>,
    policy: QueuePolicy,
    anchor_rule: AnchorRule,
    blocked_since_us: Option<u64>,
    stats: QueueStats,
}

impl<T: Timed> PlayoutQueue<T> {
    pub fn new(name: &'static str, policy: QueuePolicy, anchor_rule: AnchorRule) -> Self {
        Self {
            name,
            entries: VecDeque::new(),
            policy,
            anchor_rule,
            blocked_since_us: None,
            stats: QueueStats::default(),
        }
    }

    /// Queue a unit and trim the buffered span if it grew past the ceiling.
    pub fn insert(&mut self, unit: T) {
        self.stats.inserted += 1;

        let pts = unit.pts_us();
        if pts == 0 {
            self.entries.push_back(unit);
            return;
        }

        let position = match self.entries.iter().rposition(|e| is_timed(e) && e.pts_us() <= pts) {
            Some(index) => index + 1,
            None => self.entries.iter().position(is_timed).unwrap_or(self.entries.len()),
        };
        self.entries.insert(position, unit);
        self.trim_span();
    }

    /// Release every unit the clock allows, up to the per-call budget.
    pub fn drain(&mut self, clock: &SyncClock) -> Vec<T> {
        let mut released = Vec::new();
        while released.len() < self.policy.max_drain_per_call {
            let Some(index) = self.ready_index(clock) else {
                break;
            };
            let Some(unit) = self.entries.remove(index) else {
                break;
            };
            self.stats.rendered += 1;
            trace!(queue = self.name, pts_us = unit.pts_us(), "released");
            released.push(unit);
        }
        released
    }

    /// Hand the next playable unit to `consume` without removing it first.
    ///
    /// The unit leaves the queue once [`Timed::is_consumed`] reports it
    /// finished, which lets the audio callback read a chunk across several
    /// calls. Returns `None` when nothing is playable.
    pub fn release_with<R>(&mut self, clock: &SyncClock, consume: impl FnOnce(&mut T) -> R) -> Option<R> {
        let index = self.ready_index(clock)?;
        let entry = self.entries.get_mut(index)?;
        let result = consume(entry);
        if entry.is_consumed() {
            self.entries.remove(index);
            self.stats.rendered += 1;
        }
        Some(result)
    }

    /// Find the entry that may be rendered now, applying the anchor rule, the
    /// stale-drop policy and the stall bypass to the head on the way.
    fn ready_index(&mut self, clock: &SyncClock) -> Option<usize> {
        loop {
            let Some(head) = self.entries.front_mut() else {
                self.blocked_since_us = None;
                return None;
            };

            let pts = head.pts_us();
            if pts == 0 {
                return Some(0);
            }

            let Some(bound) = clock.playable_pts_upper_bound() else {
                if self.anchor_rule == AnchorRule::AnyUnit || head.is_keyframe() {
                    clock.anchor_if_needed(pts, self.name);
                } else {
                    self.entries.pop_front();
                    self.stats.dropped_pre_anchor += 1;
                    trace!(queue = self.name, pts_us = pts, "dropped unit ahead of first keyframe");
                }
                continue;
            };

            let playable = bound.saturating_sub(self.policy.lead_trim_us);
            let lag = playable.saturating_sub(pts);
            if lag > self.policy.staleness_us {
                let excess = lag - self.policy.staleness_us;
                if head.skip_us(excess) {
                    self.stats.partially_skipped += 1;
                    self.blocked_since_us = None;
                    debug!(queue = self.name, pts_us = pts, skipped_us = excess, "skipped stale portion of head");
                    return Some(0);
                }
                self.entries.pop_front();
                self.stats.dropped_stale += 1;
                debug!(queue = self.name, pts_us = pts, lag_us = lag, "dropped stale head");
                continue;
            }

            if pts <= playable {
                self.blocked_since_us = None;
                return Some(0);
            }

            let now = clock.now_us();
            let blocked_since = *self.blocked_since_us.get_or_insert(now);
            let blocked_for = now.saturating_sub(blocked_since);
            if blocked_for >= self.policy.stall_threshold_us && self.entries.len() >= self.policy.stall_depth {
                self.stats.bypassed += 1;
                debug!(
                    queue = self.name,
                    pts_us = pts,
                    playable_us = playable,
                    blocked_for_us = blocked_for,
                    depth = self.entries.len(),
                    "stall bypass released gated head"
                );
                return Some(0);
            }

            // Untimed entries behind a gated head are still never gated.
            return self.entries.iter().position(|e| !is_timed(e));
        }
    }

    fn trim_span(&mut self) {
        while self.timed_len() >= 2 && self.span_us() > self.policy.span_ceiling_us {
            let Some(index) = self.entries.iter().position(is_timed) else {
                break;
            };
            if let Some(evicted) = self.entries.remove(index) {
                self.stats.trimmed += 1;
                debug!(
                    queue = self.name,
                    pts_us = evicted.pts_us(),
                    ceiling_us = self.policy.span_ceiling_us,
                    "span trim evicted oldest unit"
                );
            }
        }
    }

    /// Newest minus oldest timed PTS; 0 with fewer than two timed entries.
    pub fn span_us(&self) -> u64 {
        let mut timed = self.entries.iter().filter(|e| is_timed(*e));
        let Some(oldest) = timed.next() else {
            return 0;
        };
        let newest = timed.last().unwrap_or(oldest);
        newest.pts_us().saturating_sub(oldest.pts_us())
    }

    pub fn timed_len(&self) -> usize {
        self.entries.iter().filter(|e| is_timed(*e)).count()
    }

    /// Buffered duration still to be played, for incrementally consumed units.
    pub fn buffered_us(&self) -> u64 {
        self.entries.iter().map(Timed::remaining_us).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the last gate check found the head blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked_since_us.is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Drop every entry and the stall tracking; counters are kept.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(queue = self.name, dropped = self.entries.len(), "cleared");
        }
        self.entries.clear();
        self.blocked_since_us = None;
    }
}

fn is_timed<T: Timed>(entry: &T) -> bool {
    entry.pts_us() != 0
}
