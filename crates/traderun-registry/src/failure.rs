//! Short-lived failure suppression for targets that could not be reached.
//!
//! Three windows exist: an ordinary failure, a longer "no valid approach"
//! failure (the surroundings will not change quickly), and an escalating
//! failure that uses the short window on its first occurrence and the long
//! one from the second consecutive occurrence on. Consecutive-failure
//! counts are global state: a successful interaction with any target
//! clears all of them.

use std::collections::BTreeMap;

use tracing::debug;
use traderun_types::{TargetId, Timestamp};

/// Default short suppression window.
pub const DEFAULT_SHORT_WINDOW_MS: u64 = 5_000;

/// Default long suppression window.
pub const DEFAULT_LONG_WINDOW_MS: u64 = 15_000;

/// Consecutive failures at which an escalating failure uses the long window.
const ESCALATION_THRESHOLD: u32 = 2;

/// A failure streak with no new failure for this long is forgotten.
const STREAK_EXPIRY_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct Streak {
    count: u32,
    last: Timestamp,
}

/// Per-target suppression windows and consecutive-failure counts.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    suppressed: BTreeMap<TargetId, Timestamp>,
    counts: BTreeMap<TargetId, Streak>,
    short_window_ms: u64,
    long_window_ms: u64,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_WINDOW_MS, DEFAULT_LONG_WINDOW_MS)
    }
}

impl FailureTracker {
    /// Create a tracker with the given windows.
    pub const fn new(short_window_ms: u64, long_window_ms: u64) -> Self {
        Self {
            suppressed: BTreeMap::new(),
            counts: BTreeMap::new(),
            short_window_ms,
            long_window_ms,
        }
    }

    fn suppress(&mut self, id: TargetId, now: Timestamp, window_ms: u64) {
        let until = now.plus(window_ms);
        // Never shorten an existing, longer suppression.
        let entry = self.suppressed.entry(id).or_insert(until);
        if *entry < until {
            *entry = until;
        }
    }

    /// Ordinary failure: short window.
    pub fn mark_failure(&mut self, id: TargetId, now: Timestamp) {
        debug!(target_id = %id, window_ms = self.short_window_ms, "Target failure");
        self.suppress(id, now, self.short_window_ms);
    }

    /// No valid approach tile exists: long window.
    pub fn mark_no_approach(&mut self, id: TargetId, now: Timestamp) {
        debug!(target_id = %id, window_ms = self.long_window_ms, "Target has no approach");
        self.suppress(id, now, self.long_window_ms);
    }

    /// Escalating failure. Returns `true` when this occurrence escalated to
    /// the long window.
    pub fn mark_escalating(&mut self, id: TargetId, now: Timestamp) -> bool {
        let streak = self.counts.entry(id).or_insert(Streak {
            count: 0,
            last: now,
        });
        streak.count = streak.count.saturating_add(1);
        streak.last = now;
        let count = streak.count;
        let escalated = count >= ESCALATION_THRESHOLD;
        let window = if escalated {
            self.long_window_ms
        } else {
            self.short_window_ms
        };
        debug!(target_id = %id, count, escalated, "Escalating target failure");
        self.suppress(id, now, window);
        escalated
    }

    /// Whether `id` is suppressed. Prunes the entry once it has expired,
    /// along with failure streaks that have gone stale.
    pub fn is_suppressed(&mut self, id: TargetId, now: Timestamp) -> bool {
        match self.suppressed.get(&id) {
            Some(until) if now < *until => true,
            Some(_) => {
                self.suppressed.remove(&id);
                self.prune_streaks(now);
                false
            }
            None => false,
        }
    }

    fn prune_streaks(&mut self, now: Timestamp) {
        self.counts
            .retain(|_, streak| now.millis_since(streak.last) < STREAK_EXPIRY_MS);
    }

    /// Expiry of the current suppression for `id`, if any.
    pub fn suppressed_until(&self, id: TargetId) -> Option<Timestamp> {
        self.suppressed.get(&id).copied()
    }

    /// Consecutive escalating failures recorded for `id`.
    pub fn failure_count(&self, id: TargetId) -> u32 {
        self.counts.get(&id).map_or(0, |streak| streak.count)
    }

    /// Number of suppression entries held (including expired, unpruned ones).
    pub fn suppressed_count(&self) -> usize {
        self.suppressed.len()
    }

    /// Reset every consecutive-failure count.
    pub fn clear_fail_counts(&mut self) {
        self.counts.clear();
    }

    /// Lift every suppression and reset every count.
    pub fn clear_all(&mut self) {
        self.suppressed.clear();
        self.counts.clear();
    }
}
