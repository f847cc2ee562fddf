//! Per-target trade cooldowns with optional night extension.
//!
//! After a trade the target is suppressed for a fixed duration. When the
//! night extension is enabled an expired entry is still held while the
//! world is in its night phase, because targets only restock during the
//! day. Entries are pruned lazily: a lookup that finds an entry eligible
//! for removal removes it.
//!
//! Removal rule: an entry is removed iff `now >= until` and (the extension
//! is disabled or it is currently day).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use traderun_types::{TargetId, Timestamp};

/// Length of one full day/night cycle in world ticks.
pub const DAY_LENGTH_TICKS: u64 = 24_000;

/// World tick at which night begins.
pub const NIGHT_START_TICKS: u64 = 12_500;

/// Whether the given world time is daytime.
///
/// A world without a day cycle (`None`) is always day.
pub fn is_day(time_of_day: Option<u64>) -> bool {
    time_of_day.is_none_or(|t| t.rem_euclid(DAY_LENGTH_TICKS) < NIGHT_START_TICKS)
}

/// One suppressed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    /// Nominal expiry.
    pub until: Timestamp,
    /// Whether the cooldown started during the day.
    pub started_during_day: bool,
    /// World time when the cooldown started, if the world has one.
    pub world_time_at_start: Option<u64>,
}

/// Status report for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    /// Milliseconds until nominal expiry (zero once expired).
    pub remaining_ms: u64,
    /// Expired but held because it is night.
    pub held_by_night: bool,
}

/// Persisted form: non-expired entries only, as id to expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSnapshot {
    /// Target id to nominal expiry.
    pub entries: BTreeMap<TargetId, Timestamp>,
}

/// Registry of per-target cooldowns.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    entries: BTreeMap<TargetId, CooldownEntry>,
    duration_ms: u64,
    night_extension: bool,
}

impl CooldownTracker {
    /// Create an empty tracker.
    pub const fn new(duration_ms: u64, night_extension: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            duration_ms,
            night_extension,
        }
    }

    /// Cooldown duration applied by [`start`](Self::start).
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Whether expired entries are held through the night.
    pub const fn night_extension(&self) -> bool {
        self.night_extension
    }

    /// Enable or disable the night extension.
    pub const fn set_night_extension(&mut self, enabled: bool) {
        self.night_extension = enabled;
    }

    /// Start (or restart) the cooldown for `id`.
    pub fn start(&mut self, id: TargetId, now: Timestamp, time_of_day: Option<u64>) {
        let entry = CooldownEntry {
            until: now.plus(self.duration_ms),
            started_during_day: is_day(time_of_day),
            world_time_at_start: time_of_day,
        };
        debug!(target_id = %id, until = entry.until.as_millis(), "Cooldown started");
        self.entries.insert(id, entry);
    }

    /// Whether `id` is suppressed; removes the entry once it is over.
    pub fn is_suppressed(&mut self, id: TargetId, now: Timestamp, time_of_day: Option<u64>) -> bool {
        let Some(entry) = self.entries.get(&id) else {
            return false;
        };
        if now < entry.until {
            return true;
        }
        if self.night_extension && !is_day(time_of_day) {
            return true;
        }
        self.entries.remove(&id);
        debug!(target_id = %id, "Cooldown expired");
        false
    }

    /// Read-only status for `id`, `None` when no entry exists.
    pub fn status(&self, id: TargetId, now: Timestamp, time_of_day: Option<u64>) -> Option<CooldownStatus> {
        self.entries.get(&id).map(|entry| {
            let remaining_ms = entry.until.millis_since(now);
            CooldownStatus {
                remaining_ms,
                held_by_night: remaining_ms == 0 && self.night_extension && !is_day(time_of_day),
            }
        })
    }

    /// Whether an entry exists for `id`, without pruning.
    pub fn contains(&self, id: TargetId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop the cooldown for one target. Returns whether one existed.
    pub fn clear(&mut self, id: TargetId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop every cooldown.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently held, including expired ones not yet
    /// pruned.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Remove every entry that is over at `now`.
    pub fn prune(&mut self, now: Timestamp, time_of_day: Option<u64>) {
        let hold_expired = self.night_extension && !is_day(time_of_day);
        self.entries
            .retain(|_, entry| now < entry.until || hold_expired);
    }

    /// Persistable view: entries whose nominal expiry is still ahead.
    pub fn snapshot(&self, now: Timestamp) -> CooldownSnapshot {
        CooldownSnapshot {
            entries: self
                .entries
                .iter()
                .filter(|(_, entry)| entry.until > now)
                .map(|(id, entry)| (*id, entry.until))
                .collect(),
        }
    }

    /// Replace the contents with a loaded snapshot, skipping expired entries.
    ///
    /// Loaded entries count as started during the day.
    pub fn restore(&mut self, snapshot: &CooldownSnapshot, now: Timestamp) {
        self.entries = snapshot
            .entries
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(id, until)| {
                (
                    *id,
                    CooldownEntry {
                        until: *until,
                        started_during_day: true,
                        world_time_at_start: None,
                    },
                )
            })
            .collect();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TEN_MINUTES: u64 = 600_000;
    const NOON: Option<u64> = Some(6_000);
    const MIDNIGHT: Option<u64> = Some(18_000);

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn day_boundaries() {
        assert!(is_day(Some(0)));
        assert!(is_day(Some(12_499)));
        assert!(!is_day(Some(12_500)));
        assert!(!is_day(Some(23_999)));
        assert!(is_day(Some(24_000)));
        assert!(is_day(None));
    }

    #[test]
    fn suppressed_until_expiry() {
        let mut tracker = CooldownTracker::new(TEN_MINUTES, false);
        let id = TargetId::new();
        tracker.start(id, at(0), NOON);
        assert!(tracker.is_suppressed(id, at(TEN_MINUTES.saturating_sub(1)), NOON));
        assert!(!tracker.is_suppressed(id, at(TEN_MINUTES), NOON));
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn night_extension_holds_expired_entry_until_day() {
        let mut tracker = CooldownTracker::new(TEN_MINUTES, true);
        let id = TargetId::new();
        tracker.start(id, at(0), MIDNIGHT);

        // Nominal expiry reached while still night.
        assert!(tracker.is_suppressed(id, at(TEN_MINUTES), MIDNIGHT));
        let status = tracker.status(id, at(TEN_MINUTES), MIDNIGHT).unwrap();
        assert!(status.held_by_night);

        // Next day start.
        assert!(!tracker.is_suppressed(id, at(TEN_MINUTES.saturating_add(1)), Some(24_000)));
        assert!(!tracker.contains(id));
    }

    #[test]
    fn extension_disabled_ignores_night() {
        let mut tracker = CooldownTracker::new(TEN_MINUTES, false);
        let id = TargetId::new();
        tracker.start(id, at(0), MIDNIGHT);
        assert!(!tracker.is_suppressed(id, at(TEN_MINUTES), MIDNIGHT));
    }

    #[test]
    fn snapshot_keeps_only_live_entries() {
        let mut tracker = CooldownTracker::new(1_000, false);
        let live = TargetId::new();
        let stale = TargetId::new();
        tracker.start(stale, at(0), NOON);
        tracker.start(live, at(5_000), NOON);

        let snapshot = tracker.snapshot(at(2_000));
        assert_eq!(snapshot.entries.len(), 1);
        assert!(snapshot.entries.contains_key(&live));

        let mut restored = CooldownTracker::new(1_000, false);
        restored.restore(&snapshot, at(2_000));
        assert!(restored.is_suppressed(live, at(5_500), NOON));
        assert!(!restored.is_suppressed(stale, at(2_000), NOON));
    }

    #[test]
    fn clear_removes_single_entry() {
        let mut tracker = CooldownTracker::new(TEN_MINUTES, true);
        let a = TargetId::new();
        let b = TargetId::new();
        tracker.start(a, at(0), NOON);
        tracker.start(b, at(0), NOON);
        assert!(tracker.clear(a));
        assert!(!tracker.clear(a));
        assert_eq!(tracker.count(), 1);
        tracker.clear_all();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn prune_respects_night_hold() {
        let mut tracker = CooldownTracker::new(100, true);
        let id = TargetId::new();
        tracker.start(id, at(0), NOON);
        tracker.prune(at(200), MIDNIGHT);
        assert_eq!(tracker.count(), 1);
        tracker.prune(at(200), NOON);
        assert_eq!(tracker.count(), 0);
    }
}
