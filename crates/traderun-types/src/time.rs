//! Wall-clock timestamps and the timer value types every watchdog uses.
//!
//! The controller never blocks: each deadline is a stored [`Timestamp`]
//! compared against the current time once per tick. All arithmetic
//! saturates, so a clock that jumps backwards reads as "no time elapsed"
//! rather than wrapping.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw millisecond count.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Return the raw millisecond count.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// This timestamp shifted forward by `millis`, saturating.
    pub const fn plus(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Milliseconds from `earlier` to `self`, zero if `earlier` is later.
    pub const fn millis_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// A running stopwatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    started_at: Timestamp,
}

impl Timer {
    /// Start a timer at `now`.
    pub const fn start(now: Timestamp) -> Self {
        Self { started_at: now }
    }

    /// When the timer was (re)started.
    pub const fn started_at(self) -> Timestamp {
        self.started_at
    }

    /// Milliseconds since the timer was started.
    pub const fn elapsed(self, now: Timestamp) -> u64 {
        now.millis_since(self.started_at)
    }

    /// Whether at least `span` milliseconds have passed.
    pub const fn has_elapsed(self, now: Timestamp, span: u64) -> bool {
        self.elapsed(now) >= span
    }

    /// Milliseconds left until `span` has passed, zero once it has.
    pub const fn remaining(self, now: Timestamp, span: u64) -> u64 {
        span.saturating_sub(self.elapsed(now))
    }

    /// Restart the timer at `now`.
    pub const fn restart(&mut self, now: Timestamp) {
        self.started_at = now;
    }
}

/// A point in time after which something is allowed (or overdue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Deadline {
    at: Timestamp,
}

impl Deadline {
    /// A deadline that has always passed.
    pub const PASSED: Self = Self { at: Timestamp::ZERO };

    /// A deadline `span` milliseconds after `now`.
    pub const fn after(now: Timestamp, span: u64) -> Self {
        Self { at: now.plus(span) }
    }

    /// A deadline at an absolute instant.
    pub const fn at(at: Timestamp) -> Self {
        Self { at }
    }

    /// The instant this deadline expires.
    pub const fn instant(self) -> Timestamp {
        self.at
    }

    /// Whether `now` is at or past the deadline.
    pub const fn is_reached(self, now: Timestamp) -> bool {
        now.0 >= self.at.0
    }

    /// Milliseconds left until the deadline, zero once reached.
    pub const fn remaining(self, now: Timestamp) -> u64 {
        self.at.millis_since(now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn timer_reports_elapsed_and_remaining() {
        let timer = Timer::start(Timestamp::from_millis(1_000));
        let now = Timestamp::from_millis(1_600);
        assert_eq!(timer.elapsed(now), 600);
        assert!(!timer.has_elapsed(now, 800));
        assert_eq!(timer.remaining(now, 800), 200);
        assert!(timer.has_elapsed(Timestamp::from_millis(1_800), 800));
    }

    #[test]
    fn backwards_clock_reads_as_zero_elapsed() {
        let timer = Timer::start(Timestamp::from_millis(5_000));
        assert_eq!(timer.elapsed(Timestamp::from_millis(4_000)), 0);
    }

    #[test]
    fn deadline_is_reached_at_its_instant() {
        let deadline = Deadline::after(Timestamp::from_millis(100), 50);
        assert!(!deadline.is_reached(Timestamp::from_millis(149)));
        assert!(deadline.is_reached(Timestamp::from_millis(150)));
        assert_eq!(deadline.remaining(Timestamp::from_millis(120)), 30);
        assert!(Deadline::PASSED.is_reached(Timestamp::ZERO));
    }

    #[test]
    fn plus_saturates() {
        assert_eq!(Timestamp(u64::MAX).plus(10), Timestamp(u64::MAX));
    }
}
