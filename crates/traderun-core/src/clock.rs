//! Time sources for the controller.
//!
//! The controller reads the time once per tick through a [`Clock`] and
//! stores only [`Timestamp`]s, so the same code runs against the wall
//! clock in production and a hand-advanced clock in tests.

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use traderun_types::Timestamp;

/// A source of the current time.
pub trait Clock {
    /// The current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from [`chrono::Utc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Clocks before 1970 read as the epoch.
        let millis = Utc::now().timestamp_millis();
        Timestamp::from_millis(u64::try_from(millis).unwrap_or(0))
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the controller.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Rc<Cell<u64>>,
}

impl ManualClock {
    /// A clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Rc::new(Cell::new(start.as_millis())),
        }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.millis.set(self.millis.get().saturating_add(millis));
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.millis.set(now.as_millis());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.get())
    }
}

/// Format a timestamp as `HH:MM:SS.mmm` (UTC) for log lines.
pub fn format_time_of_day(at: Timestamp) -> String {
    i64::try_from(at.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(
            || String::from("--:--:--.---"),
            |dt| dt.format("%H:%M:%S%.3f").to_string(),
        )
}

/// Format a timestamp as `YYYYmmdd_HHMMSS` (UTC) for file names.
pub fn format_file_stamp(at: Timestamp) -> String {
    i64::try_from(at.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(
            || String::from("00000000_000000"),
            |dt| dt.format("%Y%m%d_%H%M%S").to_string(),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(Timestamp::from_millis(1_000));
        let handle = clock.clone();
        handle.advance(250);
        assert_eq!(clock.now(), Timestamp::from_millis(1_250));
        clock.set(Timestamp::from_millis(5));
        assert_eq!(handle.now(), Timestamp::from_millis(5));
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock::new().now() > Timestamp::from_millis(1_577_836_800_000));
    }

    #[test]
    fn time_of_day_has_millisecond_precision() {
        // 1970-01-01 01:02:03.045
        let at = Timestamp::from_millis(3_723_045);
        assert_eq!(format_time_of_day(at), "01:02:03.045");
        assert_eq!(format_file_stamp(at), "19700101_010203");
    }
}
