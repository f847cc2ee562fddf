//! Run statistics and the reports the controller hands back to its caller.

use serde::{Deserialize, Serialize};
use traderun_types::{RunId, StateTag, Timestamp};

use crate::error::FailureKind;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Trades that changed the inventory.
    pub trades: u32,
    /// Trade screens closed without an exchange.
    pub no_trade_closes: u32,
    /// Completed restock sessions.
    pub restocks: u32,
    /// Completed dump sessions.
    pub dumps: u32,
    /// Location switches.
    pub rotations: u32,
    /// Distinct targets interacted with.
    pub visited: u32,
    /// Targets abandoned after a failure.
    pub abandoned: u32,
    /// Escape manoeuvres attempted.
    pub escapes: u32,
}

impl core::fmt::Display for RunStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "trades={} no_trade={} restocks={} dumps={} rotations={} visited={} abandoned={} escapes={}",
            self.trades,
            self.no_trade_closes,
            self.restocks,
            self.dumps,
            self.rotations,
            self.visited,
            self.abandoned,
            self.escapes,
        )
    }
}

/// What `start` made of the requested names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// The new run.
    pub run_id: RunId,
    /// Levels that will be cycled, in order.
    pub levels: Vec<i32>,
    /// Requested names that were dropped, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Whether the run begins by travelling to the first location.
    pub travelling: bool,
}

/// Why and where a run ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReport {
    /// The run that ended.
    pub run_id: RunId,
    /// When it ended.
    pub at: Timestamp,
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable reason.
    pub reason: String,
    /// State the controller was in.
    pub state: StateTag,
    /// Last navigation or container error, if any.
    pub last_error: Option<String>,
    /// Counters at the time of the abort.
    pub stats: RunStats,
    /// Tail of the rolling log.
    pub log_tail: Vec<String>,
}

impl core::fmt::Display for AbortReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "run {} aborted ({}): {}", self.run_id, self.kind, self.reason)?;
        writeln!(f, "state: {}", self.state)?;
        if let Some(error) = &self.last_error {
            writeln!(f, "last error: {error}")?;
        }
        writeln!(f, "stats: {}", self.stats)?;
        writeln!(f, "--- recent log ---")?;
        for line in &self.log_tail {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn abort_report_renders_reason_and_log() {
        let report = AbortReport {
            run_id: RunId::new(),
            at: Timestamp::ZERO,
            kind: FailureKind::Stall,
            reason: String::from("no movement for 120s"),
            state: StateTag::Approaching,
            last_error: Some(String::from("direct walk stuck")),
            stats: RunStats {
                trades: 4,
                ..RunStats::default()
            },
            log_tail: vec![String::from("00:00:01.000 seeking")],
        };
        let text = report.to_string();
        assert!(text.contains("aborted (stall): no movement for 120s"));
        assert!(text.contains("state: approaching"));
        assert!(text.contains("last error: direct walk stuck"));
        assert!(text.contains("trades=4"));
        assert!(text.ends_with("00:00:01.000 seeking\n"));
    }
}
