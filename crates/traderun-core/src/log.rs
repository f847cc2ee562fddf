//! The controller's in-memory rolling log and abort diagnostics files.
//!
//! Every line the controller logs through `tracing` that matters for a
//! post-mortem is also appended here, so an abort report can carry the
//! last few decisions even when no subscriber is installed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use traderun_types::Timestamp;

use crate::clock::{format_file_stamp, format_time_of_day};
use crate::report::AbortReport;

/// A bounded, timestamped line buffer.
#[derive(Debug, Clone)]
pub struct RollingLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl RollingLog {
    /// A log keeping at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a line stamped with `at`, dropping the oldest when full.
    pub fn push(&mut self, at: Timestamp, message: impl AsRef<str>) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines
            .push_back(format!("{} {}", format_time_of_day(at), message.as_ref()));
    }

    /// The last `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    /// Number of lines held.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Write `report` to `traderun_error_<stamp>.txt` under `dir`.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the file
/// cannot be written.
pub fn write_diagnostics(dir: &Path, report: &AbortReport) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("traderun_error_{}.txt", format_file_stamp(report.at)));
    std::fs::write(&path, report.to_string())?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::{RunId, StateTag};

    use super::*;
    use crate::error::FailureKind;
    use crate::report::RunStats;

    #[test]
    fn oldest_lines_are_dropped() {
        let mut log = RollingLog::new(3);
        for i in 0..5_u64 {
            log.push(Timestamp::from_millis(i.saturating_mul(1_000)), format!("line {i}"));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent.first().unwrap(), "00:00:02.000 line 2");
        assert_eq!(log.recent(1), vec![String::from("00:00:04.000 line 4")]);
    }

    #[test]
    fn diagnostics_file_holds_report() {
        let run_id = RunId::new();
        let dir = std::env::temp_dir().join(format!("traderun-diag-{run_id}"));
        let report = AbortReport {
            run_id,
            at: Timestamp::from_millis(1_700_000_000_000),
            kind: FailureKind::Exhaustion,
            reason: String::from("rotations exhausted"),
            state: StateTag::RestockDetour,
            last_error: None,
            stats: RunStats::default(),
            log_tail: Vec::new(),
        };
        let path = write_diagnostics(&dir, &report).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "traderun_error_20231114_221320.txt"
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("rotations exhausted"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
