//! Targets interacted with during the current run.

use std::collections::BTreeSet;

use traderun_types::TargetId;

/// Per-run set of targets that have been traded with (or closed on).
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    targets: BTreeSet<TargetId>,
}

impl VisitedSet {
    /// An empty set.
    pub const fn new() -> Self {
        Self {
            targets: BTreeSet::new(),
        }
    }

    /// Record an interaction. Returns `true` the first time `id` is seen.
    pub fn mark(&mut self, id: TargetId) -> bool {
        self.targets.insert(id)
    }

    /// Whether `id` has been interacted with this run.
    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.contains(&id)
    }

    /// Number of distinct targets visited.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether nothing has been visited yet.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Forget every visit.
    pub fn clear(&mut self) {
        self.targets.clear();
    }
}
