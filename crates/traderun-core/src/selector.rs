//! Target eligibility and nearest-match selection.
//!
//! A target is eligible when it is an adult, awake, free (not trading with
//! another actor), of a wanted category, not cooling down, not
//! failure-suppressed, within the scan radius and within one level of the
//! active floor. Among eligible targets the nearest by squared distance
//! wins.

use std::collections::BTreeMap;

use traderun_registry::{CooldownTracker, FailureTracker};
use traderun_types::{TargetSnapshot, Timestamp, Vec3};

/// Levels above or below the floor that still count as the same floor.
const SAME_FLOOR_SLACK: u32 = 1;

/// The suppression registries and the moment they are consulted at.
#[derive(Debug)]
pub struct Suppression<'a> {
    /// Trade cooldowns.
    pub cooldowns: &'a mut CooldownTracker,
    /// Failure suppressions.
    pub failures: &'a mut FailureTracker,
    /// Current time.
    pub now: Timestamp,
    /// World time of day, for the cooldown night extension.
    pub time_of_day: Option<u64>,
}

impl Suppression<'_> {
    fn cooling(&mut self, target: &TargetSnapshot) -> bool {
        self.cooldowns.is_suppressed(target.id, self.now, self.time_of_day)
    }

    fn failed(&mut self, target: &TargetSnapshot) -> bool {
        self.failures.is_suppressed(target.id, self.now)
    }
}

/// How many targets on the floor survive each filter, for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionCounts {
    /// Adults awake on the floor.
    pub on_floor: usize,
    /// Of those, in a wanted category.
    pub category: usize,
    /// Of those, not cooling down.
    pub not_cooling: usize,
    /// Of those, not failure-suppressed.
    pub not_failed: usize,
    /// Of those, not engaged with another actor.
    pub eligible: usize,
}

impl core::fmt::Display for SelectionCounts {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "floor={} category={} !cooldown={} !failed={} eligible={}",
            self.on_floor, self.category, self.not_cooling, self.not_failed, self.eligible
        )
    }
}

/// Picks the next target to trade with.
#[derive(Debug, Clone)]
pub struct TargetSelector {
    categories: Vec<String>,
    scan_radius: f64,
    relocation_min: usize,
}

impl TargetSelector {
    /// Create a selector for the given categories (empty means any).
    pub fn new(categories: &[String], scan_radius: f64, relocation_min: u32) -> Self {
        let mut selector = Self {
            categories: Vec::new(),
            scan_radius,
            relocation_min: usize::try_from(relocation_min).unwrap_or(usize::MAX),
        };
        selector.set_categories(categories);
        selector
    }

    /// Replace the wanted categories. Names are lower-cased and a
    /// `namespace:` prefix is dropped.
    pub fn set_categories(&mut self, categories: &[String]) {
        self.categories = categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.rsplit_once(':').map_or(c, |(_, path)| path).to_ascii_lowercase())
            .collect();
        self.categories.sort();
        self.categories.dedup();
    }

    /// The wanted categories.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Whether more than one category is wanted.
    pub const fn has_multiple_categories(&self) -> bool {
        self.categories.len() > 1
    }

    /// Radius the host is asked for targets.
    pub const fn scan_radius(&self) -> f64 {
        self.scan_radius
    }

    /// Whether `target` carries a wanted category.
    pub fn category_ok(&self, target: &TargetSnapshot) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| target.has_category(c))
    }

    fn in_range(&self, target: &TargetSnapshot, agent: Vec3) -> bool {
        target.position.distance_sq(agent) <= self.scan_radius * self.scan_radius
    }

    fn available(&self, target: &TargetSnapshot, agent: Vec3) -> bool {
        !target.juvenile && !target.asleep && self.category_ok(target) && self.in_range(target, agent)
    }

    fn eligible(&self, target: &TargetSnapshot, agent: Vec3, suppression: &mut Suppression<'_>) -> bool {
        self.available(target, agent)
            && !target.engaged
            && !suppression.cooling(target)
            && !suppression.failed(target)
    }

    /// The nearest eligible target within one level of `floor`.
    pub fn find_best(
        &self,
        targets: &[TargetSnapshot],
        agent: Vec3,
        floor: i32,
        suppression: &mut Suppression<'_>,
    ) -> Option<TargetSnapshot> {
        let mut best: Option<(&TargetSnapshot, f64)> = None;
        for target in targets {
            if !on_floor(target, floor) || !self.eligible(target, agent, suppression) {
                continue;
            }
            let distance = target.position.distance_sq(agent);
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((target, distance));
            }
        }
        best.map(|(target, _)| target.clone())
    }

    /// Targets on the floor of a wanted category, ignoring cooldowns and
    /// failures.
    pub fn count_on_floor(&self, targets: &[TargetSnapshot], agent: Vec3, floor: i32) -> usize {
        targets
            .iter()
            .filter(|t| on_floor(t, floor) && self.available(t, agent))
            .count()
    }

    /// Whether some target on the floor is not cooling down. Failure
    /// suppression is ignored so a floor is not abandoned over a few
    /// unreachable targets.
    pub fn has_without_cooldown(
        &self,
        targets: &[TargetSnapshot],
        agent: Vec3,
        floor: i32,
        suppression: &mut Suppression<'_>,
    ) -> bool {
        targets
            .iter()
            .filter(|t| on_floor(t, floor) && self.available(t, agent))
            .any(|t| !suppression.cooling(t))
    }

    /// The level another group of eligible targets stands on, when more
    /// than one category is wanted.
    ///
    /// Levels within one of the agent's own are skipped, a level needs at
    /// least the relocation minimum of eligible targets, and ties go to the
    /// level whose nearest target is closest.
    pub fn best_level_to_move_to(
        &self,
        targets: &[TargetSnapshot],
        agent: Vec3,
        suppression: &mut Suppression<'_>,
    ) -> Option<i32> {
        if !self.has_multiple_categories() {
            return None;
        }
        let agent_level = agent.level();
        // level -> (count, nearest squared distance)
        let mut per_level: BTreeMap<i32, (usize, f64)> = BTreeMap::new();
        for target in targets {
            let level = target.level();
            if level.abs_diff(agent_level) <= SAME_FLOOR_SLACK {
                continue;
            }
            if !self.eligible(target, agent, suppression) {
                continue;
            }
            let distance = target.position.distance_sq(agent);
            let entry = per_level.entry(level).or_insert((0, f64::INFINITY));
            entry.0 = entry.0.saturating_add(1);
            entry.1 = entry.1.min(distance);
        }
        per_level
            .into_iter()
            .filter(|(_, (count, _))| *count >= self.relocation_min)
            .min_by(|(_, (_, a)), (_, (_, b))| a.total_cmp(b))
            .map(|(level, _)| level)
    }

    /// Per-filter counts on the floor, for diagnostics.
    pub fn counts(
        &self,
        targets: &[TargetSnapshot],
        agent: Vec3,
        floor: i32,
        suppression: &mut Suppression<'_>,
    ) -> SelectionCounts {
        let mut counts = SelectionCounts::default();
        for target in targets {
            if target.juvenile || target.asleep || !on_floor(target, floor) || !self.in_range(target, agent) {
                continue;
            }
            counts.on_floor = counts.on_floor.saturating_add(1);
            if !self.category_ok(target) {
                continue;
            }
            counts.category = counts.category.saturating_add(1);
            if suppression.cooling(target) {
                continue;
            }
            counts.not_cooling = counts.not_cooling.saturating_add(1);
            if suppression.failed(target) {
                continue;
            }
            counts.not_failed = counts.not_failed.saturating_add(1);
            if !target.engaged {
                counts.eligible = counts.eligible.saturating_add(1);
            }
        }
        counts
    }
}

/// The nearest adult target of any category, cooldown or level. Used as a
/// waypoint when a walk to storage makes no progress.
pub fn nearest_any_adult(targets: &[TargetSnapshot], agent: Vec3) -> Option<&TargetSnapshot> {
    targets
        .iter()
        .filter(|t| !t.juvenile)
        .min_by(|a, b| a.position.distance_sq(agent).total_cmp(&b.position.distance_sq(agent)))
}

fn on_floor(target: &TargetSnapshot, floor: i32) -> bool {
    target.level().abs_diff(floor) <= SAME_FLOOR_SLACK
}
