//! Registry of leveled trade locations.
//!
//! A [`Location`] is keyed by its level, one per level. Registering a
//! location scans the candidate targets around the agent, clusters them,
//! and records the dominant cluster's centroid and size. Category tags
//! accumulate across registrations of the same level.
//!
//! Transition edges connect levels for cross-level travel. Lookup prefers
//! an edge that starts near the current level and ends near the target
//! level; failing that, the edge from the current level that most reduces
//! the remaining vertical distance.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;
use traderun_types::{BlockPos, Location, TargetSnapshot, TransitionDirection, TransitionEdge, Vec3};

use crate::cluster;
use crate::error::RegistryError;

/// Default radius scanned for candidates when registering.
pub const DEFAULT_SCAN_RADIUS: f64 = 48.0;

/// Default proximity threshold for clustering.
pub const DEFAULT_CLUSTER_DISTANCE: f64 = 5.0;

/// Levels within this distance count as the same floor.
const SAME_FLOOR_SLACK: i32 = 1;

/// Persisted form of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    /// Every registered location.
    pub locations: Vec<Location>,
}

/// All registered locations, keyed by level.
#[derive(Debug, Clone)]
pub struct LocationRegistry {
    locations: BTreeMap<i32, Location>,
    scan_radius: f64,
    cluster_distance: f64,
}

impl Default for LocationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_RADIUS, DEFAULT_CLUSTER_DISTANCE)
    }
}

impl LocationRegistry {
    /// Create an empty registry.
    pub const fn new(scan_radius: f64, cluster_distance: f64) -> Self {
        Self {
            locations: BTreeMap::new(),
            scan_radius,
            cluster_distance,
        }
    }

    /// Radius scanned for candidates when registering.
    pub const fn scan_radius(&self) -> f64 {
        self.scan_radius
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register (or refresh) the location on `level`.
    ///
    /// Candidates further than the scan radius from `origin`, more than one
    /// level away, juvenile, or of another category are ignored. The
    /// category is added to the location's tags; `name`, when given,
    /// replaces the alias. Existing transition edges are kept.
    pub fn register(
        &mut self,
        level: i32,
        origin: Vec3,
        candidates: &[TargetSnapshot],
        category: &str,
        name: Option<&str>,
    ) -> Result<&Location, RegistryError> {
        let radius_sq = self.scan_radius * self.scan_radius;
        let points: Vec<Vec3> = candidates
            .iter()
            .filter(|c| !c.juvenile)
            .filter(|c| c.level().abs_diff(level) <= SAME_FLOOR_SLACK.unsigned_abs())
            .filter(|c| c.position.distance_sq(origin) <= radius_sq)
            .filter(|c| category.is_empty() || c.has_category(category))
            .map(|c| c.position)
            .collect();

        let anchor = cluster::dominant_cluster(&points, self.cluster_distance, level).ok_or_else(
            || RegistryError::NoCandidates {
                level,
                category: category.to_owned(),
            },
        )?;

        let location = self
            .locations
            .entry(level)
            .or_insert_with(|| Location::new(level, anchor));
        location.cluster = anchor;
        if !category.is_empty() {
            location.categories.insert(category.to_ascii_lowercase());
        }
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            location.name = Some(name.to_owned());
        }
        info!(
            level,
            members = anchor.members,
            centroid = %anchor.centroid,
            category,
            "Location registered"
        );
        Ok(location)
    }

    /// Insert a fully-formed location, replacing any on the same level.
    pub fn insert(&mut self, location: Location) {
        self.locations.insert(location.level, location);
    }

    /// Set the alias of the location on `level`.
    pub fn set_name(&mut self, level: i32, name: &str) -> Result<(), RegistryError> {
        let location = self
            .locations
            .get_mut(&level)
            .ok_or(RegistryError::LocationNotFound { level })?;
        location.name = Some(name.to_owned());
        Ok(())
    }

    /// Remove the location on `level`.
    pub fn remove(&mut self, level: i32) -> Option<Location> {
        self.locations.remove(&level)
    }

    /// Remove the location resolved by [`by_name`](Self::by_name).
    pub fn remove_by_name(&mut self, name: &str) -> Result<Location, RegistryError> {
        let level = self
            .by_name(name)
            .map(|l| l.level)
            .ok_or_else(|| RegistryError::UnknownName {
                name: name.to_owned(),
            })?;
        self.locations
            .remove(&level)
            .ok_or(RegistryError::LocationNotFound { level })
    }

    /// Remove every location.
    pub fn clear(&mut self) {
        self.locations.clear();
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The location registered on exactly `level`.
    pub fn get(&self, level: i32) -> Option<&Location> {
        self.locations.get(&level)
    }

    /// Every location in level order.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// Number of registered locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Resolve a name: alias match first, then category match, both
    /// case-insensitive.
    pub fn by_name(&self, query: &str) -> Option<&Location> {
        self.locations
            .values()
            .find(|l| l.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(query)))
            .or_else(|| {
                self.locations
                    .values()
                    .find(|l| l.categories.iter().any(|c| c.eq_ignore_ascii_case(query)))
            })
    }

    /// The best other location for any of `categories`: not within one
    /// level of `current_level`, most cluster members.
    pub fn best_for(&self, categories: &BTreeSet<String>, current_level: i32) -> Option<&Location> {
        self.locations
            .values()
            .filter(|l| l.level.abs_diff(current_level) > SAME_FLOOR_SLACK.unsigned_abs())
            .filter(|l| {
                categories.is_empty()
                    || l.categories
                        .iter()
                        .any(|c| categories.iter().any(|q| q.eq_ignore_ascii_case(c)))
            })
            .max_by_key(|l| l.cluster.members)
    }

    /// Whether `level` is on (within one level of) a registered location.
    ///
    /// An empty registry places no restriction, so it returns `true`.
    pub fn is_on_registered(&self, level: i32) -> bool {
        self.locations.is_empty()
            || self
                .locations
                .keys()
                .any(|k| k.abs_diff(level) <= SAME_FLOOR_SLACK.unsigned_abs())
    }

    /// The location whose level is closest to `level`.
    pub fn nearest_registered(&self, level: i32) -> Option<&Location> {
        self.locations.values().min_by_key(|l| l.level.abs_diff(level))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Record an edge from the location nearest `from_level` to `to_level`.
    ///
    /// An existing edge for the same pair of levels is replaced.
    pub fn add_transition(
        &mut self,
        from_level: i32,
        to_level: i32,
        anchor: BlockPos,
    ) -> Result<TransitionEdge, RegistryError> {
        let key = self
            .locations
            .keys()
            .copied()
            .filter(|k| k.abs_diff(from_level) <= SAME_FLOOR_SLACK.unsigned_abs())
            .min_by_key(|k| k.abs_diff(from_level))
            .ok_or(RegistryError::LocationNotFound { level: from_level })?;
        let location = self
            .locations
            .get_mut(&key)
            .ok_or(RegistryError::LocationNotFound { level: from_level })?;

        let edge = TransitionEdge {
            from_level: key,
            to_level,
            anchor,
            direction: TransitionDirection::between(key, to_level),
        };
        location
            .transitions
            .retain(|e| !(e.from_level == key && e.to_level == to_level));
        location.transitions.push(edge);
        info!(from = key, to = to_level, anchor = %anchor, "Transition added");
        Ok(edge)
    }

    /// Find the edge to take from `from_level` towards `to_level`.
    pub fn find_transition(&self, from_level: i32, to_level: i32) -> Option<TransitionEdge> {
        let slack = SAME_FLOOR_SLACK.unsigned_abs();
        let outgoing: Vec<TransitionEdge> = self
            .locations
            .values()
            .flat_map(|l| l.transitions.iter().copied())
            .filter(|e| e.from_level.abs_diff(from_level) <= slack)
            .collect();

        let direct = outgoing
            .iter()
            .filter(|e| e.to_level.abs_diff(to_level) <= slack)
            .min_by_key(|e| {
                e.from_level
                    .abs_diff(from_level)
                    .saturating_add(e.to_level.abs_diff(to_level))
            })
            .copied();
        if direct.is_some() {
            return direct;
        }

        let remaining = from_level.abs_diff(to_level);
        outgoing
            .iter()
            .filter(|e| e.to_level.abs_diff(to_level) < remaining)
            .min_by_key(|e| (e.to_level.abs_diff(to_level), e.from_level.abs_diff(from_level)))
            .copied()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Persistable view of the registry.
    pub fn snapshot(&self) -> LocationSnapshot {
        LocationSnapshot {
            locations: self.locations.values().cloned().collect(),
        }
    }

    /// Replace the contents with a loaded snapshot.
    pub fn restore(&mut self, snapshot: &LocationSnapshot) {
        self.locations = snapshot
            .locations
            .iter()
            .map(|l| (l.level, l.clone()))
            .collect();
    }
}
