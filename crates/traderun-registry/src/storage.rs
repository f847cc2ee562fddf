//! Memory of input and output storage sites per location.
//!
//! Each location level has at most one site per [`Role`]. The agent's
//! reported level drifts by a block or two on stairs and slabs, so lookups
//! fall back to the nearest remembered level within a tolerance when the
//! exact level has no site.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use traderun_types::{BlockPos, ItemId, Role, StorageSite, Vec3};

/// Default level tolerance for [`StorageMemory::get`].
pub const DEFAULT_LEVEL_TOLERANCE: u32 = 3;

/// Tolerance used when looking up a remembered item.
const ITEM_LEVEL_TOLERANCE: u32 = 1;

/// Persisted form of the storage memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    /// Every remembered site.
    pub sites: Vec<StorageSite>,
}

/// Storage sites keyed by level and role.
#[derive(Debug, Clone)]
pub struct StorageMemory {
    sites: BTreeMap<(i32, Role), StorageSite>,
    level_tolerance: u32,
}

impl Default for StorageMemory {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_TOLERANCE)
    }
}

impl StorageMemory {
    /// Create an empty memory.
    pub const fn new(level_tolerance: u32) -> Self {
        Self {
            sites: BTreeMap::new(),
            level_tolerance,
        }
    }

    fn resolve_key(&self, level: i32, role: Role, tolerance: u32) -> Option<(i32, Role)> {
        if self.sites.contains_key(&(level, role)) {
            return Some((level, role));
        }
        self.sites
            .keys()
            .filter(|(l, r)| *r == role && l.abs_diff(level) <= tolerance)
            .min_by_key(|(l, _)| l.abs_diff(level))
            .copied()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Remember the site for `role` on `level`.
    ///
    /// A learned item survives re-registration, even onto a different
    /// container, unless `item` replaces it.
    pub fn set(&mut self, level: i32, role: Role, anchor: BlockPos, stance: Vec3, item: Option<ItemId>) {
        let item = item.or_else(|| {
            self.sites
                .get(&(level, role))
                .and_then(|existing| existing.item.clone())
        });
        info!(level, role = %role, anchor = %anchor, "Storage site set");
        self.sites.insert(
            (level, role),
            StorageSite {
                level,
                role,
                anchor,
                stance,
                item,
            },
        );
    }

    /// Record the item observed in the site for `role` near `level`.
    ///
    /// `None` never erases a learned item. Returns whether a site was
    /// updated.
    pub fn update_item(&mut self, level: i32, role: Role, item: Option<&ItemId>) -> bool {
        let Some(item) = item else {
            return false;
        };
        let Some(key) = self.resolve_key(level, role, self.level_tolerance) else {
            return false;
        };
        match self.sites.get_mut(&key) {
            Some(site) => {
                if site.item.as_ref() != Some(item) {
                    debug!(level = key.0, role = %role, item = %item, "Storage item learned");
                }
                site.item = Some(item.clone());
                true
            }
            None => false,
        }
    }

    /// Forget the learned item of one site. Returns whether a site existed.
    pub fn clear_item(&mut self, level: i32, role: Role) -> bool {
        match self.sites.get_mut(&(level, role)) {
            Some(site) => {
                site.item = None;
                true
            }
            None => false,
        }
    }

    /// Remove one site. A level whose sites are all removed is forgotten.
    pub fn remove(&mut self, level: i32, role: Role) -> Option<StorageSite> {
        self.sites.remove(&(level, role))
    }

    /// Remove both sites of one level.
    pub fn remove_level(&mut self, level: i32) {
        self.sites.retain(|(l, _), _| *l != level);
    }

    /// Forget everything.
    pub fn clear_all(&mut self) {
        self.sites.clear();
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The site for `role` on `level`, or the nearest one within the level
    /// tolerance.
    pub fn get(&self, level: i32, role: Role) -> Option<&StorageSite> {
        self.resolve_key(level, role, self.level_tolerance)
            .and_then(|key| self.sites.get(&key))
    }

    /// Item learned for `role` on `level` (or one level off).
    pub fn remembered_item(&self, level: i32, role: Role) -> Option<&ItemId> {
        self.resolve_key(level, role, ITEM_LEVEL_TOLERANCE)
            .and_then(|key| self.sites.get(&key))
            .and_then(|site| site.item.as_ref())
    }

    /// Whether both roles resolve for `level`.
    pub fn has_both(&self, level: i32) -> bool {
        self.get(level, Role::Input).is_some() && self.get(level, Role::Output).is_some()
    }

    /// The site for `role` whose level is closest to `level`, at any
    /// distance.
    pub fn nearest_with(&self, role: Role, level: i32) -> Option<&StorageSite> {
        self.sites
            .values()
            .filter(|s| s.role == role)
            .min_by_key(|s| s.level.abs_diff(level))
    }

    /// Whether any level has both roles.
    pub fn any_with_both(&self) -> bool {
        self.sites
            .keys()
            .any(|(level, role)| *role == Role::Input && self.sites.contains_key(&(*level, Role::Output)))
    }

    /// Levels that have a site for `role`, ascending.
    pub fn levels_with(&self, role: Role) -> Vec<i32> {
        self.sites
            .keys()
            .filter(|(_, r)| *r == role)
            .map(|(l, _)| *l)
            .collect()
    }

    /// Number of sites for `role`.
    pub fn count(&self, role: Role) -> usize {
        self.sites.keys().filter(|(_, r)| *r == role).count()
    }

    /// The site whose container is at `anchor`.
    pub fn find_by_anchor(&self, anchor: BlockPos) -> Option<&StorageSite> {
        self.sites.values().find(|s| s.anchor == anchor)
    }

    /// Every site in level order.
    pub fn iter(&self) -> impl Iterator<Item = &StorageSite> {
        self.sites.values()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Persistable view of every site.
    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot {
            sites: self.sites.values().cloned().collect(),
        }
    }

    /// Replace the contents with a loaded snapshot.
    pub fn restore(&mut self, snapshot: &StorageSnapshot) {
        self.sites = snapshot
            .sites
            .iter()
            .map(|s| ((s.level, s.role), s.clone()))
            .collect();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn paper() -> ItemId {
        ItemId::from("minecraft:paper")
    }

    fn make_memory() -> StorageMemory {
        let mut memory = StorageMemory::default();
        memory.set(64, Role::Input, BlockPos::new(1, 64, 1), Vec3::new(1.5, 64.0, 2.5), None);
        memory.set(64, Role::Output, BlockPos::new(3, 64, 1), Vec3::new(3.5, 64.0, 2.5), None);
        memory
    }

    #[test]
    fn get_falls_back_within_tolerance() {
        let memory = make_memory();
        assert_eq!(memory.get(66, Role::Input).unwrap().level, 64);
        assert_eq!(memory.get(61, Role::Output).unwrap().level, 64);
        assert!(memory.get(68, Role::Input).is_none());
    }

    #[test]
    fn exact_level_wins_over_nearby() {
        let mut memory = make_memory();
        memory.set(65, Role::Input, BlockPos::new(9, 65, 9), Vec3::ZERO, None);
        assert_eq!(memory.get(65, Role::Input).unwrap().anchor, BlockPos::new(9, 65, 9));
        assert_eq!(memory.get(64, Role::Input).unwrap().anchor, BlockPos::new(1, 64, 1));
    }

    #[test]
    fn none_never_erases_learned_item() {
        let mut memory = make_memory();
        assert!(memory.update_item(64, Role::Input, Some(&paper())));
        assert!(!memory.update_item(64, Role::Input, None));
        assert_eq!(memory.remembered_item(64, Role::Input), Some(&paper()));

        // Re-registering the same container keeps the item.
        memory.set(64, Role::Input, BlockPos::new(1, 64, 1), Vec3::ZERO, None);
        assert_eq!(memory.remembered_item(64, Role::Input), Some(&paper()));

        // So does moving the site to another container.
        memory.set(64, Role::Input, BlockPos::new(7, 64, 7), Vec3::ZERO, None);
        assert_eq!(memory.get(64, Role::Input).unwrap().anchor, BlockPos::new(7, 64, 7));
        assert_eq!(memory.remembered_item(64, Role::Input), Some(&paper()));

        // Only an explicit item replaces it.
        let wheat = ItemId::new("minecraft:wheat");
        memory.set(64, Role::Input, BlockPos::new(7, 64, 7), Vec3::ZERO, Some(wheat.clone()));
        assert_eq!(memory.remembered_item(64, Role::Input), Some(&wheat));
    }

    #[test]
    fn remembered_item_uses_narrow_tolerance() {
        let mut memory = make_memory();
        memory.update_item(64, Role::Input, Some(&paper()));
        assert_eq!(memory.remembered_item(65, Role::Input), Some(&paper()));
        assert!(memory.remembered_item(66, Role::Input).is_none());
        assert!(memory.clear_item(64, Role::Input));
        assert!(memory.remembered_item(64, Role::Input).is_none());
    }

    #[test]
    fn both_roles_tracked_per_level() {
        let mut memory = make_memory();
        memory.set(80, Role::Input, BlockPos::new(0, 80, 0), Vec3::ZERO, None);
        assert!(memory.has_both(64));
        assert!(!memory.has_both(80));
        assert!(memory.any_with_both());
        assert_eq!(memory.levels_with(Role::Input), vec![64, 80]);
        assert_eq!(memory.count(Role::Output), 1);
        assert_eq!(memory.nearest_with(Role::Output, 80).unwrap().level, 64);

        memory.remove(64, Role::Output);
        assert!(!memory.any_with_both());
        memory.remove_level(64);
        assert_eq!(memory.count(Role::Input), 1);
    }

    #[test]
    fn find_by_anchor_matches_container() {
        let memory = make_memory();
        let site = memory.find_by_anchor(BlockPos::new(3, 64, 1)).unwrap();
        assert_eq!(site.role, Role::Output);
        assert!(memory.find_by_anchor(BlockPos::new(0, 0, 0)).is_none());
    }

    #[test]
    fn snapshot_restores_sites() {
        let mut memory = make_memory();
        memory.update_item(64, Role::Input, Some(&paper()));
        let mut restored = StorageMemory::default();
        restored.restore(&memory.snapshot());
        assert_eq!(restored.get(64, Role::Input), memory.get(64, Role::Input));
        assert_eq!(restored.count(Role::Output), 1);
    }
}
