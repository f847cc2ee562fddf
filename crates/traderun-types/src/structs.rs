//! Core records: items and slots, target snapshots, blocks, locations and
//! storage sites.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enums::{Role, SlotOwner, TransitionDirection};
use crate::geometry::{BlockPos, Vec3};
use crate::ids::TargetId;

// ---------------------------------------------------------------------------
// Items and slots
// ---------------------------------------------------------------------------

/// Namespaced item identifier, e.g. `minecraft:emerald`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Build an identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the namespace separator, for short log output.
    pub fn path(&self) -> &str {
        self.0.rsplit_once(':').map_or(self.0.as_str(), |(_, path)| path)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// A non-empty stack of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// What the stack holds.
    pub item: ItemId,
    /// How many.
    pub count: u32,
}

impl ItemStack {
    /// Build a stack.
    pub fn new(item: impl Into<ItemId>, count: u32) -> Self {
        Self {
            item: item.into(),
            count,
        }
    }
}

/// One slot of an open container screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    /// Index passed back to `transfer_slot`.
    pub index: usize,
    /// Whether the slot belongs to the agent or the container.
    pub owner: SlotOwner,
    /// Grid row on screen (0 is the top).
    pub row: u32,
    /// Grid column on screen (0 is the left).
    pub column: u32,
    /// Contents, `None` when empty.
    pub stack: Option<ItemStack>,
}

impl SlotView {
    /// Whether this slot holds `item`.
    pub fn holds(&self, item: &ItemId) -> bool {
        self.stack.as_ref().is_some_and(|s| &s.item == item && s.count > 0)
    }

    /// Number of items in the slot.
    pub fn count(&self) -> u32 {
        self.stack.as_ref().map_or(0, |s| s.count)
    }

    /// Whether the slot is empty.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

// ---------------------------------------------------------------------------
// Targets and blocks
// ---------------------------------------------------------------------------

/// What the host reports about one live target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Host-assigned identity.
    pub id: TargetId,
    /// Feet position.
    pub position: Vec3,
    /// Eye height above the feet.
    pub eye_height: f64,
    /// Category tag (profession), lower-case.
    pub category: Option<String>,
    /// Juvenile targets cannot trade.
    pub juvenile: bool,
    /// Sleeping targets cannot trade.
    pub asleep: bool,
    /// Already trading with another actor.
    pub engaged: bool,
}

impl TargetSnapshot {
    /// The level the target stands on.
    pub fn level(&self) -> i32 {
        self.position.level()
    }

    /// Eye position, used for aiming and line-of-sight.
    pub fn eye_position(&self) -> Vec3 {
        self.position.offset(0.0, self.eye_height, 0.0)
    }

    /// Whether this target carries the given category (case-insensitive).
    pub fn has_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(category))
    }
}

/// What the host reports about one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Registry name without namespace, e.g. `stone` or `red_bed`.
    pub name: String,
    /// Whether the block is empty air.
    pub air: bool,
    /// Whether the block fully obstructs movement.
    pub solid: bool,
    /// Height of the collision shape's top face (0.0 for none, 1.0 full).
    pub collision_top: f64,
}

impl BlockInfo {
    /// An air block.
    pub fn air() -> Self {
        Self {
            name: String::from("air"),
            air: true,
            solid: false,
            collision_top: 0.0,
        }
    }

    /// A full solid block.
    pub fn solid(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            air: false,
            solid: true,
            collision_top: 1.0,
        }
    }

    /// A non-solid block with a partial collision shape (carpet, slab).
    pub fn partial(name: impl Into<String>, collision_top: f64) -> Self {
        Self {
            name: name.into(),
            air: false,
            solid: false,
            collision_top,
        }
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Dominant target cluster recorded when a location was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterAnchor {
    /// Block at the cluster centroid, on the location's level.
    pub centroid: BlockPos,
    /// Number of targets in the cluster.
    pub members: u32,
}

/// A registered waypoint connecting two levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEdge {
    /// Level the edge starts on.
    pub from_level: i32,
    /// Level the edge leads to.
    pub to_level: i32,
    /// Where to walk to start the traversal.
    pub anchor: BlockPos,
    /// Up or down.
    pub direction: TransitionDirection,
}

/// A named, leveled area with its own targets and storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Level key; one location per level.
    pub level: i32,
    /// Optional alias, matched case-insensitively.
    pub name: Option<String>,
    /// Lower-case category tags, additive across registrations.
    pub categories: BTreeSet<String>,
    /// Cached cluster anchor.
    pub cluster: ClusterAnchor,
    /// Edges leaving this level.
    #[serde(default)]
    pub transitions: Vec<TransitionEdge>,
}

impl Location {
    /// A fresh location with no categories or edges.
    pub fn new(level: i32, cluster: ClusterAnchor) -> Self {
        Self {
            level,
            name: None,
            categories: BTreeSet::new(),
            cluster,
            transitions: Vec::new(),
        }
    }

    /// The alias, or `Y=<level>` when unnamed.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => format!("Y={}", self.level),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// A memorized container for one role on one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSite {
    /// Location level this site belongs to.
    pub level: i32,
    /// Input or output.
    pub role: Role,
    /// The container block.
    pub anchor: BlockPos,
    /// Where the agent stood when the site was registered.
    pub stance: Vec3,
    /// Item learned from the container's top-left slot.
    pub item: Option<ItemId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn item_path_strips_namespace() {
        assert_eq!(ItemId::from("minecraft:emerald").path(), "emerald");
        assert_eq!(ItemId::from("paper").path(), "paper");
    }

    #[test]
    fn display_name_falls_back_to_level() {
        let mut location = Location::new(64, ClusterAnchor::default());
        assert_eq!(location.display_name(), "Y=64");
        location.name = Some(String::from("Librarians"));
        assert_eq!(location.display_name(), "Librarians");
    }

    #[test]
    fn category_match_is_case_insensitive() {
        let target = TargetSnapshot {
            id: TargetId::new(),
            position: Vec3::new(0.5, 64.0, 0.5),
            eye_height: 1.62,
            category: Some(String::from("librarian")),
            juvenile: false,
            asleep: false,
            engaged: false,
        };
        assert!(target.has_category("Librarian"));
        assert!(!target.has_category("farmer"));
        assert_eq!(target.level(), 64);
    }

    #[test]
    fn slot_holds_only_matching_items() {
        let slot = SlotView {
            index: 0,
            owner: SlotOwner::External,
            row: 0,
            column: 0,
            stack: Some(ItemStack::new("minecraft:paper", 12)),
        };
        assert!(slot.holds(&ItemId::from("minecraft:paper")));
        assert!(!slot.holds(&ItemId::from("minecraft:emerald")));
        assert_eq!(slot.count(), 12);
    }
}
