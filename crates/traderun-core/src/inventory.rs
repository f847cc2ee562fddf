//! Counting helpers over the agent's inventory.

use std::collections::BTreeMap;

use traderun_types::{ItemId, ItemStack};

/// Number of empty slots.
pub fn empty_slots(slots: &[Option<ItemStack>]) -> u32 {
    let empty = slots
        .iter()
        .filter(|s| s.as_ref().is_none_or(|stack| stack.count == 0))
        .count();
    u32::try_from(empty).unwrap_or(u32::MAX)
}

/// Total count of `item`.
pub fn count_item(slots: &[Option<ItemStack>], item: &ItemId) -> u32 {
    slots
        .iter()
        .flatten()
        .filter(|stack| &stack.item == item)
        .fold(0_u32, |sum, stack| sum.saturating_add(stack.count))
}

/// Count of every item kind held.
pub fn item_counts(slots: &[Option<ItemStack>]) -> BTreeMap<ItemId, u32> {
    let mut counts = BTreeMap::new();
    for stack in slots.iter().flatten().filter(|s| s.count > 0) {
        let count = counts.entry(stack.item.clone()).or_insert(0_u32);
        *count = count.saturating_add(stack.count);
    }
    counts
}

/// Whether some item kind is held in a larger number than in `before`.
/// A trade that pays out in a new item is detected even when it consumed
/// more than it gave.
pub fn gained_items(before: &BTreeMap<ItemId, u32>, slots: &[Option<ItemStack>]) -> bool {
    item_counts(slots)
        .iter()
        .any(|(item, count)| before.get(item).is_none_or(|had| count > had))
}

/// [`count_item`] for an optional item; `None` counts as zero.
pub fn count_known(slots: &[Option<ItemStack>], item: Option<&ItemId>) -> u32 {
    item.map_or(0, |item| count_item(slots, item))
}
