//! A flat block-grid world that implements the controller's host traits.
//!
//! The world is a set of rectangular stone floors, chests standing on
//! them, and targets that never move. The agent walks along its facing
//! while `Forward` is held, or straight to the goal of the built-in
//! navigator when one is enabled; the navigator also carries the agent
//! between floors once it reaches a goal on another level. Holding `Use`
//! while facing a target within reach opens its trade screen; the world's
//! trade offer is taken once the screen has been open for
//! [`TRADE_DELAY_MS`].

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;
use traderun_core::world::{ContainerInteraction, Host, InputDriver, Navigator, WorldQuery};
use traderun_types::{
    AGENT_EYE_HEIGHT, BlockInfo, BlockPos, Facing, ItemId, ItemStack, ScreenKind, Signal,
    SlotOwner, SlotView, TargetId, TargetSnapshot, ToleranceClass, Vec3,
};

/// Slots in a chest.
pub const CHEST_SLOTS: usize = 27;

/// Slots in the agent's main inventory.
pub const INVENTORY_SLOTS: usize = 36;

/// Largest stack a slot holds.
pub const MAX_STACK: u32 = 64;

/// Walking speed in blocks per second.
pub const WALK_SPEED: f64 = 4.3;

/// Eye-to-eye reach of the interact signal.
const USE_REACH: f64 = 4.5;

/// Eye-to-centre reach for opening a chest.
const CONTAINER_REACH: f64 = 5.0;

/// Cosine of the widest angle between facing and target that still hits.
const AIM_COS: f64 = 0.85;

/// Eye height of a standing target.
const TARGET_EYE_HEIGHT: f64 = 1.62;

/// World ticks per second of the day cycle.
const DAY_TICKS_PER_SECOND: u64 = 20;

/// Length of a day in world ticks.
const DAY_LENGTH: u64 = 24_000;

/// Slots per container row.
const ROW_WIDTH: usize = 9;

/// How long a trade screen stays open before the offer is taken.
pub const TRADE_DELAY_MS: u64 = 150;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// A rectangular stone floor. The agent stands on it at `level`; the
/// stone itself is one block lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Floor {
    /// Level of the blocks standing on the floor.
    pub level: i32,
    /// Westmost covered column.
    pub min_x: i32,
    /// Eastmost covered column.
    pub max_x: i32,
    /// Northmost covered row.
    pub min_z: i32,
    /// Southmost covered row.
    pub max_z: i32,
}

impl Floor {
    fn covers(&self, x: i32, z: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }
}

/// What a target gives for what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOffer {
    /// Item paid.
    pub input: ItemId,
    /// Amount paid per trade.
    pub cost: u32,
    /// Item received.
    pub output: ItemId,
    /// Amount received per trade.
    pub reward: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Trade {
        target: TargetId,
        open_ms: u64,
        taken: bool,
    },
    Container(BlockPos),
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

/// A pathfinder that knows every way: it walks straight to the goal and
/// steps onto the goal's level on arrival.
#[derive(Debug, Default)]
pub struct SimNavigator {
    goal: Option<BlockPos>,
    /// Goals accepted so far.
    pub goals_set: u32,
}

impl Navigator for SimNavigator {
    fn set_goal(&mut self, goal: BlockPos, _tolerance: ToleranceClass) -> bool {
        self.goal = Some(goal);
        self.goals_set = self.goals_set.saturating_add(1);
        true
    }

    fn cancel(&mut self) {
        self.goal = None;
    }

    fn is_pathing(&self) -> bool {
        self.goal.is_some()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The simulated world and the agent in it.
#[derive(Debug)]
pub struct SimWorld {
    agent: Vec3,
    facing: Facing,
    pressed: Vec<Signal>,
    floors: Vec<Floor>,
    chests: BTreeMap<BlockPos, Vec<Option<ItemStack>>>,
    targets: Vec<TargetSnapshot>,
    offer: TradeOffer,
    inventory: Vec<Option<ItemStack>>,
    screen: Option<Screen>,
    navigator: Option<SimNavigator>,
    time_of_day: Option<u64>,
    paused: bool,
    override_requested: bool,
    trades: u32,
}

impl SimWorld {
    /// An empty world of `floors` with the agent at `agent`.
    pub fn new(floors: Vec<Floor>, agent: Vec3, offer: TradeOffer) -> Self {
        Self {
            agent,
            facing: Facing::default(),
            pressed: Vec::new(),
            floors,
            chests: BTreeMap::new(),
            targets: Vec::new(),
            offer,
            inventory: vec![None; INVENTORY_SLOTS],
            screen: None,
            navigator: None,
            time_of_day: None,
            paused: false,
            override_requested: false,
            trades: 0,
        }
    }

    /// Give the world a navigator.
    #[must_use]
    pub fn with_navigator(mut self) -> Self {
        self.navigator = Some(SimNavigator::default());
        self
    }

    /// Run a day cycle starting at `time_of_day`.
    #[must_use]
    pub const fn with_day_cycle(mut self, time_of_day: u64) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    /// Place an adult target of `category` at `position`.
    pub fn add_target(&mut self, position: Vec3, category: &str, juvenile: bool) -> TargetId {
        let id = TargetId::new();
        self.targets.push(TargetSnapshot {
            id,
            position,
            eye_height: TARGET_EYE_HEIGHT,
            category: Some(category.to_ascii_lowercase()),
            juvenile,
            asleep: false,
            engaged: false,
        });
        id
    }

    /// Place a chest at `anchor` holding `contents`, first slots first.
    pub fn add_chest(&mut self, anchor: BlockPos, contents: &[ItemStack]) {
        let mut slots = vec![None; CHEST_SLOTS];
        for (slot, stack) in slots.iter_mut().zip(contents) {
            *slot = Some(stack.clone());
        }
        self.chests.insert(anchor, slots);
    }

    /// Put `stack` into the agent's inventory, merging where possible.
    /// Returns what did not fit.
    pub fn give(&mut self, stack: &ItemStack) -> u32 {
        insert_stack(&mut self.inventory, &stack.item, stack.count)
    }

    /// Move the agent without walking.
    pub const fn teleport(&mut self, position: Vec3) {
        self.agent = position;
    }

    /// Pause or resume the host.
    pub const fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Flag that the operator has taken the controls.
    pub const fn request_override(&mut self) {
        self.override_requested = true;
    }

    /// Trades performed so far.
    pub const fn trades(&self) -> u32 {
        self.trades
    }

    /// Contents of the chest at `anchor`.
    pub fn chest(&self, anchor: BlockPos) -> Option<&[Option<ItemStack>]> {
        self.chests.get(&anchor).map(Vec::as_slice)
    }

    /// How many of `item` the agent carries.
    pub fn carried(&self, item: &ItemId) -> u32 {
        count_in(&self.inventory, item)
    }

    /// How many of `item` the chest at `anchor` holds.
    pub fn stored(&self, anchor: BlockPos, item: &ItemId) -> u32 {
        self.chest(anchor).map_or(0, |slots| count_in(slots, item))
    }

    /// Every target in the world.
    pub fn targets(&self) -> &[TargetSnapshot] {
        &self.targets
    }

    // -----------------------------------------------------------------------
    // Physics
    // -----------------------------------------------------------------------

    /// Advance the world by `dt_ms`.
    pub fn step(&mut self, dt_ms: u64) {
        if self.paused {
            return;
        }
        let seconds = f64::from(u32::try_from(dt_ms).unwrap_or(u32::MAX)) / 1_000.0;
        let distance = WALK_SPEED * seconds;

        let goal = self.navigator.as_ref().and_then(|n| n.goal);
        if let Some(goal) = goal {
            self.path_towards(goal, distance);
        } else if self.screen.is_none() && self.pressed.contains(&Signal::Forward) {
            self.walk_forward(distance);
        }

        if self.screen.is_none() && self.pressed.contains(&Signal::Use) {
            self.try_use();
        } else {
            self.advance_trade(dt_ms);
        }

        if let Some(time) = self.time_of_day {
            let ticks = dt_ms
                .saturating_mul(DAY_TICKS_PER_SECOND)
                .checked_div(1_000)
                .unwrap_or(0);
            self.time_of_day = time.saturating_add(ticks).checked_rem(DAY_LENGTH);
        }
    }

    fn path_towards(&mut self, goal: BlockPos, distance: f64) {
        let target = goal.bottom_center();
        let dx = target.x - self.agent.x;
        let dz = target.z - self.agent.z;
        let remaining = dx.hypot(dz);
        if remaining <= distance {
            let y = if self.floor_at(goal.x, goal.y, goal.z) {
                f64::from(goal.y)
            } else {
                self.agent.y
            };
            self.agent = Vec3::new(target.x, y, target.z);
            if let Some(navigator) = self.navigator.as_mut() {
                navigator.goal = None;
            }
            debug!(goal = %goal, "Navigator arrived");
            return;
        }
        let scale = distance / remaining;
        self.agent = self.agent.offset(dx * scale, 0.0, dz * scale);
        self.facing = Facing::towards(self.agent, target);
    }

    fn walk_forward(&mut self, distance: f64) {
        let angle = (self.facing.yaw + 90.0).to_radians();
        let next = self
            .agent
            .offset(angle.cos() * distance, 0.0, angle.sin() * distance);
        let feet = next.block_pos();
        if self.floor_at(feet.x, feet.y, feet.z) && !self.block_at(feet).solid {
            self.agent = next;
        }
    }

    /// The first live target the agent faces within reach opens a trade.
    fn try_use(&mut self) {
        let eye = self.agent_eye_position();
        let angle = (self.facing.yaw + 90.0).to_radians();
        let (fx, fz) = (angle.cos(), angle.sin());
        let hit = self
            .targets
            .iter()
            .filter(|t| !t.juvenile && !t.asleep)
            .filter(|t| t.eye_position().distance_sq(eye) <= USE_REACH * USE_REACH)
            .find(|t| {
                let dx = t.position.x - eye.x;
                let dz = t.position.z - eye.z;
                let length = dx.hypot(dz);
                length <= f64::EPSILON || dx.mul_add(fx, dz * fz) / length >= AIM_COS
            })
            .map(|t| t.id);
        if let Some(target) = hit {
            debug!(%target, "Trade screen opened");
            self.screen = Some(Screen::Trade {
                target,
                open_ms: 0,
                taken: false,
            });
        }
    }

    /// Take the offer once per screen, after it has been open a while.
    fn advance_trade(&mut self, dt_ms: u64) {
        let Some(Screen::Trade {
            target,
            open_ms,
            taken,
        }) = self.screen.as_mut()
        else {
            return;
        };
        *open_ms = open_ms.saturating_add(dt_ms);
        if *taken || *open_ms < TRADE_DELAY_MS {
            return;
        }
        *taken = true;
        let target = *target;

        let offer = &self.offer;
        if count_in(&self.inventory, &offer.input) < offer.cost {
            debug!(%target, "Nothing to pay with");
            return;
        }
        remove_items(&mut self.inventory, &offer.input, offer.cost);
        insert_stack(&mut self.inventory, &offer.output, offer.reward);
        self.trades = self.trades.saturating_add(1);
        debug!(%target, trades = self.trades, "Traded");
    }

    fn floor_at(&self, x: i32, level: i32, z: i32) -> bool {
        self.floors
            .iter()
            .any(|floor| floor.level == level && floor.covers(x, z))
    }
}

// ---------------------------------------------------------------------------
// Slot helpers
// ---------------------------------------------------------------------------

fn count_in(slots: &[Option<ItemStack>], item: &ItemId) -> u32 {
    slots
        .iter()
        .flatten()
        .filter(|stack| &stack.item == item)
        .fold(0_u32, |sum, stack| sum.saturating_add(stack.count))
}

/// Add `count` of `item`, topping up partial stacks first. Returns what
/// did not fit.
fn insert_stack(slots: &mut [Option<ItemStack>], item: &ItemId, count: u32) -> u32 {
    let mut remaining = count;
    for stack in slots.iter_mut().flatten().filter(|s| &s.item == item) {
        let moved = remaining.min(MAX_STACK.saturating_sub(stack.count));
        stack.count = stack.count.saturating_add(moved);
        remaining = remaining.saturating_sub(moved);
    }
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        if remaining == 0 {
            break;
        }
        let moved = remaining.min(MAX_STACK);
        *slot = Some(ItemStack::new(item.clone(), moved));
        remaining = remaining.saturating_sub(moved);
    }
    remaining
}

/// Take up to `count` of `item`, emptying slots that run out.
fn remove_items(slots: &mut [Option<ItemStack>], item: &ItemId, count: u32) {
    let mut remaining = count;
    for slot in slots.iter_mut() {
        if remaining == 0 {
            break;
        }
        let Some(stack) = slot.as_mut().filter(|s| &s.item == item) else {
            continue;
        };
        let taken = remaining.min(stack.count);
        stack.count = stack.count.saturating_sub(taken);
        remaining = remaining.saturating_sub(taken);
        if stack.count == 0 {
            *slot = None;
        }
    }
}

/// Quick-move the stack at `index` of `from` into `to`; whatever does not
/// fit stays behind.
fn move_stack(from: &mut [Option<ItemStack>], index: usize, to: &mut [Option<ItemStack>]) {
    let Some(stack) = from.get_mut(index).and_then(Option::take) else {
        return;
    };
    let left = insert_stack(to, &stack.item, stack.count);
    if left > 0 {
        if let Some(slot) = from.get_mut(index) {
            *slot = Some(ItemStack::new(stack.item, left));
        }
    }
}

fn slot_views(
    slots: &[Option<ItemStack>],
    owner: SlotOwner,
    first_index: usize,
    first_row: u32,
) -> impl Iterator<Item = SlotView> + '_ {
    slots.iter().enumerate().map(move |(i, stack)| {
        let row = i.checked_div(ROW_WIDTH).unwrap_or(0);
        let column = i.checked_rem(ROW_WIDTH).unwrap_or(0);
        SlotView {
            index: first_index.saturating_add(i),
            owner,
            row: u32::try_from(row).unwrap_or(0).saturating_add(first_row),
            column: u32::try_from(column).unwrap_or(0),
            stack: stack.clone(),
        }
    })
}

// ---------------------------------------------------------------------------
// Host traits
// ---------------------------------------------------------------------------

impl WorldQuery for SimWorld {
    fn agent_position(&self) -> Vec3 {
        self.agent
    }

    fn agent_eye_position(&self) -> Vec3 {
        self.agent.offset(0.0, AGENT_EYE_HEIGHT, 0.0)
    }

    fn entities_within(&self, center: Vec3, radius: f64) -> Vec<TargetSnapshot> {
        self.targets
            .iter()
            .filter(|t| t.position.distance_sq(center) <= radius * radius)
            .cloned()
            .collect()
    }

    fn block_at(&self, pos: BlockPos) -> BlockInfo {
        if self.chests.contains_key(&pos) {
            return BlockInfo::solid("chest");
        }
        if self.floor_at(pos.x, pos.y.saturating_add(1), pos.z) {
            BlockInfo::solid("stone")
        } else {
            BlockInfo::air()
        }
    }

    fn line_of_sight(&self, _from: Vec3, _to: Vec3) -> bool {
        true
    }

    fn time_of_day(&self) -> Option<u64> {
        self.time_of_day
    }

    fn inventory(&self) -> Vec<Option<ItemStack>> {
        self.inventory.clone()
    }

    fn open_screen(&self) -> Option<ScreenKind> {
        self.screen.map(|screen| match screen {
            Screen::Trade { .. } => ScreenKind::Trade,
            Screen::Container(_) => ScreenKind::Container,
        })
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn override_requested(&self) -> bool {
        self.override_requested
    }
}

impl ContainerInteraction for SimWorld {
    fn open_at(&mut self, anchor: BlockPos) -> bool {
        let reach = self.agent_eye_position().distance_sq(anchor.center());
        if self.screen.is_none()
            && self.chests.contains_key(&anchor)
            && reach <= CONTAINER_REACH * CONTAINER_REACH
        {
            self.screen = Some(Screen::Container(anchor));
        }
        true
    }

    fn slots(&self) -> Vec<SlotView> {
        let Some(Screen::Container(anchor)) = self.screen else {
            return Vec::new();
        };
        let Some(chest) = self.chests.get(&anchor) else {
            return Vec::new();
        };
        let chest_rows = u32::try_from(CHEST_SLOTS.checked_div(ROW_WIDTH).unwrap_or(0)).unwrap_or(0);
        slot_views(chest, SlotOwner::External, 0, 0)
            .chain(slot_views(
                &self.inventory,
                SlotOwner::Agent,
                CHEST_SLOTS,
                chest_rows,
            ))
            .collect()
    }

    fn transfer_slot(&mut self, index: usize) {
        let Some(Screen::Container(anchor)) = self.screen else {
            return;
        };
        let Some(chest) = self.chests.get_mut(&anchor) else {
            return;
        };
        if index < CHEST_SLOTS {
            move_stack(chest, index, &mut self.inventory);
        } else {
            move_stack(&mut self.inventory, index.saturating_sub(CHEST_SLOTS), chest);
        }
    }

    fn close(&mut self) {
        self.screen = None;
    }
}

impl InputDriver for SimWorld {
    fn press(&mut self, signal: Signal) {
        if !self.pressed.contains(&signal) {
            self.pressed.push(signal);
        }
    }

    fn release(&mut self, signal: Signal) {
        self.pressed.retain(|s| *s != signal);
    }

    fn release_all(&mut self) {
        self.pressed.clear();
    }

    fn set_facing(&mut self, facing: Facing) {
        self.facing = facing;
    }
}

impl Host for SimWorld {
    fn navigator(&mut self) -> Option<&mut dyn Navigator> {
        self.navigator.as_mut().map(|n| n as &mut dyn Navigator)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn make_world() -> SimWorld {
        let floor = Floor {
            level: 64,
            min_x: -10,
            max_x: 10,
            min_z: -10,
            max_z: 10,
        };
        let offer = TradeOffer {
            input: ItemId::from("minecraft:wheat"),
            cost: 20,
            output: ItemId::from("minecraft:emerald"),
            reward: 1,
        };
        SimWorld::new(vec![floor], Vec3::new(0.5, 64.0, 0.5), offer)
    }

    #[test]
    fn floor_blocks_sit_one_below_the_level() {
        let mut world = make_world();
        world.add_chest(BlockPos::new(3, 64, 0), &[]);
        assert!(world.block_at(BlockPos::new(0, 63, 0)).solid);
        assert!(world.block_at(BlockPos::new(0, 64, 0)).air);
        assert!(world.block_at(BlockPos::new(11, 63, 0)).air);
        assert_eq!(world.block_at(BlockPos::new(3, 64, 0)).name, "chest");
    }

    #[test]
    fn forward_walks_along_the_facing_and_stops_at_the_edge() {
        let mut world = make_world();
        world.set_facing(Facing::towards(world.agent, Vec3::new(20.5, 64.0, 0.5)));
        world.press(Signal::Forward);
        world.step(1_000);
        assert!((world.agent.x - 4.8).abs() < 1e-6);
        for _ in 0..5 {
            world.step(1_000);
        }
        assert!(world.agent.x < 11.0);
    }

    #[test]
    fn navigator_carries_the_agent_to_another_level() {
        let mut world = make_world().with_navigator();
        world.floors.push(Floor {
            level: 80,
            min_x: 0,
            max_x: 5,
            min_z: 0,
            max_z: 5,
        });
        let goal = BlockPos::new(2, 80, 0);
        world.navigator().unwrap().set_goal(goal, ToleranceClass::Unrestricted);
        world.step(1_000);
        assert_eq!(world.agent.level(), 80);
        assert!(!world.navigator.as_ref().unwrap().is_pathing());
    }

    #[test]
    fn use_on_a_faced_target_trades_once() {
        let mut world = make_world();
        world.give(&ItemStack::new("minecraft:wheat", 64));
        let target = Vec3::new(2.5, 64.0, 0.5);
        world.add_target(target, "Farmer", false);
        world.set_facing(Facing::towards(world.agent_eye_position(), target));
        world.press(Signal::Use);
        world.step(50);
        assert_eq!(world.open_screen(), Some(ScreenKind::Trade));
        assert_eq!(world.trades(), 0);
        for _ in 0..10 {
            world.step(50);
        }
        assert_eq!(world.trades(), 1);
        assert_eq!(world.carried(&ItemId::from("minecraft:wheat")), 44);
        assert_eq!(world.carried(&ItemId::from("minecraft:emerald")), 1);
    }

    #[test]
    fn use_facing_away_does_nothing() {
        let mut world = make_world();
        world.add_target(Vec3::new(2.5, 64.0, 0.5), "farmer", false);
        world.set_facing(Facing::towards(world.agent, Vec3::new(-5.0, 64.0, 0.5)));
        world.press(Signal::Use);
        world.step(50);
        assert_eq!(world.open_screen(), None);
    }

    #[test]
    fn chest_transfers_merge_and_overflow() {
        let mut world = make_world();
        let anchor = BlockPos::new(2, 64, 0);
        world.add_chest(anchor, &[ItemStack::new("minecraft:wheat", 64)]);
        world.give(&ItemStack::new("minecraft:wheat", 10));
        assert!(world.open_at(anchor));
        assert_eq!(world.open_screen(), Some(ScreenKind::Container));
        assert_eq!(world.slots().len(), CHEST_SLOTS + INVENTORY_SLOTS);

        world.transfer_slot(0);
        let wheat = ItemId::from("minecraft:wheat");
        assert_eq!(world.carried(&wheat), 74);
        assert_eq!(world.stored(anchor, &wheat), 0);

        world.transfer_slot(CHEST_SLOTS);
        assert_eq!(world.stored(anchor, &wheat), 64);
        world.close();
        assert!(world.slots().is_empty());
    }

    #[test]
    fn distant_chest_does_not_open() {
        let mut world = make_world();
        let anchor = BlockPos::new(9, 64, 9);
        world.add_chest(anchor, &[]);
        world.open_at(anchor);
        assert_eq!(world.open_screen(), None);
    }

    #[test]
    fn day_cycle_wraps() {
        let mut world = make_world().with_day_cycle(23_990);
        world.step(1_000);
        assert_eq!(world.time_of_day(), Some(10));
    }
}
