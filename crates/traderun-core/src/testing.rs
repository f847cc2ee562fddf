//! A scripted host for unit tests.
//!
//! The world is a flat stone floor at level 63. The agent only moves when
//! a test moves it (or calls [`MockHost::walk`]), and every input and
//! container call is recorded.

use std::collections::BTreeMap;

use traderun_types::{
    AGENT_EYE_HEIGHT, BlockInfo, BlockPos, Facing, ItemId, ItemStack, Role, ScreenKind, Signal,
    SlotOwner, SlotView, TargetId, TargetSnapshot, ToleranceClass, Vec3,
};

use crate::config::TradeRunConfig;
use crate::controller::{Controller, Registries};
use crate::world::{ContainerInteraction, Host, InputDriver, Navigator, WorldQuery};

/// Slots in a single chest.
pub const CHEST_SLOTS: usize = 27;

/// Slots in the agent's main inventory.
pub const INVENTORY_SLOTS: usize = 36;

pub const INPUT_ANCHOR: BlockPos = BlockPos::new(-3, 64, 0);
pub const INPUT_STANCE: Vec3 = Vec3::new(-1.5, 64.0, 0.5);
pub const OUTPUT_ANCHOR: BlockPos = BlockPos::new(3, 64, 0);
pub const OUTPUT_STANCE: Vec3 = Vec3::new(1.5, 64.0, 0.5);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// An adult farmer on level 64.
pub fn make_target(x: f64, z: f64) -> TargetSnapshot {
    make_target_at(x, 64.0, z)
}

fn make_target_at(x: f64, y: f64, z: f64) -> TargetSnapshot {
    TargetSnapshot {
        id: TargetId::new(),
        position: Vec3::new(x, y, z),
        eye_height: 1.62,
        category: Some("farmer".to_owned()),
        juvenile: false,
        asleep: false,
        engaged: false,
    }
}

/// Register a farmer location on `level` with both storage sites set.
fn add_location(registries: &mut Registries, host: &MockHost, level: i32, name: &str) {
    let origin = Vec3::new(0.5, f64::from(level), 0.5);
    let registered = registries
        .locations
        .register(level, origin, &host.targets, "farmer", Some(name));
    assert!(registered.is_ok(), "fixture location {name} did not register");

    let lift = level.saturating_sub(64);
    registries.storage.set(
        level,
        Role::Input,
        INPUT_ANCHOR.offset(0, lift, 0),
        INPUT_STANCE.offset(0.0, f64::from(lift), 0.0),
        Some(ItemId::new("minecraft:wheat")),
    );
    registries.storage.set(
        level,
        Role::Output,
        OUTPUT_ANCHOR.offset(0, lift, 0),
        OUTPUT_STANCE.offset(0.0, f64::from(lift), 0.0),
        Some(ItemId::new("minecraft:emerald")),
    );
}

/// A controller with the location "farm" on level 64 (two farmers, input
/// wheat to the west, output emeralds to the east) and the agent between
/// the two sites.
pub fn make_setup() -> (Controller, MockHost) {
    let config = TradeRunConfig::default();
    let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
    host.targets = vec![make_target(10.5, 10.5), make_target(12.5, 10.5)];
    let mut registries = Registries::from_config(&config);
    add_location(&mut registries, &host, 64, "farm");
    (Controller::new(config, registries).with_seed(7), host)
}

/// [`make_setup`] plus the location "upper" on level 80 with its own
/// farmers and storage sites.
pub fn make_two_locations() -> (Controller, MockHost) {
    let config = TradeRunConfig::default();
    let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
    host.targets = vec![
        make_target(10.5, 10.5),
        make_target(12.5, 10.5),
        make_target_at(10.5, 80.0, 10.5),
        make_target_at(12.5, 80.0, 10.5),
    ];
    let mut registries = Registries::from_config(&config);
    add_location(&mut registries, &host, 64, "farm");
    add_location(&mut registries, &host, 80, "upper");
    (Controller::new(config, registries).with_seed(7), host)
}

#[derive(Debug, Default)]
pub struct MockNavigator {
    pub goals: Vec<(BlockPos, ToleranceClass)>,
    pub cancels: u32,
    pub pathing: bool,
}

impl Navigator for MockNavigator {
    fn set_goal(&mut self, goal: BlockPos, tolerance: ToleranceClass) -> bool {
        self.goals.push((goal, tolerance));
        self.pathing = true;
        true
    }

    fn cancel(&mut self) {
        self.cancels = self.cancels.saturating_add(1);
        self.pathing = false;
    }

    fn is_pathing(&self) -> bool {
        self.pathing
    }
}

#[derive(Debug)]
pub struct MockHost {
    pub agent: Vec3,
    pub facing: Facing,
    pub pressed: Vec<Signal>,
    pub blocks: BTreeMap<BlockPos, BlockInfo>,
    pub targets: Vec<TargetSnapshot>,
    pub inventory: Vec<Option<ItemStack>>,
    pub chest: Vec<Option<ItemStack>>,
    pub screen: Option<ScreenKind>,
    /// Open calls before the screen appears; `None` never opens.
    pub opens_after: Option<u32>,
    pub open_calls: u32,
    pub transfers: Vec<usize>,
    pub closes: u32,
    pub navigator: Option<MockNavigator>,
    pub paused: bool,
    pub override_requested: bool,
    pub time_of_day: Option<u64>,
}

impl MockHost {
    pub fn new(agent: Vec3) -> Self {
        Self {
            agent,
            facing: Facing::default(),
            pressed: Vec::new(),
            blocks: BTreeMap::new(),
            targets: Vec::new(),
            inventory: vec![None; INVENTORY_SLOTS],
            chest: vec![None; CHEST_SLOTS],
            screen: None,
            opens_after: Some(0),
            open_calls: 0,
            transfers: Vec::new(),
            closes: 0,
            navigator: None,
            paused: false,
            override_requested: false,
            time_of_day: Some(1_000),
        }
    }

    pub fn with_navigator(mut self) -> Self {
        self.navigator = Some(MockNavigator::default());
        self
    }

    pub fn is_pressed(&self, signal: Signal) -> bool {
        self.pressed.contains(&signal)
    }

    /// Move the agent `distance` along its facing when walking forward.
    pub fn walk(&mut self, distance: f64) {
        if !self.is_pressed(Signal::Forward) {
            return;
        }
        let yaw = (self.facing.yaw + 90.0).to_radians();
        self.agent = self.agent.offset(yaw.cos() * distance, 0.0, yaw.sin() * distance);
    }

    pub fn fill_inventory(&mut self, from: usize, stack: &ItemStack) {
        for slot in self.inventory.iter_mut().skip(from) {
            *slot = Some(stack.clone());
        }
    }
}

fn move_stack(from: &mut [Option<ItemStack>], index: usize, to: &mut [Option<ItemStack>]) {
    let Some(stack) = from.get_mut(index).and_then(Option::take) else {
        return;
    };
    let mut remaining = stack.count;
    for slot in to.iter_mut() {
        if remaining == 0 {
            break;
        }
        match slot {
            Some(existing) if existing.item == stack.item && existing.count < 64 => {
                let moved = remaining.min(64_u32.saturating_sub(existing.count));
                existing.count = existing.count.saturating_add(moved);
                remaining = remaining.saturating_sub(moved);
            }
            None => {
                *slot = Some(ItemStack::new(stack.item.clone(), remaining));
                remaining = 0;
            }
            Some(_) => {}
        }
    }
    if remaining > 0 {
        if let Some(slot) = from.get_mut(index) {
            *slot = Some(ItemStack::new(stack.item, remaining));
        }
    }
}

impl WorldQuery for MockHost {
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
        if let Some(block) = self.blocks.get(&pos) {
            return block.clone();
        }
        if pos.y == 63 {
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
        self.screen
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn override_requested(&self) -> bool {
        self.override_requested
    }
}

impl ContainerInteraction for MockHost {
    fn open_at(&mut self, _anchor: BlockPos) -> bool {
        self.open_calls = self.open_calls.saturating_add(1);
        if self.opens_after.is_some_and(|n| self.open_calls > n) {
            self.screen = Some(ScreenKind::Container);
        }
        true
    }

    fn slots(&self) -> Vec<SlotView> {
        if self.screen != Some(ScreenKind::Container) {
            return Vec::new();
        }
        let chest = self.chest.iter().enumerate().map(|(i, stack)| SlotView {
            index: i,
            owner: SlotOwner::External,
            row: u32::try_from(i / 9).unwrap_or(0),
            column: u32::try_from(i % 9).unwrap_or(0),
            stack: stack.clone(),
        });
        let agent = self.inventory.iter().enumerate().map(|(i, stack)| SlotView {
            index: CHEST_SLOTS.saturating_add(i),
            owner: SlotOwner::Agent,
            row: u32::try_from(i / 9).unwrap_or(0).saturating_add(3),
            column: u32::try_from(i % 9).unwrap_or(0),
            stack: stack.clone(),
        });
        chest.chain(agent).collect()
    }

    fn transfer_slot(&mut self, index: usize) {
        self.transfers.push(index);
        if index < CHEST_SLOTS {
            move_stack(&mut self.chest, index, &mut self.inventory);
        } else {
            move_stack(&mut self.inventory, index.saturating_sub(CHEST_SLOTS), &mut self.chest);
        }
    }

    fn close(&mut self) {
        self.closes = self.closes.saturating_add(1);
        self.screen = None;
    }
}

impl InputDriver for MockHost {
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

impl Host for MockHost {
    fn navigator(&mut self) -> Option<&mut dyn Navigator> {
        self.navigator.as_mut().map(|n| n as &mut dyn Navigator)
    }
}
