//! Scenario files.
//!
//! A scenario is a YAML document describing the world (floors, chests,
//! targets, the trade offer), the locations an operator would register in
//! it, and the names to start a run over. See `scenarios/farm.yaml` for a
//! complete example.

use std::path::Path;

use serde::Deserialize;
use traderun_types::{BlockPos, ItemId, ItemStack, Vec3};

use crate::error::SimError;
use crate::world::{Floor, MAX_STACK, SimWorld, TradeOffer};

/// A complete scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Display name.
    pub name: String,

    /// Seed of the controller's random source.
    #[serde(default)]
    pub seed: u64,

    /// Simulated milliseconds per tick.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Simulated run length.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Wall-clock speed-up of the binary; 0 runs as fast as possible.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Whether the host offers a pathfinder.
    #[serde(default = "default_true")]
    pub navigator: bool,

    /// Starting time of day in world ticks; no day cycle when absent.
    #[serde(default)]
    pub time_of_day: Option<u64>,

    /// Where the agent starts.
    pub agent: Vec3,

    /// Walkable floors.
    pub floors: Vec<Floor>,

    /// What every target trades.
    pub offer: OfferSpec,

    /// Target entities.
    #[serde(default)]
    pub targets: Vec<TargetSpec>,

    /// Chests and their contents.
    #[serde(default)]
    pub chests: Vec<ChestSpec>,

    /// The agent's starting inventory.
    #[serde(default)]
    pub inventory: Vec<StackSpec>,

    /// Locations to register before the run.
    #[serde(default)]
    pub locations: Vec<LocationSpec>,

    /// Location names passed to `start`, in order.
    pub run: Vec<String>,
}

/// A target entity.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    /// Feet position.
    pub position: Vec3,
    /// Category tag.
    pub category: String,
    /// Juvenile targets never trade.
    #[serde(default)]
    pub juvenile: bool,
}

/// A chest.
#[derive(Debug, Clone, Deserialize)]
pub struct ChestSpec {
    /// Block position.
    pub anchor: BlockPos,
    /// Contents, laid out from the first slot.
    #[serde(default)]
    pub contents: Vec<StackSpec>,
}

/// `stacks` stacks of `count` items each.
#[derive(Debug, Clone, Deserialize)]
pub struct StackSpec {
    /// Item id.
    pub item: String,
    /// Items per stack.
    #[serde(default = "default_stack_count")]
    pub count: u32,
    /// Number of stacks.
    #[serde(default = "default_stacks")]
    pub stacks: u32,
}

/// The trade offer.
#[derive(Debug, Clone, Deserialize)]
pub struct OfferSpec {
    /// Item paid.
    pub input: String,
    /// Amount paid per trade.
    pub cost: u32,
    /// Item received.
    pub output: String,
    /// Amount received per trade.
    pub reward: u32,
}

/// A location and the sites an operator would register on it.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationSpec {
    /// Registered name.
    pub name: String,
    /// Category of the targets that make up the location.
    pub category: String,
    /// Where the operator stands to register it.
    pub origin: Vec3,
    /// The input site.
    pub input: SiteSpec,
    /// The output site.
    pub output: SiteSpec,
    /// Stairs or ramps leaving the location.
    #[serde(default)]
    pub transitions: Vec<EdgeSpec>,
}

/// A storage site.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SiteSpec {
    /// The chest.
    pub anchor: BlockPos,
    /// Where the operator stands when registering it.
    pub stance: Vec3,
}

/// A transition edge.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EdgeSpec {
    /// Where the edge starts.
    pub at: Vec3,
    /// The level it leads to.
    pub to_level: i32,
}

impl Scenario {
    /// Load a scenario from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a scenario from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid scenario.
    pub fn parse(yaml: &str) -> Result<Self, SimError> {
        let scenario: Self = serde_yml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check the parts that parse but cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidScenario`] naming the first problem.
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |reason: String| Err(SimError::InvalidScenario { reason });
        if self.tick_ms == 0 {
            return invalid(String::from("tick_ms must be positive"));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return invalid(format!("speed {} is not a non-negative number", self.speed));
        }
        if self.floors.is_empty() {
            return invalid(String::from("at least one floor is required"));
        }
        if self.offer.cost == 0 || self.offer.reward == 0 {
            return invalid(String::from("offer cost and reward must be positive"));
        }
        if self.run.is_empty() {
            return invalid(String::from("run names no location"));
        }
        for stack in self.inventory.iter().chain(self.chests.iter().flat_map(|c| &c.contents)) {
            if stack.count == 0 || stack.count > MAX_STACK {
                return invalid(format!(
                    "stack of {} {} is outside 1..={MAX_STACK}",
                    stack.count, stack.item
                ));
            }
        }
        for location in &self.locations {
            for site in [&location.input, &location.output] {
                if !self.chests.iter().any(|c| c.anchor == site.anchor) {
                    return invalid(format!(
                        "location {} names a site at {} with no chest",
                        location.name, site.anchor
                    ));
                }
            }
        }
        Ok(())
    }

    /// Build the world the scenario describes, before any registration.
    pub fn build_world(&self) -> SimWorld {
        let offer = TradeOffer {
            input: ItemId::new(self.offer.input.as_str()),
            cost: self.offer.cost,
            output: ItemId::new(self.offer.output.as_str()),
            reward: self.offer.reward,
        };
        let mut world = SimWorld::new(self.floors.clone(), self.agent, offer);
        if self.navigator {
            world = world.with_navigator();
        }
        if let Some(time) = self.time_of_day {
            world = world.with_day_cycle(time);
        }
        for target in &self.targets {
            world.add_target(target.position, &target.category, target.juvenile);
        }
        for chest in &self.chests {
            world.add_chest(chest.anchor, &expand(&chest.contents));
        }
        for stack in expand(&self.inventory) {
            world.give(&stack);
        }
        world
    }
}

fn expand(specs: &[StackSpec]) -> Vec<ItemStack> {
    specs
        .iter()
        .flat_map(|spec| {
            (0..spec.stacks).map(move |_| ItemStack::new(spec.item.as_str(), spec.count))
        })
        .collect()
}

// =========================================================================
// Default value functions
// =========================================================================

const fn default_tick_ms() -> u64 {
    50
}

const fn default_duration_ms() -> u64 {
    600_000
}

const fn default_speed() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

const fn default_stack_count() -> u32 {
    MAX_STACK
}

const fn default_stacks() -> u32 {
    1
}
