//! A controller running against a [`SimWorld`] on a manual clock.

use tracing::{debug, info};
use traderun_core::{
    AbortReport, Clock, Controller, ManualClock, Registries, RunStats, StartReport,
    TradeRunConfig,
};
use traderun_core::world::{ContainerInteraction, WorldQuery};
use traderun_registry::MemoryStore;
use traderun_types::{Role, StateTag, Timestamp};

use crate::error::SimError;
use crate::scenario::{Scenario, SiteSpec};
use crate::world::SimWorld;

/// Where a finished or interrupted simulation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Simulated time since the run started.
    pub elapsed_ms: u64,
    /// Controller state at the end.
    pub state: StateTag,
    /// The controller's counters.
    pub stats: RunStats,
    /// Trades the world saw.
    pub world_trades: u32,
    /// Why the run ended, when it aborted.
    pub abort: Option<AbortReport>,
}

impl core::fmt::Display for Summary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}s state={} world_trades={} {}",
            self.elapsed_ms.checked_div(1_000).unwrap_or(0),
            self.state,
            self.world_trades,
            self.stats
        )?;
        if let Some(abort) = &self.abort {
            write!(f, " abort={abort}")?;
        }
        Ok(())
    }
}

/// The world, the controller and the clock that drives both.
#[derive(Debug)]
pub struct Simulation {
    world: SimWorld,
    controller: Controller,
    clock: ManualClock,
    tick_ms: u64,
    started: Timestamp,
    run: Vec<String>,
}

impl Simulation {
    /// Build the scenario's world and register its locations the way an
    /// operator would: standing on each location, then at each site with
    /// the chest open, then at each transition.
    ///
    /// # Errors
    ///
    /// Returns an error when a location or site cannot be registered.
    pub fn new(scenario: &Scenario, config: TradeRunConfig) -> Result<Self, SimError> {
        let mut world = scenario.build_world();
        let registries = Registries::from_config(&config);
        let mut controller = Controller::new(config, registries)
            .with_store(Box::new(MemoryStore::new()))
            .with_seed(scenario.seed);

        for location in &scenario.locations {
            world.teleport(location.origin);
            let registered =
                controller.register_location(&world, &location.category, Some(&location.name))?;
            debug!(
                name = %location.name,
                level = registered.level,
                members = registered.cluster.members,
                "Location registered"
            );
            register_site(&mut controller, &mut world, Role::Input, location.input)?;
            register_site(&mut controller, &mut world, Role::Output, location.output)?;
            for edge in &location.transitions {
                world.teleport(edge.at);
                controller.add_transition(&world, edge.to_level)?;
            }
        }
        world.teleport(scenario.agent);

        info!(
            scenario = %scenario.name,
            locations = controller.locations().len(),
            tick_ms = scenario.tick_ms,
            "Simulation ready"
        );
        Ok(Self {
            world,
            controller,
            clock: ManualClock::new(Timestamp::ZERO),
            tick_ms: scenario.tick_ms,
            started: Timestamp::ZERO,
            run: scenario.run.clone(),
        })
    }

    /// Start the scenario's run.
    ///
    /// # Errors
    ///
    /// Returns the controller's error when no named location is usable.
    pub fn start(&mut self) -> Result<StartReport, SimError> {
        let names: Vec<&str> = self.run.iter().map(String::as_str).collect();
        let now = self.clock.now();
        let report = self.controller.start(&names, &mut self.world, now)?;
        self.started = now;
        for (name, reason) in &report.skipped {
            info!(name, reason, "Location skipped");
        }
        Ok(report)
    }

    /// Advance the world and the clock by one tick, then tick the
    /// controller.
    pub fn step(&mut self) {
        self.world.step(self.tick_ms);
        self.clock.advance(self.tick_ms);
        self.controller.tick(&mut self.world, self.clock.now());
    }

    /// Step until `duration_ms` of simulated time has passed since the
    /// start or the run ends. Returns the steps taken.
    pub fn run_for(&mut self, duration_ms: u64) -> u64 {
        let mut steps = 0_u64;
        while self.controller.is_active() && self.elapsed_ms() < duration_ms {
            self.step();
            steps = steps.saturating_add(1);
        }
        steps
    }

    /// Stop the run.
    pub fn stop(&mut self) {
        self.controller.stop(&mut self.world);
    }

    /// Simulated time since the run started.
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.now().millis_since(self.started)
    }

    /// The world.
    pub const fn world(&self) -> &SimWorld {
        &self.world
    }

    /// The world, for scripted interventions.
    pub const fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    /// The controller.
    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Where things stand.
    pub fn summary(&self) -> Summary {
        Summary {
            elapsed_ms: self.elapsed_ms(),
            state: self.controller.state(),
            stats: self.controller.stats(),
            world_trades: self.world.trades(),
            abort: self.controller.last_abort().cloned(),
        }
    }
}

/// Stand at the site, register it, and learn its item when the chest
/// holds something.
fn register_site(
    controller: &mut Controller,
    world: &mut SimWorld,
    role: Role,
    site: SiteSpec,
) -> Result<(), SimError> {
    world.teleport(site.stance);
    controller.set_storage(&*world, role, site.anchor)?;
    world.open_at(site.anchor);
    if world.open_screen().is_some() {
        let item = controller.learn_item(&*world, role)?;
        debug!(%role, item = ?item, "Site item learned");
    }
    world.close();
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::ItemId;

    use super::*;

    fn make_scenario() -> Scenario {
        Scenario::parse(
            r"
name: unit
agent: { x: 0.5, y: 64.0, z: 0.5 }
floors:
  - { level: 64, min_x: -16, max_x: 16, min_z: -16, max_z: 16 }
offer: { input: 'minecraft:wheat', cost: 20, output: 'minecraft:emerald', reward: 1 }
targets:
  - { position: { x: 6.5, y: 64.0, z: 6.5 }, category: farmer }
chests:
  - anchor: { x: -3, y: 64, z: 0 }
    contents:
      - { item: 'minecraft:wheat', stacks: 4 }
  - anchor: { x: 3, y: 64, z: 0 }
    contents:
      - { item: 'minecraft:emerald', count: 1 }
locations:
  - name: farm
    category: farmer
    origin: { x: 0.5, y: 64.0, z: 0.5 }
    input: { anchor: { x: -3, y: 64, z: 0 }, stance: { x: -1.5, y: 64.0, z: 0.5 } }
    output: { anchor: { x: 3, y: 64, z: 0 }, stance: { x: 1.5, y: 64.0, z: 0.5 } }
run: [farm]
",
        )
        .unwrap()
    }

    #[test]
    fn registration_learns_both_site_items() {
        let sim = Simulation::new(&make_scenario(), TradeRunConfig::default()).unwrap();
        let storage = sim.controller().storage();
        assert_eq!(
            storage.remembered_item(64, Role::Input),
            Some(&ItemId::new("minecraft:wheat"))
        );
        assert_eq!(
            storage.remembered_item(64, Role::Output),
            Some(&ItemId::new("minecraft:emerald"))
        );
        assert_eq!(sim.world().open_screen(), None);
        assert!((sim.world().agent_position().x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_run_name_fails_to_start() {
        let mut scenario = make_scenario();
        scenario.run = vec![String::from("nowhere")];
        let mut sim = Simulation::new(&scenario, TradeRunConfig::default()).unwrap();
        assert!(matches!(sim.start(), Err(SimError::Controller { .. })));
        assert_eq!(sim.run_for(1_000), 0);
    }

    #[test]
    fn run_for_stops_at_the_duration() {
        let mut sim = Simulation::new(&make_scenario(), TradeRunConfig::default()).unwrap();
        sim.start().unwrap();
        let steps = sim.run_for(1_000);
        assert_eq!(steps, 20);
        assert_eq!(sim.elapsed_ms(), 1_000);
        sim.stop();
        assert_eq!(sim.summary().state, StateTag::Idle);
    }
}
