//! End-to-end runs of the controller in the simulated world.
//!
//! Each test builds a scenario from YAML, registers its locations through
//! the controller and steps the run on the manual clock.

#![allow(clippy::unwrap_used)]

use traderun_core::{TradeRunConfig, WorldQuery};
use traderun_sim::{Scenario, Simulation};
use traderun_types::{BlockPos, ItemId, StateTag};

const WHEAT: &str = "minecraft:wheat";
const EMERALD: &str = "minecraft:emerald";
const INPUT_CHEST: BlockPos = BlockPos::new(-3, 64, 0);
const OUTPUT_CHEST: BlockPos = BlockPos::new(3, 64, 0);

/// One location on level 64: three farmers to the south, wheat to the
/// west, emeralds to the east. `inventory` is spliced in as YAML.
fn farm_yaml(inventory: &str) -> String {
    format!(
        r"
name: farm
seed: 11
agent: {{ x: 0.5, y: 64.0, z: 0.5 }}
time_of_day: 1000
floors:
  - {{ level: 64, min_x: -16, max_x: 16, min_z: -16, max_z: 16 }}
offer: {{ input: '{WHEAT}', cost: 20, output: '{EMERALD}', reward: 1 }}
targets:
  - {{ position: {{ x: -4.5, y: 64.0, z: 8.5 }}, category: farmer }}
  - {{ position: {{ x: 0.5, y: 64.0, z: 8.5 }}, category: farmer }}
  - {{ position: {{ x: 5.5, y: 64.0, z: 8.5 }}, category: farmer }}
chests:
  - anchor: {{ x: -3, y: 64, z: 0 }}
    contents:
      - {{ item: '{WHEAT}', stacks: 8 }}
  - anchor: {{ x: 3, y: 64, z: 0 }}
    contents:
      - {{ item: '{EMERALD}', count: 1 }}
inventory: {inventory}
locations:
  - name: farm
    category: farmer
    origin: {{ x: 0.5, y: 64.0, z: 4.5 }}
    input: {{ anchor: {{ x: -3, y: 64, z: 0 }}, stance: {{ x: -1.5, y: 64.0, z: 0.5 }} }}
    output: {{ anchor: {{ x: 3, y: 64, z: 0 }}, stance: {{ x: 1.5, y: 64.0, z: 0.5 }} }}
run: [farm]
"
    )
}

fn make_sim(yaml: &str, config: TradeRunConfig) -> Simulation {
    let scenario = Scenario::parse(yaml).unwrap();
    let mut sim = Simulation::new(&scenario, config).unwrap();
    sim.start().unwrap();
    sim
}

#[test]
fn stocked_agent_trades() {
    let yaml = farm_yaml(&format!("[{{ item: '{WHEAT}', stacks: 2 }}]"));
    let mut sim = make_sim(&yaml, TradeRunConfig::default());
    sim.run_for(60_000);

    let summary = sim.summary();
    assert!(summary.abort.is_none(), "aborted: {summary}");
    assert!(summary.stats.trades >= 1, "no trade: {summary}");
    assert!(sim.world().carried(&ItemId::new(EMERALD)) >= 1);
}

#[test]
fn empty_handed_agent_restocks_first() {
    let yaml = farm_yaml("[]");
    let mut sim = make_sim(&yaml, TradeRunConfig::default());
    sim.run_for(30_000);

    let wheat = ItemId::new(WHEAT);
    assert!(sim.controller().stats().restocks >= 1);
    assert!(sim.world().carried(&wheat) >= 32);
    assert!(sim.world().stored(INPUT_CHEST, &wheat) < 512);
}

#[test]
fn output_over_the_threshold_is_dumped() {
    let config = TradeRunConfig::parse("trading:\n  output_min: 32\n").unwrap();
    let yaml = farm_yaml(&format!(
        "[{{ item: '{WHEAT}', stacks: 2 }}, {{ item: '{EMERALD}', count: 40 }}]"
    ));
    let mut sim = make_sim(&yaml, config);
    sim.run_for(30_000);

    let emerald = ItemId::new(EMERALD);
    assert!(sim.controller().stats().dumps >= 1);
    assert!(sim.world().stored(OUTPUT_CHEST, &emerald) >= 41);
    assert!(sim.world().carried(&emerald) < 32);
}

#[test]
fn run_starts_by_travelling_to_a_distant_location() {
    let yaml = format!(
        r"
name: tower
agent: {{ x: 0.5, y: 64.0, z: 0.5 }}
floors:
  - {{ level: 64, min_x: -16, max_x: 16, min_z: -16, max_z: 16 }}
  - {{ level: 80, min_x: -16, max_x: 16, min_z: -16, max_z: 16 }}
offer: {{ input: '{WHEAT}', cost: 20, output: '{EMERALD}', reward: 1 }}
targets:
  - {{ position: {{ x: 0.5, y: 80.0, z: 8.5 }}, category: farmer }}
  - {{ position: {{ x: 4.5, y: 80.0, z: 8.5 }}, category: farmer }}
chests:
  - anchor: {{ x: -3, y: 80, z: 0 }}
    contents:
      - {{ item: '{WHEAT}', stacks: 4 }}
  - anchor: {{ x: 3, y: 80, z: 0 }}
    contents:
      - {{ item: '{EMERALD}', count: 1 }}
inventory:
  - {{ item: '{WHEAT}', stacks: 2 }}
locations:
  - name: upper
    category: farmer
    origin: {{ x: 0.5, y: 80.0, z: 4.5 }}
    input: {{ anchor: {{ x: -3, y: 80, z: 0 }}, stance: {{ x: -1.5, y: 80.0, z: 0.5 }} }}
    output: {{ anchor: {{ x: 3, y: 80, z: 0 }}, stance: {{ x: 1.5, y: 80.0, z: 0.5 }} }}
run: [upper]
"
    );
    let scenario = Scenario::parse(&yaml).unwrap();
    let mut sim = Simulation::new(&scenario, TradeRunConfig::default()).unwrap();
    let report = sim.start().unwrap();
    assert!(report.travelling);
    assert_eq!(sim.controller().state(), StateTag::LocationTransition);

    sim.run_for(20_000);
    assert_eq!(sim.world().agent_position().level(), 80);
    assert!(sim.summary().abort.is_none());
}

#[test]
fn paused_host_freezes_the_run() {
    let yaml = farm_yaml(&format!("[{{ item: '{WHEAT}', stacks: 2 }}]"));
    let mut sim = make_sim(&yaml, TradeRunConfig::default());
    sim.world_mut().set_paused(true);
    let before = sim.world().agent_position();
    sim.run_for(5_000);

    assert!(sim.controller().is_active());
    assert_eq!(sim.world().trades(), 0);
    assert!(sim.world().agent_position().distance_sq(before) < 1e-9);
}

#[test]
fn operator_override_ends_the_run() {
    let yaml = farm_yaml(&format!("[{{ item: '{WHEAT}', stacks: 2 }}]"));
    let mut sim = make_sim(&yaml, TradeRunConfig::default());
    sim.run_for(1_000);
    sim.world_mut().request_override();
    sim.run_for(2_000);

    assert_eq!(sim.controller().state(), StateTag::Idle);
}

#[test]
fn shipped_scenario_and_config_load() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let config = TradeRunConfig::from_file(&root.join("traderun-config.yaml")).unwrap();
    assert_eq!(config.trading.categories, vec![String::from("farmer")]);

    let scenario = Scenario::from_file(&root.join("scenarios/farm.yaml")).unwrap();
    let sim = Simulation::new(&scenario, config).unwrap();
    assert_eq!(sim.controller().locations().len(), 2);
    assert!(sim.controller().locations().by_name("upper").is_some());
}
