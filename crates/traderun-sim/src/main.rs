//! Scenario runner for the trade-run controller.
//!
//! ```text
//! traderun-sim <scenario.yaml> [config.yaml]
//! ```
//!
//! Loads the controller configuration (the given path, else
//! `traderun-config.yaml` in the working directory, else defaults), builds
//! the scenario's world, starts the run and steps it at the scenario's
//! speed until its duration passes, the run ends, or Ctrl-C.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use traderun_core::{LogFormat, TradeRunConfig};
use traderun_sim::{Scenario, SimError, Simulation};

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "traderun-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration or scenario cannot be loaded, or
/// the run cannot be started.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(scenario_path) = args.next().map(PathBuf::from) else {
        return Err("usage: traderun-sim <scenario.yaml> [config.yaml]".into());
    };
    let config = load_config(args.next().map(PathBuf::from).as_deref())?;
    init_logging(&config);

    let scenario = Scenario::from_file(&scenario_path)?;
    info!(
        scenario = %scenario.name,
        duration_ms = scenario.duration_ms,
        speed = scenario.speed,
        "Scenario loaded"
    );

    let mut sim = Simulation::new(&scenario, config)?;
    let report = sim.start()?;
    info!(
        run_id = %report.run_id,
        levels = ?report.levels,
        travelling = report.travelling,
        "Run started"
    );

    run(&mut sim, &scenario).await;

    sim.stop();
    let summary = sim.summary();
    if let Some(abort) = &summary.abort {
        warn!(kind = %abort.kind, reason = %abort.reason, "Run aborted");
    }
    info!(%summary, "traderun-sim finished");
    Ok(())
}

/// Step the simulation, pacing ticks against the wall clock unless the
/// scenario runs at speed 0.
async fn run(sim: &mut Simulation, scenario: &Scenario) {
    if scenario.speed <= 0.0 {
        sim.run_for(scenario.duration_ms);
        return;
    }
    let period = Duration::from_secs_f64(tick_seconds(scenario.tick_ms) / scenario.speed);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while sim.controller().is_active() && sim.elapsed_ms() < scenario.duration_ms {
        tokio::select! {
            _ = interval.tick() => sim.step(),
            _ = tokio::signal::ctrl_c() => {
                info!(elapsed_ms = sim.elapsed_ms(), "Interrupted");
                break;
            }
        }
    }
}

fn tick_seconds(tick_ms: u64) -> f64 {
    f64::from(u32::try_from(tick_ms).unwrap_or(u32::MAX)) / 1_000.0
}

/// Load the configuration from `path`, or from [`CONFIG_FILE`] when it
/// exists, or fall back to defaults.
fn load_config(path: Option<&Path>) -> Result<TradeRunConfig, SimError> {
    if let Some(path) = path {
        return Ok(TradeRunConfig::from_file(path)?);
    }
    let default_path = Path::new(CONFIG_FILE);
    if default_path.exists() {
        Ok(TradeRunConfig::from_file(default_path)?)
    } else {
        Ok(TradeRunConfig::default())
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(config: &TradeRunConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
