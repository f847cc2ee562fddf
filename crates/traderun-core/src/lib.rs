//! The trade-run controller.
//!
//! A [`Controller`] drives an agent through a host world: it walks to
//! eligible targets, opens their trade screens, keeps the agent stocked
//! with input from a storage site, dumps output at another, and rotates
//! between registered locations. The host is reached only through the
//! traits in [`world`], and the controller is advanced by calling
//! [`Controller::tick`] with the current time.
//!
//! # Modules
//!
//! - [`controller`] -- The state machine, its registries and its watchdogs
//! - [`approach`] -- Approach tile search around a target
//! - [`selector`] -- Target eligibility and ranking
//! - [`navigation`] -- Goal arbitration and the direct-walk fallback
//! - [`container`] -- Withdraw and deposit sessions at storage sites
//! - [`inventory`] -- Slot counting helpers
//! - [`world`] -- Host boundary traits
//! - [`config`] -- YAML configuration with defaults
//! - [`clock`] -- Wall and manual clocks
//! - [`log`] -- Rolling log and abort diagnostics
//! - [`report`] -- Run statistics, start and abort reports
//! - [`error`] -- Controller errors and failure kinds

pub mod approach;
pub mod clock;
pub mod config;
pub mod container;
pub mod controller;
pub mod error;
pub mod inventory;
pub mod log;
pub mod navigation;
pub mod report;
pub mod selector;
pub mod world;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LogFormat, TradeRunConfig};
pub use controller::{Controller, Registries};
pub use error::{ControllerError, FailureKind};
pub use report::{AbortReport, RunStats, StartReport};
pub use world::{ContainerInteraction, Host, InputDriver, Navigator, WorldQuery};
