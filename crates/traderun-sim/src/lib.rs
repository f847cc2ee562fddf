//! Headless simulation for the trade-run controller.
//!
//! A [`Simulation`] runs a [`Controller`](traderun_core::Controller)
//! against a flat block-grid world loaded from a YAML [`Scenario`], on a
//! manual clock, so whole runs (trading, restocking, dumping, rotating
//! between levels) can be replayed deterministically.
//!
//! # Modules
//!
//! - [`world`] -- The grid world and its host trait implementations
//! - [`scenario`] -- Scenario files
//! - [`simulation`] -- World, controller and clock stepped together
//! - [`error`] -- Simulation errors

pub mod error;
pub mod scenario;
pub mod simulation;
pub mod world;

pub use error::SimError;
pub use scenario::Scenario;
pub use simulation::{Simulation, Summary};
pub use world::SimWorld;
