//! Memory and suppression registries for the trade-run controller.
//!
//! The controller owns one instance of each registry and consults them on
//! every decision. They are plain data: no clocks, no I/O. Callers pass the
//! current [`Timestamp`](traderun_types::Timestamp) in, and persistence goes
//! through explicit snapshots and a [`Store`].
//!
//! # Modules
//!
//! - [`cooldown`] -- Per-target trade cooldowns with night extension
//! - [`failure`] -- Short-lived failure suppression and escalation
//! - [`visited`] -- Targets interacted with this run
//! - [`cluster`] -- Union-find proximity clustering
//! - [`location`] -- Leveled locations and transition edges
//! - [`storage`] -- Input/output storage sites per location
//! - [`store`] -- Snapshot persistence (JSON files, memory)
//! - [`error`] -- Registry and store errors

pub mod cluster;
pub mod cooldown;
pub mod error;
pub mod failure;
pub mod location;
pub mod storage;
pub mod store;
pub mod visited;

// Re-export primary types for convenience.
pub use cooldown::{CooldownEntry, CooldownSnapshot, CooldownStatus, CooldownTracker, is_day};
pub use error::{RegistryError, StoreError};
pub use failure::FailureTracker;
pub use location::{LocationRegistry, LocationSnapshot};
pub use storage::{StorageMemory, StorageSnapshot};
pub use store::{JsonFileStore, MemoryStore, Store};
pub use visited::VisitedSet;
