//! Shared type definitions for the trade-run controller.
//!
//! Everything the registries, the controller and the host boundary pass to
//! each other lives here, so the crates above depend on one vocabulary.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for targets and runs
//! - [`geometry`] -- Positions, block coordinates, cardinal steps, facing
//! - [`time`] -- [`Timestamp`], [`Timer`] and [`Deadline`]
//! - [`enums`] -- Roles, tolerance classes, signals, state tags
//! - [`structs`] -- Items, slots, target snapshots, locations, storage sites

pub mod enums;
pub mod geometry;
pub mod ids;
pub mod structs;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use enums::{Role, ScreenKind, Signal, SlotOwner, StateTag, ToleranceClass, TransitionDirection};
pub use geometry::{AGENT_EYE_HEIGHT, BlockPos, Cardinal, Facing, Vec3, floor_to_i32};
pub use ids::{RunId, TargetId};
pub use structs::{
    BlockInfo, ClusterAnchor, ItemId, ItemStack, Location, SlotView, StorageSite, TargetSnapshot,
    TransitionEdge,
};
pub use time::{Deadline, Timer, Timestamp};
