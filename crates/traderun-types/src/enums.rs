//! Enumeration types shared across the trade-run workspace.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Storage roles
// ---------------------------------------------------------------------------

/// Which side of the trade a storage site serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The resource the agent hands over to targets.
    Input,
    /// The resource the agent receives from targets.
    Output,
}

impl Role {
    /// Both roles, input first.
    pub const ALL: [Self; 2] = [Self::Input, Self::Output];

    /// Lower-case name used in logs and file keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// How far from the current level a navigation goal may lie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceClass {
    /// Same floor: the goal must be within one level of the agent.
    ExactFloor,
    /// Elevated storage: within the configured platform band.
    Platform,
    /// Cross-level travel: any height.
    Unrestricted,
}

/// Vertical direction of a transition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionDirection {
    /// Towards a higher level.
    Up,
    /// Towards a lower level (or level).
    Down,
}

impl TransitionDirection {
    /// Direction of travel from `from` to `to`.
    pub const fn between(from: i32, to: i32) -> Self {
        if to > from { Self::Up } else { Self::Down }
    }
}

// ---------------------------------------------------------------------------
// Host interaction
// ---------------------------------------------------------------------------

/// Which inventory a container slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotOwner {
    /// The agent's own inventory, shown below the container.
    Agent,
    /// The opened container.
    External,
}

/// A simulated input the controller can hold down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Walk forward along the current facing.
    Forward,
    /// Interact with whatever is under the crosshair.
    Use,
    /// Jump.
    Jump,
}

/// Kind of screen the host currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenKind {
    /// A target's trade screen.
    Trade,
    /// A storage container.
    Container,
    /// Anything else (menus, chat).
    Other,
}

// ---------------------------------------------------------------------------
// Controller state tags
// ---------------------------------------------------------------------------

/// The controller's current state, without its per-state data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateTag {
    /// Not running.
    Idle,
    /// Looking for the next target.
    Seeking,
    /// Walking to a target's approach tile.
    Approaching,
    /// Aiming at a target and pulsing the interact signal.
    Interacting,
    /// A short forward step after a diagonal approach.
    NudgeAdjust,
    /// Waiting for the trade screen to be used and closed.
    AwaitClose,
    /// Fetching input items from storage.
    RestockDetour,
    /// Depositing output items into storage.
    DumpDetour,
    /// Returning surplus input before switching location.
    ReturnExcessInput,
    /// Travelling to another level.
    LocationTransition,
}

impl StateTag {
    /// Stable snake-case name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Seeking => "seeking",
            Self::Approaching => "approaching",
            Self::Interacting => "interacting",
            Self::NudgeAdjust => "nudge_adjust",
            Self::AwaitClose => "await_close",
            Self::RestockDetour => "restock_detour",
            Self::DumpDetour => "dump_detour",
            Self::ReturnExcessInput => "return_excess_input",
            Self::LocationTransition => "location_transition",
        }
    }
}

impl core::fmt::Display for StateTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
