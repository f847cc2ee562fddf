//! Error types for the `traderun-core` crate.
//!
//! [`ControllerError`] covers operator requests the controller cannot carry
//! out. Failures that happen while a run is under way are not errors in
//! this sense: they are classified by [`FailureKind`] and either recovered
//! from locally or recorded in an [`AbortReport`](crate::report::AbortReport).

use traderun_types::Role;

/// Errors returned by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// None of the requested names resolved to a location with both
    /// storage sites.
    #[error("no usable location among {requested:?}")]
    NoUsableLocation {
        /// The names that were requested.
        requested: Vec<String>,
    },

    /// A run is already active.
    #[error("a run is already active")]
    AlreadyRunning,

    /// The agent is not standing on any registered location.
    #[error("no location registered near level {level}")]
    NotOnLocation {
        /// The agent's level.
        level: i32,
    },

    /// There is no open container to learn from.
    #[error("no {role} container is open")]
    NoContainerOpen {
        /// The role being registered.
        role: Role,
    },

    /// A registry rejected the operation.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: traderun_registry::RegistryError,
    },

    /// Persisting a registry failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: traderun_registry::StoreError,
    },
}

/// Classification of a failure during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A target or site could not be reached.
    Navigation,
    /// A container interaction ended badly.
    Container,
    /// The agent stopped moving.
    Stall,
    /// A referenced location, site or item is not configured.
    RegistryMiss,
    /// Every rotation or wait cycle was used up.
    Exhaustion,
    /// The operator stopped or took over the run.
    Operator,
}

impl FailureKind {
    /// Stable snake-case name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Container => "container",
            Self::Stall => "stall",
            Self::RegistryMiss => "registry_miss",
            Self::Exhaustion => "exhaustion",
            Self::Operator => "operator",
        }
    }
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
