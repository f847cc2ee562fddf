//! Error types for the simulation.
//!
//! [`SimError`] wraps every failure mode of loading a scenario and setting
//! the controller up on it, so the binary can propagate with `?`.

/// Top-level error of the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Reading a scenario file failed.
    #[error("failed to read scenario file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The scenario is not valid YAML for its schema.
    #[error("failed to parse scenario YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The scenario parsed but describes an unusable world.
    #[error("invalid scenario: {reason}")]
    InvalidScenario {
        /// What is wrong with it.
        reason: String,
    },

    /// Loading the controller configuration failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: traderun_core::ConfigError,
    },

    /// Registering the scenario's locations or starting the run failed.
    #[error("controller error: {source}")]
    Controller {
        /// The underlying controller error.
        #[from]
        source: traderun_core::ControllerError,
    },
}
