//! Error types for the `traderun-registry` crate.
//!
//! Registry lookups that simply find nothing return `Option`; the variants
//! here cover registrations that cannot be carried out and persistence
//! failures.

use std::path::PathBuf;

/// Errors from registry mutations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No location is registered at or near the given level.
    #[error("no location registered near level {level}")]
    LocationNotFound {
        /// The level that was looked up.
        level: i32,
    },

    /// No location matches the given name or category.
    #[error("no location named {name:?}")]
    UnknownName {
        /// The name that was looked up.
        name: String,
    },

    /// A location cannot be registered without candidate targets.
    #[error("no {category} targets found within range of level {level}")]
    NoCandidates {
        /// The level being registered.
        level: i32,
        /// The requested category.
        category: String,
    },
}

/// Errors from loading or saving snapshots.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a snapshot file failed.
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        /// File that was being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
