//! Error types for gbp-dispatch
//!
//! Dispatch itself is best-effort: rejected pushes and player failures are
//! not errors here. These variants cover configuration, malformed input
//! from the scripting bridge, and lifecycle misuse.

use thiserror::Error;

/// Main error type for gbp-dispatch
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared crate (config files, I/O)
    #[error(transparent)]
    Common(#[from] gbp_common::Error),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raw command code that maps to no playback command
    #[error("Unknown playback command code: {0}")]
    UnknownCommand(u32),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// OS refused to create a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Convenience Result type using gbp-dispatch Error
pub type Result<T> = std::result::Result<T, Error>;
