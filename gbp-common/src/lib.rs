//! # GBP Common Library
//!
//! Shared code for the GBP playback plugin crates:
//! - Error types
//! - Configuration file resolution
//! - Player event model (state changes, errors, listeners)

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{ListenerSet, PlaybackState, PlayerEvent, PlayerListener};
