//! # GBP Playback Command Dispatcher (gbp-dispatch)
//!
//! Serializes playback requests (start, pause, stop, quit) coming from a
//! scripting bridge on arbitrary threads onto a single worker per player,
//! so pipeline state transitions never overlap.
//!
//! **Architecture:** one priority-ordered queue per player; quit preempts
//! everything queued and drains the rest. Workers are either one thread
//! per player or a bounded pool shared by all players.

pub mod config;
pub mod error;
pub mod playback;
pub mod player;

pub use config::{DispatchConfig, WorkerMode};
pub use error::{Error, Result};
pub use playback::{CommandKind, Dispatcher, PushStatus, Target};
pub use player::{Player, PlayerHandle, SimulatedPlayer};
