//! Playback command dispatch: queue, workers, lifecycle

pub mod command;
pub mod dispatcher;
pub mod lifecycle;
pub mod pool;
pub mod queue;
pub mod target;
pub mod worker;

pub use command::{Command, CommandKind, CommandOutcome, Completion, OwnerContext};
pub use dispatcher::{Dispatcher, PushStatus, ShutdownReport};
pub use lifecycle::JoinableWorkers;
pub use pool::WorkerPool;
pub use queue::CommandQueue;
pub use target::{Target, WeakTarget};
pub use worker::{QueueExit, RunLimits, WorkerState};
