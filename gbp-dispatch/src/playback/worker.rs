//! Worker loop
//!
//! Pops commands from one target's queue and applies them to its player,
//! one at a time. Both the dedicated thread and the shared pool run
//! `run_queue`; they differ only in `RunLimits`.
//!
//! States: `Idle` (blocked on pop) → `Executing` → back to `Idle`, or
//! `Draining` after a quit → `Joined` once the thread is handed off.

use super::command::{Command, CommandKind, CommandOutcome};
use super::target::Target;
use crate::config::PoolConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Worker lifecycle state, traced at debug level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Executing,
    Draining,
    Joined,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Executing => write!(f, "executing"),
            WorkerState::Draining => write!(f, "draining"),
            WorkerState::Joined => write!(f, "joined"),
        }
    }
}

/// Why `run_queue` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueExit {
    /// A quit ran and the queue was drained; the target is finished
    Quit,
    /// Outstanding count reached zero; the worker no longer owns the target
    Released,
    /// The poll timed out with no command available
    Idle,
    /// Batch budget used up with commands still outstanding
    Yield,
}

/// How long a worker stays on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Pop timeout; `None` blocks until a command arrives
    pub poll: Option<Duration>,
    /// Maximum commands applied before yielding
    pub budget: Option<usize>,
    /// Return as soon as the outstanding count drops to zero
    pub release_when_empty: bool,
}

impl RunLimits {
    /// Dedicated thread: block forever, leave only on quit
    pub fn dedicated() -> Self {
        Self {
            poll: None,
            budget: None,
            release_when_empty: false,
        }
    }

    /// Pool thread: short poll, bounded batch, release when caught up
    pub fn pooled(config: &PoolConfig) -> Self {
        Self {
            poll: Some(config.poll_timeout()),
            budget: Some(config.batch_limit),
            release_when_empty: true,
        }
    }
}

fn trace_state(target: &Target, state: WorkerState) {
    debug!(
        "{}: worker {:?} {}",
        target.name(),
        std::thread::current().id(),
        state
    );
}

/// Apply a command's operation to its player; true when the worker must exit
///
/// Quit maps to stop followed by exit. A command without a player only
/// has effect on the queue.
pub fn apply(command: &Command) -> bool {
    let player = command.target();
    let name = player.map(|p| p.name()).unwrap_or("<none>");

    debug!(
        "{}: worker {:?} processing command {} #{}",
        name,
        std::thread::current().id(),
        command.kind(),
        command.id()
    );

    let exit = match (command.kind(), player) {
        (CommandKind::Stop, Some(player)) => {
            player.stop();
            false
        }
        (CommandKind::Pause, Some(player)) => {
            player.pause();
            false
        }
        (CommandKind::Start, Some(player)) => {
            player.start();
            false
        }
        (CommandKind::Quit, Some(player)) => {
            player.stop();
            true
        }
        (CommandKind::Quit, None) => true,
        (kind, None) => {
            warn!("command {} #{} has no player, ignoring", kind, command.id());
            false
        }
    };

    debug!(
        "{}: worker {:?} processed command {} #{}",
        name,
        std::thread::current().id(),
        command.kind(),
        command.id()
    );
    exit
}

/// Service a target's queue until a quit, idleness, or the batch budget
///
/// On quit the queue is closed and every pending command is discarded
/// (waiters are woken with `Discarded`) before the quit's own waiter is
/// signalled, so a caller returning from a waited quit always observes the
/// target as exiting.
pub fn run_queue(target: &Target, limits: RunLimits) -> QueueExit {
    let queue = target.queue();
    let mut applied = 0usize;

    loop {
        if limits.budget.is_some_and(|budget| applied >= budget) {
            debug!("{}: batch of {} done, yielding", target.name(), applied);
            return QueueExit::Yield;
        }

        trace_state(target, WorkerState::Idle);
        let Some(command) = queue.pop(limits.poll) else {
            return QueueExit::Idle;
        };

        trace_state(target, WorkerState::Executing);
        let exit = apply(&command);
        let mut consumed = 1;

        if exit {
            trace_state(target, WorkerState::Draining);
            let flushed = queue.close_and_drain();
            consumed += flushed.len();
            if !flushed.is_empty() {
                info!(
                    "{}: flushing {} queued command(s) after {}",
                    target.name(),
                    flushed.len(),
                    command.kind()
                );
            }
            for stale in flushed {
                stale.finish(CommandOutcome::Discarded);
            }
        }

        command.finish(CommandOutcome::Executed);
        let remaining = queue.consumed(consumed);
        applied += 1;

        if exit {
            return QueueExit::Quit;
        }
        if limits.release_when_empty && remaining == 0 {
            return QueueExit::Released;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{PlayerCall, SimulatedPlayer};
    use std::sync::Arc;

    fn push(target: &Target, kind: CommandKind) {
        let command = Command::new(kind, Some(target.player().clone()), None, false);
        target.queue().push(command).unwrap();
    }

    #[test]
    fn test_quit_stops_and_drains() {
        let player = Arc::new(SimulatedPlayer::new("w"));
        let target = Target::new(player.clone());
        push(&target, CommandKind::Start);
        push(&target, CommandKind::Pause);
        push(&target, CommandKind::Quit);

        let exit = run_queue(&target, RunLimits::dedicated());

        assert_eq!(exit, QueueExit::Quit);
        assert_eq!(player.calls(), vec![PlayerCall::Stop]);
        assert!(target.is_exiting());
        assert_eq!(target.pending(), 0);
    }

    #[test]
    fn test_pooled_limits_release_when_caught_up() {
        let player = Arc::new(SimulatedPlayer::new("w"));
        let target = Target::new(player.clone());
        push(&target, CommandKind::Start);
        push(&target, CommandKind::Pause);

        let exit = run_queue(&target, RunLimits::pooled(&PoolConfig::default()));

        assert_eq!(exit, QueueExit::Released);
        assert_eq!(player.calls(), vec![PlayerCall::Start, PlayerCall::Pause]);
        assert!(!target.is_exiting());
    }

    #[test]
    fn test_budget_yields_with_work_left() {
        let player = Arc::new(SimulatedPlayer::new("w"));
        let target = Target::new(player.clone());
        for _ in 0..3 {
            push(&target, CommandKind::Start);
        }
        let limits = RunLimits {
            budget: Some(2),
            ..RunLimits::pooled(&PoolConfig::default())
        };

        assert_eq!(run_queue(&target, limits), QueueExit::Yield);
        assert_eq!(player.calls().len(), 2);
        assert_eq!(target.pending(), 1);
    }

    #[test]
    fn test_poll_timeout_on_empty_queue() {
        let target = Target::new(Arc::new(SimulatedPlayer::new("w")));
        let exit = run_queue(&target, RunLimits::pooled(&PoolConfig::default()));
        assert_eq!(exit, QueueExit::Idle);
    }

    #[test]
    fn test_poison_pill_exits_without_player() {
        let target = Target::new(Arc::new(SimulatedPlayer::new("w")));
        target.queue().push(Command::poison_pill()).unwrap();
        assert_eq!(run_queue(&target, RunLimits::dedicated()), QueueExit::Quit);
    }
}
