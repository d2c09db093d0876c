//! Dispatcher API and process-wide lifecycle
//!
//! The dispatcher is the single registry a plugin holds between load
//! (`init`) and unload (`shutdown`). The scripting bridge requests state
//! changes with `push`; instance creation and destruction call
//! `start_worker` and `stop_worker`.
//!
//! Pushing is best-effort: a push on an exiting target is logged and
//! dropped, never reported as an error.

use super::command::{Command, CommandKind, CommandOutcome, Completion, OwnerContext};
use super::lifecycle::{self, JoinableWorkers};
use super::pool::WorkerPool;
use super::target::{Target, WeakTarget};
use crate::config::{DispatchConfig, WorkerMode};
use crate::error::{Error, Result};
use crate::player::PlayerHandle;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// What happened to a pushed command, as far as the caller can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    /// Target already exiting; nothing was queued
    Rejected,
    /// Queued; the caller did not wait
    Queued,
    /// Waited, and the worker applied it
    Executed,
    /// Waited, and it was dropped unexecuted during a drain
    Discarded,
}

impl From<CommandOutcome> for PushStatus {
    fn from(outcome: CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::Executed => PushStatus::Executed,
            CommandOutcome::Discarded => PushStatus::Discarded,
        }
    }
}

enum Enqueued {
    Rejected,
    Queued(Option<Arc<Completion>>),
}

/// Counts reported by `Dispatcher::shutdown`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Targets still live at shutdown that had to be stopped
    pub stopped_targets: usize,
    /// Dedicated worker threads joined
    pub joined_workers: usize,
    /// Pool threads joined
    pub pool_threads: usize,
}

/// Process-wide playback command dispatcher
pub struct Dispatcher {
    config: DispatchConfig,
    pool: Option<WorkerPool>,
    joinable: Arc<JoinableWorkers>,
    targets: Mutex<Vec<WeakTarget>>,
}

impl Dispatcher {
    /// Global init: create the pool (pooled mode) and the joinable list
    pub fn init(config: DispatchConfig) -> Result<Self> {
        config.validate()?;

        let pool = match config.mode {
            WorkerMode::Pooled => Some(WorkerPool::new(&config.pool)?),
            WorkerMode::Dedicated => None,
        };

        info!("Playback dispatcher initialized ({} workers)", config.mode);

        Ok(Self {
            config,
            pool,
            joinable: Arc::new(JoinableWorkers::new()),
            targets: Mutex::new(Vec::new()),
        })
    }

    pub fn mode(&self) -> WorkerMode {
        self.config.mode
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn targets(&self) -> MutexGuard<'_, Vec<WeakTarget>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the dispatch state for a new player instance
    pub fn register(&self, player: PlayerHandle) -> Target {
        let target = Target::new(player);
        let mut targets = self.targets();
        targets.retain(WeakTarget::is_alive);
        targets.push(target.downgrade());
        debug!("{}: registered target {}", target.name(), target.id());
        target
    }

    /// Targets whose handles are still held somewhere
    pub fn live_targets(&self) -> usize {
        self.targets().iter().filter(|t| t.is_alive()).count()
    }

    /// Dedicated worker handles waiting to be joined
    pub fn joinable_len(&self) -> usize {
        self.joinable.len()
    }

    /// Start servicing `target`
    ///
    /// Dedicated mode spawns the target's thread. Pooled mode needs no
    /// setup: the pool picks the target up on its first push.
    pub fn start_worker(&self, target: &Target) -> Result<()> {
        match self.config.mode {
            WorkerMode::Dedicated => {
                if target.is_exiting() {
                    return Err(Error::InvalidState(format!(
                        "{} is exiting, not starting a worker",
                        target.name()
                    )));
                }
                lifecycle::spawn_dedicated(target, Arc::clone(&self.joinable))
            }
            WorkerMode::Pooled => {
                debug!("{}: pooled mode, worker starts on demand", target.name());
                Ok(())
            }
        }
    }

    /// Tear down `target`'s pipeline and wait until it is done
    ///
    /// Pushes a waited quit: the call returns after the player has been
    /// stopped and the queue drained, or immediately if the target was
    /// already exiting.
    pub fn stop_worker(&self, target: &Target) -> PushStatus {
        let kind = CommandKind::Quit;
        let completion = match self.enqueue(target, kind, None, true) {
            Enqueued::Rejected => return PushStatus::Rejected,
            Enqueued::Queued(completion) => completion,
        };

        if self.config.mode == WorkerMode::Dedicated && !target.worker_started() {
            // The quit is already queued ahead of everything, so a worker
            // started now runs it first
            if let Err(e) = self.start_worker(target) {
                error!("{}: could not start worker for teardown: {}", target.name(), e);
            }
        }

        match completion {
            Some(completion) => Self::wait_for(target, kind, &completion),
            None => PushStatus::Queued,
        }
    }

    /// Enqueue a playback command for `target`
    ///
    /// With `wait` the calling thread blocks until the command is executed
    /// or discarded; the owner context is then released on this thread.
    /// Without `wait` the worker releases it. Must not be called with
    /// `wait` from the target's own worker thread.
    ///
    /// In dedicated mode a waited push needs a running worker: before
    /// `start_worker` it is rejected rather than left blocked. Unwaited
    /// pushes stay queued until the worker starts.
    pub fn push(
        &self,
        target: &Target,
        kind: CommandKind,
        owner: Option<OwnerContext>,
        wait: bool,
    ) -> PushStatus {
        if wait && self.config.mode == WorkerMode::Dedicated && !target.worker_started() {
            warn!(
                "{}: no worker started, refusing to wait for {}",
                target.name(),
                kind
            );
            return PushStatus::Rejected;
        }

        match self.enqueue(target, kind, owner, wait) {
            Enqueued::Rejected => PushStatus::Rejected,
            Enqueued::Queued(None) => PushStatus::Queued,
            Enqueued::Queued(Some(completion)) => Self::wait_for(target, kind, &completion),
        }
    }

    fn enqueue(
        &self,
        target: &Target,
        kind: CommandKind,
        owner: Option<OwnerContext>,
        wait: bool,
    ) -> Enqueued {
        let command = Command::new(kind, Some(Arc::clone(target.player())), owner, wait);
        let completion = command.completion();

        match target.queue().push(command) {
            Err(rejected) => {
                info!("{}: exiting, ignoring {}", target.name(), kind);
                drop(rejected);
                Enqueued::Rejected
            }
            Ok(previous) => {
                if let Some(pool) = &self.pool {
                    if previous == 0 {
                        debug!("{}: no pending commands, pushing worker", target.name());
                        pool.submit(target.clone());
                    }
                }
                Enqueued::Queued(completion)
            }
        }
    }

    fn wait_for(target: &Target, kind: CommandKind, completion: &Completion) -> PushStatus {
        info!("{}: waiting for command {} to complete", target.name(), kind);
        let (outcome, owner) = completion.wait();
        drop(owner);
        info!("{}: command {} completed ({:?})", target.name(), kind, outcome);
        outcome.into()
    }

    /// Enqueue by raw command code, as received from the scripting bridge
    pub fn push_code(&self, target: &Target, code: u32, wait: bool) -> Result<PushStatus> {
        let kind = CommandKind::try_from(code).map_err(|e| {
            error!("{}: {}", target.name(), e);
            e
        })?;
        Ok(self.push(target, kind, None, wait))
    }

    /// Global shutdown
    ///
    /// Stops every target still alive, shuts the pool down, then joins
    /// every dedicated worker thread. Returns once no worker thread is
    /// left running.
    pub fn shutdown(self) -> Result<ShutdownReport> {
        info!("Shutting down playback dispatcher");
        let mut report = ShutdownReport::default();

        let live: Vec<Target> = self
            .targets()
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .collect();

        for target in &live {
            if !target.is_exiting() {
                warn!("{}: still running at shutdown, stopping", target.name());
                self.stop_worker(target);
                report.stopped_targets += 1;
            }
            self.joinable.adopt(target);
        }

        if let Some(pool) = self.pool {
            report.pool_threads = pool.shutdown();
        }

        report.joined_workers = self.joinable.join_all();

        info!(
            "Playback dispatcher shut down (stopped {} targets, joined {} workers)",
            report.stopped_targets, report.joined_workers
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mode", &self.config.mode)
            .field("live_targets", &self.live_targets())
            .field("joinable", &self.joinable.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{PlayerCall, SimulatedPlayer};

    #[test]
    fn test_push_code_rejects_unknown_code() {
        let dispatcher = Dispatcher::init(DispatchConfig::default()).unwrap();
        let target = dispatcher.register(Arc::new(SimulatedPlayer::new("codes")));

        let result = dispatcher.push_code(&target, 42, false);
        assert!(matches!(result, Err(Error::UnknownCommand(42))));
        assert_eq!(target.pending(), 0);

        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn test_stop_without_start_does_not_hang() {
        let dispatcher = Dispatcher::init(DispatchConfig::default()).unwrap();
        let player = Arc::new(SimulatedPlayer::new("never-started"));
        let target = dispatcher.register(player.clone());

        dispatcher.push(&target, CommandKind::Start, None, false);
        assert_eq!(dispatcher.stop_worker(&target), PushStatus::Executed);

        // Quit preempted the queued start
        assert_eq!(player.calls(), vec![PlayerCall::Stop]);
        assert_eq!(dispatcher.shutdown().unwrap().joined_workers, 1);
    }

    #[test]
    fn test_waited_push_before_start_is_rejected() {
        let dispatcher = Dispatcher::init(DispatchConfig::default()).unwrap();
        let player = Arc::new(SimulatedPlayer::new("not-yet-started"));
        let target = dispatcher.register(player.clone());

        assert_eq!(
            dispatcher.push(&target, CommandKind::Start, None, true),
            PushStatus::Rejected
        );
        assert_eq!(target.pending(), 0);

        // Unwaited pushes are kept for the worker
        assert_eq!(
            dispatcher.push(&target, CommandKind::Start, None, false),
            PushStatus::Queued
        );
        dispatcher.start_worker(&target).unwrap();
        assert_eq!(
            dispatcher.push(&target, CommandKind::Pause, None, true),
            PushStatus::Executed
        );
        assert_eq!(player.calls(), vec![PlayerCall::Start, PlayerCall::Pause]);

        dispatcher.stop_worker(&target);
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn test_register_prunes_dead_targets() {
        let dispatcher = Dispatcher::init(DispatchConfig::default()).unwrap();
        let kept = dispatcher.register(Arc::new(SimulatedPlayer::new("kept")));
        drop(dispatcher.register(Arc::new(SimulatedPlayer::new("dropped"))));

        assert_eq!(dispatcher.live_targets(), 1);
        drop(kept);
        assert_eq!(dispatcher.live_targets(), 0);
        dispatcher.shutdown().unwrap();
    }

    #[test]
    fn test_push_status_from_outcome() {
        assert_eq!(PushStatus::from(CommandOutcome::Executed), PushStatus::Executed);
        assert_eq!(PushStatus::from(CommandOutcome::Discarded), PushStatus::Discarded);
    }
}
