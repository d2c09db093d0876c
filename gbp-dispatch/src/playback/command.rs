//! Playback commands
//!
//! A command is built once at push time and never mutated afterwards,
//! except for handing its owner context back on completion. While pending
//! it is owned by the queue, while executing by the worker. When the
//! issuer waits, the worker signals the command's `Completion` and the
//! waiter releases the owner context; otherwise the worker releases it.

use crate::error::{Error, Result};
use crate::player::PlayerHandle;
use serde::Serialize;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Caller-side state attached to a command, released when it finishes
pub type OwnerContext = Box<dyn Any + Send>;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Requested playback operation
///
/// Discriminants are the codes used by the scripting bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Stop = 0,
    Pause = 1,
    Start = 2,
    Quit = 3,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Stop,
        CommandKind::Pause,
        CommandKind::Start,
        CommandKind::Quit,
    ];

    /// Name used in log lines
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Stop => "STOP",
            CommandKind::Pause => "PAUSE",
            CommandKind::Start => "START",
            CommandKind::Quit => "QUIT",
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether this command jumps ahead of queued non-preempting commands
    pub fn preempts(self) -> bool {
        matches!(self, CommandKind::Quit)
    }
}

impl TryFrom<u32> for CommandKind {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or(Error::UnknownCommand(code))
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CommandKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidState(format!("Unknown command name: {}", s)))
    }
}

/// How a command left the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    /// Applied to the player (success is reported by the player itself)
    Executed,
    /// Dropped unexecuted while draining after a quit
    Discarded,
}

#[derive(Default)]
struct CompletionState {
    outcome: Option<CommandOutcome>,
    owner: Option<OwnerContext>,
}

/// One-shot completion signal for a waited command
#[derive(Default)]
pub struct Completion {
    state: Mutex<CompletionState>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark done and hand the owner context to the waiter
    fn signal(&self, outcome: CommandOutcome, owner: Option<OwnerContext>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.outcome.is_some() {
            return;
        }
        state.outcome = Some(outcome);
        state.owner = owner;
        self.cond.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome
            .is_some()
    }

    /// Block until the command has been executed or discarded
    pub fn wait(&self) -> (CommandOutcome, Option<OwnerContext>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = state.outcome {
                return (outcome, state.owner.take());
            }
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait`, giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<(CommandOutcome, Option<OwnerContext>)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        let outcome = state.outcome?;
        Some((outcome, state.owner.take()))
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

/// A single queued playback request
pub struct Command {
    id: u64,
    kind: CommandKind,
    target: Option<PlayerHandle>,
    owner: Option<OwnerContext>,
    completion: Option<Arc<Completion>>,
}

impl Command {
    /// Build a command; `wait` allocates its completion signal
    pub fn new(
        kind: CommandKind,
        target: Option<PlayerHandle>,
        owner: Option<OwnerContext>,
        wait: bool,
    ) -> Self {
        Self {
            id: NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            target,
            owner,
            completion: wait.then(|| Arc::new(Completion::new())),
        }
    }

    /// Queue-only quit with no player attached
    pub fn poison_pill() -> Self {
        Self::new(CommandKind::Quit, None, None, false)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn target(&self) -> Option<&PlayerHandle> {
        self.target.as_ref()
    }

    pub fn wait_requested(&self) -> bool {
        self.completion.is_some()
    }

    /// Completion handle for the issuing thread
    pub fn completion(&self) -> Option<Arc<Completion>> {
        self.completion.clone()
    }

    fn target_name(&self) -> &str {
        self.target.as_deref().map(|p| p.name()).unwrap_or("<none>")
    }

    /// Consume the command, signalling any waiter
    ///
    /// Without a waiter the owner context and the player reference are
    /// released here.
    pub fn finish(mut self, outcome: CommandOutcome) {
        let owner = self.owner.take();
        match self.completion.take() {
            Some(completion) => {
                debug!(
                    "{}: signalling waiter for command {} #{} ({:?})",
                    self.target_name(),
                    self.kind,
                    self.id,
                    outcome
                );
                completion.signal(outcome, owner);
            }
            None => {
                if outcome == CommandOutcome::Discarded {
                    info!(
                        "{}: discarding command {} #{}",
                        self.target_name(),
                        self.kind,
                        self.id
                    );
                }
                drop(owner);
            }
        }
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        // A waiter must never outlive its command unsignalled
        if let Some(completion) = self.completion.take() {
            completion.signal(CommandOutcome::Discarded, self.owner.take());
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("target", &self.target_name())
            .field("has_owner", &self.owner.is_some())
            .field("wait", &self.wait_requested())
            .finish()
    }
}
