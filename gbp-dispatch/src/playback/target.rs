//! Per-player dispatch state
//!
//! A `Target` ties one player to its command queue. Handles are cheap
//! `Arc` clones: the registering bridge, each pooled job, and a dedicated
//! worker all hold one, and the queue lives until the last of them is
//! dropped.

use super::queue::CommandQueue;
use crate::player::PlayerHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use uuid::Uuid;

struct TargetShared {
    id: Uuid,
    player: PlayerHandle,
    queue: Arc<CommandQueue>,
    /// Join handle of the dedicated worker until it is moved to the joinable list
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_started: AtomicBool,
}

/// Handle to one player's dispatch state
#[derive(Clone)]
pub struct Target {
    shared: Arc<TargetShared>,
}

/// Non-owning target reference kept by the dispatcher registry
#[derive(Clone)]
pub struct WeakTarget {
    shared: Weak<TargetShared>,
}

impl WeakTarget {
    pub fn upgrade(&self) -> Option<Target> {
        self.shared.upgrade().map(|shared| Target { shared })
    }

    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl Target {
    pub fn new(player: PlayerHandle) -> Self {
        Self {
            shared: Arc::new(TargetShared {
                id: Uuid::new_v4(),
                player,
                queue: Arc::new(CommandQueue::new()),
                worker: Mutex::new(None),
                worker_started: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.shared.player
    }

    /// Player name for log lines
    pub fn name(&self) -> &str {
        self.shared.player.name()
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.shared.queue
    }

    /// Weak reference to the queue, for observing its lifetime
    pub fn queue_ref(&self) -> Weak<CommandQueue> {
        Arc::downgrade(&self.shared.queue)
    }

    /// True once a quit has run; pushes are dropped from then on
    pub fn is_exiting(&self) -> bool {
        self.shared.queue.is_exiting()
    }

    /// Commands pushed and not yet consumed
    pub fn pending(&self) -> usize {
        self.shared.queue.outstanding()
    }

    pub fn downgrade(&self) -> WeakTarget {
        WeakTarget {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Lock the dedicated worker's join-handle slot
    pub(crate) fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the right to start the dedicated worker; true only once
    pub(crate) fn claim_worker(&self) -> bool {
        !self.shared.worker_started.swap(true, Ordering::SeqCst)
    }

    /// Undo a claim whose thread never came up
    pub(crate) fn release_worker_claim(&self) {
        self.shared.worker_started.store(false, Ordering::SeqCst);
    }

    pub fn worker_started(&self) -> bool {
        self.shared.worker_started.load(Ordering::SeqCst)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Target {}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.shared.id)
            .field("player", &self.name())
            .field("queue", &self.shared.queue)
            .finish()
    }
}
