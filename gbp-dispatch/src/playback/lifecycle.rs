//! Dedicated worker threads and the joinable list
//!
//! A dedicated worker services one target until that target's quit. On
//! the way out it moves its own join handle from the target onto the
//! process-wide joinable list, so shutdown can join the thread without the
//! command-issuing path ever blocking on a join.

use super::target::Target;
use super::worker::{self, QueueExit, RunLimits, WorkerState};
use crate::error::{Error, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Finished (or finishing) worker threads awaiting a physical join
#[derive(Default)]
pub struct JoinableWorkers {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JoinableWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the target's worker handle, if still in its slot, onto the list
    ///
    /// Taking the handle and pushing it happen under the list lock, so a
    /// handle is always either in the slot or on the list.
    pub fn adopt(&self, target: &Target) -> bool {
        let mut handles = self.lock();
        match target.worker_slot().take() {
            Some(handle) => {
                handles.push(handle);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join every registered thread; returns how many were joined
    pub fn join_all(&self) -> usize {
        let handles: Vec<_> = self.lock().drain(..).collect();
        let mut joined = 0;
        for handle in handles {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            match handle.join() {
                Ok(()) => {
                    debug!("Worker {} joined successfully", name);
                    joined += 1;
                }
                Err(e) => {
                    error!("Worker {} join failed: {:?}", name, e);
                }
            }
        }
        joined
    }
}

impl std::fmt::Debug for JoinableWorkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinableWorkers")
            .field("len", &self.len())
            .finish()
    }
}

/// Spawn the dedicated worker thread for `target`
///
/// Fails if a worker was already started for this target.
pub fn spawn_dedicated(target: &Target, joinable: std::sync::Arc<JoinableWorkers>) -> Result<()> {
    if !target.claim_worker() {
        return Err(Error::InvalidState(format!(
            "worker already started for {}",
            target.name()
        )));
    }

    // Hold the slot while spawning so the worker cannot hand off its
    // handle before it has been stored
    let mut slot = target.worker_slot();
    let worker_target = target.clone();
    let id = target.id().simple().to_string();
    let handle = match thread::Builder::new()
        .name(format!("gbp-worker-{}", &id[..8]))
        .spawn(move || dedicated_main(worker_target, joinable))
    {
        Ok(handle) => handle,
        Err(e) => {
            // No thread: a later start (or stop_worker) must be able to retry
            target.release_worker_claim();
            error!("{}: failed to spawn playback worker: {}", target.name(), e);
            return Err(Error::WorkerSpawn(e));
        }
    };
    *slot = Some(handle);

    info!("{}: playback worker started", target.name());
    Ok(())
}

fn dedicated_main(target: Target, joinable: std::sync::Arc<JoinableWorkers>) {
    let exit = worker::run_queue(&target, RunLimits::dedicated());
    if exit != QueueExit::Quit {
        warn!("{}: dedicated worker left loop without quit ({:?})", target.name(), exit);
    }

    if joinable.adopt(&target) {
        debug!("{}: worker {}", target.name(), WorkerState::Joined);
    }
    info!("{}: playback worker exiting", target.name());
}
