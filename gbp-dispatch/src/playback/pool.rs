//! Shared worker pool
//!
//! Fixed set of threads servicing many targets. A target is submitted
//! when its outstanding count goes from 0 to 1, so at most one pool thread
//! works on a target at any time. The thread that holds a target keeps it
//! until the count drops back to zero or the target quits; if it runs out
//! of batch budget first, it hands the target to the back of the pool
//! queue instead, which keeps a busy target from starving the others.

use super::target::Target;
use super::worker::{self, QueueExit, RunLimits};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Shared state for the worker pool
struct SharedPoolState {
    /// Targets waiting for a pool thread
    jobs: Mutex<VecDeque<Target>>,

    /// Condition variable for notifying workers
    condvar: Condvar,

    /// Stop flag for shutdown
    stop_flag: AtomicBool,
}

/// Multi-threaded playback worker pool
pub struct WorkerPool {
    state: Arc<SharedPoolState>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create the pool with `config.max_threads` threads
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config_check(config)?;

        let state = Arc::new(SharedPoolState {
            jobs: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        });

        let limits = RunLimits::pooled(config);
        let mut threads = Vec::with_capacity(config.max_threads);
        for worker_id in 0..config.max_threads {
            let state_clone = Arc::clone(&state);
            let handle = thread::Builder::new()
                .name(format!("gbp-pool-{}", worker_id))
                .spawn(move || Self::worker_loop(worker_id, state_clone, limits))
                .map_err(Error::WorkerSpawn)?;
            threads.push(handle);
        }

        info!("Playback pool started with {} worker threads", threads.len());

        Ok(Self { state, threads })
    }

    /// Hand a target to the pool
    ///
    /// Callers submit only on the 0 → 1 outstanding transition.
    pub fn submit(&self, target: Target) {
        if self.state.stop_flag.load(Ordering::SeqCst) {
            warn!("{}: pool is shutting down, commands stay queued", target.name());
            return;
        }
        Self::enqueue(&self.state, target);
    }

    fn enqueue(state: &SharedPoolState, target: Target) {
        state
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(target);
        state.condvar.notify_one();
    }

    /// Worker thread main loop
    fn worker_loop(worker_id: usize, state: Arc<SharedPoolState>, limits: RunLimits) {
        debug!("Pool worker {} started", worker_id);

        loop {
            let target = {
                let mut jobs = state.jobs.lock().unwrap_or_else(PoisonError::into_inner);

                // Wait for work or shutdown signal
                while jobs.is_empty() && !state.stop_flag.load(Ordering::SeqCst) {
                    jobs = state
                        .condvar
                        .wait(jobs)
                        .unwrap_or_else(PoisonError::into_inner);
                }

                // Leave only once queued targets are serviced
                match jobs.pop_front() {
                    Some(target) => target,
                    None => {
                        debug!("Pool worker {} received shutdown signal", worker_id);
                        break;
                    }
                }
            };

            debug!("Pool worker {} starting on {}", worker_id, target.name());

            match worker::run_queue(&target, limits) {
                QueueExit::Quit => {
                    debug!("Pool worker {} finished {} (quit)", worker_id, target.name());
                }
                QueueExit::Yield => {
                    debug!("Pool worker {} yielding {}", worker_id, target.name());
                    Self::enqueue(&state, target);
                }
                QueueExit::Released => {
                    debug!("Pool worker {} done on {}", worker_id, target.name());
                }
                QueueExit::Idle => {
                    // A target is only ever pooled while it has outstanding
                    // commands, and between commands its outstanding count
                    // equals its queue length, so a pop never times out
                    // while work is owed.
                    debug_assert_eq!(target.pending(), 0, "pooled target idled with work queued");
                    debug!("Pool worker {} found {} idle", worker_id, target.name());
                }
            }
        }

        debug!("Pool worker {} exiting", worker_id);
    }

    /// Targets waiting for a thread (for diagnostics)
    pub fn queue_len(&self) -> usize {
        self.state
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Shutdown the pool
    ///
    /// Signals stop, lets workers finish already queued targets, and joins
    /// every thread. Returns the number of threads joined.
    pub fn shutdown(self) -> usize {
        info!("Shutting down playback pool");

        self.state.stop_flag.store(true, Ordering::SeqCst);
        self.state.condvar.notify_all();

        let mut joined = 0;
        for (idx, handle) in self.threads.into_iter().enumerate() {
            match handle.join() {
                Ok(()) => {
                    debug!("Pool worker {} joined successfully", idx);
                    joined += 1;
                }
                Err(e) => {
                    error!("Pool worker {} join failed: {:?}", idx, e);
                }
            }
        }

        info!("Playback pool shut down");
        joined
    }
}

fn config_check(config: &PoolConfig) -> Result<()> {
    if config.max_threads == 0 {
        return Err(Error::Config("pool needs at least one thread".to_string()));
    }
    if config.batch_limit == 0 {
        return Err(Error::Config("pool batch limit must be positive".to_string()));
    }
    Ok(())
}
