//! Test helpers for dispatcher integration tests
//!
//! - `GatedPlayer`: player whose `start` blocks until released, so tests
//!   can hold the worker mid-command while they queue more work
//! - `DropProbe`: owner context that records the thread releasing it
//! - `wait_until`: bounded polling for cross-thread conditions

#![allow(dead_code)]

use gbp_dispatch::player::{Player, PlayerCall};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Poll `condition` until true, failing the test after five seconds
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Player that parks inside `start` until the gate opens
pub struct GatedPlayer {
    name: String,
    calls: Mutex<Vec<PlayerCall>>,
    gate: Mutex<bool>,
    gate_cond: Condvar,
    entered_start: AtomicBool,
    active: AtomicUsize,
    overlaps: AtomicUsize,
}

impl GatedPlayer {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(false),
            gate_cond: Condvar::new(),
            entered_start: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        })
    }

    /// Let every current and future `start` through
    pub fn open(&self) {
        *self.gate.lock().unwrap() = true;
        self.gate_cond.notify_all();
    }

    /// True once a worker is parked in (or past) `start`
    pub fn entered_start(&self) -> bool {
        self.entered_start.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn enter(&self, call: PlayerCall) {
        if self.active.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(call);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Player for GatedPlayer {
    fn start(&self) {
        self.enter(PlayerCall::Start);
        self.entered_start.store(true, Ordering::SeqCst);
        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.gate_cond.wait(open).unwrap();
        }
        drop(open);
        self.leave();
    }

    fn pause(&self) {
        self.enter(PlayerCall::Pause);
        self.leave();
    }

    fn stop(&self) {
        self.enter(PlayerCall::Stop);
        self.leave();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Owner context that records which thread dropped it
pub struct DropProbe {
    dropped_on: Arc<Mutex<Option<ThreadId>>>,
}

impl DropProbe {
    pub fn new() -> (Box<Self>, Arc<Mutex<Option<ThreadId>>>) {
        let dropped_on = Arc::new(Mutex::new(None));
        (
            Box::new(Self {
                dropped_on: Arc::clone(&dropped_on),
            }),
            dropped_on,
        )
    }
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        *self.dropped_on.lock().unwrap() = Some(thread::current().id());
    }
}
