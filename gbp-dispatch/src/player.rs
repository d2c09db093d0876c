//! Player abstraction
//!
//! The dispatcher drives a player only through `start`, `pause` and
//! `stop`. Each call blocks until the pipeline reaches the requested state
//! or fails; failures travel through the player's own listeners, never
//! back through the command queue.

use gbp_common::{ListenerSet, PlaybackState, PlayerEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Media pipeline driven by the dispatcher
pub trait Player: Send + Sync {
    /// Bring the pipeline to playing
    fn start(&self);

    /// Bring the pipeline to paused
    fn pause(&self);

    /// Bring the pipeline to stopped (null)
    fn stop(&self);

    /// Name used in log lines
    fn name(&self) -> &str {
        "player"
    }
}

/// Reference-counted player handle; one clone is held per in-flight command
pub type PlayerHandle = Arc<dyn Player>;

/// Primitive operation recorded by `SimulatedPlayer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerCall {
    Start,
    Pause,
    Stop,
}

impl PlayerCall {
    fn target_state(self) -> PlaybackState {
        match self {
            PlayerCall::Start => PlaybackState::Playing,
            PlayerCall::Pause => PlaybackState::Paused,
            PlayerCall::Stop => PlaybackState::Stopped,
        }
    }
}

/// In-process player that simulates pipeline transitions
///
/// Each transition sleeps for the configured latency, records the call,
/// and emits a `StateChanged` event. Concurrent entry into a transition is
/// counted as an overlap, which must never happen under the dispatcher.
pub struct SimulatedPlayer {
    name: String,
    latency: Duration,
    state: Mutex<PlaybackState>,
    calls: Mutex<Vec<PlayerCall>>,
    listeners: ListenerSet,
    in_transition: AtomicBool,
    overlaps: AtomicUsize,
    fail_start: AtomicBool,
}

impl SimulatedPlayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_latency(name, Duration::ZERO)
    }

    pub fn with_latency(name: impl Into<String>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            latency,
            state: Mutex::new(PlaybackState::Stopped),
            calls: Mutex::new(Vec::new()),
            listeners: ListenerSet::new(),
            in_transition: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
        }
    }

    /// Make subsequent `start` calls fail (reported as an error event)
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls applied so far, in order
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times two transitions ran at once
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn transition(&self, call: PlayerCall) {
        if self.in_transition.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
            warn!("{}: re-entered while a transition was running", self.name);
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        let event = if call == PlayerCall::Start && self.fail_start.load(Ordering::SeqCst) {
            PlayerEvent::error(&self.name, "could not create pipeline element", None)
        } else {
            let new_state = call.target_state();
            let old_state = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::replace(&mut *state, new_state)
            };
            debug!("{}: {} -> {}", self.name, old_state, new_state);
            PlayerEvent::state_changed(&self.name, old_state, new_state)
        };

        self.in_transition.store(false, Ordering::SeqCst);
        self.listeners.emit(&event);
    }

    /// Simulate the media running out; only a playing pipeline reports it
    ///
    /// Returns whether an end-of-stream event was emitted. The state stays
    /// `Playing` until the next command, as a real pipeline does at EOS.
    pub fn end_stream(&self) -> bool {
        if self.state() != PlaybackState::Playing {
            debug!("{}: not playing, no end of stream", self.name);
            return false;
        }
        self.listeners.emit(&PlayerEvent::end_of_stream(&self.name));
        true
    }
}

impl Player for SimulatedPlayer {
    fn start(&self) {
        self.transition(PlayerCall::Start);
    }

    fn pause(&self) {
        self.transition(PlayerCall::Pause);
    }

    fn stop(&self) {
        self.transition(PlayerCall::Stop);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SimulatedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlayer")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbp_common::PlayerListener;

    #[derive(Default)]
    struct ErrorCounter(AtomicUsize);

    impl PlayerListener for ErrorCounter {
        fn on_error(&self, _player: &str, _message: &str, _debug: Option<&str>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct EosCounter(AtomicUsize);

    impl PlayerListener for EosCounter {
        fn on_eos(&self, _player: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_end_of_stream_only_while_playing() {
        let player = SimulatedPlayer::new("sim");
        let counter = Arc::new(EosCounter::default());
        player.listeners().add(counter.clone());

        assert!(!player.end_stream());
        player.start();
        assert!(player.end_stream());
        assert_eq!(player.state(), PlaybackState::Playing);
        player.pause();
        assert!(!player.end_stream());

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transitions_update_state_and_trace() {
        let player = SimulatedPlayer::new("sim");
        player.start();
        player.pause();
        assert_eq!(player.state(), PlaybackState::Paused);
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(
            player.calls(),
            vec![PlayerCall::Start, PlayerCall::Pause, PlayerCall::Stop]
        );
        assert_eq!(player.overlaps(), 0);
    }

    #[test]
    fn test_failed_start_reports_through_listener() {
        let player = SimulatedPlayer::new("sim");
        let counter = Arc::new(ErrorCounter::default());
        player.listeners().add(counter.clone());
        player.set_fail_start(true);

        player.start();

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(player.state(), PlaybackState::Stopped);
    }
}
