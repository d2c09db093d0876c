//! Player event model
//!
//! Players report state changes and failures through registered
//! listeners. This channel is independent of the playback command queue:
//! a processed command only means the request was handled, the outcome of
//! the underlying pipeline transition arrives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Events emitted by a player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Pipeline reached a new state
    StateChanged {
        /// Player name
        player: String,
        /// State before the transition
        old_state: PlaybackState,
        /// State after the transition
        new_state: PlaybackState,
        /// When the transition completed
        timestamp: DateTime<Utc>,
    },

    /// Media reached its end
    EndOfStream {
        player: String,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline failure (element creation, negotiation, ...)
    Error {
        player: String,
        message: String,
        /// Optional debug detail from the pipeline
        debug: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Convenience constructor for state transitions
    pub fn state_changed(player: &str, old_state: PlaybackState, new_state: PlaybackState) -> Self {
        PlayerEvent::StateChanged {
            player: player.to_string(),
            old_state,
            new_state,
            timestamp: Utc::now(),
        }
    }

    /// Convenience constructor for end of media
    pub fn end_of_stream(player: &str) -> Self {
        PlayerEvent::EndOfStream {
            player: player.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Convenience constructor for failures
    pub fn error(player: &str, message: impl Into<String>, debug: Option<String>) -> Self {
        PlayerEvent::Error {
            player: player.to_string(),
            message: message.into(),
            debug,
            timestamp: Utc::now(),
        }
    }

    /// Name of the player that emitted the event
    pub fn player(&self) -> &str {
        match self {
            PlayerEvent::StateChanged { player, .. }
            | PlayerEvent::EndOfStream { player, .. }
            | PlayerEvent::Error { player, .. } => player,
        }
    }
}

/// Listener interface for player events
///
/// Implementations are called on the thread that drives the player, so
/// they must not block on the playback command queue.
pub trait PlayerListener: Send + Sync {
    /// Called for every state transition
    fn on_state_change(&self, _player: &str, _old: PlaybackState, _new: PlaybackState) {}

    /// Called when the pipeline reports a failure
    fn on_error(&self, _player: &str, _message: &str, _debug: Option<&str>) {}

    /// Called when the stream ends
    fn on_eos(&self, _player: &str) {}

    /// Route an event to the typed callbacks
    fn on_event(&self, event: &PlayerEvent) {
        match event {
            PlayerEvent::StateChanged {
                player,
                old_state,
                new_state,
                ..
            } => self.on_state_change(player, *old_state, *new_state),
            PlayerEvent::EndOfStream { player, .. } => self.on_eos(player),
            PlayerEvent::Error {
                player,
                message,
                debug,
                ..
            } => self.on_error(player, message, debug.as_deref()),
        }
    }
}

/// Registered listeners of one player
#[derive(Default, Clone)]
pub struct ListenerSet {
    listeners: Arc<RwLock<Vec<Arc<dyn PlayerListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it receives every subsequent event
    pub fn add(&self, listener: Arc<dyn PlayerListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Drop all listeners
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: &PlayerEvent) {
        // Snapshot so listeners may register others without deadlocking
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<(PlaybackState, PlaybackState)>>,
        errors: Mutex<Vec<String>>,
        eos: Mutex<Vec<String>>,
    }

    impl PlayerListener for Recorder {
        fn on_state_change(&self, _player: &str, old: PlaybackState, new: PlaybackState) {
            self.states.lock().unwrap().push((old, new));
        }

        fn on_error(&self, _player: &str, message: &str, _debug: Option<&str>) {
            self.errors.lock().unwrap().push(message.to_string());
        }

        fn on_eos(&self, player: &str) {
            self.eos.lock().unwrap().push(player.to_string());
        }
    }

    #[test]
    fn test_emit_routes_to_typed_callbacks() {
        let set = ListenerSet::new();
        let recorder = Arc::new(Recorder::default());
        set.add(recorder.clone());

        set.emit(&PlayerEvent::state_changed(
            "p0",
            PlaybackState::Stopped,
            PlaybackState::Playing,
        ));
        set.emit(&PlayerEvent::error("p0", "no audio sink", None));
        set.emit(&PlayerEvent::end_of_stream("p0"));

        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![(PlaybackState::Stopped, PlaybackState::Playing)]
        );
        assert_eq!(*recorder.errors.lock().unwrap(), vec!["no audio sink"]);
        assert_eq!(*recorder.eos.lock().unwrap(), vec!["p0"]);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlayerEvent::state_changed("p1", PlaybackState::Playing, PlaybackState::Paused);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StateChanged");
        assert_eq!(json["new_state"], "paused");
        assert_eq!(event.player(), "p1");
    }

    #[test]
    fn test_clear_removes_listeners() {
        let set = ListenerSet::new();
        set.add(Arc::new(Recorder::default()));
        assert_eq!(set.len(), 1);
        set.clear();
        assert!(set.is_empty());
    }
}
