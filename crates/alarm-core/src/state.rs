//! Alarm state machine
//!
//! [`AlarmState`] holds the three flags the agent reports on and the rules for
//! moving between them. It performs no I/O; the dispatcher decides whether a
//! command would change anything, runs the side effect, and only then applies
//! the transition here.
//!
//! The alarm is allowed to keep ringing while the connection is down, but
//! location streaming is tied to an active session: losing the connection
//! always clears `location_enabled`.

use serde::Serialize;

use crate::types::{Command, Event};

/// Outcome of applying a command or connection change to [`AlarmState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// The state already matched; nothing to report.
    Unchanged,
    /// The state changed and the given event describes the change.
    Changed(Event),
}

impl Transition {
    pub fn event(self) -> Option<Event> {
        match self {
            Self::Unchanged => None,
            Self::Changed(event) => Some(event),
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Connected / playing / location flags of the running agent.
///
/// Created with every flag cleared when the service starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmState {
    pub connected: bool,
    pub alarm_playing: bool,
    pub location_enabled: bool,
}

impl AlarmState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether applying `cmd` would change the state.
    ///
    /// Repeated identical commands are no-ops, which keeps handlers
    /// idempotent when the controller redelivers during a reconnect.
    pub fn would_change(&self, cmd: Command) -> bool {
        match cmd {
            Command::Play => !self.alarm_playing,
            Command::Stop => self.alarm_playing,
            Command::LocationOn => !self.location_enabled,
            Command::LocationOff => self.location_enabled,
        }
    }

    /// Apply `cmd` and report what changed.
    pub fn apply(&mut self, cmd: Command) -> Transition {
        if !self.would_change(cmd) {
            return Transition::Unchanged;
        }

        let event = match cmd {
            Command::Play => {
                self.alarm_playing = true;
                Event::AlarmStarted
            }
            Command::Stop => {
                self.alarm_playing = false;
                Event::AlarmStopped
            }
            Command::LocationOn => {
                self.location_enabled = true;
                Event::LocationStarted
            }
            Command::LocationOff => {
                self.location_enabled = false;
                Event::LocationStopped
            }
        };
        Transition::Changed(event)
    }

    /// The transport confirmed an open connection.
    pub fn connection_opened(&mut self) -> Transition {
        if self.connected {
            return Transition::Unchanged;
        }
        self.connected = true;
        Transition::Changed(Event::ServerStarted)
    }

    /// The connection closed or failed.
    ///
    /// Clears `connected`, and clears `location_enabled` when it was set,
    /// reporting `LocationStopped` in that case.
    pub fn connection_lost(&mut self) -> Transition {
        self.connected = false;
        if self.location_enabled {
            self.location_enabled = false;
            Transition::Changed(Event::LocationStopped)
        } else {
            Transition::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_all_flags_cleared() {
        let state = AlarmState::new();
        assert!(!state.connected);
        assert!(!state.alarm_playing);
        assert!(!state.location_enabled);
    }

    #[test]
    fn test_duplicate_play_changes_state_once() {
        let mut state = AlarmState::new();
        let transitions: Vec<_> = (0..5).map(|_| state.apply(Command::Play)).collect();

        let started = transitions
            .iter()
            .filter(|t| **t == Transition::Changed(Event::AlarmStarted))
            .count();
        assert_eq!(started, 1);
        assert!(state.alarm_playing);
    }

    #[test]
    fn test_stop_when_silent_is_noop() {
        let mut state = AlarmState::new();
        assert_eq!(state.apply(Command::Stop), Transition::Unchanged);
        assert!(!state.alarm_playing);
    }

    #[test]
    fn test_location_on_off_cycle() {
        let mut state = AlarmState::new();
        assert_eq!(
            state.apply(Command::LocationOn).event(),
            Some(Event::LocationStarted)
        );
        assert_eq!(state.apply(Command::LocationOn), Transition::Unchanged);
        assert_eq!(
            state.apply(Command::LocationOff).event(),
            Some(Event::LocationStopped)
        );
        assert!(!state.location_enabled);
    }

    #[test]
    fn test_alarm_survives_disconnect() {
        let mut state = AlarmState::new();
        state.connection_opened();
        state.apply(Command::Play);

        assert_eq!(state.connection_lost(), Transition::Unchanged);
        assert!(!state.connected);
        assert!(state.alarm_playing);
    }

    #[test]
    fn test_disconnect_clears_location() {
        let mut state = AlarmState::new();
        state.connection_opened();
        state.apply(Command::LocationOn);

        assert_eq!(
            state.connection_lost(),
            Transition::Changed(Event::LocationStopped)
        );
        assert!(!state.location_enabled);
    }

    #[test]
    fn test_connection_opened_reports_once() {
        let mut state = AlarmState::new();
        assert!(state.connection_opened().is_changed());
        assert!(!state.connection_opened().is_changed());
        assert!(state.connected);
    }

    #[test]
    fn test_would_change_mirrors_apply() {
        let mut state = AlarmState::new();
        for cmd in [
            Command::Play,
            Command::Play,
            Command::LocationOn,
            Command::Stop,
            Command::LocationOff,
            Command::LocationOff,
        ] {
            let predicted = state.would_change(cmd);
            assert_eq!(state.apply(cmd).is_changed(), predicted);
        }
    }
}
