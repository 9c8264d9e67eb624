//! Domain types shared by every layer of the agent

use serde::{Deserialize, Serialize};

/// A typed inbound instruction from the remote controller.
///
/// Only constructed by the codec (or a request/response front end that maps
/// its routes onto the same vocabulary) and consumed once by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start looping the alarm sound
    Play,
    /// Stop the alarm sound
    Stop,
    /// Start streaming location fixes to the controller
    LocationOn,
    /// Stop streaming location fixes
    LocationOff,
}

impl Command {
    /// The `action` value that selects this command on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Stop => "stop",
            Self::LocationOn => "location_on",
            Self::LocationOff => "location_off",
        }
    }

    /// Parse a wire `action` value. Unknown actions yield `None`.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "play" => Some(Self::Play),
            "stop" => Some(Self::Stop),
            "location_on" => Some(Self::LocationOn),
            "location_off" => Some(Self::LocationOff),
            _ => None,
        }
    }
}

/// A typed outbound notification of a state change or telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    // ─────────────────────────────────────────────────────────
    // Connection Lifecycle
    // ─────────────────────────────────────────────────────────
    /// The transport confirmed the connection is open
    ServerStarted,
    /// The core was stopped and will not reconnect
    ServerStopped,

    // ─────────────────────────────────────────────────────────
    // Alarm
    // ─────────────────────────────────────────────────────────
    AlarmStarted,
    AlarmStopped,

    // ─────────────────────────────────────────────────────────
    // Location
    // ─────────────────────────────────────────────────────────
    LocationStarted,
    LocationStopped,
    /// A position fix forwarded while location streaming is enabled
    LocationSample { latitude: f64, longitude: f64 },
}

impl Event {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServerStarted => "server_started",
            Self::ServerStopped => "server_stopped",
            Self::AlarmStarted => "alarm_started",
            Self::AlarmStopped => "alarm_stopped",
            Self::LocationStarted => "location_started",
            Self::LocationStopped => "location_stopped",
            Self::LocationSample { .. } => "location_sample",
        }
    }

    /// Whether this event describes the connection itself rather than device
    /// state. These are never written back to the controller.
    pub fn is_connection_event(&self) -> bool {
        matches!(self, Self::ServerStarted | Self::ServerStopped)
    }
}

impl From<LocationFix> for Event {
    fn from(fix: LocationFix) -> Self {
        Self::LocationSample {
            latitude: fix.latitude,
            longitude: fix.longitude,
        }
    }
}

/// A single position sample produced by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_action_names_match_wire_vocabulary() {
        for cmd in [
            Command::Play,
            Command::Stop,
            Command::LocationOn,
            Command::LocationOff,
        ] {
            assert_eq!(Command::from_action(cmd.action()), Some(cmd));
        }
    }

    #[test]
    fn test_unknown_action_is_none() {
        assert_eq!(Command::from_action("bogus"), None);
        assert_eq!(Command::from_action(""), None);
        assert_eq!(Command::from_action("PLAY"), None);
    }

    #[test]
    fn test_connection_events_are_flagged() {
        assert!(Event::ServerStarted.is_connection_event());
        assert!(Event::ServerStopped.is_connection_event());
        assert!(!Event::AlarmStarted.is_connection_event());
        assert!(!Event::LocationSample {
            latitude: 0.0,
            longitude: 0.0
        }
        .is_connection_event());
    }

    #[test]
    fn test_fix_converts_to_sample() {
        let event: Event = LocationFix::new(52.1, 21.0).into();
        assert_eq!(
            event,
            Event::LocationSample {
                latitude: 52.1,
                longitude: 21.0
            }
        );
        assert_eq!(event.event_type(), "location_sample");
    }
}
