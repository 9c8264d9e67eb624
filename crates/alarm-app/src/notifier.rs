//! Status notification surface
//!
//! [`StatusNotifier`] derives a title and status line from the alarm state
//! and the connection lifecycle, and logs every change. In headless mode it
//! also writes each event to stdout as NDJSON:
//!
//! ```json
//! {"event":"server_started","timestamp":1704700001000}
//! {"event":"location_sample","lat":52.1,"lng":21.0,"timestamp":1704700002000}
//! ```

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use alarm_core::prelude::*;
use alarm_core::{AlarmState, Event};

use crate::ports::Observer;

pub const TITLE_ALARM: &str = "ALARM!";
pub const TITLE_GPS: &str = "Sound Alarm (GPS on)";
pub const TITLE_IDLE: &str = "Sound Alarm";

pub const STATUS_CONNECTING: &str = "Connecting to server...";
pub const STATUS_WAITING: &str = "Connected - waiting for signal";
pub const STATUS_PLAYING: &str = "ALARM PLAYING!";
pub const STATUS_GPS: &str = "Connected - GPS on";
pub const STATUS_RETRYING: &str = "Connection error - retrying...";
pub const STATUS_STOPPED: &str = "Stopped";

/// What the user currently sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: &'static str,
    pub status: &'static str,
}

/// Connection phase as far as the display is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    Stopped,
    Connecting,
    Retrying,
}

#[derive(Debug)]
struct Inner {
    state: AlarmState,
    phase: LinkPhase,
    shown: Notification,
}

impl Inner {
    fn notification(&self) -> Notification {
        let title = if self.state.alarm_playing {
            TITLE_ALARM
        } else if self.state.location_enabled {
            TITLE_GPS
        } else {
            TITLE_IDLE
        };

        let status = if self.state.alarm_playing {
            STATUS_PLAYING
        } else if self.state.connected && self.state.location_enabled {
            STATUS_GPS
        } else if self.state.connected {
            STATUS_WAITING
        } else {
            match self.phase {
                LinkPhase::Stopped => STATUS_STOPPED,
                LinkPhase::Connecting => STATUS_CONNECTING,
                LinkPhase::Retrying => STATUS_RETRYING,
            }
        };

        Notification { title, status }
    }

    /// Recompute and return the new notification if it changed.
    fn refresh(&mut self) -> Option<Notification> {
        let next = self.notification();
        if next == self.shown {
            return None;
        }
        self.shown = next.clone();
        Some(next)
    }
}

#[derive(Debug)]
pub struct StatusNotifier {
    headless: bool,
    inner: Mutex<Inner>,
}

impl StatusNotifier {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            inner: Mutex::new(Inner {
                state: AlarmState::new(),
                phase: LinkPhase::Stopped,
                shown: Notification {
                    title: TITLE_IDLE,
                    status: STATUS_STOPPED,
                },
            }),
        }
    }

    pub fn current(&self) -> Notification {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .shown
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) {
        let changed = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut inner);
            inner.refresh()
        };
        if let Some(notification) = changed {
            info!("[{}] {}", notification.title, notification.status);
        }
    }

    fn emit(&self, event: &HeadlessEvent) {
        if self.headless {
            event.emit();
        }
    }
}

impl Observer for StatusNotifier {
    fn name(&self) -> &str {
        "status-notifier"
    }

    fn on_event(&self, event: &Event, state: &AlarmState) -> Result<()> {
        self.update(|inner| {
            inner.state = *state;
            if *event == Event::ServerStopped {
                inner.phase = LinkPhase::Stopped;
            }
        });
        self.emit(&HeadlessEvent::from_event(event));
        Ok(())
    }

    fn on_connecting(&self) -> Result<()> {
        self.update(|inner| inner.phase = LinkPhase::Connecting);
        self.emit(&HeadlessEvent::Connecting {
            timestamp: HeadlessEvent::now(),
        });
        Ok(())
    }

    fn on_connection_lost(&self, reason: &str) -> Result<()> {
        self.update(|inner| {
            inner.state.connected = false;
            inner.phase = LinkPhase::Retrying;
        });
        self.emit(&HeadlessEvent::ConnectionLost {
            reason: reason.to_string(),
            timestamp: HeadlessEvent::now(),
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Headless output
// ─────────────────────────────────────────────────────────

/// One NDJSON line of headless output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    ServerStarted { timestamp: i64 },
    ServerStopped { timestamp: i64 },
    AlarmStarted { timestamp: i64 },
    AlarmStopped { timestamp: i64 },
    LocationStarted { timestamp: i64 },
    LocationStopped { timestamp: i64 },
    LocationSample { lat: f64, lng: f64, timestamp: i64 },
    Connecting { timestamp: i64 },
    ConnectionLost { reason: String, timestamp: i64 },
}

impl HeadlessEvent {
    pub fn from_event(event: &Event) -> Self {
        let timestamp = Self::now();
        match *event {
            Event::ServerStarted => Self::ServerStarted { timestamp },
            Event::ServerStopped => Self::ServerStopped { timestamp },
            Event::AlarmStarted => Self::AlarmStarted { timestamp },
            Event::AlarmStopped => Self::AlarmStopped { timestamp },
            Event::LocationStarted => Self::LocationStarted { timestamp },
            Event::LocationStopped => Self::LocationStopped { timestamp },
            Event::LocationSample {
                latitude,
                longitude,
            } => Self::LocationSample {
                lat: latitude,
                lng: longitude,
                timestamp,
            },
        }
    }

    /// Write this event to stdout as one JSON line.
    pub fn emit(&self) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = self.write_to(&mut stdout) {
            error!("Failed to write headless event to stdout: {}", e);
        }
    }

    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        let json = serde_json::to_string(self)?;
        writeln!(out, "{}", json)?;
        out.flush()?;
        Ok(())
    }

    /// Current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }
}
