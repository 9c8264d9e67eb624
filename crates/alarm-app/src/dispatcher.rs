//! Command dispatch
//!
//! The [`Dispatcher`] is the only writer of [`AlarmState`]. For each command
//! it checks whether anything would change, runs the collaborator side
//! effect, applies the transition and publishes the resulting event.
//! Repeated identical commands are no-ops.

use std::sync::{Arc, RwLock};

use alarm_core::prelude::*;
use alarm_core::{AlarmState, Command, Event, Transition};

use crate::bus::EventBus;
use crate::location::LocationBridge;
use crate::ports::{AudioOutput, LocationProvider};

pub struct Dispatcher {
    state: Arc<RwLock<AlarmState>>,
    audio: Arc<dyn AudioOutput>,
    location: Arc<dyn LocationProvider>,
    bridge: LocationBridge,
    bus: EventBus,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state())
            .field("bridge", &self.bridge)
            .finish()
    }
}

impl Dispatcher {
    /// `state` must be the same handle the bus was built with.
    pub fn new(
        state: Arc<RwLock<AlarmState>>,
        audio: Arc<dyn AudioOutput>,
        location: Arc<dyn LocationProvider>,
        bus: EventBus,
    ) -> Self {
        let bridge = LocationBridge::new(Arc::clone(&location), bus.clone());
        Self {
            state,
            audio,
            location,
            bridge,
            bus,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AlarmState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state_handle(&self) -> Arc<RwLock<AlarmState>> {
        Arc::clone(&self.state)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Apply `cmd`; returns the emitted event, or `None` when nothing changed.
    pub fn handle(&mut self, cmd: Command) -> Option<Event> {
        if !self.state().would_change(cmd) {
            debug!("{} ignored, state unchanged", cmd.action());
            return None;
        }

        match cmd {
            Command::Play => {
                info!("Starting alarm");
                self.audio.start_looping();
            }
            Command::Stop => {
                info!("Stopping alarm");
                self.audio.stop();
            }
            Command::LocationOn => {
                if !self.location.is_available() {
                    warn!(
                        "{}",
                        Error::capability_unavailable("location (location_on ignored)")
                    );
                    return None;
                }
                if let Err(e) = self.bridge.subscribe() {
                    invariant_violated(e);
                    return None;
                }
                info!("Location streaming enabled");
            }
            Command::LocationOff => {
                if let Err(e) = self.bridge.unsubscribe() {
                    invariant_violated(e);
                    return None;
                }
                info!("Location streaming disabled");
            }
        }

        let transition = self.write_state(|state| state.apply(cmd));
        self.publish(transition)
    }

    /// The channel confirmed an open connection.
    pub fn on_connected(&mut self) -> Option<Event> {
        let transition = self.write_state(AlarmState::connection_opened);
        self.publish(transition)
    }

    /// The connection closed or failed. Location streaming ends with it.
    pub fn on_disconnected(&mut self) -> Option<Event> {
        if self.bridge.is_subscribed() {
            if let Err(e) = self.bridge.unsubscribe() {
                invariant_violated(e);
            }
        }
        let transition = self.write_state(AlarmState::connection_lost);
        self.publish(transition)
    }

    /// The channel was stopped and will not reconnect.
    ///
    /// With `halt`, the alarm and location tracking are stopped as well.
    /// Commands received before the stop have all been handled by now.
    pub fn on_stopped(&mut self, halt: bool) {
        if halt {
            self.handle(Command::Stop);
            self.handle(Command::LocationOff);
        }
        self.on_disconnected();
        self.bus.publish(&Event::ServerStopped);
    }

    fn write_state(&self, f: impl FnOnce(&mut AlarmState) -> Transition) -> Transition {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn publish(&self, transition: Transition) -> Option<Event> {
        let event = transition.event()?;
        self.bus.publish(&event);
        Some(event)
    }
}

fn invariant_violated(err: Error) {
    error!("{}", err);
    if err.is_fatal() && cfg!(debug_assertions) {
        panic!("{err}");
    }
}
