//! Event fan-out.
//!
//! Every emitted [`Event`] goes to the registered observers and the broadcast
//! channel. Only part of them goes back to the controller:
//! - location samples always
//! - alarm/location state changes when `report_state_changes` is set
//! - connection events never

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use alarm_core::prelude::*;
use alarm_core::{AlarmState, Event};

use crate::ports::{EventSink, Observer};

/// Capacity of the broadcast channel returned by [`EventBus::subscribe`].
const BROADCAST_CAPACITY: usize = 64;

/// Clonable fan-out point shared by the dispatcher and the location bridge.
#[derive(Clone)]
pub struct EventBus {
    sink: Arc<dyn EventSink>,
    observers: Arc<RwLock<Vec<Arc<dyn Observer>>>>,
    state: Arc<RwLock<AlarmState>>,
    event_tx: broadcast::Sender<Event>,
    report_state_changes: bool,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .field("report_state_changes", &self.report_state_changes)
            .finish()
    }
}

impl EventBus {
    pub fn new(
        sink: Arc<dyn EventSink>,
        state: Arc<RwLock<AlarmState>>,
        report_state_changes: bool,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sink,
            observers: Arc::new(RwLock::new(Vec::new())),
            state,
            event_tx,
            report_state_changes,
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        info!("Registered observer: {}", observer.name());
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Whether `event` is written to the controller connection.
    pub fn goes_to_wire(&self, event: &Event) -> bool {
        match event {
            Event::LocationSample { .. } => true,
            e if e.is_connection_event() => false,
            _ => self.report_state_changes,
        }
    }

    /// Fan `event` out to observers, subscribers and (if applicable) the wire.
    pub fn publish(&self, event: &Event) {
        if self.goes_to_wire(event) && !self.sink.send(event) {
            trace!("{} not delivered to controller", event.event_type());
        }

        let state = *self.state.read().unwrap_or_else(|e| e.into_inner());
        self.for_each_observer(|observer| observer.on_event(event, &state));

        // No receivers is normal
        let _ = self.event_tx.send(*event);
    }

    pub fn notify_connecting(&self) {
        self.for_each_observer(|observer| observer.on_connecting());
    }

    pub fn notify_connection_lost(&self, reason: &str) {
        self.for_each_observer(|observer| observer.on_connection_lost(reason));
    }

    fn for_each_observer(&self, hook: impl Fn(&dyn Observer) -> Result<()>) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            if let Err(e) = hook(observer.as_ref()) {
                warn!("Observer '{}' failed: {}", observer.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingObserver, RecordingSink};

    fn bus(report_state_changes: bool) -> (EventBus, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::connected());
        let state = Arc::new(RwLock::new(AlarmState::new()));
        (
            EventBus::new(sink.clone(), state, report_state_changes),
            sink,
        )
    }

    #[test]
    fn test_samples_always_go_to_wire() {
        let (bus, sink) = bus(false);
        let sample = Event::LocationSample {
            latitude: 1.0,
            longitude: 2.0,
        };

        bus.publish(&sample);
        bus.publish(&Event::AlarmStarted);

        assert_eq!(sink.sent(), vec![sample]);
    }

    #[test]
    fn test_state_changes_reported_when_enabled() {
        let (bus, sink) = bus(true);

        bus.publish(&Event::AlarmStarted);
        bus.publish(&Event::LocationStopped);

        assert_eq!(sink.sent(), vec![Event::AlarmStarted, Event::LocationStopped]);
    }

    #[test]
    fn test_connection_events_stay_local() {
        let (bus, sink) = bus(true);

        bus.publish(&Event::ServerStarted);
        bus.publish(&Event::ServerStopped);

        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_observers_see_every_event() {
        let (bus, _sink) = bus(false);
        let observer = Arc::new(RecordingObserver::default());
        bus.register_observer(observer.clone());

        bus.publish(&Event::ServerStarted);
        bus.publish(&Event::AlarmStarted);
        bus.notify_connection_lost("reset");

        assert_eq!(
            observer.events(),
            vec![Event::ServerStarted, Event::AlarmStarted]
        );
        assert_eq!(observer.lost(), vec!["reset".to_string()]);
    }

    #[test]
    fn test_subscribers_receive_published_events() {
        let (bus, _sink) = bus(false);
        let mut rx = bus.subscribe();

        bus.publish(&Event::AlarmStopped);

        assert_eq!(rx.try_recv().unwrap(), Event::AlarmStopped);
    }

    #[test]
    fn test_publish_without_connection_is_harmless() {
        let sink = Arc::new(RecordingSink::disconnected());
        let state = Arc::new(RwLock::new(AlarmState::new()));
        let bus = EventBus::new(sink.clone(), state, true);

        bus.publish(&Event::AlarmStarted);

        assert_eq!(sink.attempts(), 1);
        assert!(sink.sent().is_empty());
    }
}
