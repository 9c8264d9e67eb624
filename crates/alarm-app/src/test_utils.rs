//! Recording collaborators for tests
//!
//! In-memory stand-ins for audio output, the location provider, the event
//! sink and observers. Each records what the core asked of it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alarm_core::prelude::*;
use alarm_core::{AlarmState, Event, LocationFix};

use crate::ports::{AudioOutput, EventSink, FixCallback, LocationProvider, Observer, SubscriptionHandle};

// ─────────────────────────────────────────────────────────
// Audio
// ─────────────────────────────────────────────────────────

/// Counts start/stop calls.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl RecordingAudio {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioOutput for RecordingAudio {
    fn start_looping(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────

type SharedCallback = Arc<dyn Fn(LocationFix) + Send + Sync>;

/// Location provider whose fixes are pushed by the test with [`emit`].
///
/// [`emit`]: ManualLocationProvider::emit
pub struct ManualLocationProvider {
    available: AtomicBool,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, SharedCallback>>,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
}

impl std::fmt::Debug for ManualLocationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualLocationProvider")
            .field("available", &self.available.load(Ordering::SeqCst))
            .field("active", &self.active_subscriptions())
            .finish()
    }
}

impl ManualLocationProvider {
    pub fn available() -> Self {
        Self::with_availability(true)
    }

    pub fn unavailable() -> Self {
        Self::with_availability(false)
    }

    fn with_availability(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Deliver `fix` to every current subscriber.
    pub fn emit(&self, fix: LocationFix) {
        let callbacks: Vec<SharedCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(fix);
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl LocationProvider for ManualLocationProvider {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn subscribe(&self, on_fix: FixCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::from(on_fix));
        SubscriptionHandle(id)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.0);
    }
}

// ─────────────────────────────────────────────────────────
// Sink and observer
// ─────────────────────────────────────────────────────────

/// Event sink that records delivered events.
#[derive(Debug)]
pub struct RecordingSink {
    connected: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        let sink = Self::connected();
        sink.set_connected(false);
        sink
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Events actually delivered.
    pub fn sent(&self) -> Vec<Event> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every send call, delivered or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: &Event) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*event);
        true
    }
}

/// Observer that records every hook invocation.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
    states: Mutex<Vec<AlarmState>>,
    connecting: AtomicUsize,
    lost: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// State snapshot passed alongside each event.
    pub fn states(&self) -> Vec<AlarmState> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn connecting(&self) -> usize {
        self.connecting.load(Ordering::SeqCst)
    }

    pub fn lost(&self) -> Vec<String> {
        self.lost.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of recorded events matching `event`.
    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

impl Observer for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &Event, state: &AlarmState) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*event);
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*state);
        Ok(())
    }

    fn on_connecting(&self) -> Result<()> {
        self.connecting.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_connection_lost(&self, reason: &str) -> Result<()> {
        self.lost
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_provider_stops_delivering_after_unsubscribe() {
        let provider = ManualLocationProvider::available();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        let handle = provider.subscribe(Box::new(move |_: LocationFix| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        provider.emit(LocationFix::new(1.0, 2.0));
        provider.unsubscribe(handle);
        provider.emit(LocationFix::new(3.0, 4.0));

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(provider.active_subscriptions(), 0);
    }

    #[test]
    fn test_recording_sink_respects_connection() {
        let sink = RecordingSink::disconnected();
        assert!(!sink.send(&Event::AlarmStarted));
        sink.set_connected(true);
        assert!(sink.send(&Event::AlarmStopped));

        assert_eq!(sink.sent(), vec![Event::AlarmStopped]);
        assert_eq!(sink.attempts(), 2);
    }
}
