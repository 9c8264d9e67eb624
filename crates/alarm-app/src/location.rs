//! Bridge from a position-fix producer to outbound events.
//!
//! Subscribe and unsubscribe are paired: exactly one subscription exists per
//! location-on / location-off cycle. Each fix received while subscribed is
//! published immediately as [`Event::LocationSample`]; nothing is buffered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alarm_core::prelude::*;
use alarm_core::{Event, LocationFix};

use crate::bus::EventBus;
use crate::ports::{LocationProvider, SubscriptionHandle};

struct ActiveSubscription {
    handle: SubscriptionHandle,
    /// Cleared on unsubscribe so a fix racing the unsubscribe is dropped.
    live: Arc<AtomicBool>,
}

pub struct LocationBridge {
    provider: Arc<dyn LocationProvider>,
    bus: EventBus,
    active: Option<ActiveSubscription>,
}

impl std::fmt::Debug for LocationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationBridge")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

impl LocationBridge {
    pub fn new(provider: Arc<dyn LocationProvider>, bus: EventBus) -> Self {
        Self {
            provider,
            bus,
            active: None,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    /// Start forwarding fixes.
    ///
    /// Fails with [`Error::Invariant`] when already subscribed.
    pub fn subscribe(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::invariant("location bridge is already subscribed"));
        }

        let live = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&live);
        let bus = self.bus.clone();
        let handle = self.provider.subscribe(Box::new(move |fix: LocationFix| {
            if flag.load(Ordering::SeqCst) {
                bus.publish(&Event::from(fix));
            }
        }));

        debug!("Location subscription {:?} started", handle);
        self.active = Some(ActiveSubscription { handle, live });
        Ok(())
    }

    /// Stop forwarding fixes.
    ///
    /// Fails with [`Error::Invariant`] when not subscribed.
    pub fn unsubscribe(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Err(Error::invariant("location bridge is not subscribed"));
        };

        active.live.store(false, Ordering::SeqCst);
        self.provider.unsubscribe(active.handle);
        debug!("Location subscription {:?} ended", active.handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ManualLocationProvider, RecordingSink};
    use alarm_core::{AlarmState, LocationFix};
    use std::sync::RwLock;

    fn setup() -> (LocationBridge, Arc<ManualLocationProvider>, Arc<RecordingSink>) {
        let provider = Arc::new(ManualLocationProvider::available());
        let sink = Arc::new(RecordingSink::connected());
        let bus = EventBus::new(
            sink.clone(),
            Arc::new(RwLock::new(AlarmState::new())),
            false,
        );
        (LocationBridge::new(provider.clone(), bus), provider, sink)
    }

    #[test]
    fn test_fixes_forwarded_while_subscribed() {
        let (mut bridge, provider, sink) = setup();

        bridge.subscribe().unwrap();
        provider.emit(LocationFix::new(52.1, 21.0));
        provider.emit(LocationFix::new(52.2, 21.1));

        assert_eq!(
            sink.sent(),
            vec![
                Event::LocationSample {
                    latitude: 52.1,
                    longitude: 21.0
                },
                Event::LocationSample {
                    latitude: 52.2,
                    longitude: 21.1
                },
            ]
        );
    }

    #[test]
    fn test_no_fixes_after_unsubscribe() {
        let (mut bridge, provider, sink) = setup();

        bridge.subscribe().unwrap();
        bridge.unsubscribe().unwrap();
        provider.emit(LocationFix::new(1.0, 1.0));

        assert!(sink.sent().is_empty());
        assert_eq!(provider.subscribes(), 1);
        assert_eq!(provider.unsubscribes(), 1);
        assert!(!bridge.is_subscribed());
    }

    #[test]
    fn test_double_subscribe_is_an_invariant_violation() {
        let (mut bridge, provider, _sink) = setup();

        bridge.subscribe().unwrap();
        let err = bridge.subscribe().unwrap_err();

        assert!(matches!(err, Error::Invariant { .. }));
        assert!(err.is_fatal());
        assert_eq!(provider.active_subscriptions(), 1);
    }

    #[test]
    fn test_unsubscribe_without_subscription_fails() {
        let (mut bridge, provider, _sink) = setup();

        assert!(matches!(
            bridge.unsubscribe().unwrap_err(),
            Error::Invariant { .. }
        ));
        assert_eq!(provider.unsubscribes(), 0);
    }

    #[test]
    fn test_resubscribe_after_cycle() {
        let (mut bridge, provider, sink) = setup();

        bridge.subscribe().unwrap();
        bridge.unsubscribe().unwrap();
        bridge.subscribe().unwrap();
        provider.emit(LocationFix::new(5.0, 6.0));

        assert_eq!(sink.sent().len(), 1);
        assert_eq!(provider.active_subscriptions(), 1);
    }
}
