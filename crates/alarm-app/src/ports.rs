//! Collaborator interfaces consumed by the dispatcher.
//!
//! The core never talks to audio hardware, position sources or a display
//! directly. Hosts supply implementations of these traits; tests supply
//! recording fakes or `mockall` mocks.

use std::fmt;

use alarm_core::prelude::*;
use alarm_core::{AlarmState, Event, LocationFix};
use alarm_link::SupervisedChannel;

/// Looping alarm playback.
///
/// Both calls are idempotent and report nothing back; failures are the
/// implementation's to log.
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send + Sync {
    fn start_looping(&self);
    fn stop(&self);
}

/// Callback invoked for every position fix while subscribed.
pub type FixCallback = Box<dyn Fn(LocationFix) + Send + Sync>;

/// Opaque token returned by [`LocationProvider::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Capability check and periodic position-fix producer.
pub trait LocationProvider: Send + Sync {
    /// Whether location may be used at all (permission and hardware).
    fn is_available(&self) -> bool;

    fn subscribe(&self, on_fix: FixCallback) -> SubscriptionHandle;

    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Outbound side of the controller connection.
pub trait EventSink: Send + Sync {
    /// Best-effort write; returns whether the event was handed to the
    /// transport.
    fn send(&self, event: &Event) -> bool;
}

impl EventSink for SupervisedChannel {
    fn send(&self, event: &Event) -> bool {
        SupervisedChannel::send(self, event)
    }
}

/// Display-only consumer of emitted events (status line, headless output).
///
/// Each hook has a default no-op implementation. Observers never feed back
/// into the core; an error is logged and otherwise ignored.
pub trait Observer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Called for every emitted event, after the state change it describes.
    fn on_event(&self, _event: &Event, _state: &AlarmState) -> Result<()> {
        Ok(())
    }

    /// Called when the core is asked to start connecting.
    fn on_connecting(&self) -> Result<()> {
        Ok(())
    }

    /// Called when a live connection closed or failed.
    fn on_connection_lost(&self, _reason: &str) -> Result<()> {
        Ok(())
    }
}
