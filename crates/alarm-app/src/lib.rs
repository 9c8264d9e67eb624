//! # alarm-app - Command Dispatch and Service Lifecycle
//!
//! Applies controller commands to the alarm state, drives the audio and
//! location collaborators, and owns the supervised connection for the
//! lifetime of the agent.
//!
//! ## Architecture
//!
//! ```text
//!   SupervisedChannel ──signals──▶ AlarmService run loop ──▶ Dispatcher
//!          ▲                                ▲                    │
//!          │                    ControlAction (host)             ▼
//!          └──────── EventBus ◀── events ◀── AlarmState + collaborators
//!                       │
//!                       └──▶ observers (StatusNotifier), broadcast
//! ```
//!
//! The HTTP front end ([`http::router`]) feeds the same dispatcher through
//! a [`ServiceHandle`].
//!
//! ## Public API
//!
//! - [`AlarmService`], [`ServiceHandle`], [`ControlAction`] - lifecycle
//! - [`Dispatcher`], [`LocationBridge`], [`EventBus`] - the command core
//! - [`AudioOutput`], [`LocationProvider`], [`Observer`] - collaborator ports
//! - [`CommandAudio`], [`ConfiguredLocationProvider`], [`StatusNotifier`] - host collaborators
//! - [`config`] - settings loading and validation

pub mod audio;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod http;
pub mod location;
pub mod notifier;
pub mod ports;
pub mod provider;
pub mod service;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use audio::CommandAudio;
pub use bus::EventBus;
pub use config::Settings;
pub use dispatcher::Dispatcher;
pub use location::LocationBridge;
pub use notifier::{Notification, StatusNotifier};
pub use ports::{AudioOutput, EventSink, FixCallback, LocationProvider, Observer, SubscriptionHandle};
pub use provider::ConfiguredLocationProvider;
pub use service::{AlarmService, ControlAction, ServiceHandle, ServiceOptions};
