//! Service lifecycle
//!
//! [`AlarmService`] owns the supervised channel and the dispatcher. Its run
//! loop consumes channel signals and host control actions; everything else
//! talks to it through a clonable [`ServiceHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::{broadcast, mpsc};

use alarm_core::prelude::*;
use alarm_core::{AlarmState, Command, Event};
use alarm_link::{BackoffPolicy, ChannelSignal, SupervisedChannel, Transport, CLOSE_REASON_SHUTDOWN};

use crate::bus::EventBus;
use crate::dispatcher::Dispatcher;
use crate::ports::{AudioOutput, LocationProvider, Observer};

/// Discrete lifecycle requests from the hosting process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Enable reconnection and connect.
    StartCore,
    /// Stop the alarm and location, then disconnect for good.
    StopCore,
    /// Silence the alarm without touching the connection.
    StopAlarm,
    /// Stop everything and leave the run loop.
    Quit,
}

impl ControlAction {
    /// Parse a host control word (`start`, `stop`, `stop-alarm`, `quit`).
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::StartCore),
            "stop" => Some(Self::StopCore),
            "stop-alarm" | "stop_alarm" => Some(Self::StopAlarm),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Options for [`AlarmService::new`].
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub backoff: BackoffPolicy,
    /// Also send alarm/location state changes to the controller.
    pub report_state_changes: bool,
}

/// Clonable handle to a running service.
#[derive(Clone)]
pub struct ServiceHandle {
    channel: SupervisedChannel,
    dispatcher: Arc<Mutex<Dispatcher>>,
    bus: EventBus,
    /// Set by stop-core and shutdown; consumed with the matching `Stopped`.
    halt_on_stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("channel", &self.channel)
            .field("state", &self.state())
            .finish()
    }
}

impl ServiceHandle {
    fn dispatcher(&self) -> MutexGuard<'_, Dispatcher> {
        self.dispatcher.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start (or keep) the controller connection.
    pub fn start_core(&self) {
        info!("Starting core");
        self.bus.notify_connecting();
        self.channel.start();
    }

    /// Stop the alarm and location tracking, then stop the connection.
    ///
    /// Commands already queued from the controller are applied before the
    /// `Stopped` signal, which silences the alarm again if one of them
    /// restarted it.
    pub fn stop_core(&self) {
        info!("Stopping core");
        self.halt(|channel| channel.stop());
    }

    /// Silence the alarm only.
    pub fn stop_alarm_only(&self) {
        self.dispatch(Command::Stop);
    }

    /// Like [`stop_core`](Self::stop_core), used when the process exits.
    pub fn shutdown(&self) {
        info!("Shutting down core");
        self.halt(|channel| channel.stop_with_reason(CLOSE_REASON_SHUTDOWN));
    }

    fn halt(&self, stop: impl FnOnce(&SupervisedChannel)) {
        // Reported while the connection is still up
        self.dispatch(Command::Stop);
        self.dispatch(Command::LocationOff);
        self.halt_on_stop.store(true, Ordering::SeqCst);
        stop(&self.channel);
    }

    /// Apply a command from any front end.
    pub fn dispatch(&self, cmd: Command) -> Option<Event> {
        self.dispatcher().handle(cmd)
    }

    pub fn state(&self) -> AlarmState {
        self.dispatcher().state()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn channel(&self) -> &SupervisedChannel {
        &self.channel
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        self.bus.register_observer(observer);
    }

    /// Feed one channel signal into the dispatcher.
    pub fn apply_signal(&self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Connected => {
                self.dispatcher().on_connected();
            }
            ChannelSignal::Disconnected { reason } => {
                self.bus.notify_connection_lost(&reason);
                self.dispatcher().on_disconnected();
            }
            ChannelSignal::ConnectFailed { reason } => {
                self.bus.notify_connection_lost(&reason);
            }
            ChannelSignal::Stopped => {
                let halt = self.halt_on_stop.swap(false, Ordering::SeqCst);
                self.dispatcher().on_stopped(halt);
            }
            ChannelSignal::Command(cmd) => {
                self.dispatch(cmd);
            }
        }
    }

    /// Run `action`; returns `false` for [`ControlAction::Quit`].
    pub fn apply_action(&self, action: ControlAction) -> bool {
        debug!("Control action: {:?}", action);
        match action {
            ControlAction::StartCore => self.start_core(),
            ControlAction::StopCore => self.stop_core(),
            ControlAction::StopAlarm => self.stop_alarm_only(),
            ControlAction::Quit => {
                self.shutdown();
                return false;
            }
        }
        true
    }
}

/// The alarm agent: one supervised channel feeding one dispatcher.
pub struct AlarmService {
    handle: ServiceHandle,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
}

impl AlarmService {
    /// Build the service and spawn the channel's supervision task.
    ///
    /// Must be called inside a tokio runtime. Nothing connects until
    /// [`ServiceHandle::start_core`].
    pub fn new<T>(
        transport: T,
        audio: Arc<dyn AudioOutput>,
        location: Arc<dyn LocationProvider>,
        options: ServiceOptions,
    ) -> Self
    where
        T: Transport + Sync + 'static,
    {
        let (channel, signals) = SupervisedChannel::spawn(transport, options.backoff);
        let state = Arc::new(RwLock::new(AlarmState::new()));
        let bus = EventBus::new(
            Arc::new(channel.clone()),
            Arc::clone(&state),
            options.report_state_changes,
        );
        let dispatcher = Dispatcher::new(state, audio, location, bus.clone());

        Self {
            handle: ServiceHandle {
                channel,
                dispatcher: Arc::new(Mutex::new(dispatcher)),
                bus,
                halt_on_stop: Arc::new(AtomicBool::new(false)),
            },
            signals,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        self.handle.register_observer(observer);
    }

    /// Process channel signals and control actions until
    /// [`ControlAction::Quit`] arrives or every action sender is dropped.
    pub async fn run(self, mut actions: mpsc::Receiver<ControlAction>) {
        let Self {
            handle,
            mut signals,
        } = self;

        loop {
            tokio::select! {
                Some(signal) = signals.recv() => {
                    handle.apply_signal(signal);
                }

                action = actions.recv() => {
                    match action {
                        Some(action) => {
                            if !handle.apply_action(action) {
                                break;
                            }
                        }
                        None => {
                            debug!("Control channel closed");
                            handle.shutdown();
                            break;
                        }
                    }
                }
            }
        }

        // Signals emitted by the shutdown itself
        while let Ok(signal) = signals.try_recv() {
            handle.apply_signal(signal);
        }
        info!("Alarm service stopped");
    }
}
