//! Supervised connection to the remote controller.
//!
//! [`SupervisedChannel`] keeps at most one connection attempt alive at a time
//! and retries with exponential backoff whenever the connection closes or
//! fails, until [`SupervisedChannel::stop`] is called.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SupervisedChannel                          │
//! │                                                                   │
//! │  ┌──────────────┐          ┌───────────────────────────────────┐ │
//! │  │  Public API  │          │  Supervision task                  │ │
//! │  │              │          │                                    │ │
//! │  │  start()   ──┼──ctrl──▶ │  Idle → Connecting → Connected     │ │
//! │  │  stop()    ──┼──ctrl──▶ │  retry timer (cancellable)         │ │
//! │  │              │          │        ▲                           │ │
//! │  │  send()    ──┼─ writer ─┼────────┼──▶ Link.outbound           │ │
//! │  │              │          │  attempt / frame / end events      │ │
//! │  │  signals   ◀─┼──────────┼─ Connected, Disconnected, Command  │ │
//! │  └──────────────┘          └───────────────────────────────────┘ │
//! │                                                                   │
//! │  Fence { generation, should_reconnect }: every attempt is tagged  │
//! │  with a generation; completions from an older generation are      │
//! │  discarded, so nothing leaks out after stop().                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connect attempts and link readers run as their own tasks and report back
//! through one internal queue, so the supervision loop never blocks on
//! network I/O and `stop()` can interrupt a pending retry immediately.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use alarm_core::prelude::*;
use alarm_core::{decode_command, encode_event, Command, Event};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::transport::{Inbound, Link, Outbound, Transport, CLOSE_NORMAL};

/// Close reason used by [`SupervisedChannel::stop`].
pub const CLOSE_REASON_USER: &str = "User stopped";

/// Close reason used when the hosting service shuts down.
pub const CLOSE_REASON_SHUTDOWN: &str = "Service destroyed";

/// Longest prefix of a discarded inbound message that is logged.
const LOG_PREVIEW_BYTES: usize = 120;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle of the single connection owned by a [`SupervisedChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and no attempt in flight (a retry may be pending).
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and exchanging messages.
    Connected,
    /// Tearing down the current connection after `stop()`.
    Closing,
}

/// Everything the channel reports to its consumer, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// The transport confirmed the connection is open.
    Connected,
    /// The connection closed or failed; a retry follows unless stopped.
    Disconnected { reason: String },
    /// A connection attempt failed before opening; a retry follows.
    ConnectFailed { reason: String },
    /// `stop()` was called; no further signals from earlier attempts.
    Stopped,
    /// A decoded inbound command.
    Command(Command),
}

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// Messages from the public API to the supervision task.
#[derive(Debug)]
enum Control {
    Start,
    Stop { reason: &'static str },
}

/// Completions reported to the supervision task, each tagged with the
/// generation of the attempt that produced it.
enum TaskEvent {
    Attempt { generation: u64, result: Result<Link> },
    Frame { generation: u64, text: String },
    Ended { generation: u64, reason: String },
}

#[derive(Debug)]
struct Fence {
    generation: u64,
    should_reconnect: bool,
}

struct Shared {
    fence: Mutex<Fence>,
    state: RwLock<ChannelState>,
    current_delay: RwLock<Duration>,
    /// Outbound queue of the live connection; `Some` only while connected.
    writer: RwLock<Option<mpsc::Sender<Outbound>>>,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
}

impl Shared {
    fn lock_fence(&self) -> std::sync::MutexGuard<'_, Fence> {
        self.fence.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ChannelState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn set_writer(&self, writer: Option<mpsc::Sender<Outbound>>) {
        *self.writer.write().unwrap_or_else(|e| e.into_inner()) = writer;
    }

    fn set_current_delay(&self, delay: Duration) {
        *self.current_delay.write().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    fn emit(&self, signal: ChannelSignal) {
        if self.signal_tx.send(signal).is_err() {
            debug!("Channel signal receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// SupervisedChannel
// ---------------------------------------------------------------------------

/// Clonable handle to a supervised controller connection.
///
/// Create with [`SupervisedChannel::spawn`]. All methods are synchronous and
/// never wait on the network; they may be called from any task or thread.
/// The supervision task exits once every handle is dropped.
#[derive(Clone)]
pub struct SupervisedChannel {
    control_tx: mpsc::UnboundedSender<Control>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SupervisedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedChannel")
            .field("state", &self.shared.state())
            .finish()
    }
}

impl SupervisedChannel {
    /// Spawn the supervision task for `transport`.
    ///
    /// Returns the handle and the receiver of [`ChannelSignal`]s. Nothing
    /// connects until [`start`](Self::start) is called.
    pub fn spawn<T>(
        transport: T,
        policy: BackoffPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelSignal>)
    where
        T: Transport + Sync + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let backoff = Backoff::new(policy);

        let shared = Arc::new(Shared {
            fence: Mutex::new(Fence {
                generation: 0,
                should_reconnect: false,
            }),
            state: RwLock::new(ChannelState::Idle),
            current_delay: RwLock::new(backoff.current()),
            writer: RwLock::new(None),
            signal_tx,
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor {
            transport: Arc::new(transport),
            shared: Arc::clone(&shared),
            backoff,
            event_tx,
            link: None,
            attempt: None,
        };
        tokio::spawn(run_supervisor(supervisor, control_rx, event_rx));

        (Self { control_tx, shared }, signal_rx)
    }

    /// Enable reconnection and connect if idle. Idempotent.
    pub fn start(&self) {
        self.shared.lock_fence().should_reconnect = true;
        if self.control_tx.send(Control::Start).is_err() {
            warn!("Supervision task has exited; start ignored");
        }
    }

    /// Disable reconnection, close any live connection with a normal-closure
    /// code, and cancel any pending retry.
    ///
    /// [`ChannelSignal::Stopped`] is emitted before this returns, and no
    /// signal from an attempt started earlier is emitted afterwards.
    pub fn stop(&self) {
        self.stop_with_reason(CLOSE_REASON_USER);
    }

    /// [`stop`](Self::stop) with a specific close reason.
    pub fn stop_with_reason(&self, reason: &'static str) {
        {
            let mut fence = self.shared.lock_fence();
            fence.should_reconnect = false;
            fence.generation += 1;
            self.shared.set_writer(None);
            self.shared.emit(ChannelSignal::Stopped);
        }
        info!("Controller connection stopped ({})", reason);
        let _ = self.control_tx.send(Control::Stop { reason });
    }

    /// Write `event` on the live connection.
    ///
    /// Best-effort: returns `false` and drops the event when not connected
    /// or when the outbound queue is full. Nothing is queued for later.
    pub fn send(&self, event: &Event) -> bool {
        let writer = self
            .shared
            .writer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let Some(writer) = writer else {
            debug!("Not connected, dropping {} event", event.event_type());
            return false;
        };

        let text = match encode_event(event) {
            Ok(text) => text,
            Err(err) => {
                warn!("Cannot encode {} event: {}", event.event_type(), err);
                return false;
            }
        };

        match writer.try_send(Outbound::Text(text)) {
            Ok(()) => true,
            Err(err) => {
                debug!("Dropping {} event: {}", event.event_type(), err);
                false
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Return `true` if the channel is currently connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Whether the channel will reconnect after the next close or failure.
    pub fn should_reconnect(&self) -> bool {
        self.shared.lock_fence().should_reconnect
    }

    /// The delay the next retry will wait.
    pub fn current_delay(&self) -> Duration {
        *self
            .shared
            .current_delay
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Supervision task
// ---------------------------------------------------------------------------

struct Supervisor<T> {
    transport: Arc<T>,
    shared: Arc<Shared>,
    backoff: Backoff,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
    /// Outbound queue of the live connection, kept to close it on stop.
    link: Option<mpsc::Sender<Outbound>>,
    /// The in-flight connect task, if any.
    attempt: Option<JoinHandle<()>>,
}

async fn run_supervisor<T>(
    mut supervisor: Supervisor<T>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    mut event_rx: mpsc::UnboundedReceiver<TaskEvent>,
) where
    T: Transport + Sync + 'static,
{
    let mut retry_at: Option<Instant> = None;

    loop {
        tokio::select! {
            control = control_rx.recv() => {
                match control {
                    Some(Control::Start) => {
                        supervisor.on_start();
                    }
                    Some(Control::Stop { reason }) => {
                        retry_at = None;
                        supervisor.on_stop(reason);
                    }
                    None => {
                        debug!("All channel handles dropped, shutting down");
                        supervisor.on_stop(CLOSE_REASON_SHUTDOWN);
                        break;
                    }
                }
            }

            Some(event) = event_rx.recv() => {
                if let Some(delay) = supervisor.on_task_event(event) {
                    retry_at = Some(Instant::now() + delay);
                }
            }

            _ = sleep_until(retry_at) => {
                retry_at = None;
                supervisor.on_retry_due();
            }
        }
    }

    debug!("Supervision task exiting");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl<T> Supervisor<T>
where
    T: Transport + Sync + 'static,
{
    fn on_start(&mut self) {
        let state = self.shared.state();
        if state != ChannelState::Idle {
            debug!("start: channel already {:?}", state);
            return;
        }
        self.begin_attempt();
    }

    fn on_stop(&mut self, reason: &'static str) {
        self.shared.set_state(ChannelState::Closing);
        self.cancel_attempt();
        if let Some(link) = self.link.take() {
            close_link(&link, reason);
        }
        self.shared.set_writer(None);
        self.shared.set_state(ChannelState::Idle);
    }

    fn on_retry_due(&mut self) {
        let should_reconnect = self.shared.lock_fence().should_reconnect;
        let state = self.shared.state();
        if !should_reconnect || state != ChannelState::Idle {
            debug!(
                "Skipping scheduled retry (should_reconnect={}, state={:?})",
                should_reconnect, state
            );
            return;
        }
        self.begin_attempt();
    }

    fn begin_attempt(&mut self) {
        let generation = {
            let mut fence = self.shared.lock_fence();
            if !fence.should_reconnect {
                return;
            }
            fence.generation += 1;
            fence.generation
        };

        self.cancel_attempt();
        self.shared.set_state(ChannelState::Connecting);
        info!("Connecting to controller (generation {})", generation);

        let transport = Arc::clone(&self.transport);
        let event_tx = self.event_tx.clone();
        self.attempt = Some(tokio::spawn(async move {
            let result = transport.connect().await;
            let _ = event_tx.send(TaskEvent::Attempt { generation, result });
        }));
    }

    /// Abort the in-flight connect, so at most one is ever pending.
    fn cancel_attempt(&mut self) {
        if let Some(task) = self.attempt.take() {
            if !task.is_finished() {
                debug!("Abandoning in-flight connection attempt");
            }
            task.abort();
        }
    }

    /// Handle a completion; returns a retry delay when one was scheduled.
    fn on_task_event(&mut self, event: TaskEvent) -> Option<Duration> {
        match event {
            TaskEvent::Attempt { generation, result } => self.on_attempt(generation, result),
            TaskEvent::Frame { generation, text } => {
                self.on_frame(generation, &text);
                None
            }
            TaskEvent::Ended { generation, reason } => self.on_ended(generation, reason),
        }
    }

    fn on_attempt(&mut self, generation: u64, result: Result<Link>) -> Option<Duration> {
        let fence = self.shared.lock_fence();
        if fence.generation != generation {
            drop(fence);
            debug!("Discarding stale connection attempt (generation {})", generation);
            if let Ok(link) = result {
                close_link(&link.outbound, CLOSE_REASON_USER);
            }
            return None;
        }
        self.attempt = None;

        match result {
            Ok(link) => {
                self.backoff.reset();
                self.shared.set_current_delay(self.backoff.current());
                self.shared.set_writer(Some(link.outbound.clone()));
                self.shared.set_state(ChannelState::Connected);
                self.shared.emit(ChannelSignal::Connected);
                drop(fence);

                info!("Connected to controller");
                self.link = Some(link.outbound);
                spawn_link_reader(generation, link.inbound, self.event_tx.clone());
                None
            }
            Err(err) => {
                self.shared.set_state(ChannelState::Idle);
                self.shared.emit(ChannelSignal::ConnectFailed {
                    reason: err.to_string(),
                });
                drop(fence);

                if err.is_recoverable() {
                    warn!("Connection attempt failed: {}", err);
                } else {
                    error!("Connection attempt failed: {}", err);
                }
                self.schedule_retry()
            }
        }
    }

    fn on_frame(&mut self, generation: u64, text: &str) {
        let command = match decode_command(text) {
            Ok(command) => command,
            Err(err) => {
                warn!(
                    "Discarding inbound message: {} ({})",
                    err,
                    log_preview(text)
                );
                return;
            }
        };

        let fence = self.shared.lock_fence();
        if fence.generation == generation {
            debug!("Received {:?}", command);
            self.shared.emit(ChannelSignal::Command(command));
        }
    }

    fn on_ended(&mut self, generation: u64, reason: String) -> Option<Duration> {
        {
            let fence = self.shared.lock_fence();
            if fence.generation != generation {
                return None;
            }
            self.shared.set_writer(None);
            self.shared.set_state(ChannelState::Idle);
            self.shared.emit(ChannelSignal::Disconnected {
                reason: reason.clone(),
            });
        }

        warn!("Controller connection lost: {}", reason);
        self.link = None;
        self.schedule_retry()
    }

    fn schedule_retry(&mut self) -> Option<Duration> {
        if !self.shared.lock_fence().should_reconnect {
            debug!("Reconnect disabled, not scheduling a retry");
            return None;
        }

        let delay = self.backoff.next_delay();
        self.shared.set_current_delay(self.backoff.current());
        info!("Retrying connection in {:?}", delay);
        Some(delay)
    }
}

/// Forward one link's inbound frames to the supervision task.
fn spawn_link_reader(
    generation: u64,
    mut inbound: mpsc::Receiver<Inbound>,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
) {
    tokio::spawn(async move {
        while let Some(frame) = inbound.recv().await {
            let event = match frame {
                Inbound::Text(text) => TaskEvent::Frame { generation, text },
                Inbound::Closed { code, reason } => {
                    let reason = match code {
                        Some(code) => format!("closed ({code}) {reason}"),
                        None => format!("closed {reason}"),
                    };
                    let _ = event_tx.send(TaskEvent::Ended { generation, reason });
                    return;
                }
                Inbound::Failed(err) => {
                    let _ = event_tx.send(TaskEvent::Ended {
                        generation,
                        reason: format!("failed: {err}"),
                    });
                    return;
                }
            };
            if event_tx.send(event).is_err() {
                return;
            }
        }

        let _ = event_tx.send(TaskEvent::Ended {
            generation,
            reason: "link dropped".to_string(),
        });
    });
}

/// Leading part of `text`, cut on a character boundary.
fn log_preview(text: &str) -> &str {
    if text.len() <= LOG_PREVIEW_BYTES {
        return text;
    }
    let mut end = LOG_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn close_link(link: &mpsc::Sender<Outbound>, reason: &str) {
    let frame = Outbound::Close {
        code: CLOSE_NORMAL,
        reason: reason.to_string(),
    };
    if let Err(err) = link.try_send(frame) {
        debug!("Could not queue close frame: {}", err);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
