//! # alarm-link - Supervised Controller Connection
//!
//! Keeps a single persistent connection to the remote controller alive,
//! reconnecting with exponential backoff, decoding inbound commands and
//! writing outbound events.
//!
//! Depends on [`alarm_core`] for domain types, the wire codec and error
//! handling.
//!
//! ## Public API
//!
//! ### Supervision
//! - [`SupervisedChannel`] - Start/stop/send handle backed by a supervision task
//! - [`ChannelSignal`] - Connected / Disconnected / ConnectFailed / Stopped / Command, in order
//! - [`ChannelState`] - Idle, Connecting, Connected, Closing
//!
//! ### Backoff
//! - [`Backoff`], [`BackoffPolicy`] - Exponential reconnection delay
//!
//! ### Transports
//! - [`Transport`] - Seam for opening a connection as a [`Link`]
//! - [`WebSocketTransport`] - `ws://` / `wss://` via tokio-tungstenite

pub mod backoff;
pub mod channel;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod transport;
pub mod websocket;

// Public API re-exports
pub use backoff::{Backoff, BackoffPolicy};
pub use channel::{
    ChannelSignal, ChannelState, SupervisedChannel, CLOSE_REASON_SHUTDOWN, CLOSE_REASON_USER,
};
pub use transport::{Inbound, Link, LocalTransport, Outbound, Transport, CLOSE_NORMAL};
pub use websocket::WebSocketTransport;
