//! # alarm-core - Core Domain Types
//!
//! Foundation crate for the sound alarm agent. Provides domain types, the
//! alarm state machine, the wire codec, error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Command`] - Inbound instruction (play, stop, location on/off)
//! - [`Event`] - Outbound notification of a state change or telemetry sample
//! - [`LocationFix`] - A single position sample from a location provider
//!
//! ### State (`state`)
//! - [`AlarmState`] - Connected / playing / location flags and their transitions
//!
//! ### Wire Codec (`codec`)
//! - [`decode_command()`] - Parse an inbound JSON message into a [`Command`]
//! - [`encode_event()`] - Serialize an [`Event`] into its outbound JSON message
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use alarm_core::prelude::*;
//! ```

pub mod codec;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod state;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use codec::{decode_command, encode_event, WireMessage};
pub use error::{Error, Result, ResultExt};
pub use state::{AlarmState, Transition};
pub use types::{Command, Event, LocationFix};
