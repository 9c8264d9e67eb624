//! Sound Alarm Agent
//!
//! Host process for the remote-triggered alarm: CLI, signal handling, stdin
//! control actions and wiring. The domain lives in the workspace crates.

pub mod control;
pub mod runner;
pub mod signals;

pub use runner::run;
