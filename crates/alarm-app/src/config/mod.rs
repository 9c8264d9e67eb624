//! Configuration file parsing for the sound alarm agent
//!
//! Supports:
//! - `~/.config/sound-alarm/config.toml` - Agent settings (or `--config PATH`)

pub mod settings;
pub mod types;

pub use settings::{default_config_path, init_config_file, load_settings};
pub use types::*;
