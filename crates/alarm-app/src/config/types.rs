//! Configuration types for the sound alarm agent
//!
//! Defines:
//! - `Settings` - Global agent settings, one struct per TOML section
//! - Section types with serde defaults so partial files are valid

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use alarm_core::prelude::*;
use alarm_link::BackoffPolicy;

/// Default controller endpoint.
pub const DEFAULT_SERVER_URL: &str = "wss://alarm-server-3aag.onrender.com";

/// Global agent settings (from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub audio: AudioSettings,

    #[serde(default)]
    pub location: LocationSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub behavior: BehaviorSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// WebSocket URL of the controller (`ws://` or `wss://`)
    #[serde(default = "default_server_url")]
    pub url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl ReconnectSettings {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Keep-alive ping period in seconds (0 disables pings)
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl ConnectionSettings {
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioSettings {
    /// Player executable, resolved through PATH
    #[serde(default = "default_player")]
    pub player: String,

    /// Arguments passed to the player (usually the sound file)
    #[serde(default = "default_player_args")]
    pub args: Vec<String>,

    /// Command run before playback to force maximum volume (empty disables)
    #[serde(default = "default_volume_command")]
    pub volume_command: Vec<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            player: default_player(),
            args: default_player_args(),
            volume_command: default_volume_command(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationSettings {
    /// Whether location may be shared at all (the permission switch)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Desired period between fixes
    #[serde(default = "default_location_interval_ms")]
    pub interval_ms: u64,

    /// Fixes are never produced faster than this
    #[serde(default = "default_location_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            latitude: None,
            longitude: None,
            interval_ms: default_location_interval_ms(),
            min_interval_ms: default_location_min_interval_ms(),
        }
    }
}

impl LocationSettings {
    /// Effective period between fixes.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(self.min_interval_ms).max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    /// Serve the request/response control routes
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_http_bind")]
    pub bind: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_http_bind(),
        }
    }
}

impl HttpSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| Error::config_invalid(format!("http.bind '{}': {e}", self.bind)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BehaviorSettings {
    /// Connect as soon as the agent starts
    #[serde(default = "default_true")]
    pub auto_start: bool,

    /// Also report alarm/location state changes to the controller
    #[serde(default = "default_true")]
    pub report_state_changes: bool,

    /// Write every event to stdout as NDJSON
    #[serde(default)]
    pub headless: bool,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            report_state_changes: true,
            headless: false,
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> u32 {
    2
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_player() -> String {
    "paplay".to_string()
}

fn default_player_args() -> Vec<String> {
    vec!["/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga".to_string()]
}

fn default_volume_command() -> Vec<String> {
    ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "100%"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_location_interval_ms() -> u64 {
    5_000
}

fn default_location_min_interval_ms() -> u64 {
    3_000
}

fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}
