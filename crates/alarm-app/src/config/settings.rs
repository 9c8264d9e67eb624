//! Settings loader for config.toml

use std::path::{Path, PathBuf};

use super::types::Settings;
use alarm_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = "sound-alarm";

/// Default location of the settings file
/// (`~/.config/sound-alarm/config.toml` on Linux).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILENAME)
}

/// Load settings from `config_path`, falling back to defaults.
///
/// A missing file is normal; an unreadable or invalid file is logged and
/// ignored.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write a commented default config file unless one already exists.
pub fn init_config_file(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::config(format!("Failed to create {}: {}", dir.display(), e)))?;
    }

    let default_content = r#"# Sound alarm agent configuration

[server]
url = "wss://alarm-server-3aag.onrender.com"

[reconnect]
initial_delay_ms = 5000
max_delay_ms = 60000
multiplier = 2

[connection]
# Keep-alive ping period, 0 disables
ping_interval_secs = 15

[audio]
player = "paplay"
args = ["/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga"]
volume_command = ["pactl", "set-sink-volume", "@DEFAULT_SINK@", "100%"]

[location]
enabled = false
# latitude = 52.2297
# longitude = 21.0122
interval_ms = 5000
min_interval_ms = 3000

[http]
enabled = false
bind = "0.0.0.0:8080"

[behavior]
auto_start = true
report_state_changes = true
headless = false
"#;

    std::fs::write(config_path, default_content)
        .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
    info!("Wrote default config to {:?}", config_path);
    Ok(())
}

impl Settings {
    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.server.url)
            .map_err(|e| Error::config_invalid(format!("server.url '{}': {e}", self.server.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config_invalid(format!(
                "server.url must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }

        if self.reconnect.initial_delay_ms == 0 {
            return Err(Error::config_invalid(
                "reconnect.initial_delay_ms must be greater than 0",
            ));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(Error::config_invalid(
                "reconnect.initial_delay_ms must not exceed reconnect.max_delay_ms",
            ));
        }
        if self.reconnect.multiplier < 1 {
            return Err(Error::config_invalid("reconnect.multiplier must be at least 1"));
        }

        if self.audio.player.trim().is_empty() {
            return Err(Error::config_invalid("audio.player must not be empty"));
        }

        if self.location.enabled
            && (self.location.latitude.is_none() || self.location.longitude.is_none())
        {
            warn!("location.enabled is set without coordinates; location will be unavailable");
        }

        if self.http.enabled {
            self.http.bind_addr()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(&temp.path().join(CONFIG_FILENAME));

        assert_eq!(settings.server.url, "wss://alarm-server-3aag.onrender.com");
        assert_eq!(settings.reconnect.initial_delay_ms, 5_000);
        assert_eq!(settings.reconnect.max_delay_ms, 60_000);
        assert!(settings.behavior.auto_start);
        assert!(!settings.http.enabled);
        assert!(!settings.location.enabled);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);

        let config = r#"
[server]
url = "ws://192.168.1.20:9000/agent"

[reconnect]
initial_delay_ms = 1000

[location]
enabled = true
latitude = 52.1
longitude = 21.0
"#;
        std::fs::write(&path, config).unwrap();

        let settings = load_settings(&path);

        assert_eq!(settings.server.url, "ws://192.168.1.20:9000/agent");
        assert_eq!(settings.reconnect.initial_delay_ms, 1_000);
        assert_eq!(settings.reconnect.max_delay_ms, 60_000);
        assert!(settings.location.enabled);
        assert_eq!(settings.location.latitude, Some(52.1));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.server.url, super::super::types::DEFAULT_SERVER_URL);
    }

    #[test]
    fn test_init_config_file_round_trips() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILENAME);

        init_config_file(&path).unwrap();
        assert!(path.exists());

        let settings = load_settings(&path);
        assert_eq!(settings.connection.ping_interval_secs, 15);
        assert_eq!(settings.audio.player, "paplay");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_init_config_file_keeps_existing() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[behavior]\nauto_start = false\n").unwrap();

        init_config_file(&path).unwrap();
        assert!(!load_settings(&path).behavior.auto_start);
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let mut settings = Settings::default();
        settings.server.url = "https://example.org".to_string();
        assert!(matches!(
            settings.validate().unwrap_err(),
            Error::ConfigInvalid { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_garbage_url() {
        let mut settings = Settings::default();
        settings.server.url = "not a url".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut settings = Settings::default();
        settings.reconnect.initial_delay_ms = 120_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_initial_delay() {
        let mut settings = Settings::default();
        settings.reconnect.initial_delay_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("initial_delay_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_multiplier() {
        let mut settings = Settings::default();
        settings.reconnect.multiplier = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_default_config_path_file_name() {
        let path = default_config_path();
        assert!(path.ends_with("sound-alarm/config.toml"));
    }
}
