//! Application configuration.
//!
//! Each daemon loads `$XDG_CONFIG_HOME/<daemon>/config.json`.  Every section
//! is optional, so a minimal `{}` file is valid and missing keys fall back
//! to compiled-in defaults.
//!
//! # Example
//!
//! ```json
//! {
//!   "socket_path": "/tmp/ewwd.sock",
//!   "date": { "birth_date": "1996-02-26" },
//!   "timer": {
//!     "default_minutes": 90,
//!     "default_alarm_hours": 6,
//!     "min_alarm_hours": 3,
//!     "notify_command": "dunstify"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the daemon's well-known socket path.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Date provider settings.
    #[serde(default)]
    pub date: DateConfig,

    /// Timer and alarm defaults.
    #[serde(default)]
    pub timer: TimerConfig,
}

/// Date provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// `YYYY-MM-DD`, used for the `weeks_alive` counter.
    pub birth_date: String,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            birth_date: "1996-02-26".into(),
        }
    }
}

/// Timer and alarm defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Timer value after a reset, in minutes.
    pub default_minutes: u32,
    /// Alarm target after a reset, in hours from now.
    pub default_alarm_hours: u32,
    /// Alarm offset used instead when the current hour is almost over.
    pub min_alarm_hours: u32,
    /// Desktop notification program (`dunstify`-compatible flags).
    /// `null` disables notifications.
    pub notify_command: Option<String>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            default_minutes: 90,
            default_alarm_hours: 6,
            min_alarm_hours: 3,
            notify_command: Some("dunstify".into()),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load `config.json` from the daemon's config directory, or defaults.
    pub fn load_or_default(daemon: &str) -> Self {
        let path = config_dir(daemon).join("config.json");
        match Self::load(&path) {
            Ok(cfg) => {
                log::info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                log::info!("no config file ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// The configured socket path, or `default`.
    pub fn socket_path_or(&self, default: &str) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(default))
    }
}

/// Resolve the config directory (`$XDG_CONFIG_HOME/<daemon>`).
pub fn config_dir(daemon: &str) -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join(daemon)
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "socket_path": "/run/user/1000/ewwd.sock",
            "date": { "birth_date": "2000-01-01" },
            "timer": {
                "default_minutes": 25,
                "default_alarm_hours": 8,
                "min_alarm_hours": 4,
                "notify_command": "notify-send"
            }
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            cfg.socket_path_or("/tmp/ewwd.sock"),
            PathBuf::from("/run/user/1000/ewwd.sock")
        );
        assert_eq!(cfg.date.birth_date, "2000-01-01");
        assert_eq!(cfg.timer.default_minutes, 25);
        assert_eq!(cfg.timer.default_alarm_hours, 8);
        assert_eq!(cfg.timer.min_alarm_hours, 4);
        assert_eq!(cfg.timer.notify_command.as_deref(), Some("notify-send"));
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.socket_path_or("/tmp/ewwd.sock"), PathBuf::from("/tmp/ewwd.sock"));
        assert_eq!(cfg.date.birth_date, DateConfig::default().birth_date);
        let td = TimerConfig::default();
        assert_eq!(cfg.timer.default_minutes, td.default_minutes);
        assert_eq!(cfg.timer.default_alarm_hours, td.default_alarm_hours);
        assert_eq!(cfg.timer.min_alarm_hours, td.min_alarm_hours);
        assert_eq!(cfg.timer.notify_command, td.notify_command);
    }

    #[test]
    fn deserialize_partial_timer() {
        let json = r#"{ "timer": { "default_minutes": 45, "notify_command": null } }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.timer.default_minutes, 45);
        assert_eq!(cfg.timer.notify_command, None);
        assert_eq!(cfg.timer.min_alarm_hours, TimerConfig::default().min_alarm_hours);
    }

    #[test]
    fn unknown_top_level_keys_ignored() {
        let json = r#"{ "date": {}, "weather": { "api_key": "x" } }"#;
        let _cfg: Config = serde_json::from_str(json).unwrap();
    }

    #[test]
    fn load_reports_missing_file() {
        let path = std::env::temp_dir().join("deskd-no-such-config.json");
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().starts_with("config error: failed to read"));
    }
}
