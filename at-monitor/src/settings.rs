//! Monitor settings

use std::path::PathBuf;

use anyhow::{Context, Result};
use at_engine::SessionConfig;
use at_sim::VirtualModemConfig;
use serde::{Deserialize, Serialize};

/// Persisted monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Serial port used when none is given on the command line
    #[serde(default)]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Print raw traffic as well as decoded events
    #[serde(default)]
    pub show_traffic: bool,
    /// Wait for the boot sequence before running a command
    #[serde(default = "default_true")]
    pub wait_for_boot: bool,
    /// APN used by `http-get`
    #[serde(default)]
    pub apn: String,
    /// Engine tuning
    #[serde(default)]
    pub session: SessionConfig,
    /// Modem used with `--simulate`
    #[serde(default)]
    pub simulator: VirtualModemConfig,
}

fn default_baud() -> u32 {
    9600
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud(),
            show_traffic: false,
            wait_for_boot: true,
            apn: String::new(),
            session: SessionConfig::default(),
            simulator: VirtualModemConfig::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for at-monitor
    /// Uses $XDG_CONFIG_HOME/at-monitor, falls back to ~/.config/at-monitor
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("at-monitor"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("at-monitor"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| Self::from_json(&s).ok())
            .unwrap_or_default()
    }

    fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::settings_path().context("could not determine settings path")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings.baud_rate, 9600);
        assert!(settings.wait_for_boot);
        assert_eq!(settings.session, SessionConfig::default());
        assert!(settings.simulator.echo);
    }

    #[test]
    fn test_nested_overrides() {
        let settings = Settings::from_json(
            r#"{
                "port": "/dev/ttyUSB0",
                "session": { "command_timeout_ms": 3000 },
                "simulator": { "echo": false, "http_status": 404 }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.session.command_timeout_ms, 3000);
        assert_eq!(settings.session.poll_interval_ms, 50);
        assert!(!settings.simulator.echo);
        assert_eq!(settings.simulator.http_status, 404);
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut settings = Settings::default();
        settings.apn = "internet".to_string();
        settings.show_traffic = true;

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let loaded = Settings::from_json(&json).unwrap();
        assert_eq!(loaded.apn, "internet");
        assert!(loaded.show_traffic);
    }
}
