pub mod store;

pub use store::SettingsStore;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::terminal::{BackspacePolicy, SchedulerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Terminal behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub flush_interval_ms: u64,
    pub flush_initial_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub backspace: BackspacePolicy,
    pub local_echo: bool,
    pub echo_window_ms: Option<u64>,
    pub log_level: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 500,
            flush_initial_delay_ms: 100,
            read_timeout_ms: 50,
            backspace: BackspacePolicy::Erase,
            local_echo: true,
            echo_window_ms: Some(1000),
            log_level: "info".to_string(),
        }
    }
}

impl TerminalConfig {
    /// Read a JSON config file. A missing file gives the defaults; absent fields too.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(self.flush_interval_ms.max(1)),
            initial_delay: Duration::from_millis(self.flush_initial_delay_ms),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn echo_window(&self) -> Option<Duration> {
        self.echo_window_ms.map(Duration::from_millis)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', using info", self.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TerminalConfig =
            serde_json::from_str(r#"{ "flush_interval_ms": 250, "backspace": "literal" }"#).unwrap();
        assert_eq!(config.flush_interval_ms, 250);
        assert_eq!(config.backspace, BackspacePolicy::Literal);
        assert_eq!(config.flush_initial_delay_ms, 100);
        assert!(config.local_echo);
    }

    #[test]
    fn test_null_echo_window_never_expires() {
        let config: TerminalConfig = serde_json::from_str(r#"{ "echo_window_ms": null }"#).unwrap();
        assert_eq!(config.echo_window(), None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TerminalConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TerminalConfig::default());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(TerminalConfig::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_log_level_fallback() {
        let config = TerminalConfig { log_level: "chatty".into(), ..TerminalConfig::default() };
        assert_eq!(config.log_level(), log::LevelFilter::Info);
        let config = TerminalConfig { log_level: "debug".into(), ..TerminalConfig::default() };
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }
}
