//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scanner::default_projects_root;

/// Settings for the live tailing watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Interval of the fallback sweep over every tracked file.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce window applied to OS change notifications.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Capacity of the event queue. A full queue blocks the tail loop.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Capacity of the error queue. A full queue drops errors.
    #[serde(default = "default_error_capacity")]
    pub error_capacity: usize,
    /// Deliver a file's existing records as events when it is registered.
    #[serde(default)]
    pub replay_existing: bool,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_event_capacity() -> usize {
    1024
}

fn default_error_capacity() -> usize {
    64
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            event_capacity: default_event_capacity(),
            error_capacity: default_error_capacity(),
            replay_existing: false,
        }
    }
}

impl WatcherConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    #[must_use]
    pub fn event_capacity(&self) -> usize {
        self.event_capacity.max(1)
    }

    #[must_use]
    pub fn error_capacity(&self) -> usize {
        self.error_capacity.max(1)
    }
}

/// Top-level ingestion configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory holding one subdirectory per project.
    /// Defaults to `~/.claude/projects`.
    #[serde(default)]
    pub projects_root: Option<PathBuf>,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

impl IngestConfig {
    /// The configured projects root, or the default one.
    #[must_use]
    pub fn projects_root(&self) -> Option<PathBuf> {
        self.projects_root.clone().or_else(default_projects_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watcher_config_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.event_capacity(), 1024);
        assert_eq!(config.error_capacity(), 64);
        assert!(!config.replay_existing);
    }

    #[test]
    fn test_zero_values_clamped() {
        let config = WatcherConfig {
            poll_interval_ms: 0,
            debounce_ms: 0,
            event_capacity: 0,
            error_capacity: 0,
            replay_existing: false,
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.debounce(), Duration::from_millis(1));
        assert_eq!(config.event_capacity(), 1);
        assert_eq!(config.error_capacity(), 1);
    }

    #[test]
    fn test_ingest_config_deserialize() {
        let toml = r#"
            projects_root = "/data/projects"

            [watcher]
            poll_interval_ms = 250
            replay_existing = true
        "#;
        let config: IngestConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.projects_root(), Some(PathBuf::from("/data/projects")));
        assert_eq!(config.watcher.poll_interval_ms, 250);
        assert_eq!(config.watcher.debounce_ms, 100);
        assert!(config.watcher.replay_existing);
    }

    #[test]
    fn test_watcher_keys_belong_in_watcher_table() {
        let config: IngestConfig = toml::from_str("poll_interval_ms = 250\n").unwrap();
        assert_eq!(config.watcher, WatcherConfig::default());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: IngestConfig = toml::from_str("").unwrap();
        assert_eq!(config, IngestConfig::default());
    }
}
