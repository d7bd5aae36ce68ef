//! Locating and reading the ingestion config file.

use std::path::{Path, PathBuf};

use super::types::IngestConfig;

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".agent-timeline.toml";

/// `<config_dir>/agent-timeline/config.toml`, when a config dir exists.
fn user_config_file() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("agent-timeline").join("config.toml"))
}

/// Reads the first config file that exists among a list of candidates.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    candidates: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Working directory first, then the user config directory.
    #[must_use]
    pub fn new() -> Self {
        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE))
            .chain(user_config_file())
            .collect();
        Self { candidates }
    }

    /// Only consider `path`.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            candidates: vec![path],
        }
    }

    #[must_use]
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// The config file `load` would read, if any.
    #[must_use]
    pub fn locate(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .map(PathBuf::as_path)
            .find(|path| path.is_file())
    }

    /// Load the located config file, or defaults when there is none.
    ///
    /// A relative `projects_root` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the located file cannot be read or is not valid TOML.
    pub fn load(&self) -> Result<IngestConfig, ConfigError> {
        let Some(path) = self.locate() else {
            tracing::debug!(candidates = self.candidates.len(), "No config file, using defaults");
            return Ok(IngestConfig::default());
        };

        let mut config = read_config(path)?;
        let base = path.parent().unwrap_or(Path::new(""));
        config.projects_root = config.projects_root.map(|root| base.join(root));
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_config(path: &Path) -> Result<IngestConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_searched_first() {
        let loader = ConfigLoader::new();
        assert_eq!(loader.candidates()[0], PathBuf::from(LOCAL_CONFIG_FILE));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let loader = ConfigLoader::with_path(PathBuf::from("/nonexistent/agent-timeline.toml"));
        assert!(loader.locate().is_none());
        assert_eq!(loader.load().unwrap(), IngestConfig::default());
    }

    #[test]
    fn test_directory_is_not_a_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_path(temp_dir.path().to_path_buf());
        assert!(loader.locate().is_none());
    }

    #[test]
    fn test_reads_watcher_section() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[watcher]\nevent_capacity = 8\n").unwrap();

        let config = ConfigLoader::with_path(path).load().unwrap();
        assert_eq!(config.watcher.event_capacity, 8);
        assert!(config.projects_root.is_none());
    }

    #[test]
    fn test_relative_root_resolved_against_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "projects_root = \"logs/projects\"\n").unwrap();

        let config = ConfigLoader::with_path(path).load().unwrap();
        assert_eq!(
            config.projects_root,
            Some(temp_dir.path().join("logs/projects"))
        );
    }

    #[test]
    fn test_absolute_root_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "projects_root = \"/data/projects\"\n").unwrap();

        let config = ConfigLoader::with_path(path).load().unwrap();
        assert_eq!(config.projects_root, Some(PathBuf::from("/data/projects")));
    }

    #[test]
    fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[watcher\npoll_interval_ms = ").unwrap();

        let err = ConfigLoader::with_path(path.clone()).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: p, .. } if p == path));
    }
}
