use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stemplay_transport::BufferFormat;
use tracing::{debug, warn};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of one stage, and of every stem buffer.
    pub stage_duration_secs: f64,
    /// Gain applied to each stem before the master gain.
    pub stem_gain: f32,
    pub master_gain: f32,
    pub rewind_step_secs: f64,
    pub poll_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage_duration_secs: BufferFormat::DEFAULT_DURATION_SECS,
            stem_gain: 0.7,
            master_gain: 1.0,
            rewind_step_secs: 5.0,
            poll_interval_ms: 100,
            server_url: None,
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stemplay").join("config.toml"))
    }

    /// Load the user config, falling back to defaults if it is missing or broken.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(error = %err, "ignoring config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(write_err)
    }

    /// The shape stem buffers take for an output running at `sample_rate`.
    pub fn buffer_format(&self, sample_rate: u32) -> BufferFormat {
        BufferFormat::new(
            sample_rate,
            BufferFormat::DEFAULT_CHANNELS,
            self.stage_duration_secs,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_game_constants() {
        let config = Config::default();
        assert_eq!(config.stage_duration_secs, 30.0);
        assert_eq!(config.stem_gain, 0.7);
        assert_eq!(config.rewind_step_secs, 5.0);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "stage_duration_secs = 15.0\nserver_url = \"http://localhost:5000\"\n")
            .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.stage_duration_secs, 15.0);
        assert_eq!(config.server_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(config.stem_gain, 0.7);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            master_gain: 0.5,
            ..Config::default()
        };

        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "stem_gain = \"loud\"").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_buffer_format_uses_stage_duration() {
        let config = Config {
            stage_duration_secs: 2.0,
            ..Config::default()
        };
        let format = config.buffer_format(8000);
        assert_eq!(format.frames(), 16000);
        assert_eq!(format.channels, 2);
    }
}
