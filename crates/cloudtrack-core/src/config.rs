//! Tracker configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, SearchScope};

/// When a watched upload counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadCompletion {
    /// Upload percentage reached `complete_percent`.
    Percent,
    /// The provider stopped reporting the item as uploading.
    IdleFlag,
    /// Whichever of the two happens first.
    #[default]
    Either,
}

/// Configuration for the operation dispatcher and bundled providers.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TrackerConfig {
    /// Search domains every watch is scoped to.
    #[builder(default = "vec![SearchScope::Data]")]
    #[serde(default = "default_scopes")]
    pub scopes: Vec<SearchScope>,

    /// Completion rule for watched uploads.
    #[builder(default)]
    #[serde(default)]
    pub upload_completion: UploadCompletion,

    /// Percentage at which a transfer counts as complete.
    #[builder(default = "100.0")]
    #[serde(default = "default_complete_percent")]
    pub complete_percent: f64,

    /// Create the container root before copying an upload into it.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub create_container_on_upload: bool,

    /// Refresh interval of the local directory provider, in milliseconds.
    #[builder(default = "500")]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_scopes() -> Vec<SearchScope> {
    vec![SearchScope::Data]
}

fn default_complete_percent() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl TrackerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref scopes) = self.scopes {
            if scopes.is_empty() {
                return Err("At least one search scope is required".to_string());
            }
        }
        if let Some(percent) = self.complete_percent {
            if !(percent > 0.0 && percent <= 100.0) {
                return Err(format!("complete_percent must be in (0, 100], got {percent}"));
            }
        }
        if self.poll_interval_ms == Some(0) {
            return Err("poll_interval_ms must be positive".to_string());
        }
        Ok(())
    }
}

impl TrackerConfig {
    /// Create a new config builder.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Default location of the config file, `<config dir>/cloudtrack/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cloudtrack").join("config.toml"))
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at [`TrackerConfig::default_path`] if it exists,
    /// otherwise return the defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Check value ranges of a config built without the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut builder = Self::builder();
        builder
            .scopes(self.scopes.clone())
            .complete_percent(self.complete_percent)
            .poll_interval_ms(self.poll_interval_ms);
        builder
            .validate()
            .map_err(|message| ConfigError::Invalid { message })
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
            upload_completion: UploadCompletion::default(),
            complete_percent: default_complete_percent(),
            create_container_on_upload: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
