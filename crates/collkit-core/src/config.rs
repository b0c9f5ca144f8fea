//! Process-level defaults for every record type built by one
//! [`CollectionTools`](crate::tools::CollectionTools).
//!
//! Loaded from TOML, then adjusted by `COLLKIT_*` environment variables.
//! Per-record options fall back to these values when unset.

use crate::error::{Error, ErrorKind, ErrorOrigin};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error as ThisError;

pub const ENV_DEBUG: &str = "COLLKIT_DEBUG";
pub const ENV_DEFAULT_RATE_LIMIT: &str = "COLLKIT_DEFAULT_RATE_LIMIT";
pub const ENV_DEFAULT_RATE_LIMIT_INTERVAL_MS: &str = "COLLKIT_DEFAULT_RATE_LIMIT_INTERVAL_MS";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, err.to_string())
    }
}

///
/// ToolsConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Root under which derived method prefixes are built
    /// (`{root}{collection}/`).
    pub method_prefix_root: String,
    pub default_rate_limit: u32,
    pub default_rate_limit_interval_ms: u64,
    pub restrictive_allow_deny: bool,
    pub id_field: String,

    /// Emit argument dumps for every procedure call.
    pub debug: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            method_prefix_root: "collections/".to_string(),
            default_rate_limit: 10,
            default_rate_limit_interval_ms: 1000,
            restrictive_allow_deny: true,
            id_field: "_id".to_string(),
            debug: false,
        }
    }
}

impl ToolsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;

        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults. Environment
    /// overrides are applied in both cases.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|var| std::env::var(var).ok());
    }

    // invalid values are logged and ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_DEBUG) {
            match raw.trim() {
                "1" | "true" | "yes" => self.debug = true,
                "0" | "false" | "no" => self.debug = false,
                other => tracing::warn!("invalid {ENV_DEBUG} '{other}', ignoring"),
            }
        }

        if let Some(raw) = lookup(ENV_DEFAULT_RATE_LIMIT) {
            match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => self.default_rate_limit = value,
                Ok(_) => tracing::warn!("{ENV_DEFAULT_RATE_LIMIT} must be positive, ignoring"),
                Err(err) => tracing::warn!("invalid {ENV_DEFAULT_RATE_LIMIT}, ignoring: {err}"),
            }
        }

        if let Some(raw) = lookup(ENV_DEFAULT_RATE_LIMIT_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => self.default_rate_limit_interval_ms = value,
                Ok(_) => tracing::warn!(
                    "{ENV_DEFAULT_RATE_LIMIT_INTERVAL_MS} must be positive, ignoring"
                ),
                Err(err) => {
                    tracing::warn!("invalid {ENV_DEFAULT_RATE_LIMIT_INTERVAL_MS}, ignoring: {err}");
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_rate_limit == 0 || self.default_rate_limit_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "default rate limit and interval must be positive".to_string(),
            ));
        }
        if self.id_field.is_empty() {
            return Err(ConfigError::Invalid("id_field must not be empty".to_string()));
        }

        Ok(())
    }

    #[must_use]
    pub const fn default_rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.default_rate_limit_interval_ms)
    }
}
