use std::env;
use std::str::FromStr;

use tracing::info;

use crate::error::EngineError;

/// Engine configuration, loadable from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum characters of an invalid value rendered into diagnostics.
    pub render_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { render_limit: 512 }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = Self::default();
        Ok(Self {
            render_limit: optional_env("EFFECTFLOW_RENDER_LIMIT", defaults.render_limit)?,
        })
    }

    pub fn log_summary(&self) {
        info!(render_limit = self.render_limit, "Effects engine configuration");
    }
}

fn optional_env<T: FromStr>(key: &str, default: T) -> Result<T, EngineError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
