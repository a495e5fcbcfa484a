//! Sync configuration

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix, e.g. `VERSION_SYNC_DEFAULT_TEST_ALL=true`
pub const ENV_PREFIX: &str = "VERSION_SYNC";

/// Process-wide reconciliation settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Check every container unless it opts out (true), or only containers
    /// that opt in (false)
    #[serde(default)]
    pub default_test_all: bool,

    /// Deadline for a single version check in seconds
    #[serde(default)]
    pub check_timeout_secs: Option<u64>,

    /// Number of containers of one pod checked at the same time
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
}

fn default_max_concurrent_checks() -> usize {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_test_all: false,
            check_timeout_secs: None,
            max_concurrent_checks: default_max_concurrent_checks(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize from an already assembled configuration
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    /// Per-check deadline, if one is configured
    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Effective concurrency, never below one
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_checks.max(1)
    }
}
