//! Studio configuration.
//!
//! Values come from the builder first, then from the environment, then
//! from defaults.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "LOOKBOOK_DATA_DIR";

/// Environment variable giving the per-call timeout in seconds.
pub const TIMEOUT_ENV: &str = "LOOKBOOK_TIMEOUT_SECS";

/// Environment variable whose value, when set, replaces the key pool.
pub const DEFAULT_OVERRIDE_ENV: &str = "API_KEY";

/// Per-call timeout when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of variations generated at the same time.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Hard limit on variations generated at the same time.
pub const MAX_CONCURRENCY: usize = 5;

/// Resolved studio configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    /// Directory holding the key pool and the gallery.
    pub data_dir: PathBuf,
    /// Bound on each single remote call.
    pub timeout: Duration,
    /// Environment variable checked for an override key, if any.
    pub override_env_var: Option<String>,
    /// Number of variations generated at the same time.
    pub concurrency: usize,
}

impl StudioConfig {
    /// Creates a new `StudioConfigBuilder`.
    pub fn builder() -> StudioConfigBuilder {
        StudioConfigBuilder::new()
    }

    /// Resolves a configuration from the environment and defaults alone.
    pub fn from_env() -> Result<Self> {
        StudioConfigBuilder::new().build()
    }
}

/// Builder for [`StudioConfig`].
#[derive(Debug, Clone, Default)]
pub struct StudioConfigBuilder {
    data_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    override_env_var: Option<Option<String>>,
    concurrency: Option<usize>,
}

impl StudioConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory. Falls back to `LOOKBOOK_DATA_DIR`, then the platform data dir.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the per-call timeout. Falls back to `LOOKBOOK_TIMEOUT_SECS`, then 120 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the environment variable checked for an override key.
    pub fn override_env_var(mut self, var: impl Into<String>) -> Self {
        self.override_env_var = Some(Some(var.into()));
        self
    }

    /// Ignores any override key and always uses the pool.
    pub fn no_override(mut self) -> Self {
        self.override_env_var = Some(None);
        self
    }

    /// Sets how many variations run at the same time (1 to 5).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Resolves the configuration.
    pub fn build(self) -> Result<StudioConfig> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => timeout_from_env()?.unwrap_or(DEFAULT_TIMEOUT),
        };
        if timeout.is_zero() {
            return Err(Error::InvalidRequest("timeout must be greater than zero".into()));
        }

        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if !(1..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(Error::InvalidRequest(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {concurrency}"
            )));
        }

        Ok(StudioConfig {
            data_dir,
            timeout,
            override_env_var: self
                .override_env_var
                .unwrap_or_else(|| Some(DEFAULT_OVERRIDE_ENV.to_string())),
            concurrency,
        })
    }
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|d| d.join("lookbook"))
        .ok_or_else(|| {
            Error::Persistence(format!(
                "no platform data directory found; set {DATA_DIR_ENV}"
            ))
        })
}

fn timeout_from_env() -> Result<Option<Duration>> {
    match std::env::var(TIMEOUT_ENV) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| {
                Error::InvalidRequest(format!("{TIMEOUT_ENV} must be a whole number of seconds"))
            }),
        Err(_) => Ok(None),
    }
}
