//! Application-level configuration loading: game timing and input limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COLUMNS_BACK_CONFIG_PATH";

const DEFAULT_DROP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_NAME_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    drop_interval: Duration,
    tick_interval: Duration,
    max_name_length: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        drop_interval_ms = config.drop_interval.as_millis() as u64,
                        tick_interval_ms = config.tick_interval.as_millis() as u64,
                        "loaded game settings from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Override timings, mostly useful for tests.
    pub fn with_timings(mut self, drop_interval: Duration, tick_interval: Duration) -> Self {
        self.drop_interval = drop_interval;
        self.tick_interval = tick_interval;
        self
    }

    /// Delay between two automatic drops of a piece.
    pub fn drop_interval(&self) -> Duration {
        self.drop_interval
    }

    /// Cadence of the per-room scheduler.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Longest display name accepted, in characters.
    pub fn max_name_length(&self) -> usize {
        self.max_name_length
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    drop_interval_ms: u64,
    tick_interval_ms: u64,
    max_name_length: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            drop_interval_ms: DEFAULT_DROP_INTERVAL_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        if value.tick_interval_ms == 0 {
            warn!("tick_interval_ms must be positive; using the default");
        }
        let tick_interval_ms = match value.tick_interval_ms {
            0 => DEFAULT_TICK_INTERVAL_MS,
            ms => ms,
        };
        Self {
            drop_interval: Duration::from_millis(value.drop_interval_ms),
            tick_interval: Duration::from_millis(tick_interval_ms),
            max_name_length: value.max_name_length.max(1),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
