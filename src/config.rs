//! Application-level configuration loading, including the live protocol tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_SCORING_CONFIG_PATH";
/// Shortest accepted timer period.
const MIN_PERIOD: Duration = Duration::from_secs(1);
/// Environment variable selecting the storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub live: LiveConfig,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Tunables of the live scoring protocol.
pub struct LiveConfig {
    /// Interval between `ping` events on every open stream.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "keep_alive_secs")]
    pub keep_alive: Duration,
    /// Lifetime of a connection ticket.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "ticket_ttl_secs")]
    pub ticket_ttl: Duration,
    /// Upper bound on persisting final scores during a finalize.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "persist_timeout_ms")]
    pub persist_timeout: Duration,
    /// How long ended sessions are remembered.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "tombstone_retention_secs")]
    pub tombstone_retention: Duration,
    /// Events a subscriber may fall behind before it is resnapshotted.
    pub channel_capacity: usize,
    /// Events buffered between a stream forwarder and the HTTP response.
    pub feed_buffer: usize,
    /// Interval of the expired tickets and tombstones sweep.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "sweep_interval_secs")]
    pub sweep_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
            ticket_ttl: Duration::from_secs(60),
            persist_timeout: Duration::from_secs(5),
            tombstone_retention: Duration::from_secs(10 * 60),
            channel_capacity: 64,
            feed_buffer: 16,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        keep_alive_secs = app_config.live.keep_alive.as_secs(),
                        ticket_ttl_secs = app_config.live.ticket_ttl.as_secs(),
                        "loaded live scoring config"
                    );
                    app_config
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
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    live: LiveConfig,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut live = value.live;
        live.channel_capacity = live.channel_capacity.max(1);
        live.feed_buffer = live.feed_buffer.max(1);
        live.keep_alive = live.keep_alive.max(MIN_PERIOD);
        live.sweep_interval = live.sweep_interval.max(MIN_PERIOD);
        Self { live }
    }
}

/// Durable storage selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Couch,
    Memory,
}

impl StorageBackend {
    /// Read [`STORAGE_BACKEND_ENV`], defaulting to the first compiled-in backend.
    pub fn from_env() -> Self {
        match env::var(STORAGE_BACKEND_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                warn!(value, "unknown storage backend; using default");
                Self::compiled_default()
            }),
            Err(_) => Self::compiled_default(),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Some(Self::Mongo),
            "couch" | "couchdb" => Some(Self::Couch),
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }

    fn compiled_default() -> Self {
        if cfg!(feature = "mongo-store") {
            Self::Mongo
        } else if cfg!(feature = "couch-store") {
            Self::Couch
        } else {
            Self::Memory
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config =
            AppConfig::from_json(r#"{"live":{"keep_alive_secs":5,"persist_timeout_ms":250}}"#)
                .unwrap();
        assert_eq!(config.live.keep_alive, Duration::from_secs(5));
        assert_eq!(config.live.persist_timeout, Duration::from_millis(250));
        assert_eq!(config.live.ticket_ttl, Duration::from_secs(60));
        assert_eq!(config.live.channel_capacity, 64);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn zero_capacities_are_clamped() {
        let config =
            AppConfig::from_json(r#"{"live":{"channel_capacity":0,"feed_buffer":0}}"#).unwrap();
        assert_eq!(config.live.channel_capacity, 1);
        assert_eq!(config.live.feed_buffer, 1);
    }

    #[test]
    fn storage_backend_names() {
        assert_eq!(StorageBackend::parse("Mongo"), Some(StorageBackend::Mongo));
        assert_eq!(StorageBackend::parse("couchdb"), Some(StorageBackend::Couch));
        assert_eq!(StorageBackend::parse(" memory "), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("sqlite"), None);
    }
}
