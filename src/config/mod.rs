//! Configuration layer: typed settings with layered precedence (file → env).

use std::{
    num::NonZeroUsize,
    path::Path,
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "finder_cache";
const ENV_PREFIX: &str = "FINDER_CACHE";
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub memory_capacity: NonZeroUsize,
    pub memory_ttl: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (defaults → files → environment).
///
/// `config_file`, when given, must exist and overrides the discovered files.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    memory_capacity: Option<usize>,
    memory_ttl_secs: Option<u64>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;
        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY);
    let memory_capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("cache.memory_capacity", "must be greater than zero"))?;

    let memory_ttl = match cache.memory_ttl_secs {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.memory_ttl_secs",
                "must be greater than zero; omit it to disable expiry",
            ));
        }
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        memory_capacity,
        memory_ttl,
    })
}
