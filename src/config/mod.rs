pub mod log_level;

use std::path::Path;
use std::time::Duration;

use figment::providers::{Format, Yaml};
use figment::{Figment, providers::Env};
use serde::{Deserialize, Deserializer};
use serde_aux::field_attributes::deserialize_bool_from_anything;
use serde_json::Value;

use crate::config::log_level::LogLevel;
use crate::flushing::RetryPolicy;
use crate::{CONFIG_FILE_NAME, ENV_PREFIX};

pub const DEFAULT_ENDPOINT: &str = "https://api.segment.io";

#[derive(Debug, PartialEq, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub write_key: String,
    pub endpoint: String,
    /// Connect/read/write timeout of the intake client, in seconds
    pub timeout: u64,
    pub flush_max_attempts: u32,
    pub flush_initial_backoff_ms: u64,
    /// Upper bound for one flush attempt (flush plus drain), in seconds
    pub flush_attempt_timeout: u64,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub propagate_failures: bool,
    /// Gzip request bodies
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub use_compression: bool,
    /// Gzip level, 0 to 9
    pub compression_level: u32,
    pub https_proxy: Option<String>,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            write_key: String::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: 30,
            // Flushing
            flush_max_attempts: 5,
            flush_initial_backoff_ms: 1000,
            flush_attempt_timeout: 60,
            propagate_failures: false,
            // Transport
            use_compression: true,
            compression_level: 6,
            https_proxy: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.flush_max_attempts,
            Duration::from_millis(self.flush_initial_backoff_ms),
            Duration::from_secs(self.flush_attempt_timeout),
        )
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub fn get_config(config_directory: &Path) -> Result<Config, ConfigError> {
    let path = config_directory.join(CONFIG_FILE_NAME);

    let figment = Figment::new()
        .merge(Yaml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Env::raw().only(&["HTTPS_PROXY"]));

    let mut config: Config = figment
        .extract()
        .map_err(|err| ConfigError::ParseError(err.to_string()))?;

    if config.write_key.trim().is_empty() {
        return Err(ConfigError::Invalid("write_key must be set".to_string()));
    }
    if config.flush_max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "flush_max_attempts must be at least 1".to_string(),
        ));
    }
    if config.flush_attempt_timeout == 0 {
        return Err(ConfigError::Invalid(
            "flush_attempt_timeout must be at least 1 second".to_string(),
        ));
    }
    if config.compression_level > 9 {
        return Err(ConfigError::Invalid(
            "compression_level must be between 0 and 9".to_string(),
        ));
    }

    if config.endpoint.is_empty() {
        config.endpoint = DEFAULT_ENDPOINT.to_string();
    }
    // Accept both `https://host` and `https://host/`
    while config.endpoint.ends_with('/') {
        config.endpoint.pop();
    }

    Ok(config)
}

fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected a string or an integer")),
    }
}
