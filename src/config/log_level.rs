use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only terminal flush failures.
    Error,
    /// Failed attempts and dropped records.
    #[default]
    Warn,
    /// Flush outcomes and lifecycle.
    Info,
    /// Per-request transport details and bodies.
    Debug,
    /// Gate bookkeeping.
    Trace,
}

const NAMES: [(LogLevel, &str); 5] = [
    (LogLevel::Error, "error"),
    (LogLevel::Warn, "warn"),
    (LogLevel::Info, "info"),
    (LogLevel::Debug, "debug"),
    (LogLevel::Trace, "trace"),
];

impl LogLevel {
    /// Case-insensitive lookup by name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, known)| known.eq_ignore_ascii_case(name.trim()))
            .map(|(level, _)| *level)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(level, _)| *level == self)
            .map_or("warn", |(_, name)| name)
    }

    /// `EnvFilter` directive for this level with the HTTP stack silenced.
    #[must_use]
    pub fn filter_directive(self) -> String {
        format!("h2=off,hyper=off,hyper_util=off,rustls=off,{}", self.name())
    }
}

// Never fails: a bad level must not keep the process from starting
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().and_then(LogLevel::parse).unwrap_or_else(|| {
            warn!("Invalid log level {value}, using warn");
            LogLevel::Warn
        }))
    }
}
