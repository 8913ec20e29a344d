use std::env;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Read a non-empty environment variable.
pub(crate) fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Read and parse an environment variable, failing on values that do not parse.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Boolean flags accept `true/false`, `1/0`, `yes/no`.
pub(crate) fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env_string(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
        None => Ok(None),
    }
}
