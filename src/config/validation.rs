//! Validation rules applied after the configuration sources are merged.

use std::time::Duration;

use tracing::warn;
use url::Url;

use super::ClientConfig;
use crate::errors::ConfigError;

/// Parse an endpoint URL and enforce HTTPS unless insecure endpoints are allowed.
///
/// Insecure endpoints exist for local mock servers; the real service is TLS only.
pub fn validate_endpoint_url(
    key: &'static str,
    raw: &str,
    allow_insecure: bool,
) -> Result<Url, ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        key,
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_insecure => {
            warn!(key, url = %parsed, "Using an insecure endpoint");
        }
        other => {
            return Err(ConfigError::InvalidUrl {
                key,
                reason: format!("scheme must be https, got '{other}'"),
            });
        }
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            key,
            reason: "URL must have a host".to_string(),
        });
    }

    Ok(parsed)
}

pub fn validate_credentials(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.client_id.trim().is_empty() {
        return Err(ConfigError::Missing("client_id"));
    }
    if config.client_secret.trim().is_empty() {
        return Err(ConfigError::Missing("client_secret"));
    }
    if config.refresh_token.trim().is_empty() {
        return Err(ConfigError::Missing("refresh_token"));
    }
    Ok(())
}

/// The boundary must be usable verbatim inside `--<boundary>` delimiters.
pub fn validate_boundary(boundary: &str) -> Result<(), ConfigError> {
    let invalid = boundary.is_empty()
        || boundary.len() > 70
        || boundary
            .chars()
            .any(|c| c.is_whitespace() || c == ';' || c == '"' || !c.is_ascii());
    if invalid {
        return Err(ConfigError::InvalidValue {
            key: "boundary".to_string(),
            reason: format!("'{boundary}' is not a valid multipart boundary"),
        });
    }
    Ok(())
}

pub fn validate_timing(config: &ClientConfig) -> Result<(), ConfigError> {
    let non_zero = [
        ("token_refresh_margin", config.token_refresh_margin),
        ("ping_interval", config.ping_interval),
        ("keepalive_tick", config.keepalive_tick),
        ("connect_timeout", config.connect_timeout),
    ];
    for (key, value) in non_zero {
        if value == Duration::ZERO {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
    }

    if config.keepalive_tick > config.ping_interval {
        return Err(ConfigError::InvalidValue {
            key: "keepalive_tick".to_string(),
            reason: "must not exceed ping_interval".to_string(),
        });
    }

    if config.max_pending_responses == 0 {
        return Err(ConfigError::InvalidValue {
            key: "max_pending_responses".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.speaker_volume > 100 {
        return Err(ConfigError::InvalidValue {
            key: "speaker_volume".to_string(),
            reason: format!("{} is outside 0..=100", config.speaker_volume),
        });
    }

    Ok(())
}
