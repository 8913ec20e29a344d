//! Configuration module for the device client
//!
//! Configuration comes from .env files, YAML files and environment variables.
//! Priority: YAML > ENV vars > .env values > defaults. The resulting [`ClientConfig`]
//! is an owned value handed to the token provider and connection manager at
//! construction; nothing in the crate reads configuration from globals.
//!
//! # Modules
//! - `yaml`: YAML and legacy JSON credential file loading
//! - `env`: Environment variable helpers
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use avs_device_client::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = ClientConfig::from_file(&PathBuf::from("avs.yaml"))?;
//! println!("Talking to {}", config.endpoint);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

mod env;
mod validation;
mod yaml;

pub use validation::validate_endpoint_url;
pub use yaml::{
    CredentialsYaml, DeviceYaml, EndpointYaml, LegacyCredentials, SessionYaml, YamlConfig,
};

use crate::errors::ConfigError;
use env::{env_bool, env_parse, env_string};

/// North American service endpoint
pub const DEFAULT_ENDPOINT: &str = "https://avs-alexa-na.amazon.com";
/// Versioned path prefix for directives and events
pub const DEFAULT_API_VERSION: &str = "v20160207";
/// Login With Amazon token endpoint
pub const DEFAULT_AUTH_URL: &str = "https://api.amazon.com/auth/o2/token";
pub const DEFAULT_BOUNDARY: &str = "this-is-my-boundary";
/// Access tokens live for 3600s; refreshing 30s early keeps a usable token on hand.
pub const DEFAULT_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(3570);
/// The service drops connections idle for more than five minutes.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(240);
pub const DEFAULT_KEEPALIVE_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PENDING_RESPONSES: usize = 32;
pub const DEFAULT_SPEAKER_VOLUME: u8 = 50;

/// Client configuration
///
/// Contains the long-lived credentials, the service endpoints and the session
/// timing policy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // Credentials from the one-time authorization flow
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,

    // Endpoints
    /// Base URL of the voice service, without the version prefix
    pub endpoint: String,
    /// Version segment prefixed to directive and event paths
    pub api_version: String,
    pub auth_url: String,
    /// Multipart boundary used for outbound event bodies
    pub boundary: String,
    pub connect_timeout: Duration,
    /// Permit `http://` endpoints, used against local mock servers
    pub allow_insecure_endpoints: bool,

    // Session policy
    /// How long a fetched access token is reused before refreshing
    pub token_refresh_margin: Duration,
    /// Idle time after which a ping is sent
    pub ping_interval: Duration,
    /// Resolution of the cancellable keepalive wait
    pub keepalive_tick: Duration,
    /// Upper bound on responses processed within one conversational turn
    pub max_pending_responses: usize,

    // Device context
    pub speaker_volume: u8,
    pub speaker_muted: bool,
}

/// Zeroize the credentials when the configuration is dropped.
impl Drop for ClientConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.client_secret.zeroize();
        self.refresh_token.zeroize();
    }
}

impl ClientConfig {
    /// Build a configuration with default endpoints and timing.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            boundary: DEFAULT_BOUNDARY.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            allow_insecure_endpoints: false,
            token_refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN,
            ping_interval: DEFAULT_PING_INTERVAL,
            keepalive_tick: DEFAULT_KEEPALIVE_TICK,
            max_pending_responses: DEFAULT_MAX_PENDING_RESPONSES,
            speaker_volume: DEFAULT_SPEAKER_VOLUME,
            speaker_muted: false,
        }
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge_config(YamlConfig::default())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values (loaded by the binary at startup)
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment variable
    /// has an invalid format, or validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge_config(yaml_config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load credentials from a legacy JSON credentials file, everything else from the
    /// environment.
    pub fn from_credentials_file(path: &Path) -> Result<Self, ConfigError> {
        let credentials = LegacyCredentials::from_file(path)?;
        let yaml_config = YamlConfig {
            credentials: Some(credentials.into()),
            ..Default::default()
        };
        let config = merge_config(yaml_config)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_credentials(self)?;
        validate_endpoint_url("endpoint", &self.endpoint, self.allow_insecure_endpoints)?;
        validate_endpoint_url("auth_url", &self.auth_url, self.allow_insecure_endpoints)?;
        validation::validate_boundary(&self.boundary)?;
        validation::validate_timing(self)?;
        Ok(())
    }

    /// Path with the API version prefix, e.g. `/v20160207/events`.
    pub fn versioned_path(&self, path: &str) -> String {
        format!(
            "/{}/{}",
            self.api_version.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Environment variables form the base, YAML values override them.
fn merge_config(yaml: YamlConfig) -> Result<ClientConfig, ConfigError> {
    let credentials = yaml.credentials.unwrap_or_default();
    let endpoint = yaml.endpoint.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let device = yaml.device.unwrap_or_default();

    let client_id = credentials
        .client_id
        .or_else(|| env_string("AVS_CLIENT_ID"))
        .ok_or(ConfigError::Missing("client_id"))?;
    let client_secret = credentials
        .client_secret
        .or_else(|| env_string("AVS_CLIENT_SECRET"))
        .ok_or(ConfigError::Missing("client_secret"))?;
    let refresh_token = credentials
        .refresh_token
        .or_else(|| env_string("AVS_REFRESH_TOKEN"))
        .ok_or(ConfigError::Missing("refresh_token"))?;

    let mut config = ClientConfig::new(client_id, client_secret, refresh_token);

    if let Some(url) = endpoint.url.or_else(|| env_string("AVS_ENDPOINT")) {
        config.endpoint = url;
    }
    if let Some(version) = endpoint.api_version.or_else(|| env_string("AVS_API_VERSION")) {
        config.api_version = version;
    }
    if let Some(auth_url) = endpoint.auth_url.or_else(|| env_string("AVS_AUTH_URL")) {
        config.auth_url = auth_url;
    }
    if let Some(boundary) = endpoint.boundary.or_else(|| env_string("AVS_BOUNDARY")) {
        config.boundary = boundary;
    }
    if let Some(secs) = pick(
        endpoint.connect_timeout_seconds,
        "AVS_CONNECT_TIMEOUT_SECONDS",
    )? {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(allow) = match endpoint.allow_insecure {
        Some(allow) => Some(allow),
        None => env_bool("AVS_ALLOW_INSECURE_ENDPOINTS")?,
    } {
        config.allow_insecure_endpoints = allow;
    }

    if let Some(secs) = pick(
        session.token_refresh_margin_seconds,
        "AVS_TOKEN_REFRESH_MARGIN_SECONDS",
    )? {
        config.token_refresh_margin = Duration::from_secs(secs);
    }
    if let Some(secs) = pick(session.ping_interval_seconds, "AVS_PING_INTERVAL_SECONDS")? {
        config.ping_interval = Duration::from_secs(secs);
    }
    if let Some(millis) = pick(session.keepalive_tick_millis, "AVS_KEEPALIVE_TICK_MILLIS")? {
        config.keepalive_tick = Duration::from_millis(millis);
    }
    if let Some(max) = pick(session.max_pending_responses, "AVS_MAX_PENDING_RESPONSES")? {
        config.max_pending_responses = max;
    }

    if let Some(volume) = pick(device.speaker_volume, "AVS_SPEAKER_VOLUME")? {
        config.speaker_volume = volume;
    }
    if let Some(muted) = match device.speaker_muted {
        Some(muted) => Some(muted),
        None => env_bool("AVS_SPEAKER_MUTED")?,
    } {
        config.speaker_muted = muted;
    }

    Ok(config)
}

fn pick<T>(yaml_value: Option<T>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match yaml_value {
        Some(value) => Ok(Some(value)),
        None => env_parse(key),
    }
}
