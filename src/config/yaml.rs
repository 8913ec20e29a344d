use serde::Deserialize;
use std::path::Path;

use crate::errors::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional so a file may override only part of the configuration.
/// Values present here take priority over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// credentials:
///   client_id: "amzn1.application-oa2-client.xxxx"
///   client_secret: "secret"
///   refresh_token: "Atzr|xxxx"
///
/// endpoint:
///   url: "https://avs-alexa-na.amazon.com"
///   api_version: "v20160207"
///   auth_url: "https://api.amazon.com/auth/o2/token"
///   boundary: "this-is-my-boundary"
///   connect_timeout_seconds: 10
///
/// session:
///   token_refresh_margin_seconds: 3570
///   ping_interval_seconds: 240
///   keepalive_tick_millis: 1000
///   max_pending_responses: 32
///
/// device:
///   speaker_volume: 50
///   speaker_muted: false
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub credentials: Option<CredentialsYaml>,
    pub endpoint: Option<EndpointYaml>,
    pub session: Option<SessionYaml>,
    pub device: Option<DeviceYaml>,
}

/// Long-lived credentials issued by the one-time authorization flow
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsYaml {
    #[serde(alias = "Client_ID")]
    pub client_id: Option<String>,
    #[serde(alias = "Client_Secret")]
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

/// Service endpoint settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EndpointYaml {
    pub url: Option<String>,
    pub api_version: Option<String>,
    pub auth_url: Option<String>,
    pub boundary: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    /// Permit `http://` endpoints (local mocks only)
    pub allow_insecure: Option<bool>,
}

/// Session timing and dialog limits
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub token_refresh_margin_seconds: Option<u64>,
    pub ping_interval_seconds: Option<u64>,
    pub keepalive_tick_millis: Option<u64>,
    pub max_pending_responses: Option<usize>,
}

/// Device state reported in every event context
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeviceYaml {
    pub speaker_volume: Option<u8>,
    pub speaker_muted: Option<bool>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Credentials file written by the authorization helper.
///
/// ```json
/// {"Client_ID": "...", "Client_Secret": "...", "refresh_token": "..."}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyCredentials {
    #[serde(rename = "Client_ID")]
    pub client_id: String,
    #[serde(rename = "Client_Secret")]
    pub client_secret: String,
    pub refresh_token: String,
}

impl LegacyCredentials {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl From<LegacyCredentials> for CredentialsYaml {
    fn from(creds: LegacyCredentials) -> Self {
        CredentialsYaml {
            client_id: Some(creds.client_id),
            client_secret: Some(creds.client_secret),
            refresh_token: Some(creds.refresh_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
credentials:
  client_id: "client"
  client_secret: "secret"
  refresh_token: "refresh"

endpoint:
  url: "https://avs-alexa-eu.amazon.com"
  api_version: "v20160207"
  boundary: "custom-boundary"
  connect_timeout_seconds: 5

session:
  token_refresh_margin_seconds: 1800
  ping_interval_seconds: 120
  max_pending_responses: 8

device:
  speaker_volume: 70
  speaker_muted: true
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let creds = config.credentials.as_ref().unwrap();
        assert_eq!(creds.client_id, Some("client".to_string()));
        assert_eq!(creds.refresh_token, Some("refresh".to_string()));

        let endpoint = config.endpoint.as_ref().unwrap();
        assert_eq!(
            endpoint.url,
            Some("https://avs-alexa-eu.amazon.com".to_string())
        );
        assert_eq!(endpoint.boundary, Some("custom-boundary".to_string()));
        assert_eq!(endpoint.connect_timeout_seconds, Some(5));
        assert!(endpoint.auth_url.is_none());

        let session = config.session.as_ref().unwrap();
        assert_eq!(session.token_refresh_margin_seconds, Some(1800));
        assert_eq!(session.ping_interval_seconds, Some(120));
        assert!(session.keepalive_tick_millis.is_none());
        assert_eq!(session.max_pending_responses, Some(8));

        let device = config.device.as_ref().unwrap();
        assert_eq!(device.speaker_volume, Some(70));
        assert_eq!(device.speaker_muted, Some(true));
    }

    #[test]
    fn test_yaml_config_accepts_legacy_credential_keys() {
        let yaml = r#"
credentials:
  Client_ID: "legacy-client"
  Client_Secret: "legacy-secret"
  refresh_token: "legacy-refresh"
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let creds = config.credentials.unwrap();
        assert_eq!(creds.client_id, Some("legacy-client".to_string()));
        assert_eq!(creds.client_secret, Some("legacy-secret".to_string()));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.credentials.is_none());
        assert!(config.endpoint.is_none());
        assert!(config.session.is_none());
        assert!(config.device.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "session:\n  ping_interval_seconds: 60\n",
        )
        .unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(config.session.unwrap().ping_interval_seconds, Some(60));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_legacy_credentials_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.dict");
        fs::write(
            &path,
            r#"{"Client_ID": "id", "Client_Secret": "secret", "refresh_token": "refresh"}"#,
        )
        .unwrap();

        let creds = LegacyCredentials::from_file(&path).unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.client_secret, "secret");
        assert_eq!(creds.refresh_token, "refresh");
    }

    #[test]
    fn test_legacy_credentials_missing_field() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.dict");
        fs::write(&path, r#"{"Client_ID": "id"}"#).unwrap();

        assert!(matches!(
            LegacyCredentials::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
