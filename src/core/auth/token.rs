use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::errors::{AvsError, AvsResult};

/// Issuer-reported lifetimes are shortened by this much before use.
const EXPIRY_SAFETY_WINDOW: Duration = Duration::from_secs(30);

/// Cached access token.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Clone)]
pub struct Token {
    value: String,
    obtained_at: Instant,
    lifetime: Duration,
}

impl Token {
    pub fn new(value: impl Into<String>, obtained_at: Instant, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            obtained_at,
            lifetime,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn obtained_at(&self) -> Instant {
        self.obtained_at
    }

    /// Valid only while `now - obtained_at < lifetime`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.obtained_at) < self.lifetime
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.value.zeroize();
    }
}

/// Anything able to hand out a bearer token for the voice service.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> AvsResult<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// Token lifetime in seconds.
    expires_in: Option<u64>,
}

/// Refresh-token grant against the Login With Amazon token endpoint.
pub struct TokenProvider {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    refresh_margin: Duration,
    cached: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(config: &ClientConfig) -> AvsResult<Self> {
        // Explicit timeouts so a stalled token endpoint cannot hang session setup
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AvsError::Auth(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            refresh_margin: config.token_refresh_margin,
            cached: Mutex::new(None),
        })
    }

    /// Return the cached token, refreshing it first when it is missing or past the
    /// refresh margin.
    ///
    /// Concurrent callers wait on the cache lock, so at most one refresh is in flight.
    pub async fn get_token(&self) -> AvsResult<Token> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(Instant::now()) {
                return Ok(token.clone());
            }
            debug!("Access token passed its refresh margin");
        }

        let token = self.refresh().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn refresh(&self) -> AvsResult<Token> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AvsError::Auth(format!("Failed to request access token: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AvsError::Auth(format!(
                "Token request failed ({status}): {body}"
            )));
        }

        let obtained_at = Instant::now();
        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AvsError::Auth(format!("Failed to parse token response: {e}")))?;

        let access_token = token_response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AvsError::Auth("Token response lacks access_token".to_string()))?;

        let lifetime = match token_response.expires_in {
            Some(expires_in) => {
                let issuer_lifetime =
                    Duration::from_secs(expires_in).saturating_sub(EXPIRY_SAFETY_WINDOW);
                self.refresh_margin.min(issuer_lifetime)
            }
            None => self.refresh_margin,
        };

        info!(lifetime_secs = lifetime.as_secs(), "Refreshed access token");

        Ok(Token::new(access_token, obtained_at, lifetime))
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn access_token(&self) -> AvsResult<String> {
        Ok(self.get_token().await?.value().to_string())
    }
}

/// A fixed token, for tests and pre-authorized deployments.
#[async_trait]
impl TokenSource for String {
    async fn access_token(&self) -> AvsResult<String> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer, margin: Duration) -> ClientConfig {
        let mut config = ClientConfig::new("client-id", "client-secret", "refresh-token");
        config.auth_url = format!("{}/auth/o2/token", server.uri());
        config.allow_insecure_endpoints = true;
        config.token_refresh_margin = margin;
        config
    }

    #[test]
    fn test_token_validity_window() {
        let start = Instant::now();
        let token = Token::new("abc", start, Duration::from_secs(3570));

        assert!(token.is_valid_at(start));
        assert!(token.is_valid_at(start + Duration::from_secs(3569)));
        assert!(!token.is_valid_at(start + Duration::from_secs(3570)));
        assert!(!token.is_valid_at(start + Duration::from_secs(3600)));
    }

    #[test]
    fn test_token_debug_redacts_value() {
        let token = Token::new("super-secret", Instant::now(), Duration::from_secs(1));
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_cached_token_reused_within_margin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/o2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "Atza|first",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            TokenProvider::new(&test_config(&server, Duration::from_secs(3570))).unwrap();

        let first = provider.get_token().await.unwrap();
        let second = provider.get_token().await.unwrap();

        assert_eq!(first.value(), "Atza|first");
        assert_eq!(second.value(), "Atza|first");
        assert_eq!(first.obtained_at(), second.obtained_at());
    }

    #[tokio::test]
    async fn test_refresh_after_margin_issues_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/o2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "Atza|token"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider =
            TokenProvider::new(&test_config(&server, Duration::from_millis(50))).unwrap();

        let first = provider.get_token().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let second = provider.get_token().await.unwrap();
        let third = provider.get_token().await.unwrap();

        assert!(second.obtained_at() > first.obtained_at());
        assert_eq!(second.obtained_at(), third.obtained_at());
    }

    #[tokio::test]
    async fn test_short_issuer_lifetime_wins_over_margin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/o2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "Atza|short",
                "expires_in": 30
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider =
            TokenProvider::new(&test_config(&server, Duration::from_secs(3570))).unwrap();

        // 30s minus the safety window leaves a zero lifetime, so every call refreshes
        provider.get_token().await.unwrap();
        provider.get_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_access_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/o2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"expires_in": 3600})),
            )
            .mount(&server)
            .await;

        let provider =
            TokenProvider::new(&test_config(&server, Duration::from_secs(3570))).unwrap();

        match provider.get_token().await {
            Err(AvsError::Auth(msg)) => assert!(msg.contains("access_token")),
            other => panic!("Expected Auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/o2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let provider =
            TokenProvider::new(&test_config(&server, Duration::from_secs(3570))).unwrap();

        match provider.get_token().await {
            Err(AvsError::Auth(msg)) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("invalid_grant"));
            }
            other => panic!("Expected Auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/o2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "Atza|token",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider =
            TokenProvider::new(&test_config(&server, Duration::from_secs(3570))).unwrap();

        provider.get_token().await.unwrap();
        provider.invalidate().await;
        assert_eq!(provider.access_token().await.unwrap(), "Atza|token");
    }
}
