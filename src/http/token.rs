//! Bearer token sources.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{Result, ScoutrError, truncate};

/// Supplies bearer tokens to a client.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current token, fetching one if needed.
    async fn token(&self) -> Result<String>;

    /// Drop the cached token after the platform rejected it.
    async fn invalidate(&self);
}

/// A fixed token from the environment.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }

    async fn invalidate(&self) {
        log::warn!("Static bearer token was rejected; it cannot be refreshed");
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth refresh-token grant. The access token is cached until invalidated.
pub struct RefreshTokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    user_agent: Option<String>,
    cached: Mutex<Option<String>>,
}

impl RefreshTokenSource {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            user_agent: None,
            cached: Mutex::new(None),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    async fn fetch(&self) -> Result<String> {
        let mut request = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", self.refresh_token.as_str())]);
        if let Some(ua) = &self.user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ScoutrError::Http {
                status: status.as_u16(),
                body: truncate(&body, super::MAX_ERROR_BODY_CHARS),
            });
        }
        let parsed: TokenResponse = serde_json::from_str(&body)?;
        log::debug!("Refreshed access token from {}", self.token_url);
        Ok(parsed.access_token)
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.fetch().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken::new("abc");
        assert_eq!(source.token().await.unwrap(), "abc");
        source.invalidate().await;
        assert_eq!(source.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_refresh_token_is_cached_until_invalidated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "bearer"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let source = RefreshTokenSource::new(format!("{}/token", server.uri()), "id", "secret", "rt").unwrap();
        assert_eq!(source.token().await.unwrap(), "fresh");
        assert_eq!(source.token().await.unwrap(), "fresh");
        source.invalidate().await;
        assert_eq!(source.token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_refresh_failure_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let source = RefreshTokenSource::new(format!("{}/token", server.uri()), "id", "secret", "rt").unwrap();
        let err = source.token().await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
