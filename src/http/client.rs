//! Paced, retrying JSON client for one platform.
//!
//! Calls on one instance are serialized: the pacing lock is held for the
//! whole call, and the minimum interval is measured from the end of the
//! previous call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, HeaderMap, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::MAX_ERROR_BODY_CHARS;
use super::backoff::{ResetStyle, header_f64, is_retryable, retry_delay};
use super::token::TokenSource;
use crate::error::{Result, ScoutrError, truncate};

/// Connection settings for one platform.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub min_interval: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub reset_style: ResetStyle,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, reset_style: ResetStyle) -> Self {
        Self {
            base_url: base_url.into(),
            min_interval: Duration::from_millis(1_200),
            max_retries: 3,
            timeout: Duration::from_secs(30),
            user_agent: None,
            reset_style,
        }
    }
}

/// Rate-limit state reported by the last response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Epoch seconds
    pub reset_at: Option<i64>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap, style: ResetStyle, now_epoch_secs: i64) -> Self {
        let remaining = header_f64(headers, style.remaining_header());
        let limit = match style {
            ResetStyle::Epoch => header_f64(headers, "x-rate-limit-limit"),
            ResetStyle::Delta => header_f64(headers, "x-ratelimit-used").zip(remaining).map(|(u, r)| u + r),
        };
        let reset_at = style
            .seconds_until_reset(headers, now_epoch_secs)
            .and_then(|secs| now_epoch_secs.checked_add(secs));
        Self {
            limit: limit.map(|v| v.max(0.0) as u32),
            remaining: remaining.map(|v| v.max(0.0) as u32),
            reset_at,
        }
    }
}

enum Payload<'a> {
    Query(&'a [(&'a str, &'a str)]),
    Form(&'a [(&'a str, &'a str)]),
    Json(&'a Value),
}

pub struct RateLimitedClient {
    http: reqwest::Client,
    config: ClientConfig,
    bearer: Option<Arc<dyn TokenSource>>,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            bearer: None,
            last_call: Mutex::new(None),
        })
    }

    /// Attach a bearer token layer.
    pub fn with_bearer(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.bearer = Some(source);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<(Value, RateLimitInfo)> {
        self.call(Method::GET, path, Payload::Query(params)).await
    }

    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(Value, RateLimitInfo)> {
        self.call(Method::POST, path, Payload::Form(form)).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<(Value, RateLimitInfo)> {
        self.call(Method::POST, path, Payload::Json(body)).await
    }

    async fn call(&self, method: Method, path: &str, payload: Payload<'_>) -> Result<(Value, RateLimitInfo)> {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.config.min_interval {
                tokio::time::sleep(self.config.min_interval - elapsed).await;
            }
        }

        let result = self.attempt_loop(&method, path, &payload).await;
        *last_call = Some(Instant::now());
        result
    }

    async fn attempt_loop(&self, method: &Method, path: &str, payload: &Payload<'_>) -> Result<(Value, RateLimitInfo)> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut attempt: u32 = 0;
        let mut token_refreshed = false;

        loop {
            let mut request = self.http.request(method.clone(), &url);
            request = match payload {
                Payload::Query(params) => request.query(params),
                Payload::Form(form) => request.form(form),
                Payload::Json(body) => request.json(body),
            };
            if let Some(ua) = &self.config.user_agent {
                request = request.header(USER_AGENT, ua);
            }
            if let Some(bearer) = &self.bearer {
                request = request.header(AUTHORIZATION, format!("Bearer {}", bearer.token().await?));
            }

            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let now_secs = chrono::Utc::now().timestamp();
            let info = RateLimitInfo::from_headers(&headers, self.config.reset_style, now_secs);
            let body = response.text().await?;

            if status.is_success() {
                log::debug!(
                    "{} {} -> {} (remaining {:?}, reset {:?})",
                    method,
                    path,
                    status.as_u16(),
                    info.remaining,
                    info.reset_at
                );
                let value = if body.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&body)?
                };
                return Ok((value, info));
            }

            if status == StatusCode::UNAUTHORIZED
                && !token_refreshed
                && let Some(bearer) = &self.bearer
            {
                log::info!("{} {} returned 401, refreshing bearer token", method, path);
                bearer.invalidate().await;
                token_refreshed = true;
                continue;
            }

            if is_retryable(status) && attempt < self.config.max_retries {
                attempt += 1;
                let delay = retry_delay(&headers, self.config.reset_style, attempt, now_secs);
                tracing::warn!(
                    status = status.as_u16(),
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    path,
                    "Retryable response, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(ScoutrError::Http {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StaticToken;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn client(server: &MockServer, style: ResetStyle) -> RateLimitedClient {
        let mut config = ClientConfig::new(server.uri(), style);
        config.min_interval = Duration::ZERO;
        RateLimitedClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_get_parses_body_and_rate_limit_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tweets/search/recent"))
            .and(query_param("query", "athlete"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": "1"}]}))
                    .insert_header("x-rate-limit-limit", "450")
                    .insert_header("x-rate-limit-remaining", "449")
                    .insert_header("x-rate-limit-reset", "4102444800"),
            )
            .mount(&server)
            .await;

        let (body, info) = client(&server, ResetStyle::Epoch)
            .get("/tweets/search/recent", &[("query", "athlete")])
            .await
            .unwrap();
        assert_eq!(body["data"][0]["id"], "1");
        assert_eq!(info.limit, Some(450));
        assert_eq!(info.remaining, Some(449));
        assert_eq!(info.reset_at, Some(4_102_444_800));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let (body, _) = client(&server, ResetStyle::Epoch).get("/x", &[]).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_truncated_http_error() {
        let server = MockServer::start().await;
        let long_body = "e".repeat(1_000);
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("retry-after", "0")
                    .set_body_string(long_body),
            )
            .expect(4)
            .mount(&server)
            .await;

        let err = client(&server, ResetStyle::Delta).get("/x", &[]).await.unwrap_err();
        match err {
            ScoutrError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body.chars().count(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_fail_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, ResetStyle::Epoch)
            .post_json("/dm", &json!({"text": "hi"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_post_form_sends_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/comment"))
            .and(body_string_contains("thing_id=t1_abc"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (body, _) = client(&server, ResetStyle::Delta)
            .post_form("/api/comment", &[("thing_id", "t1_abc"), ("text", "thanks")])
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_bearer_header_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, ResetStyle::Epoch)
            .with_bearer(Arc::new(StaticToken::new("tok")))
            .get("/me", &[])
            .await
            .unwrap();
    }

    struct CountingToken {
        invalidations: AtomicU32,
    }

    #[async_trait::async_trait]
    impl TokenSource for CountingToken {
        async fn token(&self) -> Result<String> {
            Ok(format!("tok{}", self.invalidations.load(Ordering::SeqCst)))
        }

        async fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_token_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok0"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
            .mount(&server)
            .await;

        let token = Arc::new(CountingToken {
            invalidations: AtomicU32::new(0),
        });
        let (body, _) = client(&server, ResetStyle::Epoch)
            .with_bearer(token.clone())
            .get("/me", &[])
            .await
            .unwrap();
        assert_eq!(body["ok"], 1);
        assert_eq!(token.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_unauthorized_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let token = Arc::new(CountingToken {
            invalidations: AtomicU32::new(0),
        });
        let err = client(&server, ResetStyle::Epoch)
            .with_bearer(token)
            .get("/me", &[])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[derive(Clone)]
    struct Stamp(Arc<std::sync::Mutex<Vec<Instant>>>);

    impl Respond for Stamp {
        fn respond(&self, _: &Request) -> ResponseTemplate {
            if let Ok(mut stamps) = self.0.lock() {
                stamps.push(Instant::now());
            }
            ResponseTemplate::new(200).set_body_json(json!({}))
        }
    }

    #[tokio::test]
    async fn test_min_interval_between_calls() {
        let server = MockServer::start().await;
        let stamps = Stamp(Arc::new(std::sync::Mutex::new(Vec::new())));
        Mock::given(method("GET"))
            .respond_with(stamps.clone())
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(server.uri(), ResetStyle::Epoch);
        config.min_interval = Duration::from_millis(150);
        let client = Arc::new(RateLimitedClient::new(config).unwrap());

        let a = client.clone();
        let b = client.clone();
        let (ra, rb) = tokio::join!(a.get("/a", &[]), b.get("/b", &[]));
        ra.unwrap();
        rb.unwrap();
        client.get("/c", &[]).await.unwrap();

        let stamps = stamps.0.lock().unwrap();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_delta_style_rate_limit_info() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-used", "4".parse().unwrap());
        headers.insert("x-ratelimit-remaining", "596.0".parse().unwrap());
        headers.insert("x-ratelimit-reset", "120".parse().unwrap());
        let info = RateLimitInfo::from_headers(&headers, ResetStyle::Delta, 1_000);
        assert_eq!(info.limit, Some(600));
        assert_eq!(info.remaining, Some(596));
        assert_eq!(info.reset_at, Some(1_120));
    }

    #[test]
    fn test_oversized_reset_header_is_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "10".parse().unwrap());
        headers.insert("x-ratelimit-reset", "1e30".parse().unwrap());
        let info = RateLimitInfo::from_headers(&headers, ResetStyle::Delta, i64::MAX - 5);
        assert_eq!(info.remaining, Some(10));
        assert_eq!(info.reset_at, None);

        headers.insert("x-ratelimit-reset", "60".parse().unwrap());
        let info = RateLimitInfo::from_headers(&headers, ResetStyle::Delta, i64::MAX - 5);
        assert_eq!(info.reset_at, None);
    }

    #[tokio::test]
    async fn test_success_with_garbage_reset_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/running/search.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"children": []}}))
                    .insert_header("x-ratelimit-reset", "1e30"),
            )
            .mount(&server)
            .await;

        let (_, info) = client(&server, ResetStyle::Delta)
            .get("/r/running/search.json", &[])
            .await
            .unwrap();
        assert_eq!(info.reset_at, None);
    }
}
