//! Resilient client orchestrating retry, circuit breaking, and decoding
//!
//! One client wraps one upstream base URL. Every request resolves (or lazily
//! creates) the circuit breaker for its `METHOD:endpoint` key, runs the
//! underlying call through the retry loop inside the breaker, and pushes any
//! terminal failure to the injected [`ErrorReporter`] exactly once.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::http::breaker::{BreakerPolicy, BreakerStatus, CircuitBreaker};
use crate::http::error::CallError;
use crate::http::reporter::ErrorReporter;
use crate::http::retry::{execute_with_retry, RetryPolicy};

/// Client-level configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upstream base URL; endpoint paths are appended to it
    pub base_url: String,
    /// Headers applied to every request (auth, content negotiation)
    pub default_headers: HashMap<String, String>,
    /// Default retry policy, overridable per call
    pub retry: RetryPolicy,
    /// Default breaker policy for lazily created breakers
    pub breaker: BreakerPolicy,
    /// Per-request transport timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_headers: HashMap::new(),
            retry: RetryPolicy::default(),
            breaker: BreakerPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a configuration targeting the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Add a header sent with every request
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set the default retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the default breaker policy
    pub fn with_breaker_policy(mut self, breaker: BreakerPolicy) -> Self {
        self.breaker = breaker;
        self
    }

    /// Set the transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HashMap<String, String>,
    /// Query parameters, appended to the URL. Not part of the breaker key:
    /// breakers are scoped per (method, endpoint path), so varying queries
    /// against one path share one breaker.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-call retry policy override
    pub retry: Option<RetryPolicy>,
    /// Per-call breaker policy, applied when this call creates the breaker
    pub breaker: Option<BreakerPolicy>,
    /// Invoke the underlying call exactly once, bypassing the retry loop
    pub skip_retry: bool,
    /// Bypass the circuit breaker entirely for this call
    pub skip_circuit_breaker: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HashMap::new(),
            query: Vec::new(),
            body: None,
            retry: None,
            breaker: None,
            skip_retry: false,
            skip_circuit_breaker: false,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn put(body: Value) -> Self {
        Self {
            method: Method::PUT,
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_breaker_policy(mut self, breaker: BreakerPolicy) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_skip_retry(mut self, skip: bool) -> Self {
        self.skip_retry = skip;
        self
    }

    pub fn with_skip_circuit_breaker(mut self, skip: bool) -> Self {
        self.skip_circuit_breaker = skip;
        self
    }
}

/// Decoded response body, by declared content type
#[derive(Debug, Clone)]
pub enum ResponseBody {
    /// `application/json` (or any json-flavored media type)
    Json(Value),
    /// `text/*`
    Text(String),
    /// Anything else, raw
    Bytes(Vec<u8>),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ResponseBody::Json(_) => "json",
            ResponseBody::Text(_) => "text",
            ResponseBody::Bytes(_) => "bytes",
        }
    }
}

/// Resilient HTTP client for one upstream service
pub struct ResilientClient {
    http: reqwest::Client,
    config: ClientConfig,
    breakers: DashMap<String, CircuitBreaker>,
    reporter: ErrorReporter,
}

fn breaker_key(method: &Method, endpoint: &str) -> String {
    format!("{method}:{endpoint}")
}

impl ResilientClient {
    pub fn new(config: ClientConfig, reporter: ErrorReporter) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config,
            breakers: DashMap::new(),
            reporter,
        })
    }

    /// The error reporter this client pushes terminal failures to
    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Perform a resilient HTTP request and decode the response body.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<ResponseBody> {
        let url = self.build_url(endpoint, &options.query);
        let mut headers = self.config.default_headers.clone();
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }
        let method = options.method.clone();
        let body = options.body.clone();
        let path = endpoint.to_string();

        let operation = || self.perform(&method, &url, &headers, body.as_ref(), &path);
        self.execute(endpoint, &options, operation).await
    }

    /// Perform a resilient request expecting a JSON body, deserialized into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let body = self.request(endpoint, options).await?;
        self.decode_json(body)
    }

    /// Decode failures are terminal too; listeners hear about them like any
    /// other error leaving the pipeline.
    fn decode_json<T: DeserializeOwned>(&self, body: ResponseBody) -> Result<T> {
        let result = match body {
            ResponseBody::Json(value) => {
                serde_json::from_value(value).map_err(|e| ClientError::Decode {
                    message: format!("failed to deserialize response: {e}"),
                    source: Some(anyhow::Error::new(e)),
                })
            }
            other => Err(ClientError::Decode {
                message: format!("expected a JSON response, got {}", other.kind()),
                source: None,
            }),
        };
        if let Err(ref err) = result {
            self.reporter.report(err);
        }
        result
    }

    /// Run an arbitrary outbound operation under this client's resilience
    /// policies.
    ///
    /// This is the seam `request` itself goes through; callers with their own
    /// transport (an SMS provider SDK, a gRPC stub) get the same retry loop,
    /// breaker accounting, and terminal-error reporting. The breaker observes
    /// only the final outcome of the whole retry sequence: one logical call
    /// counts once, regardless of how many attempts it took.
    pub async fn execute<T, F, Fut>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry_policy = options
            .retry
            .clone()
            .unwrap_or_else(|| self.config.retry.clone());
        let key = breaker_key(&options.method, endpoint);

        let outcome = if options.skip_circuit_breaker {
            if options.skip_retry {
                operation().await
            } else {
                execute_with_retry(operation, &retry_policy, &key).await
            }
        } else {
            let breaker = self.breaker_for(&key, options);
            if options.skip_retry {
                breaker.execute(|| operation()).await
            } else {
                breaker
                    .execute(|| execute_with_retry(operation, &retry_policy, &key))
                    .await
            }
        };

        if let Err(ref err) = outcome {
            self.reporter.report(err);
        }
        outcome
    }

    fn breaker_for(&self, key: &str, options: &RequestOptions) -> CircuitBreaker {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                let policy = options
                    .breaker
                    .clone()
                    .unwrap_or_else(|| self.config.breaker.clone());
                CircuitBreaker::new(key.to_string(), policy)
            })
            .clone()
    }

    /// Snapshot of the breaker guarding `(method, endpoint)`, if one exists
    pub fn breaker_status(&self, endpoint: &str, method: &Method) -> Option<BreakerStatus> {
        self.breakers
            .get(&breaker_key(method, endpoint))
            .map(|breaker| breaker.status())
    }

    /// Drop the breaker for `(method, endpoint)`; the next call recreates it
    /// closed with zero failures. Returns false when no breaker existed.
    pub fn reset_breaker(&self, endpoint: &str, method: &Method) -> bool {
        self.breakers.remove(&breaker_key(method, endpoint)).is_some()
    }

    /// Snapshots of every breaker this client has created
    pub fn all_breaker_statuses(&self) -> HashMap<String, BreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    fn build_url(&self, endpoint: &str, query: &[(String, String)]) -> String {
        let base = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        if query.is_empty() {
            return base;
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in query {
            serializer.append_pair(name, value);
        }
        format!("{base}?{}", serializer.finish())
    }

    async fn perform(
        &self,
        method: &Method,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
        endpoint: &str,
    ) -> Result<ResponseBody> {
        let mut request = self.http.request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(json) = body {
            request = request.json(json);
        }

        // No response at all: propagate without entering retry classification.
        let response = request.send().await.map_err(|e| {
            let message = e.to_string();
            ClientError::Transport {
                message,
                source: Some(anyhow::Error::new(e)),
            }
        })?;

        if !response.status().is_success() {
            let call = CallError::from_response(method.as_str(), endpoint, response).await;
            return Err(ClientError::Call(call));
        }

        decode_body(response).await
    }
}

async fn decode_body(response: reqwest::Response) -> Result<ResponseBody> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("json") {
        let value = response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Decode {
                message: format!("response declared JSON but did not parse: {e}"),
                source: Some(anyhow::Error::new(e)),
            })?;
        Ok(ResponseBody::Json(value))
    } else if content_type.starts_with("text/") {
        let text = response.text().await.map_err(|e| ClientError::Decode {
            message: format!("failed to read text response: {e}"),
            source: Some(anyhow::Error::new(e)),
        })?;
        Ok(ResponseBody::Text(text))
    } else {
        let bytes = response.bytes().await.map_err(|e| ClientError::Decode {
            message: format!("failed to read response bytes: {e}"),
            source: Some(anyhow::Error::new(e)),
        })?;
        Ok(ResponseBody::Bytes(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn breaker_key_is_method_colon_endpoint() {
        assert_eq!(breaker_key(&Method::GET, "/routes"), "GET:/routes");
        assert_eq!(
            breaker_key(&Method::POST, "/api/ml/optimize/route"),
            "POST:/api/ml/optimize/route"
        );
    }

    #[test]
    fn options_builders_set_flags() {
        let options = RequestOptions::post(serde_json::json!({"stop": "CST"}))
            .with_header("X-Request-Id", "abc")
            .with_skip_retry(true)
            .with_skip_circuit_breaker(true);

        assert_eq!(options.method, Method::POST);
        assert!(options.body.is_some());
        assert_eq!(options.headers.get("X-Request-Id").unwrap(), "abc");
        assert!(options.skip_retry);
        assert!(options.skip_circuit_breaker);
    }

    #[test]
    fn url_join_handles_trailing_slash() {
        let reporter = ErrorReporter::new();
        let client =
            ResilientClient::new(ClientConfig::new("http://backend.local/"), reporter).unwrap();
        assert_eq!(client.build_url("/health", &[]), "http://backend.local/health");
    }

    #[test]
    fn query_parameters_are_encoded_into_the_url() {
        let client = ResilientClient::new(
            ClientConfig::new("http://backend.local"),
            ErrorReporter::new(),
        )
        .unwrap();

        let query = vec![("q".to_string(), "São Paulo".to_string())];
        assert_eq!(
            client.build_url("/geocode", &query),
            "http://backend.local/geocode?q=S%C3%A3o+Paulo"
        );
    }

    #[test]
    fn json_decode_failures_reach_the_reporter() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        #[derive(serde::Deserialize)]
        struct Stop {
            name: String,
        }

        let reporter = ErrorReporter::new();
        let reported = Arc::new(AtomicU32::new(0));
        let r = reported.clone();
        reporter.on_error(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let client =
            ResilientClient::new(ClientConfig::new("http://backend.local"), reporter).unwrap();

        // Non-JSON body: reported once.
        let result: Result<Stop> = client.decode_json(ResponseBody::Text("pong".to_string()));
        assert!(matches!(result, Err(ClientError::Decode { .. })));
        assert_eq!(reported.load(Ordering::SeqCst), 1);

        // Shape mismatch: reported once.
        let result: Result<Stop> = client.decode_json(ResponseBody::Json(serde_json::json!({
            "id": 7
        })));
        assert!(matches!(result, Err(ClientError::Decode { .. })));
        assert_eq!(reported.load(Ordering::SeqCst), 2);

        // Successful decode reports nothing.
        let stop: Stop = client
            .decode_json(ResponseBody::Json(serde_json::json!({"name": "CST"})))
            .unwrap();
        assert_eq!(stop.name, "CST");
        assert_eq!(reported.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn response_body_accessors() {
        let body = ResponseBody::Json(serde_json::json!({"ok": true}));
        assert!(body.as_json().is_some());
        assert!(body.as_text().is_none());

        let text = ResponseBody::Text("pong".to_string());
        assert_eq!(text.as_text(), Some("pong"));
    }
}
