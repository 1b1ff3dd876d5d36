//! Preset clients for the services Transitflow calls out to
//!
//! Specialized clients are plain composition: a named policy bundle plus
//! bearer-token header injection over [`ResilientClient`]. No subtype
//! hierarchy.

use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::http::breaker::BreakerPolicy;
use crate::http::client::{ClientConfig, RequestOptions, ResilientClient};
use crate::http::reporter::ErrorReporter;
use crate::http::retry::RetryPolicy;

/// Client for the internal ML route-optimization backend.
///
/// - Breaker: 5 failures, 60s cooldown (internal service, looser)
/// - Optimize write path: 5 retries starting at 2s, the one call worth
///   waiting for
pub struct OptimizationBackend {
    client: ResilientClient,
}

impl OptimizationBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_token: &str,
        reporter: ErrorReporter,
    ) -> Result<Self> {
        let config = ClientConfig::new(base_url)
            .with_default_header("Authorization", format!("Bearer {api_token}"))
            .with_breaker_policy(BreakerPolicy::new(5));

        Ok(Self {
            client: ResilientClient::new(config, reporter)?,
        })
    }

    /// Retry tuning for the optimize write path
    pub fn optimize_retry_policy() -> RetryPolicy {
        RetryPolicy::new(5).with_base_delay(Duration::from_millis(2000))
    }

    /// Run the optimization engine over a route
    pub async fn optimize_route(&self, route: Value) -> Result<Value> {
        self.client
            .request_json(
                "/api/ml/optimize/route",
                RequestOptions::post(serde_json::json!({ "route": route }))
                    .with_retry_policy(Self::optimize_retry_policy()),
            )
            .await
    }

    /// Analyze a route for optimization opportunities
    pub async fn analyze_route(&self, route: Value) -> Result<Value> {
        self.client
            .request_json(
                "/api/ml/analyze/route",
                RequestOptions::post(serde_json::json!({ "route": route })),
            )
            .await
    }

    /// Backend readiness probe
    pub async fn status(&self) -> Result<Value> {
        self.client
            .request_json("/api/ml/status", RequestOptions::get())
            .await
    }

    /// The underlying resilient client, for diagnostics surfaces
    pub fn client(&self) -> &ResilientClient {
        &self.client
    }
}

/// Client for the external maps/geocoding provider.
///
/// - Breaker: 3 failures, 30s cooldown (third party, lower trust)
pub struct GeocodingProvider {
    client: ResilientClient,
}

impl GeocodingProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_token: &str,
        reporter: ErrorReporter,
    ) -> Result<Self> {
        let config = ClientConfig::new(base_url)
            .with_default_header("Authorization", format!("Bearer {api_token}"))
            .with_breaker_policy(
                BreakerPolicy::new(3).with_recovery_timeout(Duration::from_millis(30_000)),
            );

        Ok(Self {
            client: ResilientClient::new(config, reporter)?,
        })
    }

    /// Forward-geocode a free-text query.
    ///
    /// The query rides in the options, not the endpoint, so every geocode
    /// call counts against the single `GET:/geocode` breaker.
    pub async fn geocode(&self, query: &str) -> Result<Value> {
        self.client
            .request_json("/geocode", RequestOptions::get().with_query("q", query))
            .await
    }

    /// Reverse-geocode a coordinate pair
    pub async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Value> {
        self.client
            .request_json(
                "/reverse",
                RequestOptions::get()
                    .with_query("lat", lat.to_string())
                    .with_query("lon", lon.to_string()),
            )
            .await
    }

    /// The underlying resilient client, for diagnostics surfaces
    pub fn client(&self) -> &ResilientClient {
        &self.client
    }
}
