//! Transitflow client - resilient outbound call layer
//!
//! Every network call Transitflow services make to external dependencies
//! (the ML optimization backend, the maps/geocoding provider, SMS) goes
//! through this crate: automatic retry with exponential backoff and jitter,
//! a circuit breaker per `(method, endpoint)` key, and fan-out reporting of
//! terminal failures.
//!
//! # Main Components
//!
//! - **Error Handling**: explicit outcome variants - a rejected call
//!   ([`ClientError::CircuitOpen`]) is type-distinct from a failed exchange
//! - **Retry**: [`RetryPolicy`] and the backoff loop in [`http::retry`]
//! - **Circuit Breaking**: [`CircuitBreaker`] state machine per endpoint
//! - **Client**: [`ResilientClient`] orchestrating the pipeline
//! - **Presets**: ready-made clients for Transitflow's upstream services
//!
//! # Example
//!
//! ```no_run
//! use transitflow_client::{ClientConfig, ErrorReporter, RequestOptions, ResilientClient};
//!
//! #[tokio::main]
//! async fn main() -> transitflow_client::Result<()> {
//!     let reporter = ErrorReporter::new();
//!     reporter.on_error(|err| eprintln!("call failed: {err}"));
//!
//!     let client = ResilientClient::new(
//!         ClientConfig::new("https://maps.example.com"),
//!         reporter,
//!     )?;
//!     let body = client.request("/health", RequestOptions::get()).await?;
//!     println!("{body:?}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod http;
pub mod presets;

// Re-export main types for convenience
pub use error::{ClientError, Result};
pub use http::{
    classify, compute_delay, execute_with_retry, BreakerPolicy, BreakerStatus, CallError,
    CircuitBreaker, CircuitState, ClientConfig, ErrorReporter, Method, RequestOptions,
    ResilientClient, ResponseBody, RetryPolicy, StatusCode, SubscriptionId,
};
pub use presets::{GeocodingProvider, OptimizationBackend};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_surface_defaults() {
        assert_eq!(RetryPolicy::default().max_retries, 3);
        assert_eq!(BreakerPolicy::default().failure_threshold, 5);
    }
}
