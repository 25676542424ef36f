//! External route and tower providers
//!
//! The engine only talks to the traits defined here. Concrete adapters
//! normalize whatever their backend returns into the crate's models at the
//! boundary, so nothing downstream branches on the wire format.

use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::models::{BoundingBox, RouteCandidate, RouteEndpoints, RouteType, TowerRecord};
use crate::{CellwayError, Result};

pub mod routing;
pub mod towers;

pub use routing::HttpRouteProvider;
pub use towers::{CsvTowerProvider, HttpTowerProvider};

/// One route request
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub endpoints: RouteEndpoints,
    pub route_type: RouteType,
    /// Coverage weight in `[0, 1]`, `None` for plain fastest routing
    pub weight: Option<f64>,
    /// Ask for ranked alternatives as well as the best route
    pub alternatives: bool,
}

/// Normalized provider answer
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    /// Candidates in provider ranking order, fastest first
    pub candidates: Vec<RouteCandidate>,
    /// The backend honoured the requested route type and weight
    pub weighted_routing: bool,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Fetch route candidates. Fails with `NoRouteFound` when the backend
    /// answered without a usable route and `ProviderUnavailable` otherwise.
    async fn fetch_routes(&self, request: &RouteRequest) -> Result<RouteResponse>;
}

#[async_trait]
pub trait TowerProvider: Send + Sync {
    /// Towers inside `bounds`. An empty result is a valid answer.
    async fn fetch_towers(&self, bounds: &BoundingBox) -> Result<Vec<TowerRecord>>;
}

/// HTTP client with retry on transient failures
pub(crate) fn build_http_client(timeout_seconds: u32, max_retries: u32) -> Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds.into()))
        .user_agent(concat!("Cellway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CellwayError::config(format!("Failed to create HTTP client: {e}")))?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}
