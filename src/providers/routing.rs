use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::towers::TowerWire;
use super::{RouteProvider, RouteRequest, RouteResponse, build_http_client};
use crate::config::RoutingConfig;
use crate::models::{RouteCandidate, RouteGeometry, SourceAlgorithm};
use crate::{CellwayError, Result};

/// Route provider speaking the routing backend's HTTP API
pub struct HttpRouteProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl HttpRouteProvider {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout_seconds, config.max_retries)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_url(&self, request: &RouteRequest) -> String {
        let RouteRequest {
            endpoints,
            route_type,
            weight,
            alternatives,
        } = request;
        format!(
            "{}/routing/calculate?start_lat={}&start_lng={}&end_lat={}&end_lng={}&route_type={}&weight={}&alternatives={}",
            self.base_url,
            endpoints.start.lat,
            endpoints.start.lng,
            endpoints.end.lat,
            endpoints.end.lng,
            route_type,
            weight.unwrap_or(0.0),
            alternatives
        )
    }
}

#[async_trait]
impl RouteProvider for HttpRouteProvider {
    #[instrument(skip(self), fields(route_type = %request.route_type))]
    async fn fetch_routes(&self, request: &RouteRequest) -> Result<RouteResponse> {
        let url = self.request_url(request);
        debug!("Calling the routing API");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CellwayError::provider(format!("Routing request failed: {e}")))?;

        let status = response.status();
        let body: RouteWire = response.json().await.map_err(|e| {
            CellwayError::provider(format!("Unreadable routing response ({status}): {e}"))
        })?;

        normalize(body, status, request)
    }
}

/// The response shapes routing backends are known to produce
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteWire {
    Routes(RoutesBody),
    Paths(PathsBody),
    Failure(FailureBody),
}

#[derive(Debug, Deserialize)]
struct RoutesBody {
    code: Option<String>,
    routes: Vec<RouteEntry>,
    /// Towers along the optimized route of a weighted answer
    towers: Option<Vec<TowerWire>>,
    optimization_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    geometry: LineString,
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
    towers: Option<Vec<TowerWire>>,
}

#[derive(Debug, Deserialize)]
struct PathsBody {
    paths: Vec<PathEntry>,
}

#[derive(Debug, Deserialize)]
struct PathEntry {
    points: LineString,
    /// Meters
    distance: f64,
    /// Milliseconds
    time: f64,
}

#[derive(Debug, Deserialize)]
struct LineString {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

/// Classify a backend failure. Without a known code the HTTP status decides:
/// endpoints are validated before the call, so a 4xx means no route exists.
fn failure(code: Option<&str>, message: Option<&str>, status: StatusCode) -> CellwayError {
    let message = message.map_or_else(
        || format!("routing backend reported an error ({status})"),
        str::to_string,
    );
    match code {
        Some("NoRoute" | "PointNotFound" | "NoSegment") => CellwayError::no_route(message),
        Some(code) => CellwayError::provider(format!("{code}: {message}")),
        None if status.is_client_error() => CellwayError::no_route(message),
        None => CellwayError::provider(message),
    }
}

/// Map a wire body onto candidates. A weighted backend marks its answers
/// with `optimization_type`; anything else is treated as plain ranked routing.
fn normalize(body: RouteWire, status: StatusCode, request: &RouteRequest) -> Result<RouteResponse> {
    let (candidates, weighted_routing) = match body {
        RouteWire::Routes(RoutesBody {
            code,
            routes,
            towers,
            optimization_type,
        }) => {
            if let Some(code) = code.as_deref().filter(|c| *c != "Ok") {
                return Err(failure(Some(code), None, status));
            }
            let weighted = optimization_type.is_some();
            let (source_algorithm, weight) = if weighted {
                (SourceAlgorithm::Weighted, request.weight.unwrap_or(0.0))
            } else {
                (SourceAlgorithm::Base, 0.0)
            };
            let mut candidates = routes
                .into_iter()
                .filter_map(|route| {
                    let geometry = usable_geometry(&route.geometry)?;
                    Some(RouteCandidate {
                        geometry,
                        distance_meters: route.distance,
                        duration_seconds: route.duration,
                        source_algorithm,
                        weight,
                        towers: route
                            .towers
                            .map(|towers| towers.into_iter().map(Into::into).collect()),
                    })
                })
                .collect::<Vec<_>>();
            if weighted {
                if let (Some(towers), Some(first)) = (towers, candidates.first_mut()) {
                    first
                        .towers
                        .get_or_insert_with(|| towers.into_iter().map(Into::into).collect());
                }
            }
            (candidates, weighted)
        }
        RouteWire::Paths(body) => {
            let candidates = body
                .paths
                .into_iter()
                .filter_map(|path| {
                    let geometry = usable_geometry(&path.points)?;
                    Some(RouteCandidate {
                        geometry,
                        distance_meters: path.distance,
                        duration_seconds: path.time / 1000.0,
                        source_algorithm: SourceAlgorithm::Base,
                        weight: 0.0,
                        towers: None,
                    })
                })
                .collect::<Vec<_>>();
            (candidates, false)
        }
        RouteWire::Failure(body) => {
            let message = body.message.or(body.error);
            return Err(failure(body.code.as_deref(), message.as_deref(), status));
        }
    };

    if candidates.is_empty() {
        return Err(CellwayError::no_route(format!(
            "backend returned no usable {} route",
            request.route_type
        )));
    }

    Ok(RouteResponse {
        candidates,
        weighted_routing,
    })
}

fn usable_geometry(line: &LineString) -> Option<RouteGeometry> {
    match RouteGeometry::from_lng_lat(&line.coordinates) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            warn!("Dropping route candidate: {}", e);
            None
        }
    }
}
