use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::CellwayError;
use crate::calculation::CalculationTicket;
use crate::models::{
    BackendMode, BoundingBox, Coordinate, RouteEndpoints, RouteType, RouteVariants, TowerRecord,
};
use crate::selector::RouteSelector;

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
}

#[derive(Debug, Deserialize)]
pub struct TowerQuery {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

#[derive(Debug, Serialize)]
pub struct ApiRoutes {
    pub routes: RouteVariants,
    pub failures: BTreeMap<RouteType, String>,
    pub mode: Option<BackendMode>,
    pub from_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiTowers {
    pub towers: Vec<TowerRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
}

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(CellwayError);

impl From<CellwayError> for ApiError {
    fn from(error: CellwayError) -> Self {
        Self(error)
    }
}

#[must_use]
pub fn status_for(error: &CellwayError) -> StatusCode {
    match error {
        CellwayError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        CellwayError::NoRouteFound { .. } => StatusCode::NOT_FOUND,
        CellwayError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = ApiErrorBody {
            error: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(selector: Arc<RouteSelector>) -> Router {
    Router::new()
        .route("/routes", get(get_routes))
        .route("/towers", get(get_towers))
        .with_state(selector)
}

async fn get_routes(
    State(selector): State<Arc<RouteSelector>>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<ApiRoutes>, ApiError> {
    let endpoints = RouteEndpoints::new(
        Coordinate::new(query.start_lat, query.start_lng)?,
        Coordinate::new(query.end_lat, query.end_lng)?,
    );

    let outcome = selector
        .compute_all_variants(endpoints, &CalculationTicket::detached(), |_| {})
        .await?;

    Ok(Json(ApiRoutes {
        routes: outcome.variants,
        failures: outcome.failures,
        mode: outcome.mode,
        from_cache: outcome.from_cache,
    }))
}

async fn get_towers(
    State(selector): State<Arc<RouteSelector>>,
    Query(query): Query<TowerQuery>,
) -> Result<Json<ApiTowers>, ApiError> {
    let bounds = BoundingBox {
        min_lat: query.min_lat,
        min_lng: query.min_lng,
        max_lat: query.max_lat,
        max_lng: query.max_lng,
    };
    let towers = selector.towers_in(&bounds).await?;
    Ok(Json(ApiTowers {
        total: towers.len(),
        towers,
    }))
}
