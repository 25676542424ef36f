//! Route candidates, variants and scored results

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Coordinate, ScoredTower, TowerRecord};
use crate::{CellwayError, Result};

/// Named optimization target of a route
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    #[default]
    Fastest,
    CellCoverage,
    Balanced,
}

impl RouteType {
    pub const ALL: [RouteType; 3] = [
        RouteType::Fastest,
        RouteType::CellCoverage,
        RouteType::Balanced,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Fastest => "fastest",
            RouteType::CellCoverage => "cell_coverage",
            RouteType::Balanced => "balanced",
        }
    }
}

impl Display for RouteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteType {
    type Err = CellwayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fastest" => Ok(RouteType::Fastest),
            "cell_coverage" | "cell-coverage" | "coverage" => Ok(RouteType::CellCoverage),
            "balanced" => Ok(RouteType::Balanced),
            other => Err(CellwayError::invalid_input(format!(
                "unknown route type '{other}', expected fastest, cell_coverage or balanced"
            ))),
        }
    }
}

/// How the provider produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAlgorithm {
    Base,
    Weighted,
}

/// Which provider capability a calculation ran against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// One request per variant, each with its own coverage weight
    WeightedRouting,
    /// A single request returning ranked alternatives
    RankedAlternatives,
}

/// Ordered polyline, start to end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    points: Vec<Coordinate>,
}

impl RouteGeometry {
    /// Build a geometry from at least two points
    pub fn new(points: Vec<Coordinate>) -> Result<Self> {
        if points.len() < 2 {
            return Err(CellwayError::invalid_input(format!(
                "route geometry needs at least 2 points, got {}",
                points.len()
            )));
        }
        Ok(Self { points })
    }

    /// Build a geometry from `[lng, lat]` pairs as delivered by routing backends
    pub fn from_lng_lat(pairs: &[[f64; 2]]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|[lng, lat]| Coordinate { lat: *lat, lng: *lng })
                .collect(),
        )
    }

    #[must_use]
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// Consecutive point pairs
    pub fn segments(&self) -> impl Iterator<Item = (&Coordinate, &Coordinate)> {
        self.points.windows(2).map(|w| (&w[0], &w[1]))
    }
}

/// One route as returned by the route provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub geometry: RouteGeometry,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub source_algorithm: SourceAlgorithm,
    /// Coverage weight in `[0, 1]` the provider routed with
    pub weight: f64,
    /// Towers the provider already matched to this route, if any
    pub towers: Option<Vec<TowerRecord>>,
}

/// A scored route variant ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub signal_score: f64,
    pub tower_count: usize,
    pub towers: Vec<ScoredTower>,
    pub geometry: RouteGeometry,
}

/// The three named variants of one calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteVariants {
    pub fastest: Option<RouteResult>,
    pub cell_coverage: Option<RouteResult>,
    pub balanced: Option<RouteResult>,
}

impl RouteVariants {
    #[must_use]
    pub fn get(&self, route_type: RouteType) -> Option<&RouteResult> {
        match route_type {
            RouteType::Fastest => self.fastest.as_ref(),
            RouteType::CellCoverage => self.cell_coverage.as_ref(),
            RouteType::Balanced => self.balanced.as_ref(),
        }
    }

    pub fn set(&mut self, result: RouteResult) {
        let slot = match result.route_type {
            RouteType::Fastest => &mut self.fastest,
            RouteType::CellCoverage => &mut self.cell_coverage,
            RouteType::Balanced => &mut self.balanced,
        };
        *slot = Some(result);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        RouteType::ALL.iter().all(|t| self.get(*t).is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        RouteType::ALL.iter().all(|t| self.get(*t).is_none())
    }

    /// The requested variant, or `fastest` when it is unavailable
    #[must_use]
    pub fn get_or_fastest(&self, route_type: RouteType) -> Option<&RouteResult> {
        self.get(route_type).or(self.fastest.as_ref())
    }
}
