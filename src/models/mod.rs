//! Data models for the Cellway engine
//!
//! This module contains the core domain models organized by concern:
//! - Coordinate: positions, endpoint pairs and bounding boxes
//! - Route: candidates from the route provider and scored variants
//! - Tower: cell tower records and their distance annotations

pub mod coordinate;
pub mod route;
pub mod tower;

// Re-export all public types for convenient access
pub use coordinate::{BoundingBox, Coordinate, RouteEndpoints};
pub use route::{
    BackendMode, RouteCandidate, RouteGeometry, RouteResult, RouteType, RouteVariants,
    SourceAlgorithm,
};
pub use tower::{RadioType, ScoredTower, TowerRecord};
