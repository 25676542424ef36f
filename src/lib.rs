//! Cellway - route choice by cellular coverage
//!
//! Scores driving routes by the cell towers along them and offers three
//! variants per trip: fastest, best coverage, and a balance of the two.

pub mod api;
pub mod cache;
pub mod calculation;
pub mod config;
pub mod error;
pub mod geometry;
pub mod models;
pub mod providers;
pub mod proximity;
pub mod scoring;
pub mod selector;
pub mod session;
pub mod telemetry;
pub mod web;

// Re-export core types for public API
pub use cache::{CacheEntry, ResultCache};
pub use calculation::{CalculationTicket, CalculationTracker};
pub use config::CellwayConfig;
pub use error::CellwayError;
pub use models::{
    BackendMode, BoundingBox, Coordinate, RouteCandidate, RouteEndpoints, RouteGeometry,
    RouteResult, RouteType, RouteVariants, ScoredTower, TowerRecord,
};
pub use providers::{RouteProvider, RouteRequest, RouteResponse, TowerProvider};
pub use proximity::ProximityFilter;
pub use scoring::SignalScorer;
pub use selector::{RouteSelector, SelectionWeights, VariantOutcome, VariantUpdate};
pub use session::{RouteSession, SessionSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, CellwayError>;
