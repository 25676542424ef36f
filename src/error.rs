//! Error types and handling for the Cellway route engine

use thiserror::Error;

use crate::models::RouteType;

/// Main error type for the Cellway engine
#[derive(Error, Debug)]
pub enum CellwayError {
    /// Non-numeric or out-of-range coordinates, rejected before any network call
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Network or backend failure of the route or tower provider
    #[error("Provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// The provider answered but produced no usable candidate
    #[error("No route found: {message}")]
    NoRouteFound { message: String },

    /// One named variant could not be computed while others succeeded
    #[error("Variant {route_type} failed: {message}")]
    PartialVariantFailure {
        route_type: RouteType,
        message: String,
    },

    /// A newer calculation superseded this one
    #[error("Calculation superseded by a newer request")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CellwayError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new provider error
    pub fn provider<S: Into<String>>(message: S) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    /// Create a new no-route error
    pub fn no_route<S: Into<String>>(message: S) -> Self {
        Self::NoRouteFound {
            message: message.into(),
        }
    }

    pub fn partial<S: Into<String>>(route_type: RouteType, message: S) -> Self {
        Self::PartialVariantFailure {
            route_type,
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CellwayError::InvalidInput { message } => format!("Invalid input: {message}"),
            CellwayError::ProviderUnavailable { .. } => {
                "Unable to reach the routing or tower service. Please try again later."
                    .to_string()
            }
            CellwayError::NoRouteFound { .. } => {
                "No route found between the specified points.".to_string()
            }
            CellwayError::PartialVariantFailure { route_type, .. } => {
                format!("The {route_type} route is unavailable, showing the fastest route instead.")
            }
            CellwayError::Cancelled => "Calculation was replaced by a newer request.".to_string(),
            CellwayError::Config { .. } => {
                "Configuration error. Please check your config file.".to_string()
            }
        }
    }
}
