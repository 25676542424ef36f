//! Coordinates, endpoint pairs and bounding boxes

use serde::{Deserialize, Serialize};

use crate::{CellwayError, Result};

/// A WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting non-finite or out-of-range values
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let coordinate = Self { lat, lng };
        coordinate.validate()?;
        Ok(coordinate)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(CellwayError::invalid_input(format!(
                "coordinates must be numbers, got ({}, {})",
                self.lat, self.lng
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(CellwayError::invalid_input(format!(
                "latitude {} outside [-90, 90]",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(CellwayError::invalid_input(format!(
                "longitude {} outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }

    /// Parse a `"lat,lng"` pair as typed on the command line
    pub fn parse(input: &str) -> Result<Self> {
        let (lat, lng) = input
            .split_once(',')
            .ok_or_else(|| CellwayError::invalid_input(format!("expected 'lat,lng', got '{input}'")))?;
        let parse = |value: &str| {
            value.trim().parse::<f64>().map_err(|_| {
                CellwayError::invalid_input(format!("'{}' is not a number", value.trim()))
            })
        };
        Self::new(parse(lat)?, parse(lng)?)
    }

    /// Round coordinates for cache key generation
    #[must_use]
    pub fn rounded(&self, precision: u32) -> (f64, f64) {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(6));
        let lat = (self.lat * multiplier).round() / multiplier;
        let lng = (self.lng * multiplier).round() / multiplier;
        (lat, lng)
    }
}

/// Start and end of one calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEndpoints {
    pub start: Coordinate,
    pub end: Coordinate,
}

impl RouteEndpoints {
    #[must_use]
    pub fn new(start: Coordinate, end: Coordinate) -> Self {
        Self { start, end }
    }

    pub fn validate(&self) -> Result<()> {
        self.start.validate()?;
        self.end.validate()
    }

    /// Cache key collapsing near-duplicate requests
    #[must_use]
    pub fn cache_key(&self, precision: u32) -> String {
        let width = precision as usize;
        let (start_lat, start_lng) = self.start.rounded(precision);
        let (end_lat, end_lng) = self.end.rounded(precision);
        format!(
            "route:{start_lat:.width$},{start_lng:.width$}:{end_lat:.width$},{end_lng:.width$}"
        )
    }
}

/// Axis-aligned lat/lng rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Smallest box containing every coordinate, `None` for an empty input
    pub fn around<'a>(coordinates: impl IntoIterator<Item = &'a Coordinate>) -> Option<Self> {
        coordinates.into_iter().fold(None, |acc: Option<Self>, c| {
            Some(match acc {
                None => Self {
                    min_lat: c.lat,
                    min_lng: c.lng,
                    max_lat: c.lat,
                    max_lng: c.lng,
                },
                Some(b) => Self {
                    min_lat: b.min_lat.min(c.lat),
                    min_lng: b.min_lng.min(c.lng),
                    max_lat: b.max_lat.max(c.lat),
                    max_lng: b.max_lng.max(c.lng),
                },
            })
        })
    }

    pub fn validate(&self) -> Result<()> {
        Coordinate::new(self.min_lat, self.min_lng)?;
        Coordinate::new(self.max_lat, self.max_lng)?;
        if self.min_lat > self.max_lat || self.min_lng > self.max_lng {
            return Err(CellwayError::invalid_input(
                "bounding box minimum exceeds maximum",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_lat: self.min_lat.min(other.min_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lat: self.max_lat.max(other.max_lat),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Grow the box to the next `decimals` grid line on every side
    #[must_use]
    pub fn rounded_outward(&self, decimals: u32) -> Self {
        let multiplier = 10_f64.powi(i32::try_from(decimals).unwrap_or(3));
        Self {
            min_lat: ((self.min_lat * multiplier).floor() / multiplier).max(-90.0),
            min_lng: ((self.min_lng * multiplier).floor() / multiplier).max(-180.0),
            max_lat: ((self.max_lat * multiplier).ceil() / multiplier).min(90.0),
            max_lng: ((self.max_lng * multiplier).ceil() / multiplier).min(180.0),
        }
    }

    /// Cache key for tower-only requests
    #[must_use]
    pub fn cache_key(&self, decimals: u32) -> String {
        let width = decimals as usize;
        let b = self.rounded_outward(decimals);
        format!(
            "towers:{:.width$},{:.width$}:{:.width$},{:.width$}",
            b.min_lat, b.min_lng, b.max_lat, b.max_lng
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(91.0, 0.0)]
    #[case(-90.5, 10.0)]
    #[case(10.0, 180.1)]
    #[case(f64::NAN, 0.0)]
    #[case(0.0, f64::INFINITY)]
    fn test_invalid_coordinates_rejected(#[case] lat: f64, #[case] lng: f64) {
        let err = Coordinate::new(lat, lng).unwrap_err();
        assert!(matches!(err, CellwayError::InvalidInput { .. }));
    }

    #[test]
    fn test_boundary_coordinates_accepted() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_parse_coordinate() {
        let c = Coordinate::parse("33.6846, -117.8265").unwrap();
        assert_eq!(c.lat, 33.6846);
        assert_eq!(c.lng, -117.8265);
        assert!(Coordinate::parse("33.6846").is_err());
        assert!(Coordinate::parse("north,east").is_err());
    }

    #[test]
    fn test_endpoint_cache_key_collapses_near_duplicates() {
        let a = RouteEndpoints::new(
            Coordinate::new(40.712_800_01, -74.006_000_02).unwrap(),
            Coordinate::new(40.730_6, -73.935_2).unwrap(),
        );
        let b = RouteEndpoints::new(
            Coordinate::new(40.712_799_99, -74.005_999_98).unwrap(),
            Coordinate::new(40.730_6, -73.935_2).unwrap(),
        );
        assert_eq!(a.cache_key(6), b.cache_key(6));
        assert_eq!(a.cache_key(6), "route:40.712800,-74.006000:40.730600,-73.935200");
    }

    #[test]
    fn test_bounding_box_around() {
        let points = [
            Coordinate { lat: 1.0, lng: 5.0 },
            Coordinate { lat: -2.0, lng: 7.0 },
            Coordinate { lat: 0.5, lng: 4.0 },
        ];
        let b = BoundingBox::around(&points).unwrap();
        assert_eq!((b.min_lat, b.min_lng, b.max_lat, b.max_lng), (-2.0, 4.0, 1.0, 7.0));
        assert!(BoundingBox::around(std::iter::empty::<&Coordinate>()).is_none());
    }

    #[test]
    fn test_rounded_outward_contains_original() {
        let b = BoundingBox {
            min_lat: 40.12345,
            min_lng: -74.98765,
            max_lat: 40.54321,
            max_lng: -74.11111,
        };
        let r = b.rounded_outward(3);
        assert!(r.min_lat <= b.min_lat && r.max_lat >= b.max_lat);
        assert!(r.min_lng <= b.min_lng && r.max_lng >= b.max_lng);
        assert_eq!(b.cache_key(3), "towers:40.123,-74.988:40.544,-74.111");
    }

    #[test]
    fn test_inverted_bounding_box_invalid() {
        let b = BoundingBox {
            min_lat: 2.0,
            min_lng: 0.0,
            max_lat: 1.0,
            max_lng: 1.0,
        };
        assert!(b.validate().is_err());
    }
}
