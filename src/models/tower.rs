//! Cell tower records

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Radio technology of a cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioType {
    Gsm,
    Umts,
    Cdma,
    Lte,
    Nr,
    Other(String),
}

impl From<&str> for RadioType {
    fn from(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "GSM" => RadioType::Gsm,
            "UMTS" => RadioType::Umts,
            "CDMA" => RadioType::Cdma,
            "LTE" => RadioType::Lte,
            "NR" | "5G" => RadioType::Nr,
            other => RadioType::Other(other.to_string()),
        }
    }
}

/// One tower as delivered by the tower provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerRecord {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radio_type: RadioType,
    pub mcc: u32,
    pub net: u32,
    pub area: u32,
    pub cell: u64,
    /// Mean observed signal in dBm, typically -120..-50
    pub average_signal_dbm: Option<i32>,
    pub range_meters: Option<u32>,
    pub last_updated_epoch: Option<i64>,
}

impl TowerRecord {
    /// Position of the tower, `None` when either coordinate is missing or not finite
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some(Coordinate { lat, lng })
            }
            _ => None,
        }
    }
}

/// A tower annotated with its distance to a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTower {
    pub tower: TowerRecord,
    pub distance_to_route_meters: f64,
}

#[cfg(test)]
pub(crate) fn tower_at(lat: f64, lng: f64, signal: i32) -> TowerRecord {
    TowerRecord {
        lat: Some(lat),
        lon: Some(lng),
        radio_type: RadioType::Lte,
        mcc: 310,
        net: 410,
        area: 1000,
        cell: 10_000,
        average_signal_dbm: Some(signal),
        range_meters: Some(2000),
        last_updated_epoch: None,
    }
}
