//! Geodesic helpers used by the proximity filter
//!
//! Authoritative distances are great-circle (haversine). The planar
//! approximations here are only used to locate the closest point on a short
//! segment and to size the coarse bounding-box prefilter.

use haversine::{Location as HaversineLocation, Units, distance};

use crate::models::{BoundingBox, Coordinate};

/// Rough length of one degree of latitude, used for prefilter padding only.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Extra padding applied on top of the converted distance so the prefilter
/// never rejects a tower the exact check would accept.
const PREFILTER_SLACK: f64 = 1.1;

/// Great-circle distance between two coordinates in meters
#[must_use]
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let from = HaversineLocation {
        latitude: a.lat,
        longitude: a.lng,
    };
    let to = HaversineLocation {
        latitude: b.lat,
        longitude: b.lng,
    };
    distance(from, to, Units::Kilometers) * 1000.0
}

/// Longitude difference folded into [-180, 180)
fn wrap_longitude(delta: f64) -> f64 {
    (delta + 180.0).rem_euclid(360.0) - 180.0
}

/// Distance from `point` to the closest point of the segment `start`..`end`.
///
/// The projection parameter is computed in a local equirectangular frame
/// centred on `point` and clamped to the segment; the final measurement from
/// `point` to the projected position is haversine. Longitude differences take
/// the short way round, so segments crossing the antimeridian work.
#[must_use]
pub fn point_to_segment_distance(point: &Coordinate, start: &Coordinate, end: &Coordinate) -> f64 {
    if start == end {
        return distance_meters(point, start);
    }

    let cos_lat = point.lat.to_radians().cos();
    let span_lng = wrap_longitude(end.lng - start.lng);
    let dx = span_lng * cos_lat;
    let dy = end.lat - start.lat;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return distance_meters(point, start);
    }

    let px = wrap_longitude(point.lng - start.lng) * cos_lat;
    let py = point.lat - start.lat;
    let t = ((px * dx + py * dy) / length_sq).clamp(0.0, 1.0);

    let projection = Coordinate {
        lat: start.lat + t * (end.lat - start.lat),
        lng: wrap_longitude(start.lng + t * span_lng),
    };
    distance_meters(point, &projection)
}

/// Bounding box of `points` grown by `padding_meters` on every side.
///
/// Longitude padding is widened by the cosine of the most poleward latitude in
/// the grown box so the box stays over-inclusive away from the equator.
/// Returns `None` for an empty input.
#[must_use]
pub fn expand_bounding_box(points: &[Coordinate], padding_meters: f64) -> Option<BoundingBox> {
    let bounds = BoundingBox::around(points)?;
    let lat_pad = padding_meters.max(0.0) * PREFILTER_SLACK / METERS_PER_DEGREE;

    let min_lat = (bounds.min_lat - lat_pad).max(-90.0);
    let max_lat = (bounds.max_lat + lat_pad).min(90.0);
    let poleward = min_lat.abs().max(max_lat.abs());
    let cos_lat = poleward.to_radians().cos();
    let lng_pad = if cos_lat > 1e-6 {
        (lat_pad / cos_lat).min(360.0)
    } else {
        360.0
    };

    Some(BoundingBox {
        min_lat,
        min_lng: (bounds.min_lng - lng_pad).max(-180.0),
        max_lat,
        max_lng: (bounds.max_lng + lng_pad).min(180.0),
    })
}
