//! Towers along a route
//!
//! Finds the towers within a maximum distance of a route polyline, annotates
//! them with that distance and bounds the result size with tiered sampling.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{expand_bounding_box, point_to_segment_distance};
use crate::models::{RouteGeometry, ScoredTower, TowerRecord};

/// Thresholds of the proximity filter and its down-sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximitySettings {
    /// Towers farther than this from every segment are dropped
    #[serde(default = "default_max_distance")]
    pub max_distance_meters: f64,
    /// Stop scanning segments once a tower is this close
    #[serde(default = "default_near_enough")]
    pub near_enough_meters: f64,
    /// Sampling kicks in above this many matches
    #[serde(default = "default_sampling_trigger")]
    pub sampling_trigger: usize,
    /// Towers up to this distance are always kept when sampling
    #[serde(default = "default_near_tier")]
    pub near_tier_meters: f64,
    /// Upper bound of the middle tier
    #[serde(default = "default_mid_tier")]
    pub mid_tier_meters: f64,
    #[serde(default = "default_mid_tier_samples")]
    pub mid_tier_samples: usize,
    #[serde(default = "default_far_tier_samples")]
    pub far_tier_samples: usize,
    /// A sample smaller than this is considered degenerate
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
    /// Size of the closest-first fallback used for degenerate samples
    #[serde(default = "default_fallback_size")]
    pub fallback_size: usize,
}

fn default_max_distance() -> f64 {
    2500.0
}

fn default_near_enough() -> f64 {
    100.0
}

fn default_sampling_trigger() -> usize {
    100
}

fn default_near_tier() -> f64 {
    200.0
}

fn default_mid_tier() -> f64 {
    600.0
}

fn default_mid_tier_samples() -> usize {
    40
}

fn default_far_tier_samples() -> usize {
    30
}

fn default_min_sample() -> usize {
    20
}

fn default_fallback_size() -> usize {
    100
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            max_distance_meters: default_max_distance(),
            near_enough_meters: default_near_enough(),
            sampling_trigger: default_sampling_trigger(),
            near_tier_meters: default_near_tier(),
            mid_tier_meters: default_mid_tier(),
            mid_tier_samples: default_mid_tier_samples(),
            far_tier_samples: default_far_tier_samples(),
            min_sample: default_min_sample(),
            fallback_size: default_fallback_size(),
        }
    }
}

/// Stateless tower-to-route filter
#[derive(Debug, Clone, Default)]
pub struct ProximityFilter {
    settings: ProximitySettings,
}

impl ProximityFilter {
    #[must_use]
    pub fn new(settings: ProximitySettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &ProximitySettings {
        &self.settings
    }

    /// Towers within the configured maximum distance, closest first
    #[must_use]
    pub fn filter(&self, towers: &[TowerRecord], geometry: &RouteGeometry) -> Vec<ScoredTower> {
        self.filter_along_route(towers, geometry, self.settings.max_distance_meters)
    }

    /// Towers within `max_distance_meters` of `geometry`, closest first and
    /// down-sampled once the match count passes the sampling trigger.
    #[must_use]
    pub fn filter_along_route(
        &self,
        towers: &[TowerRecord],
        geometry: &RouteGeometry,
        max_distance_meters: f64,
    ) -> Vec<ScoredTower> {
        let Some(prefilter) = expand_bounding_box(geometry.points(), max_distance_meters) else {
            return Vec::new();
        };

        let mut matches: Vec<ScoredTower> = towers
            .iter()
            .filter_map(|tower| {
                let position = tower.coordinate()?;
                if !prefilter.contains(position.lat, position.lng) {
                    return None;
                }

                let mut closest = f64::INFINITY;
                for (start, end) in geometry.segments() {
                    closest = closest.min(point_to_segment_distance(&position, start, end));
                    if closest <= self.settings.near_enough_meters {
                        break;
                    }
                }

                (closest <= max_distance_meters).then(|| ScoredTower {
                    tower: tower.clone(),
                    distance_to_route_meters: closest,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance_to_route_meters
                .partial_cmp(&b.distance_to_route_meters)
                .unwrap_or(Ordering::Equal)
        });

        debug!(
            "{} of {} towers within {}m of route",
            matches.len(),
            towers.len(),
            max_distance_meters
        );

        if matches.len() > self.settings.sampling_trigger {
            self.tiered_sample(matches)
        } else {
            matches
        }
    }

    /// Keep every near tower and an evenly spaced sample of the middle and far
    /// tiers. Falls back to the closest towers when the sample is degenerate.
    fn tiered_sample(&self, sorted: Vec<ScoredTower>) -> Vec<ScoredTower> {
        let s = &self.settings;
        let near_end = sorted.partition_point(|t| t.distance_to_route_meters <= s.near_tier_meters);
        let mid_end = sorted.partition_point(|t| t.distance_to_route_meters <= s.mid_tier_meters);

        let (near, rest) = sorted.split_at(near_end);
        let (mid, far) = rest.split_at(mid_end - near_end);

        let mut sample: Vec<ScoredTower> = near.to_vec();
        sample.extend(evenly_spaced(mid, s.mid_tier_samples));
        sample.extend(evenly_spaced(far, s.far_tier_samples));

        if sample.len() < s.min_sample && sorted.len() >= s.min_sample {
            debug!(
                "Sample of {} too small, keeping the {} closest towers instead",
                sample.len(),
                s.fallback_size
            );
            return sorted.into_iter().take(s.fallback_size).collect();
        }

        debug!("Sampled {} towers down to {}", sorted.len(), sample.len());
        sample
    }
}

/// Up to `count` items taken at even strides, order preserved
pub(crate) fn evenly_spaced<T: Clone>(items: &[T], count: usize) -> Vec<T> {
    if items.len() <= count {
        return items.to_vec();
    }
    (0..count)
        .map(|i| items[i * items.len() / count].clone())
        .collect()
}
