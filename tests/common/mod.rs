#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cellway::models::{RadioType, SourceAlgorithm};
use cellway::{
    BoundingBox, CellwayError, Coordinate, ResultCache, Result, RouteCandidate, RouteEndpoints,
    RouteGeometry, RouteProvider, RouteRequest, RouteResponse, RouteSelector, RouteType,
    TowerProvider, TowerRecord,
};

/// Scripted answer of the mock routing backend
#[derive(Debug, Clone)]
pub enum Reply {
    Routes(RouteResponse),
    Unavailable,
    NoRoute,
}

pub struct MockRoutes {
    calls: AtomicUsize,
    replies: HashMap<RouteType, (Reply, Duration)>,
    slow: Option<(RouteEndpoints, Duration)>,
    requests: Mutex<Vec<RouteRequest>>,
}

impl MockRoutes {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            replies: HashMap::new(),
            slow: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, route_type: RouteType, reply: Reply) -> Self {
        self.replies.insert(route_type, (reply, Duration::ZERO));
        self
    }

    pub fn reply_after(mut self, route_type: RouteType, reply: Reply, delay: Duration) -> Self {
        self.replies.insert(route_type, (reply, delay));
        self
    }

    /// Every request for `endpoints` takes an extra `delay`
    pub fn slow_for(mut self, endpoints: RouteEndpoints, delay: Duration) -> Self {
        self.slow = Some((endpoints, delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteProvider for MockRoutes {
    async fn fetch_routes(&self, request: &RouteRequest) -> Result<RouteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let (reply, delay) = self
            .replies
            .get(&request.route_type)
            .cloned()
            .unwrap_or((Reply::Unavailable, Duration::ZERO));
        let extra = match self.slow {
            Some((endpoints, extra)) if endpoints == request.endpoints => extra,
            _ => Duration::ZERO,
        };
        tokio::time::sleep(delay + extra).await;

        match reply {
            Reply::Routes(response) => Ok(response),
            Reply::Unavailable => Err(CellwayError::provider("connection refused")),
            Reply::NoRoute => Err(CellwayError::no_route("Impossible route")),
        }
    }
}

pub struct MockTowers {
    calls: AtomicUsize,
    towers: Vec<TowerRecord>,
    fail: bool,
    bounds: Mutex<Vec<BoundingBox>>,
}

impl MockTowers {
    pub fn with(towers: Vec<TowerRecord>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            towers,
            fail: false,
            bounds: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            towers: Vec::new(),
            fail: true,
            bounds: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_bounds(&self) -> Vec<BoundingBox> {
        self.bounds.lock().unwrap().clone()
    }
}

#[async_trait]
impl TowerProvider for MockTowers {
    async fn fetch_towers(&self, bounds: &BoundingBox) -> Result<Vec<TowerRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bounds.lock().unwrap().push(*bounds);
        if self.fail {
            return Err(CellwayError::provider("tower service down"));
        }
        Ok(self
            .towers
            .iter()
            .filter(|t| {
                t.coordinate()
                    .is_some_and(|c| bounds.contains(c.lat, c.lng))
            })
            .cloned()
            .collect())
    }
}

pub fn endpoints() -> RouteEndpoints {
    RouteEndpoints::new(
        Coordinate::new(47.0, 8.0).unwrap(),
        Coordinate::new(47.0, 8.1).unwrap(),
    )
}

pub fn other_endpoints() -> RouteEndpoints {
    RouteEndpoints::new(
        Coordinate::new(46.5, 7.0).unwrap(),
        Coordinate::new(46.5, 7.1).unwrap(),
    )
}

/// Route from (47.0, 8.0) to (47.0, 8.1) bulging north by `detour` degrees
pub fn candidate(duration_seconds: f64, detour: f64, weighted: bool) -> RouteCandidate {
    RouteCandidate {
        geometry: RouteGeometry::from_lng_lat(&[[8.0, 47.0], [8.05, 47.0 + detour], [8.1, 47.0]])
            .unwrap(),
        distance_meters: 7600.0 + detour * 111_000.0,
        duration_seconds,
        source_algorithm: if weighted {
            SourceAlgorithm::Weighted
        } else {
            SourceAlgorithm::Base
        },
        weight: 0.0,
        towers: None,
    }
}

pub fn weighted(candidate: RouteCandidate) -> Reply {
    Reply::Routes(RouteResponse {
        candidates: vec![candidate],
        weighted_routing: true,
    })
}

pub fn tower(lat: f64, lng: f64, signal: Option<i32>) -> TowerRecord {
    TowerRecord {
        lat: Some(lat),
        lon: Some(lng),
        radio_type: RadioType::Lte,
        mcc: 228,
        net: 1,
        area: 100,
        cell: 1,
        average_signal_dbm: signal,
        range_meters: Some(1500),
        last_updated_epoch: None,
    }
}

/// `count` towers about 55 m north of the straight route
pub fn towers_along_route(count: usize, signal: i32) -> Vec<TowerRecord> {
    (0..count)
        .map(|i| tower(47.0005, 8.005 + 0.09 * i as f64 / count as f64, Some(signal)))
        .collect()
}

pub fn selector(routes: Arc<MockRoutes>, towers: Arc<MockTowers>) -> RouteSelector {
    RouteSelector::new(
        routes,
        towers,
        Arc::new(ResultCache::in_memory(Duration::from_secs(30 * 60))),
    )
}
