mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cellway::{
    BackendMode, BoundingBox, CalculationTicket, CalculationTracker, CellwayConfig, CellwayError,
    Coordinate, ResultCache, RouteEndpoints, RouteResponse, RouteSelector, RouteType,
    VariantUpdate,
};
use common::{
    MockRoutes, MockTowers, Reply, candidate, endpoints, selector, towers_along_route, weighted,
};

fn weighted_backend() -> MockRoutes {
    MockRoutes::new()
        .reply(RouteType::Fastest, weighted(candidate(600.0, 0.0, true)))
        .reply(RouteType::CellCoverage, weighted(candidate(720.0, 0.01, true)))
        .reply(RouteType::Balanced, weighted(candidate(650.0, 0.005, true)))
}

#[tokio::test]
async fn test_weighted_backend_publishes_every_variant() {
    let routes = Arc::new(weighted_backend());
    let towers = Arc::new(MockTowers::with(towers_along_route(10, -75)));
    let selector = selector(routes.clone(), towers.clone());

    let updates: Mutex<Vec<VariantUpdate>> = Mutex::new(Vec::new());
    let outcome = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |update| {
            updates.lock().unwrap().push(update);
        })
        .await
        .unwrap();

    assert_eq!(outcome.mode, Some(BackendMode::WeightedRouting));
    assert!(outcome.is_complete());
    assert!(!outcome.from_cache);
    assert_eq!(routes.calls(), 3);

    let fastest = outcome.variants.fastest.as_ref().unwrap();
    assert_eq!(fastest.duration_seconds, 600.0);
    assert_eq!(fastest.tower_count, 10);
    assert!(fastest.signal_score > 0.0);
    assert_eq!(
        outcome.variants.cell_coverage.as_ref().unwrap().duration_seconds,
        720.0
    );

    let updates = updates.into_inner().unwrap();
    assert_eq!(updates.len(), 3);
    for route_type in RouteType::ALL {
        assert!(
            updates
                .iter()
                .any(|u| u.route_type == route_type && u.outcome.is_ok())
        );
    }

    // The fastest request asks for alternatives and carries no weight
    let requests = routes.requests();
    let primary = requests
        .iter()
        .find(|r| r.route_type == RouteType::Fastest)
        .unwrap();
    assert!(primary.alternatives);
    assert_eq!(primary.weight, None);
    let coverage = requests
        .iter()
        .find(|r| r.route_type == RouteType::CellCoverage)
        .unwrap();
    assert_eq!(coverage.weight, Some(0.8));
}

#[tokio::test]
async fn test_second_identical_request_is_served_from_cache() {
    let routes = Arc::new(weighted_backend());
    let towers = Arc::new(MockTowers::with(towers_along_route(10, -75)));
    let selector = selector(routes.clone(), towers.clone());
    let ticket = CalculationTicket::detached();

    let first = selector
        .compute_all_variants(endpoints(), &ticket, |_| {})
        .await
        .unwrap();
    let route_calls = routes.calls();
    let tower_calls = towers.calls();

    let mut published = 0;
    let second = selector
        .compute_all_variants(endpoints(), &ticket, |_| published += 1)
        .await
        .unwrap();

    assert_eq!(routes.calls(), route_calls);
    assert_eq!(towers.calls(), tower_calls);
    assert!(second.from_cache);
    assert_eq!(second.variants, first.variants);
    assert_eq!(published, 3);
}

#[tokio::test]
async fn test_near_duplicate_endpoints_share_cache_entry() {
    let routes = Arc::new(weighted_backend());
    let towers = Arc::new(MockTowers::with(vec![]));
    let selector = selector(routes.clone(), towers);
    let ticket = CalculationTicket::detached();

    selector
        .compute_all_variants(endpoints(), &ticket, |_| {})
        .await
        .unwrap();
    let nudged = RouteEndpoints::new(
        Coordinate::new(47.000_000_01, 8.0).unwrap(),
        Coordinate::new(47.0, 8.100_000_02).unwrap(),
    );
    let outcome = selector
        .compute_all_variants(nudged, &ticket, |_| {})
        .await
        .unwrap();
    assert!(outcome.from_cache);
    assert_eq!(routes.calls(), 3);
}

#[tokio::test]
async fn test_failed_variant_does_not_abort_siblings() {
    let routes = Arc::new(
        MockRoutes::new()
            .reply(RouteType::Fastest, weighted(candidate(600.0, 0.0, true)))
            .reply(RouteType::CellCoverage, weighted(candidate(720.0, 0.01, true)))
            .reply(RouteType::Balanced, Reply::Unavailable),
    );
    let towers = Arc::new(MockTowers::with(towers_along_route(5, -80)));
    let selector = selector(routes.clone(), towers);
    let ticket = CalculationTicket::detached();

    let updates: Mutex<Vec<VariantUpdate>> = Mutex::new(Vec::new());
    let outcome = selector
        .compute_all_variants(endpoints(), &ticket, |u| updates.lock().unwrap().push(u))
        .await
        .unwrap();

    assert!(outcome.variants.fastest.is_some());
    assert!(outcome.variants.cell_coverage.is_some());
    assert!(outcome.variants.balanced.is_none());
    assert!(outcome.failures.contains_key(&RouteType::Balanced));
    assert!(!outcome.is_complete());

    let balanced_update = updates
        .into_inner()
        .unwrap()
        .into_iter()
        .find(|u| u.route_type == RouteType::Balanced)
        .unwrap();
    assert!(balanced_update.outcome.is_err());

    // Incomplete results are not cached
    selector
        .compute_all_variants(endpoints(), &ticket, |_| {})
        .await
        .unwrap();
    assert_eq!(routes.calls(), 6);
}

#[tokio::test]
async fn test_weighted_requests_follow_the_fastest_answer() {
    let routes = Arc::new(
        MockRoutes::new()
            .reply_after(
                RouteType::Fastest,
                weighted(candidate(600.0, 0.0, true)),
                Duration::from_millis(50),
            )
            .reply(RouteType::CellCoverage, weighted(candidate(720.0, 0.01, true)))
            .reply(RouteType::Balanced, weighted(candidate(650.0, 0.005, true))),
    );
    let towers = Arc::new(MockTowers::with(towers_along_route(5, -80)));
    let selector = selector(routes.clone(), towers);

    let outcome = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |_| {})
        .await
        .unwrap();
    assert!(outcome.is_complete());

    let requests = routes.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].route_type, RouteType::Fastest);
}

#[tokio::test]
async fn test_primary_failure_aborts_calculation() {
    let routes = Arc::new(
        MockRoutes::new()
            .reply(RouteType::Fastest, Reply::Unavailable)
            .reply(RouteType::CellCoverage, weighted(candidate(720.0, 0.01, true)))
            .reply(RouteType::Balanced, weighted(candidate(650.0, 0.005, true))),
    );
    let selector = selector(routes.clone(), Arc::new(MockTowers::with(vec![])));
    let err = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CellwayError::ProviderUnavailable { .. }));
    assert_eq!(routes.calls(), 1);

    let routes = Arc::new(MockRoutes::new().reply(RouteType::Fastest, Reply::NoRoute));
    let selector = common::selector(routes, Arc::new(MockTowers::with(vec![])));
    let err = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CellwayError::NoRouteFound { .. }));
}

#[tokio::test]
async fn test_ranked_alternatives_are_selected_locally() {
    let mut alt0 = candidate(600.0, 0.0, false);
    alt0.towers = Some(vec![]);
    let mut alt1 = candidate(650.0, 0.0, false);
    alt1.towers = Some(towers_along_route(2, -110));
    let mut alt2 = candidate(900.0, 0.0, false);
    alt2.towers = Some(towers_along_route(20, -60));

    let routes = Arc::new(
        MockRoutes::new()
            .reply(
                RouteType::Fastest,
                Reply::Routes(RouteResponse {
                    candidates: vec![alt0, alt1, alt2],
                    weighted_routing: false,
                }),
            )
            .reply(RouteType::CellCoverage, weighted(candidate(720.0, 0.01, true)))
            .reply(RouteType::Balanced, weighted(candidate(650.0, 0.005, true))),
    );
    let towers = Arc::new(MockTowers::with(vec![]));
    let selector = selector(routes.clone(), towers.clone());

    let outcome = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.mode, Some(BackendMode::RankedAlternatives));
    assert!(outcome.failures.is_empty());
    let variants = &outcome.variants;
    assert_eq!(variants.fastest.as_ref().unwrap().duration_seconds, 600.0);
    assert_eq!(variants.cell_coverage.as_ref().unwrap().duration_seconds, 900.0);
    assert_eq!(variants.balanced.as_ref().unwrap().duration_seconds, 900.0);
    assert_eq!(variants.balanced.as_ref().unwrap().route_type, RouteType::Balanced);
    // Precomputed tower lists need no tower lookup
    assert_eq!(towers.calls(), 0);
    // A ranked-alternatives backend is asked exactly once
    let requests = routes.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].route_type, RouteType::Fastest);
}

#[tokio::test]
async fn test_ranked_alternatives_share_one_tower_fetch() {
    let routes = Arc::new(MockRoutes::new().reply(
        RouteType::Fastest,
        Reply::Routes(RouteResponse {
            candidates: vec![
                candidate(600.0, 0.0, false),
                candidate(650.0, 0.01, false),
            ],
            weighted_routing: false,
        }),
    ));
    let towers = Arc::new(MockTowers::with(towers_along_route(8, -85)));
    let selector = selector(routes.clone(), towers.clone());

    let outcome = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |_| {})
        .await
        .unwrap();
    assert!(outcome.variants.is_complete());
    assert_eq!(towers.calls(), 1);
    assert_eq!(routes.calls(), 1);
}

#[tokio::test]
async fn test_tower_boxes_use_configured_precision() {
    let mut config = CellwayConfig::default();
    config.cache.tower_box_precision = 2;
    let towers = Arc::new(MockTowers::with(vec![]));
    let selector = RouteSelector::with_config(
        Arc::new(MockRoutes::new()),
        towers.clone(),
        Arc::new(ResultCache::in_memory(Duration::from_secs(60))),
        &config,
    );

    let bounds = BoundingBox {
        min_lat: 47.0012,
        min_lng: 8.0012,
        max_lat: 47.0987,
        max_lng: 8.1987,
    };
    selector.towers_in(&bounds).await.unwrap();
    assert_eq!(
        towers.requested_bounds(),
        vec![BoundingBox {
            min_lat: 47.0,
            min_lng: 8.0,
            max_lat: 47.1,
            max_lng: 8.2,
        }]
    );

    // Anything inside the same rounded box is a cache hit
    let nudged = BoundingBox {
        min_lat: 47.003,
        ..bounds
    };
    selector.towers_in(&nudged).await.unwrap();
    assert_eq!(towers.calls(), 1);
}

#[tokio::test]
async fn test_tower_failure_scores_zero() {
    let routes = Arc::new(weighted_backend());
    let towers = Arc::new(MockTowers::failing());
    let selector = selector(routes, towers);

    let outcome = selector
        .compute_all_variants(endpoints(), &CalculationTicket::detached(), |_| {})
        .await
        .unwrap();

    assert!(outcome.variants.is_complete());
    for route_type in RouteType::ALL {
        let result = outcome.variants.get(route_type).unwrap();
        assert_eq!(result.signal_score, 0.0);
        assert_eq!(result.tower_count, 0);
        assert!(result.distance_meters > 0.0);
    }
}

#[tokio::test]
async fn test_invalid_input_fails_before_network() {
    let routes = Arc::new(weighted_backend());
    let towers = Arc::new(MockTowers::with(vec![]));
    let selector = selector(routes.clone(), towers.clone());

    let endpoints = RouteEndpoints::new(
        Coordinate {
            lat: 91.0,
            lng: 8.0,
        },
        Coordinate {
            lat: 47.0,
            lng: f64::NAN,
        },
    );
    let err = selector
        .compute_all_variants(endpoints, &CalculationTicket::detached(), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, CellwayError::InvalidInput { .. }));
    assert_eq!(routes.calls(), 0);
    assert_eq!(towers.calls(), 0);
}

#[tokio::test]
async fn test_superseded_calculation_is_discarded() {
    let routes = Arc::new(
        MockRoutes::new()
            .reply_after(
                RouteType::Fastest,
                weighted(candidate(600.0, 0.0, true)),
                Duration::from_millis(300),
            )
            .reply(RouteType::CellCoverage, weighted(candidate(720.0, 0.01, true)))
            .reply(RouteType::Balanced, weighted(candidate(650.0, 0.005, true))),
    );
    let selector = selector(routes, Arc::new(MockTowers::with(vec![])));
    let tracker = CalculationTracker::new();
    let ticket = tracker.begin();

    let mut published = 0;
    let (result, _) = tokio::join!(
        selector.compute_all_variants(endpoints(), &ticket, |_| published += 1),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tracker.begin()
        }
    );

    assert!(matches!(result, Err(CellwayError::Cancelled)));
    assert_eq!(published, 0);
}
