//! Route variant selection
//!
//! Computes the three named variants for an endpoint pair. The `fastest`
//! request doubles as the capability probe: when the backend answers with a
//! weighted-routing marker, each variant comes from its own request and is
//! published as soon as it is scored. Otherwise the variants are picked from
//! the ranked alternatives of that one response.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResultCache;
use crate::calculation::CalculationTicket;
use crate::config::{CellwayConfig, TowerSource};
use crate::geometry::expand_bounding_box;
use crate::models::{
    BackendMode, BoundingBox, RouteCandidate, RouteEndpoints, RouteResult, RouteType,
    RouteVariants, TowerRecord,
};
use crate::providers::{
    CsvTowerProvider, HttpRouteProvider, HttpTowerProvider, RouteProvider, RouteRequest,
    RouteResponse, TowerProvider,
};
use crate::proximity::ProximityFilter;
use crate::scoring::SignalScorer;
use crate::{CellwayError, Result};

/// Weights steering the specialized variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionWeights {
    /// Coverage weight sent with the `cell_coverage` request
    #[serde(default = "default_cell_coverage_weight")]
    pub cell_coverage_weight: f64,
    /// Coverage weight sent with the `balanced` request
    #[serde(default = "default_balanced_weight")]
    pub balanced_weight: f64,
    /// Share of the signal score in the local balanced score, the rest is time
    #[serde(default = "default_balanced_signal_share")]
    pub balanced_signal_share: f64,
    /// Durations beyond `fastest * duration_slack` earn no time credit
    #[serde(default = "default_duration_slack")]
    pub duration_slack: f64,
}

fn default_cell_coverage_weight() -> f64 {
    0.8
}

fn default_balanced_weight() -> f64 {
    0.5
}

fn default_balanced_signal_share() -> f64 {
    0.5
}

fn default_duration_slack() -> f64 {
    1.5
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            cell_coverage_weight: default_cell_coverage_weight(),
            balanced_weight: default_balanced_weight(),
            balanced_signal_share: default_balanced_signal_share(),
            duration_slack: default_duration_slack(),
        }
    }
}

/// One variant resolved, successfully or not
#[derive(Debug, Clone, PartialEq)]
pub struct VariantUpdate {
    /// Ticket id of the calculation this belongs to
    pub calculation: u64,
    pub route_type: RouteType,
    pub outcome: std::result::Result<RouteResult, String>,
}

/// Final state of one calculation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantOutcome {
    pub variants: RouteVariants,
    /// Variants that could not be computed, with the reason
    pub failures: BTreeMap<RouteType, String>,
    /// `None` when served from cache
    pub mode: Option<BackendMode>,
    pub from_cache: bool,
}

impl VariantOutcome {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.variants.is_complete() && self.failures.is_empty()
    }
}

/// Indices picked from a list of ranked alternatives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlternativeChoice {
    pub fastest: usize,
    pub cell_coverage: usize,
    pub balanced: usize,
}

/// Pick the three variants from ranked alternatives. Index 0 is the
/// provider's fastest route. Ties go to the earlier alternative.
#[must_use]
pub fn select_from_alternatives(
    durations: &[f64],
    signal_scores: &[f64],
    weights: &SelectionWeights,
) -> Option<AlternativeChoice> {
    let count = durations.len().min(signal_scores.len());
    if count == 0 {
        return None;
    }

    let reference = durations[0] * weights.duration_slack;
    let share = weights.balanced_signal_share;
    let balanced: Vec<f64> = (0..count)
        .map(|i| {
            let signal_part = signal_scores[i] * share;
            if reference > 0.0 {
                signal_part + (1.0 - durations[i] / reference) * (1.0 - share)
            } else {
                signal_part
            }
        })
        .collect();

    Some(AlternativeChoice {
        fastest: 0,
        cell_coverage: first_max(&signal_scores[..count]),
        balanced: first_max(&balanced),
    })
}

fn first_max(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = i;
        }
    }
    best
}

enum Step {
    Routed(RouteType, Result<RouteResponse>),
    Evaluated(RouteResult),
}

/// Orchestrates route requests, tower lookups, filtering and scoring
pub struct RouteSelector {
    routes: Arc<dyn RouteProvider>,
    towers: Arc<dyn TowerProvider>,
    cache: Arc<ResultCache>,
    filter: ProximityFilter,
    scorer: SignalScorer,
    weights: SelectionWeights,
    max_alternatives: usize,
    key_precision: u32,
    tower_box_precision: u32,
}

impl RouteSelector {
    /// Selector with default thresholds and weights
    pub fn new(
        routes: Arc<dyn RouteProvider>,
        towers: Arc<dyn TowerProvider>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self::with_config(routes, towers, cache, &CellwayConfig::default())
    }

    pub fn with_config(
        routes: Arc<dyn RouteProvider>,
        towers: Arc<dyn TowerProvider>,
        cache: Arc<ResultCache>,
        config: &CellwayConfig,
    ) -> Self {
        Self {
            routes,
            towers,
            cache,
            filter: ProximityFilter::new(config.proximity.clone()),
            scorer: SignalScorer::new(config.scoring.clone()),
            weights: config.selection.clone(),
            max_alternatives: usize::try_from(config.routing.alternatives)
                .unwrap_or(usize::MAX)
                .max(1),
            key_precision: config.cache.key_precision,
            tower_box_precision: config.cache.tower_box_precision,
        }
    }

    /// Wire up the HTTP or CSV providers and the cache described by `config`
    pub fn from_config(config: &CellwayConfig) -> anyhow::Result<Self> {
        let routes: Arc<dyn RouteProvider> = Arc::new(HttpRouteProvider::new(&config.routing)?);
        let towers: Arc<dyn TowerProvider> = match config.towers.source {
            TowerSource::Http => Arc::new(HttpTowerProvider::new(
                &config.towers,
                config.routing.max_retries,
            )?),
            TowerSource::Csv => Arc::new(CsvTowerProvider::new(&config.towers)),
        };

        let ttl = Duration::from_secs(u64::from(config.cache.ttl_minutes) * 60);
        let cache = match &config.cache.location {
            Some(location) => ResultCache::with_persistence(location, ttl)?,
            None => ResultCache::in_memory(ttl),
        };

        Ok(Self::with_config(routes, towers, Arc::new(cache), config))
    }

    #[must_use]
    pub fn weights(&self) -> &SelectionWeights {
        &self.weights
    }

    /// Compute all three variants for `endpoints`.
    ///
    /// `on_update` sees each variant as it resolves. Nothing is published once
    /// `ticket` has been superseded; the call then ends with `Cancelled`.
    /// Only a failure of the primary `fastest` request fails the whole call.
    #[instrument(skip(self, ticket, on_update), fields(calculation = ticket.id()))]
    pub async fn compute_all_variants<F>(
        &self,
        endpoints: RouteEndpoints,
        ticket: &CalculationTicket,
        mut on_update: F,
    ) -> Result<VariantOutcome>
    where
        F: FnMut(VariantUpdate) + Send,
    {
        endpoints.validate()?;

        let key = endpoints.cache_key(self.key_precision);
        if let Some(entry) = self.cache.get(&key).await {
            info!("Serving variants for {} from cache", key);
            for route_type in RouteType::ALL {
                if let Some(result) = entry.value.get(route_type) {
                    publish(ticket, &mut on_update, route_type, Ok(result.clone()))?;
                }
            }
            return Ok(VariantOutcome {
                variants: entry.value,
                from_cache: true,
                ..VariantOutcome::default()
            });
        }

        // The probe goes out alone; weighted requests follow only when the
        // backend turns out to support them.
        let mut pending: FuturesUnordered<BoxFuture<'_, Step>> = FuturesUnordered::new();
        pending.push(self.request_step(endpoints, RouteType::Fastest, None, true));

        let mut outcome = VariantOutcome::default();

        loop {
            let step = tokio::select! {
                biased;
                () = ticket.superseded() => {
                    debug!("Calculation superseded, dropping in-flight requests");
                    return Err(CellwayError::Cancelled);
                }
                step = pending.next() => step,
            };
            let Some(step) = step else { break };

            match step {
                Step::Routed(RouteType::Fastest, response) => {
                    let response = response?;
                    if !response.weighted_routing {
                        info!(
                            "Backend returned {} ranked alternatives, selecting locally",
                            response.candidates.len()
                        );
                        return self
                            .select_alternatives(&key, response, ticket, &mut on_update)
                            .await;
                    }

                    info!("Backend supports weighted routing");
                    outcome.mode = Some(BackendMode::WeightedRouting);
                    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
                        CellwayError::no_route("backend returned no fastest route")
                    })?;
                    pending.push(self.evaluate_step(RouteType::Fastest, candidate));
                    pending.push(self.request_step(
                        endpoints,
                        RouteType::CellCoverage,
                        Some(self.weights.cell_coverage_weight),
                        false,
                    ));
                    pending.push(self.request_step(
                        endpoints,
                        RouteType::Balanced,
                        Some(self.weights.balanced_weight),
                        false,
                    ));
                }
                Step::Routed(route_type, response) => {
                    match self.secondary_step(route_type, response) {
                        Ok(step) => pending.push(step),
                        Err(message) => {
                            fail_variant(&mut outcome, ticket, &mut on_update, route_type, message)?;
                        }
                    }
                }
                Step::Evaluated(result) => {
                    publish(ticket, &mut on_update, result.route_type, Ok(result.clone()))?;
                    outcome.variants.set(result);
                }
            }
        }

        if outcome.is_complete() {
            self.cache.put(&key, outcome.variants.clone()).await;
        } else {
            debug!("Not caching incomplete variants for {}", key);
        }
        Ok(outcome)
    }

    /// Towers inside `bounds`, cached by rounded box. Provider errors propagate.
    #[instrument(skip(self))]
    pub async fn towers_in(&self, bounds: &BoundingBox) -> Result<Vec<TowerRecord>> {
        bounds.validate()?;
        let rounded = bounds.rounded_outward(self.tower_box_precision);
        let key = rounded.cache_key(self.tower_box_precision);

        if let Some(towers) = self.cache.get_towers(&key).await {
            return Ok(towers);
        }
        let towers = self.towers.fetch_towers(&rounded).await?;
        self.cache.put_towers(&key, towers.clone()).await;
        Ok(towers)
    }

    fn request_step(
        &self,
        endpoints: RouteEndpoints,
        route_type: RouteType,
        weight: Option<f64>,
        alternatives: bool,
    ) -> BoxFuture<'_, Step> {
        let request = RouteRequest {
            endpoints,
            route_type,
            weight,
            alternatives,
        };
        async move {
            let response = self.routes.fetch_routes(&request).await;
            Step::Routed(route_type, response)
        }
        .boxed()
    }

    fn evaluate_step(&self, route_type: RouteType, candidate: RouteCandidate) -> BoxFuture<'_, Step> {
        async move { Step::Evaluated(self.evaluate(route_type, &candidate).await) }.boxed()
    }

    /// Turn a secondary response into an evaluation, or a failure message
    fn secondary_step(
        &self,
        route_type: RouteType,
        response: Result<RouteResponse>,
    ) -> std::result::Result<BoxFuture<'_, Step>, String> {
        match response {
            Ok(response) => match response.candidates.into_iter().next() {
                Some(candidate) => Ok(self.evaluate_step(route_type, candidate)),
                None => Err(format!("backend returned no {route_type} route")),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    async fn evaluate(&self, route_type: RouteType, candidate: &RouteCandidate) -> RouteResult {
        match &candidate.towers {
            Some(towers) => self.score_candidate(route_type, candidate, towers),
            None => {
                let corpus = match expand_bounding_box(
                    candidate.geometry.points(),
                    self.filter.settings().max_distance_meters,
                ) {
                    Some(bounds) => self.tower_corpus(&bounds).await,
                    None => Vec::new(),
                };
                self.score_candidate(route_type, candidate, &corpus)
            }
        }
    }

    fn score_candidate(
        &self,
        route_type: RouteType,
        candidate: &RouteCandidate,
        corpus: &[TowerRecord],
    ) -> RouteResult {
        let towers = self.filter.filter(corpus, &candidate.geometry);
        let signal_score = self.scorer.score(&towers);
        debug!(
            "{} candidate: {:.0} m, {:.0} s, {} towers, score {:.2}",
            route_type,
            candidate.distance_meters,
            candidate.duration_seconds,
            towers.len(),
            signal_score
        );
        RouteResult {
            route_type,
            distance_meters: candidate.distance_meters,
            duration_seconds: candidate.duration_seconds,
            signal_score,
            tower_count: towers.len(),
            towers,
            geometry: candidate.geometry.clone(),
        }
    }

    /// Tower corpus for scoring. Failures degrade to an empty corpus, which is
    /// not cached.
    async fn tower_corpus(&self, bounds: &BoundingBox) -> Vec<TowerRecord> {
        match self.towers_in(bounds).await {
            Ok(towers) => towers,
            Err(e) => {
                warn!("Tower data unavailable, scoring without towers: {}", e);
                Vec::new()
            }
        }
    }

    async fn select_alternatives<F>(
        &self,
        key: &str,
        response: RouteResponse,
        ticket: &CalculationTicket,
        on_update: &mut F,
    ) -> Result<VariantOutcome>
    where
        F: FnMut(VariantUpdate) + Send,
    {
        let mut candidates = response.candidates;
        candidates.truncate(self.max_alternatives);
        if candidates.is_empty() {
            return Err(CellwayError::no_route("backend returned no alternatives"));
        }

        let union = candidates
            .iter()
            .filter(|c| c.towers.is_none())
            .filter_map(|c| {
                expand_bounding_box(c.geometry.points(), self.filter.settings().max_distance_meters)
            })
            .reduce(|a, b| a.union(&b));
        let corpus = match union {
            Some(bounds) => {
                tokio::select! {
                    biased;
                    () = ticket.superseded() => return Err(CellwayError::Cancelled),
                    corpus = self.tower_corpus(&bounds) => corpus,
                }
            }
            None => Vec::new(),
        };

        let scored: Vec<RouteResult> = candidates
            .iter()
            .map(|c| {
                let towers = c.towers.as_deref().unwrap_or(&corpus);
                self.score_candidate(RouteType::Fastest, c, towers)
            })
            .collect();

        let durations: Vec<f64> = scored.iter().map(|r| r.duration_seconds).collect();
        let signal_scores: Vec<f64> = scored.iter().map(|r| r.signal_score).collect();
        let choice = select_from_alternatives(&durations, &signal_scores, &self.weights)
            .ok_or_else(|| CellwayError::no_route("backend returned no alternatives"))?;
        debug!("Selected alternatives {:?}", choice);

        let mut outcome = VariantOutcome {
            mode: Some(BackendMode::RankedAlternatives),
            ..VariantOutcome::default()
        };
        for (route_type, index) in [
            (RouteType::Fastest, choice.fastest),
            (RouteType::CellCoverage, choice.cell_coverage),
            (RouteType::Balanced, choice.balanced),
        ] {
            let result = RouteResult {
                route_type,
                ..scored[index].clone()
            };
            publish(ticket, on_update, route_type, Ok(result.clone()))?;
            outcome.variants.set(result);
        }

        self.cache.put(key, outcome.variants.clone()).await;
        Ok(outcome)
    }
}

fn publish<F: FnMut(VariantUpdate)>(
    ticket: &CalculationTicket,
    on_update: &mut F,
    route_type: RouteType,
    outcome: std::result::Result<RouteResult, String>,
) -> Result<()> {
    if !ticket.is_current() {
        return Err(CellwayError::Cancelled);
    }
    on_update(VariantUpdate {
        calculation: ticket.id(),
        route_type,
        outcome,
    });
    Ok(())
}

fn fail_variant<F: FnMut(VariantUpdate)>(
    outcome: &mut VariantOutcome,
    ticket: &CalculationTicket,
    on_update: &mut F,
    route_type: RouteType,
    message: String,
) -> Result<()> {
    warn!("{}", CellwayError::partial(route_type, message.clone()));
    publish(ticket, on_update, route_type, Err(message.clone()))?;
    outcome.failures.insert(route_type, message);
    Ok(())
}
