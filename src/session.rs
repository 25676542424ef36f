//! Presentation-facing state for interactive clients

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::calculation::CalculationTracker;
use crate::models::{BackendMode, RouteEndpoints, RouteResult, RouteType, RouteVariants};
use crate::selector::RouteSelector;
use crate::{CellwayError, Result};

/// What a renderer needs to draw the current calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Ticket id of the calculation shown, 0 before the first one
    pub calculation: u64,
    pub endpoints: Option<RouteEndpoints>,
    pub results: RouteVariants,
    pub loading: bool,
    /// Per-variant failure messages
    pub failures: BTreeMap<RouteType, String>,
    /// Set when the whole calculation failed
    pub error: Option<String>,
    pub selected: RouteType,
    pub mode: Option<BackendMode>,
    pub from_cache: bool,
}

impl SessionSnapshot {
    /// The selected variant, or `fastest` when it is unavailable
    #[must_use]
    pub fn active(&self) -> Option<&RouteResult> {
        self.results.get_or_fastest(self.selected)
    }
}

/// One user's route calculations. Starting a calculation supersedes the
/// previous one; its late results never reach the snapshot.
pub struct RouteSession {
    selector: Arc<RouteSelector>,
    tracker: CalculationTracker,
    state: Mutex<SessionSnapshot>,
}

impl RouteSession {
    #[must_use]
    pub fn new(selector: Arc<RouteSelector>) -> Self {
        Self {
            selector,
            tracker: CalculationTracker::new(),
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calculate variants for new endpoints. Returns `Cancelled` when a newer
    /// calculation started before this one finished.
    #[instrument(skip(self))]
    pub async fn calculate(&self, endpoints: RouteEndpoints) -> Result<SessionSnapshot> {
        endpoints.validate()?;

        let ticket = self.tracker.begin();
        let calculation = ticket.id();
        {
            let mut state = self.state();
            let selected = state.selected;
            *state = SessionSnapshot {
                calculation,
                endpoints: Some(endpoints),
                loading: true,
                selected,
                ..SessionSnapshot::default()
            };
        }

        let result = self
            .selector
            .compute_all_variants(endpoints, &ticket, |update| {
                let mut state = self.state();
                if state.calculation != update.calculation {
                    return;
                }
                match update.outcome {
                    Ok(result) => {
                        state.failures.remove(&update.route_type);
                        state.results.set(result);
                    }
                    Err(message) => {
                        state.failures.insert(update.route_type, message);
                    }
                }
            })
            .await;

        let mut state = self.state();
        if state.calculation != calculation {
            debug!("Discarding results of superseded calculation {}", calculation);
            return Err(CellwayError::Cancelled);
        }
        state.loading = false;

        match result {
            Ok(outcome) => {
                state.results = outcome.variants;
                state.failures = outcome.failures;
                state.mode = outcome.mode;
                state.from_cache = outcome.from_cache;
                Ok(state.clone())
            }
            Err(e) => {
                state.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state().clone()
    }

    /// Switch the displayed variant. No network calls. Returns what is now
    /// shown, `fastest` standing in for a missing specialized variant.
    pub fn select(&self, route_type: RouteType) -> Option<RouteResult> {
        let mut state = self.state();
        state.selected = route_type;
        state.active().cloned()
    }
}
