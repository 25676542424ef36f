//! Calculation identities
//!
//! Every user-initiated calculation gets a ticket. Starting a new one
//! supersedes all earlier tickets: their results must not be published and
//! their in-flight requests may be abandoned.

use tokio::sync::watch;

/// Hands out tickets and remembers the latest one
#[derive(Debug)]
pub struct CalculationTracker {
    latest: watch::Sender<u64>,
}

impl Default for CalculationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculationTracker {
    #[must_use]
    pub fn new() -> Self {
        let (latest, _) = watch::channel(0);
        Self { latest }
    }

    /// Start a new calculation, superseding every earlier ticket
    pub fn begin(&self) -> CalculationTicket {
        let mut id = 0;
        self.latest.send_modify(|latest| {
            *latest += 1;
            id = *latest;
        });
        CalculationTicket {
            id,
            latest: Some(self.latest.subscribe()),
        }
    }

    /// Identifier of the most recent calculation, 0 before the first one
    #[must_use]
    pub fn latest(&self) -> u64 {
        *self.latest.borrow()
    }
}

/// Token carried by one calculation
#[derive(Debug, Clone)]
pub struct CalculationTicket {
    id: u64,
    latest: Option<watch::Receiver<u64>>,
}

impl CalculationTicket {
    /// A ticket nothing can supersede, for one-shot callers
    #[must_use]
    pub fn detached() -> Self {
        Self { id: 0, latest: None }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this is still the newest calculation
    #[must_use]
    pub fn is_current(&self) -> bool {
        match &self.latest {
            Some(latest) => *latest.borrow() == self.id,
            None => true,
        }
    }

    /// Resolves once a newer calculation has started. Never resolves for
    /// detached tickets or after the tracker is gone.
    pub async fn superseded(&self) {
        if let Some(latest) = &self.latest {
            let mut latest = latest.clone();
            let id = self.id;
            if latest.wait_for(|current| *current != id).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
