use std::sync::Arc;

use crate::{Criteria, DedupLedger, ReleaseEvent};

/// Result of pushing one event through the decision path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No freeleech marker; dropped before the filter.
    NotFreeleech,
    /// Failed the category or size criteria; the ledger never saw it.
    Filtered,
    /// Already admitted earlier in this process, from either source.
    Duplicate,
    /// First admission: hand the event to the pipeline.
    Admitted,
}

/// The serialized decision path: freeleech check, filter, then ledger.
#[derive(Debug, Clone)]
pub struct Gate {
    criteria: Criteria,
    ledger: Arc<DedupLedger>,
}

impl Gate {
    pub fn new(criteria: Criteria, ledger: Arc<DedupLedger>) -> Self {
        Self { criteria, ledger }
    }

    pub fn evaluate(&self, event: &ReleaseEvent) -> Decision {
        if !event.freeleech {
            return Decision::NotFreeleech;
        }
        if !self.criteria.matches(event) {
            return Decision::Filtered;
        }
        if !self.ledger.admit(&event.id) {
            return Decision::Duplicate;
        }
        Decision::Admitted
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }
}
