use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ReleaseId;

/// Process-lifetime record of admitted releases, shared by both producers.
///
/// Grows monotonically; nothing is ever evicted.
#[derive(Debug, Default)]
pub struct DedupLedger {
    admitted: Mutex<HashSet<ReleaseId>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert: `true` only for the first call with `id`.
    pub fn admit(&self, id: &ReleaseId) -> bool {
        self.lock().insert(id.clone())
    }

    pub fn contains(&self, id: &ReleaseId) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<ReleaseId>> {
        self.admitted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
