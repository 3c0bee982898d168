use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;

use crate::types::{ScanId, ScanStatus};

/// Concurrent `ScanId -> ScanStatus` table shared between the orchestrator
/// and its background scan tasks. Cloning shares the same table.
///
/// Entries live as long as the registry; nothing is evicted.
#[derive(Clone, Debug, Default)]
pub struct ScanRegistry {
    inner: Arc<DashMap<ScanId, ScanStatus>>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status` for `id`. Returns `false` if the write was refused:
    /// `Unknown` is never stored and a terminal status never goes back to `InProgress`.
    pub fn put(&self, id: ScanId, status: ScanStatus) -> bool {
        if status == ScanStatus::Unknown {
            warn!(%id, "refusing to store UNKNOWN status");
            return false;
        }
        match self.inner.entry(id) {
            Entry::Occupied(mut e) => {
                if e.get().is_terminal() && !status.is_terminal() {
                    warn!(%id, current = %e.get(), "refusing to move a finished scan back in progress");
                    return false;
                }
                e.insert(status);
            }
            Entry::Vacant(e) => {
                e.insert(status);
            }
        }
        true
    }

    /// Current status for `id`, or [`ScanStatus::Unknown`] if it was never registered.
    pub fn get(&self, id: &ScanId) -> ScanStatus {
        self.inner
            .get(id)
            .map(|s| s.value().clone())
            .unwrap_or(ScanStatus::Unknown)
    }

    pub fn contains(&self, id: &ScanId) -> bool {
        self.inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
