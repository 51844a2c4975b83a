//! In-process metadata provider driven by explicit publishes.
//!
//! Useful for embedding the engine behind a host that pushes metadata
//! itself, and for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use cloudtrack_core::{MetadataQuery, MetadataRecord, SearchScope, Snapshot, TrackError};

use crate::provider::{MetadataProvider, RefreshHandler, SubscriptionId};

#[derive(Default)]
struct MemoryState {
    index: HashMap<SearchScope, Vec<MetadataRecord>>,
    subscriptions: HashMap<SubscriptionId, (MetadataQuery, RefreshHandler)>,
}

impl MemoryState {
    fn snapshot_for(&self, query: &MetadataQuery) -> Snapshot {
        let records = query
            .scopes
            .iter()
            .filter_map(|scope| self.index.get(scope))
            .flatten()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        Snapshot::new(records)
    }
}

/// Provider whose index is replaced wholesale by [`MemoryProvider::publish`].
///
/// Every publish refreshes each subscription scoped to the published domain,
/// whether or not its matching records changed.
#[derive(Default)]
pub struct MemoryProvider {
    containers: DashMap<String, PathBuf>,
    failing_triggers: DashMap<PathBuf, String>,
    triggered: Mutex<Vec<PathBuf>>,
    state: Mutex<MemoryState>,
    next_id: AtomicU64,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container root.
    pub fn with_container(self, container_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.containers.insert(container_id.into(), root.into());
        self
    }

    /// Make [`MetadataProvider::start_downloading`] fail for `path`.
    pub fn fail_trigger(&self, path: impl Into<PathBuf>, message: impl Into<String>) {
        self.failing_triggers.insert(path.into(), message.into());
    }

    /// Paths for which a download was triggered, in call order.
    pub fn triggered(&self) -> Vec<PathBuf> {
        self.triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the records of the data scope and refresh subscribers.
    pub fn publish(&self, records: Vec<MetadataRecord>) {
        self.publish_in(SearchScope::Data, records);
    }

    /// Replace the records of `scope` and refresh its subscribers.
    pub fn publish_in(&self, scope: SearchScope, records: Vec<MetadataRecord>) {
        // Handlers run under the lock so that concurrent publishes reach every
        // subscriber in the same order.
        let mut state = self.lock();
        state.index.insert(scope, records);
        for (query, handler) in state.subscriptions.values() {
            if query.in_scope(scope) {
                handler(state.snapshot_for(query));
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }
}

impl MetadataProvider for MemoryProvider {
    fn container_root(&self, container_id: &str) -> Result<PathBuf, TrackError> {
        self.containers
            .get(container_id)
            .map(|root| root.value().clone())
            .ok_or_else(|| TrackError::container(container_id, "unknown container"))
    }

    fn start_downloading(&self, path: &Path) -> Result<(), TrackError> {
        if let Some(message) = self.failing_triggers.get(path) {
            return Err(TrackError::TriggerFailed {
                path: path.to_path_buf(),
                message: message.value().clone(),
            });
        }
        self.triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }

    fn subscribe(
        &self,
        query: MetadataQuery,
        handler: RefreshHandler,
    ) -> Result<SubscriptionId, TrackError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.lock();
        handler(state.snapshot_for(&query));
        state.subscriptions.insert(id, (query, handler));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscriptions.remove(&id);
    }
}
