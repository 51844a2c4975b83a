//! The remote metadata provider interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudtrack_core::{MetadataQuery, Snapshot, TrackError};

/// Callback a provider invokes with the full matching snapshot, once for the
/// initial gather and again on every change.
pub type RefreshHandler = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Handle of a live provider subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Source of remote metadata and container resolution.
///
/// Implementations must not call a [`RefreshHandler`] after
/// [`MetadataProvider::unsubscribe`] returned for its subscription, and must
/// not call back into the provider from inside a handler.
pub trait MetadataProvider: Send + Sync {
    /// Resolve a container id to its root directory.
    fn container_root(&self, container_id: &str) -> Result<PathBuf, TrackError>;

    /// Ask the sync agent to begin materializing a remote item locally.
    fn start_downloading(&self, path: &Path) -> Result<(), TrackError>;

    /// Start observing records matching `query`.
    fn subscribe(
        &self,
        query: MetadataQuery,
        handler: RefreshHandler,
    ) -> Result<SubscriptionId, TrackError>;

    /// Stop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
