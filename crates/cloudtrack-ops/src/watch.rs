//! Metadata watch: one query against the provider with a serial delivery queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cloudtrack_core::{MetadataQuery, Snapshot, TrackError};

use crate::provider::{MetadataProvider, RefreshHandler, SubscriptionId};

/// Lifecycle phase of a [`MetadataWatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Created,
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum WatchState {
    Created,
    Started(SubscriptionId),
    Stopped,
}

/// Observes every record matching a query and calls back on the initial
/// gather and on each change.
///
/// Refreshes are delivered one at a time, in provider order, on a dedicated
/// task. [`MetadataWatch::stop`] may be called any number of times, from any
/// thread, including from inside the refresh callback; once it has been
/// called no further callback runs.
pub struct MetadataWatch {
    provider: Arc<dyn MetadataProvider>,
    query: MetadataQuery,
    state: Mutex<WatchState>,
    cancel: CancellationToken,
}

impl MetadataWatch {
    pub fn new(provider: Arc<dyn MetadataProvider>, query: MetadataQuery) -> Self {
        Self {
            provider,
            query,
            state: Mutex::new(WatchState::Created),
            cancel: CancellationToken::new(),
        }
    }

    pub fn query(&self) -> &MetadataQuery {
        &self.query
    }

    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> WatchPhase {
        match *self.lock() {
            WatchState::Created => WatchPhase::Created,
            WatchState::Started(_) => WatchPhase::Started,
            WatchState::Stopped => WatchPhase::Stopped,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == WatchPhase::Stopped
    }

    /// Subscribe to the provider and start delivering refreshes.
    ///
    /// Fails outside a tokio runtime. Starting an already started or stopped
    /// watch registers nothing.
    pub fn start<F>(&self, on_refresh: F) -> Result<(), TrackError>
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let mut state = self.lock();
        match *state {
            WatchState::Created => {}
            WatchState::Started(_) => {
                tracing::debug!(query = ?self.query.predicate, "watch already started");
                return Ok(());
            }
            WatchState::Stopped => return Ok(()),
        }

        let runtime = Handle::try_current()
            .map_err(|e| TrackError::provider(format!("watch needs a tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel::<Snapshot>();
        runtime.spawn(deliver(rx, self.cancel.clone(), on_refresh));

        let handler: RefreshHandler = Arc::new(move |snapshot| {
            // The delivery task is gone once the watch stopped.
            let _ = tx.send(snapshot);
        });

        match self.provider.subscribe(self.query.clone(), handler) {
            Ok(id) => {
                *state = WatchState::Started(id);
                tracing::debug!(query = ?self.query.predicate, subscription = id.0, "watch started");
                Ok(())
            }
            Err(e) => {
                *state = WatchState::Stopped;
                self.cancel.cancel();
                Err(e)
            }
        }
    }

    /// Stop delivering refreshes and release the provider subscription.
    pub fn stop(&self) {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut *state, WatchState::Stopped)
        };
        self.cancel.cancel();
        if let WatchState::Started(id) = previous {
            self.provider.unsubscribe(id);
            tracing::debug!(query = ?self.query.predicate, subscription = id.0, "watch stopped");
        }
    }
}

impl Drop for MetadataWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MetadataWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataWatch")
            .field("query", &self.query)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Serial delivery loop of one watch.
async fn deliver<F>(
    mut rx: mpsc::UnboundedReceiver<Snapshot>,
    cancel: CancellationToken,
    mut on_refresh: F,
) where
    F: FnMut(Snapshot) + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(snapshot) if !cancel.is_cancelled() => on_refresh(snapshot),
                _ => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cloudtrack_core::{MetadataRecord, PathPredicate, SearchScope};
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::memory::MemoryProvider;

    fn query() -> MetadataQuery {
        MetadataQuery::new(
            PathPredicate::exact(Path::new("/cloud/X/a.txt")),
            vec![SearchScope::Data],
        )
    }

    #[tokio::test]
    async fn test_refreshes_arrive_in_order() {
        let provider = Arc::new(MemoryProvider::new());
        let watch = MetadataWatch::new(provider.clone(), query());
        let (tx, mut rx) = unbounded_channel();

        watch
            .start(move |snapshot: Snapshot| {
                let _ = tx.send(snapshot.first().and_then(|r| r.percent_uploaded));
            })
            .unwrap();
        assert_eq!(watch.phase(), WatchPhase::Started);

        for percent in [10.0, 55.0, 55.0, 30.0] {
            provider.publish(vec![MetadataRecord::file("/cloud/X/a.txt").uploading(percent)]);
        }

        // Initial gather of an empty index comes first.
        assert_eq!(rx.recv().await.unwrap(), None);
        for expected in [10.0, 55.0, 55.0, 30.0] {
            assert_eq!(rx.recv().await.unwrap(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_subscription() {
        let provider = Arc::new(MemoryProvider::new());
        let watch = MetadataWatch::new(provider.clone(), query());

        watch.start(|_| {}).unwrap();
        assert_eq!(provider.subscription_count(), 1);

        watch.stop();
        watch.stop();
        assert!(watch.is_stopped());
        assert_eq!(provider.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_registers_once() {
        let provider = Arc::new(MemoryProvider::new());
        let watch = MetadataWatch::new(provider.clone(), query());

        watch.start(|_| {}).unwrap();
        watch.start(|_| {}).unwrap();
        assert_eq!(provider.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_from_inside_callback() {
        let provider = Arc::new(MemoryProvider::new());
        let watch = Arc::new(MetadataWatch::new(provider.clone(), query()));
        let calls = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = unbounded_channel();

        let inner = Arc::clone(&watch);
        let counter = calls.clone();
        watch
            .start(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                inner.stop();
                let _ = done_tx.send(());
            })
            .unwrap();

        done_rx.recv().await.unwrap();
        provider.publish(vec![MetadataRecord::file("/cloud/X/a.txt")]);
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.subscription_count(), 0);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let provider = Arc::new(MemoryProvider::new());
        let watch = MetadataWatch::new(provider.clone(), query());

        assert!(watch.start(|_| {}).is_err());
        assert_eq!(watch.phase(), WatchPhase::Created);
        assert_eq!(provider.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_watch_never_starts() {
        let provider = Arc::new(MemoryProvider::new());
        let watch = MetadataWatch::new(provider.clone(), query());

        watch.stop();
        watch.start(|_| panic!("must not run")).unwrap();
        assert_eq!(provider.subscription_count(), 0);
    }
}
