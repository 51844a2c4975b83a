//! Provider backed by a plain local directory tree.
//!
//! Each container is the directory `<base>/<container id>`. Everything on
//! disk counts as fully uploaded and current, so uploads and downloads finish
//! on their first refresh. Search scopes are not distinguished.

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jwalk::WalkDir;
use tokio_util::sync::CancellationToken;

use cloudtrack_core::{
    path_string, MetadataQuery, MetadataRecord, PathPredicate, Snapshot, TrackError,
};

use crate::provider::{MetadataProvider, RefreshHandler, SubscriptionId};

/// Polling provider over `<base>/<container id>` directories.
#[derive(Debug)]
pub struct LocalProvider {
    base: PathBuf,
    poll_interval: Duration,
    subscriptions: DashMap<SubscriptionId, CancellationToken>,
    next_id: AtomicU64,
}

impl LocalProvider {
    pub fn new(base: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            base: base.into(),
            poll_interval,
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl MetadataProvider for LocalProvider {
    fn container_root(&self, container_id: &str) -> Result<PathBuf, TrackError> {
        let mut components = Path::new(container_id).components();
        let valid = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !valid {
            return Err(TrackError::container(
                container_id,
                "container id must be a single path component",
            ));
        }
        if !self.base.is_dir() {
            return Err(TrackError::container(
                container_id,
                format!("base directory {} is not accessible", self.base.display()),
            ));
        }
        Ok(self.base.join(container_id))
    }

    fn start_downloading(&self, path: &Path) -> Result<(), TrackError> {
        if path.exists() {
            Ok(())
        } else {
            Err(TrackError::TriggerFailed {
                path: path.to_path_buf(),
                message: "no such item".to_string(),
            })
        }
    }

    fn subscribe(
        &self,
        query: MetadataQuery,
        handler: RefreshHandler,
    ) -> Result<SubscriptionId, TrackError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        self.subscriptions.insert(id, cancel.clone());

        let interval = self.poll_interval;
        tokio::spawn(async move {
            let mut last: Option<Snapshot> = None;
            loop {
                let predicate = query.predicate.clone();
                let snapshot = match tokio::task::spawn_blocking(move || scan(&predicate)).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::error!(error = %e, "local scan task failed");
                        break;
                    }
                };

                if cancel.is_cancelled() {
                    break;
                }
                if last.as_ref() != Some(&snapshot) {
                    handler(snapshot.clone());
                    last = Some(snapshot);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((_, cancel)) = self.subscriptions.remove(&id) {
            cancel.cancel();
        }
    }
}

/// Read every record matching `predicate` from disk.
fn scan(predicate: &PathPredicate) -> Snapshot {
    let records = match predicate {
        PathPredicate::Exact(path) => std::fs::metadata(path)
            .ok()
            .map(|metadata| record_for(Path::new(path), &metadata))
            .into_iter()
            .collect(),
        PathPredicate::Prefix(prefix) => {
            let root = Path::new(prefix.as_str());
            if !root.is_dir() {
                return Snapshot::default();
            }
            WalkDir::new(root)
                .skip_hidden(false)
                .min_depth(1)
                .sort(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter_map(|entry| {
                    let path = entry.path();
                    entry.metadata().ok().map(|metadata| record_for(&path, &metadata))
                })
                .collect()
        }
    };
    Snapshot::new(records)
}

fn record_for(path: &Path, metadata: &Metadata) -> MetadataRecord {
    let created = metadata.created().ok().map(DateTime::<Utc>::from);
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    if metadata.is_dir() {
        return MetadataRecord::directory(path_string(path)).with_times(created, modified);
    }

    let mut record = MetadataRecord::file(path_string(path))
        .with_size(metadata.len())
        .with_times(created, modified)
        .resident();
    record.percent_uploaded = Some(100.0);
    record.percent_downloaded = Some(100.0);
    record
}

#[cfg(test)]
mod tests {
    use std::fs;

    use cloudtrack_core::{DownloadStatus, SearchScope};

    use super::*;

    #[test]
    fn test_container_root_validation() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(dir.path(), Duration::from_millis(10));

        assert_eq!(provider.container_root("X").unwrap(), dir.path().join("X"));
        assert!(provider.container_root("").is_err());
        assert!(provider.container_root("../escape").is_err());
        assert!(provider.container_root("a/b").is_err());

        let missing = LocalProvider::new(dir.path().join("nope"), Duration::from_millis(10));
        assert!(matches!(
            missing.container_root("X"),
            Err(TrackError::ContainerUnavailable { .. })
        ));
    }

    #[test]
    fn test_scan_marks_directories_and_resident_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("X");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("sub").join("b.txt"), b"world!").unwrap();

        let snapshot = scan(&PathPredicate::under(&root));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.files().count(), 2);

        let file = snapshot
            .files()
            .find(|r| r.path.ends_with("/a.txt"))
            .unwrap();
        assert_eq!(file.size, Some(5));
        assert_eq!(file.download_status, DownloadStatus::Current);
        assert!(file.is_uploaded);
    }

    #[test]
    fn test_scan_exact_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = scan(&PathPredicate::exact(&dir.path().join("missing.txt")));
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_subscription_refreshes_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("X");
        fs::create_dir_all(&root).unwrap();

        let provider = LocalProvider::new(dir.path(), Duration::from_millis(10));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let query = MetadataQuery::new(PathPredicate::under(&root), vec![SearchScope::Data]);
        let id = provider
            .subscribe(
                query,
                std::sync::Arc::new(move |snapshot: Snapshot| {
                    let _ = tx.send(snapshot.len());
                }),
            )
            .unwrap();

        assert_eq!(rx.recv().await, Some(0));
        fs::write(root.join("a.txt"), b"x").unwrap();
        assert_eq!(rx.recv().await, Some(1));

        provider.unsubscribe(id);
        assert!(provider.subscriptions.is_empty());
    }
}
