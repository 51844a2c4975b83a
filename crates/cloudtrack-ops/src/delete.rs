//! Coordinated removal of container items.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cloudtrack_core::TrackError;

use crate::coordinator::WriteCoordinator;

/// Remove a file (or directory tree) while holding write access to it.
///
/// A missing target fails with [`TrackError::FileNotFound`].
pub async fn delete_item(
    coordinator: &WriteCoordinator,
    target: PathBuf,
) -> Result<(), TrackError> {
    let _guard = coordinator.acquire(&target).await;

    let path = target.clone();
    let result = tokio::task::spawn_blocking(move || remove(&path))
        .await
        .map_err(io::Error::other)
        .and_then(|r| r);

    match result {
        Ok(()) => {
            tracing::debug!(path = %target.display(), "deleted");
            Ok(())
        }
        Err(e) => Err(TrackError::delete(target, e)),
    }
}

fn remove(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
