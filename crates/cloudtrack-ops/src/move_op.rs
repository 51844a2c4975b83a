//! Coordinated moves inside a container.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cloudtrack_core::TrackError;

use crate::coordinator::WriteCoordinator;

/// Move `from` to `to`, creating missing parents of `to`.
///
/// Both paths are held for writing during the move. An existing destination
/// is never overwritten.
pub async fn move_item(
    coordinator: &WriteCoordinator,
    from: PathBuf,
    to: PathBuf,
) -> Result<(), TrackError> {
    let _guard = coordinator.acquire_pair(&from, &to).await;

    let (source, dest) = (from.clone(), to.clone());
    let result = tokio::task::spawn_blocking(move || relocate(&source, &dest))
        .await
        .map_err(io::Error::other)
        .and_then(|r| r);

    match result {
        Ok(()) => {
            tracing::debug!(from = %from.display(), to = %to.display(), "moved");
            Ok(())
        }
        Err(source) => Err(TrackError::MoveFailed { from, to, source }),
    }
}

fn relocate(source: &Path, dest: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(source)?;
    if fs::symlink_metadata(dest).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination already exists",
        ));
    }
    if dest.starts_with(source) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot move a directory into itself",
        ));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        // Cross-device moves of plain files fall back to copy and remove.
        Err(_) if metadata.is_file() => {
            fs::copy(source, dest)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("archive").join("2024").join("a.txt");
        fs::write(&from, b"data").unwrap();

        move_item(&WriteCoordinator::new(), from.clone(), to.clone())
            .await
            .unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_item(
            &WriteCoordinator::new(),
            dir.path().join("missing.txt"),
            dir.path().join("b.txt"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TrackError::MoveFailed { .. }));
        assert_eq!(err.code(), "E_NAT");
    }

    #[tokio::test]
    async fn test_move_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = move_item(&WriteCoordinator::new(), from.clone(), to.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, TrackError::MoveFailed { .. }));
        assert_eq!(fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
    }

    #[tokio::test]
    async fn test_move_into_itself_fails() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("sub");
        fs::create_dir_all(&from).unwrap();

        let err = move_item(&WriteCoordinator::new(), from.clone(), from.join("inner"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::MoveFailed { .. }));
    }
}
