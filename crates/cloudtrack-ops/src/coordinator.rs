//! Coordinated write access to container paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Hands out exclusive write access per path.
///
/// Deletes and moves hold the guard of every path they touch for the whole
/// mutation, so two requests on the same file never interleave. A path is
/// tracked only while someone holds or waits for its lock.
#[derive(Debug, Default)]
pub struct WriteCoordinator {
    locks: Arc<LockTable>,
}

/// Write access to one or two paths. Released on drop.
#[derive(Debug)]
pub struct WriteGuard {
    locks: Arc<LockTable>,
    held: Vec<(PathBuf, OwnedMutexGuard<()>)>,
}

impl WriteCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    async fn lock(&self, path: &Path) -> (PathBuf, OwnedMutexGuard<()>) {
        (path.to_path_buf(), self.lock_for(path).lock_owned().await)
    }

    /// Wait for exclusive write access to `path`.
    pub async fn acquire(&self, path: &Path) -> WriteGuard {
        let held = vec![self.lock(path).await];
        WriteGuard {
            locks: Arc::clone(&self.locks),
            held,
        }
    }

    /// Wait for write access to both `from` and `to`.
    ///
    /// Paths are locked in a fixed order so that opposite moves cannot
    /// deadlock.
    pub async fn acquire_pair(&self, from: &Path, to: &Path) -> WriteGuard {
        if from == to {
            return self.acquire(from).await;
        }
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        WriteGuard {
            locks: Arc::clone(&self.locks),
            held: vec![first, second],
        }
    }

    pub fn tracked_paths(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        for (path, guard) in self.held.drain(..) {
            drop(guard);
            // Only the table itself still points at an idle lock.
            self.locks.remove_if(&path, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_path_is_exclusive() {
        let coordinator = Arc::new(WriteCoordinator::new());
        let path = PathBuf::from("/cloud/X/a.txt");

        let guard = coordinator.acquire(&path).await;

        let waiter = {
            let coordinator = coordinator.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let _guard = coordinator.acquire(&path).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(coordinator.tracked_paths(), 0);
    }

    #[tokio::test]
    async fn test_opposite_pairs_do_not_deadlock() {
        let coordinator = Arc::new(WriteCoordinator::new());
        let a = PathBuf::from("/cloud/X/a.txt");
        let b = PathBuf::from("/cloud/X/b.txt");

        let forward = {
            let (coordinator, a, b) = (coordinator.clone(), a.clone(), b.clone());
            tokio::spawn(async move {
                let _guard = coordinator.acquire_pair(&a, &b).await;
                tokio::task::yield_now().await;
            })
        };
        let backward = {
            let (coordinator, a, b) = (coordinator.clone(), a.clone(), b.clone());
            tokio::spawn(async move {
                let _guard = coordinator.acquire_pair(&b, &a).await;
                tokio::task::yield_now().await;
            })
        };

        forward.await.unwrap();
        backward.await.unwrap();

        assert_eq!(coordinator.tracked_paths(), 0);
    }

    #[tokio::test]
    async fn test_released_paths_are_forgotten() {
        let coordinator = WriteCoordinator::new();
        let a = PathBuf::from("/cloud/X/a.txt");

        let guard = coordinator.acquire(&a).await;
        assert_eq!(coordinator.tracked_paths(), 1);

        let waiter = coordinator.lock_for(&a);
        drop(guard);
        assert_eq!(coordinator.tracked_paths(), 1);

        drop(waiter);
        for i in 0..100 {
            let _guard = coordinator
                .acquire(Path::new(&format!("/cloud/X/{i}.txt")))
                .await;
        }
        let _guard = coordinator.acquire(&a).await;
        assert_eq!(coordinator.tracked_paths(), 1);
    }
}
