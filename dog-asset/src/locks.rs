use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Per-directory mutexes serializing default-marker changes.
///
/// Entries exist only while someone holds or waits on them.
#[derive(Clone, Default)]
pub struct DirLocks {
    locks: Arc<LockMap>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `dir`
    pub async fn lock(&self, dir: &Path) -> DirLockGuard {
        let mutex = self
            .locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        DirLockGuard {
            guard: Some(guard),
            dir: dir.to_path_buf(),
            locks: self.locks.clone(),
        }
    }

    /// Number of directories with a live lock entry
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

pub struct DirLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    dir: PathBuf,
    locks: Arc<LockMap>,
}

impl Drop for DirLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references the mutex: nobody holds or awaits it.
        self.locks
            .remove_if(&self.dir, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_pruned_after_release() {
        let locks = DirLocks::new();
        {
            let _guard = locks.lock(Path::new("/a")).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn same_directory_is_serialized() {
        let locks = DirLocks::new();
        let guard = locks.lock(Path::new("/a")).await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.lock(Path::new("/a")).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn different_directories_do_not_contend() {
        let locks = DirLocks::new();
        let _a = locks.lock(Path::new("/a")).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Path::new("/b")))
            .await
            .expect("independent directory should not block");
        assert_eq!(locks.active(), 2);
    }
}
