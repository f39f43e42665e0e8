use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a lock file.
///
/// Released when dropped. The kernel also drops the lock when the holding
/// process dies, so a crashed worker never wedges its domain.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until the lock at `path` is ours. Creates the file if needed.
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        let file = open_lock_file(path)?;
        if file.try_lock_exclusive().is_err() {
            tracing::info!(
                lock = %path.display(),
                holder = %read_holder(path).as_deref().unwrap_or("unknown"),
                "waiting for lock"
            );
            file.lock_exclusive().map_err(|e| {
                anyhow::anyhow!("cannot lock {}: {e}", path.display())
            })?;
        }
        Self::claim(file, path)
    }

    /// Try to take the lock without waiting.
    pub fn try_acquire(path: &Path) -> anyhow::Result<Self> {
        let file = open_lock_file(path)?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!("{} is locked by another process", path.display())
        })?;
        Self::claim(file, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn claim(mut file: File, path: &Path) -> anyhow::Result<Self> {
        // Holder pid is informational only; the flock is the source of truth.
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        tracing::debug!(lock = %path.display(), "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(lock = %self.path.display(), "lock released");
    }
}

fn open_lock_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("cannot open lock file {}: {e}", path.display()))
}

/// Pid recorded by the current holder, if any.
pub fn read_holder(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let pid = content.trim();
    (!pid.is_empty()).then(|| pid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn acquire_and_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("worker.lock");

        let lock = LockGuard::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(read_holder(&path), Some(std::process::id().to_string()));
        // Second acquire should fail while first is held
        assert!(LockGuard::try_acquire(&path).is_err());
        drop(lock);
        // After drop, should succeed again
        let _lock2 = LockGuard::try_acquire(&path).unwrap();
    }

    #[test]
    fn drop_clears_holder() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.lock");
        drop(LockGuard::acquire(&path).unwrap());
        assert_eq!(read_holder(&path), None);
    }

    #[test]
    fn blocking_acquire_waits_for_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("worker.lock");
        let held = LockGuard::acquire(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            let _guard = LockGuard::acquire(&waiter_path).unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}
