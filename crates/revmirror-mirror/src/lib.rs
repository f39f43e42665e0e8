//! Keeps a local mirror current with its upstream and replays pushes
//! through the mirror's post-receive hook once the mirror has the commits.

pub mod attempt_log;
pub mod hook;
pub mod queue;
pub mod sendchange;
pub mod sync;
pub mod worker;

pub use attempt_log::AttemptLog;
pub use hook::{HookDispatcher, PostReceiveHook};
pub use queue::PendingQueue;
pub use sendchange::{
    send_ref_updates, BuildbotSendchange, ChangeSet, ChangeSink, ChangeSource, SendReport,
};
pub use sync::{SyncOptions, SyncStatus, Synchronizer};
pub use worker::{JobEvent, MirrorOutcome, MirrorWorker, WorkerJob};

use revmirror_store::{LockGuard, RepoPaths};

/// Per-repository critical section.
///
/// Fetching, queue edits, and hook dispatch for one repository all happen
/// while this is held. Different repositories never contend.
#[derive(Debug)]
pub struct RepoLock {
    _guard: LockGuard,
}

impl RepoLock {
    pub fn acquire(paths: &RepoPaths) -> anyhow::Result<Self> {
        paths.ensure_layout()?;
        Ok(Self {
            _guard: LockGuard::acquire(&paths.lock_file)?,
        })
    }

    /// Fails instead of waiting when a worker holds the lock.
    pub fn try_acquire(paths: &RepoPaths) -> anyhow::Result<Self> {
        paths.ensure_layout()?;
        Ok(Self {
            _guard: LockGuard::try_acquire(&paths.lock_file)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repositories_lock_independently() {
        let tmp = tempfile::tempdir().unwrap();
        let a = RepoPaths::new(tmp.path().join("a"));
        let b = RepoPaths::new(tmp.path().join("b"));
        let _held = RepoLock::acquire(&a).unwrap();
        assert!(RepoLock::try_acquire(&a).is_err());
        assert!(RepoLock::try_acquire(&b).is_ok());
    }
}
