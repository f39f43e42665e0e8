//! Durable FIFO of post-receive invocations waiting for a successful mirror update.
//!
//! The whole list is read and rewritten as one unit (temp file + rename), and
//! every operation takes the repository lock as proof of exclusive access.

use std::path::PathBuf;

use revmirror_core::PendingAction;
use revmirror_store::RepoPaths;
use serde::{Deserialize, Serialize};

use crate::hook::HookDispatcher;
use crate::RepoLock;

/// On-disk shape of `queue.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    #[serde(default)]
    actions: Vec<PendingAction>,
}

pub struct PendingQueue {
    path: PathBuf,
}

impl PendingQueue {
    pub fn new(paths: &RepoPaths) -> Self {
        Self {
            path: paths.queue_json.clone(),
        }
    }

    /// Current queue contents in arrival order.
    ///
    /// An unreadable queue file is moved aside to `queue.json.corrupt` and
    /// treated as empty so one bad write cannot wedge the repository.
    pub fn load(&self, _lock: &RepoLock) -> anyhow::Result<Vec<PendingAction>> {
        match revmirror_store::read_json::<QueueFile>(&self.path) {
            Ok(file) => Ok(file.map(|f| f.actions).unwrap_or_default()),
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                tracing::error!(
                    queue = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "discarding unreadable queue"
                );
                std::fs::rename(&self.path, &aside)?;
                Ok(Vec::new())
            }
        }
    }

    /// Replace the persisted queue with `actions`.
    pub fn save(&self, _lock: &RepoLock, actions: &[PendingAction]) -> anyhow::Result<()> {
        let file = QueueFile {
            actions: actions.to_vec(),
        };
        revmirror_store::write_json(&self.path, &file)
    }

    /// Append one action. Returns the new queue length.
    pub fn enqueue(&self, lock: &RepoLock, action: PendingAction) -> anyhow::Result<usize> {
        let mut actions = self.load(lock)?;
        actions.push(action);
        self.save(lock, &actions)?;
        Ok(actions.len())
    }

    pub fn clear(&self, lock: &RepoLock) -> anyhow::Result<()> {
        self.save(lock, &[])
    }

    /// Dispatch every queued action in FIFO order, then clear the queue.
    ///
    /// Hook failures are logged and not retried. Returns the number of
    /// actions dispatched successfully.
    pub fn drain_and_dispatch<H: HookDispatcher + ?Sized>(
        &self,
        lock: &RepoLock,
        hook: &H,
    ) -> anyhow::Result<usize> {
        let actions = self.load(lock)?;
        let mut ok = 0;
        for action in &actions {
            match hook.dispatch(action) {
                Ok(()) => ok += 1,
                Err(e) => tracing::warn!(
                    before = %action.before,
                    after = %action.after,
                    ref_name = %action.ref_name,
                    error = %e,
                    "post-receive dispatch failed"
                ),
            }
        }
        self.clear(lock)?;
        tracing::info!(total = actions.len(), ok, "drained pending actions");
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingHook {
        seen: RefCell<Vec<PendingAction>>,
        fail_on: Option<String>,
    }

    impl HookDispatcher for RecordingHook {
        fn dispatch(&self, action: &PendingAction) -> anyhow::Result<()> {
            self.seen.borrow_mut().push(action.clone());
            if self.fail_on.as_deref() == Some(action.after.as_str()) {
                anyhow::bail!("hook exited with 1");
            }
            Ok(())
        }
    }

    fn setup() -> (tempfile::TempDir, RepoPaths, PendingQueue) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RepoPaths::new(tmp.path().join("reactos"));
        let queue = PendingQueue::new(&paths);
        (tmp, paths, queue)
    }

    fn action(n: &str) -> PendingAction {
        PendingAction::new(format!("{n}0"), format!("{n}1"), "refs/heads/master")
    }

    #[test]
    fn missing_queue_is_empty() {
        let (_tmp, paths, queue) = setup();
        let lock = RepoLock::acquire(&paths).unwrap();
        assert!(queue.load(&lock).unwrap().is_empty());
    }

    #[test]
    fn enqueue_preserves_order_across_loads() {
        let (_tmp, paths, queue) = setup();
        let lock = RepoLock::acquire(&paths).unwrap();
        assert_eq!(queue.enqueue(&lock, action("a")).unwrap(), 1);
        assert_eq!(queue.enqueue(&lock, action("b")).unwrap(), 2);
        assert_eq!(queue.enqueue(&lock, action("c")).unwrap(), 3);
        assert_eq!(
            queue.load(&lock).unwrap(),
            vec![action("a"), action("b"), action("c")]
        );
    }

    #[test]
    fn drain_dispatches_fifo_and_clears() {
        let (_tmp, paths, queue) = setup();
        let lock = RepoLock::acquire(&paths).unwrap();
        for n in ["a", "b", "c"] {
            queue.enqueue(&lock, action(n)).unwrap();
        }
        let hook = RecordingHook {
            seen: RefCell::new(Vec::new()),
            fail_on: None,
        };
        assert_eq!(queue.drain_and_dispatch(&lock, &hook).unwrap(), 3);
        assert_eq!(
            hook.seen.into_inner(),
            vec![action("a"), action("b"), action("c")]
        );
        assert!(queue.load(&lock).unwrap().is_empty());
    }

    #[test]
    fn failed_dispatch_is_not_retried() {
        let (_tmp, paths, queue) = setup();
        let lock = RepoLock::acquire(&paths).unwrap();
        queue.enqueue(&lock, action("a")).unwrap();
        queue.enqueue(&lock, action("b")).unwrap();
        let hook = RecordingHook {
            seen: RefCell::new(Vec::new()),
            fail_on: Some("a1".into()),
        };
        assert_eq!(queue.drain_and_dispatch(&lock, &hook).unwrap(), 1);
        assert_eq!(hook.seen.borrow().len(), 2);
        assert!(queue.load(&lock).unwrap().is_empty());
    }

    #[test]
    fn corrupt_queue_is_moved_aside() {
        let (_tmp, paths, queue) = setup();
        let lock = RepoLock::acquire(&paths).unwrap();
        std::fs::write(&paths.queue_json, "a:1:{garbage").unwrap();
        assert!(queue.load(&lock).unwrap().is_empty());
        assert!(paths.queue_json.with_extension("json.corrupt").exists());
        queue.enqueue(&lock, action("a")).unwrap();
        assert_eq!(queue.load(&lock).unwrap(), vec![action("a")]);
    }
}
