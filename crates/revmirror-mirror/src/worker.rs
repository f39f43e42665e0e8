//! One mirror update for one repository, start to finish.

use std::path::PathBuf;

use revmirror_core::{Error, PendingAction, RemoteFetcher};
use revmirror_store::RepoPaths;

use crate::attempt_log::AttemptLog;
use crate::hook::HookDispatcher;
use crate::queue::PendingQueue;
use crate::sync::{SyncOptions, SyncStatus, Synchronizer};
use crate::RepoLock;

/// Why the mirror is being refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A push: refresh and queue one post-receive invocation.
    Push(PendingAction),
    /// A pull request: refresh only.
    PullRequest,
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Push(_) => "push",
            Self::PullRequest => "pull_request",
        }
    }
}

/// A validated notification handed off by the webhook gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerJob {
    pub repo: String,
    pub repo_path: PathBuf,
    pub event: JobEvent,
}

impl WorkerJob {
    /// Arguments for `revmirror worker`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.repo.clone(),
            self.repo_path.to_string_lossy().into_owned(),
            self.event.name().to_string(),
        ];
        if let JobEvent::Push(action) = &self.event {
            args.push(action.before.clone());
            args.push(action.after.clone());
            args.push(action.ref_name.clone());
        }
        args
    }

    /// Inverse of [`WorkerJob::to_args`].
    pub fn from_parts(
        repo: String,
        repo_path: PathBuf,
        event: &str,
        push: &[String],
    ) -> Result<Self, Error> {
        let event = match (event, push) {
            ("push", [before, after, ref_name]) => {
                JobEvent::Push(PendingAction::new(before, after, ref_name))
            }
            ("push", _) => {
                return Err(Error::Protocol(
                    "push needs <before> <after> <ref>".to_string(),
                ))
            }
            ("pull_request", _) => JobEvent::PullRequest,
            (other, _) => return Err(Error::Protocol(format!("Wrong event: {other}"))),
        };
        Ok(Self {
            repo,
            repo_path,
            event,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorOutcome {
    pub status: SyncStatus,
    /// Actions handed to the hook (0 unless the update succeeded).
    pub dispatched: usize,
    /// Actions still queued after the run.
    pub queued: usize,
}

/// Runs the per-repository critical section: lock, enqueue, fetch with
/// retries, then flush the queue through the hook on success.
pub struct MirrorWorker<'a, F: RemoteFetcher + ?Sized, H: HookDispatcher + ?Sized> {
    paths: RepoPaths,
    fetcher: &'a F,
    hook: &'a H,
    options: SyncOptions,
}

impl<'a, F: RemoteFetcher + ?Sized, H: HookDispatcher + ?Sized> MirrorWorker<'a, F, H> {
    pub fn new(paths: RepoPaths, fetcher: &'a F, hook: &'a H, options: SyncOptions) -> Self {
        Self {
            paths,
            fetcher,
            hook,
            options,
        }
    }

    pub fn run(&self, event: &JobEvent) -> anyhow::Result<MirrorOutcome> {
        let lock = RepoLock::acquire(&self.paths)?;
        let queue = PendingQueue::new(&self.paths);

        // Persist first so the action survives a crash mid-update.
        if let JobEvent::Push(action) = event {
            let len = queue.enqueue(&lock, action.clone())?;
            tracing::debug!(queued = len, after = %action.after, "enqueued push");
        }

        let log = AttemptLog::new(&self.paths.log_file);
        let status = Synchronizer::new(self.fetcher, &log, self.options).synchronize(&lock);

        let outcome = if status.succeeded() {
            let dispatched = queue.drain_and_dispatch(&lock, self.hook)?;
            MirrorOutcome {
                status,
                dispatched,
                queued: 0,
            }
        } else {
            MirrorOutcome {
                status,
                dispatched: 0,
                queued: queue.load(&lock)?.len(),
            }
        };
        tracing::info!(
            event = event.name(),
            attempts = status.attempts(),
            succeeded = status.succeeded(),
            dispatched = outcome.dispatched,
            queued = outcome.queued,
            "mirror update finished"
        );
        Ok(outcome)
    }
}
