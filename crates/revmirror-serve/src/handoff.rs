use std::path::PathBuf;
use std::process::{Command, Stdio};

use revmirror_mirror::WorkerJob;
use revmirror_store::paths::STATE_DIR_ENV;

/// Receives validated jobs. Must return quickly: the webhook sender
/// enforces a short response deadline.
pub trait Handoff: Send + Sync {
    fn hand_off(&self, job: WorkerJob) -> anyhow::Result<()>;
}

/// Runs each job as a detached `revmirror worker …` process.
#[derive(Debug, Clone)]
pub struct ProcessHandoff {
    exe: PathBuf,
    state_root: PathBuf,
}

impl ProcessHandoff {
    pub fn new(exe: impl Into<PathBuf>, state_root: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            state_root: state_root.into(),
        }
    }

    /// Re-invoke the running binary.
    pub fn current(state_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, state_root))
    }

    fn command(&self, job: &WorkerJob) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("worker")
            .args(job.to_args())
            .env(STATE_DIR_ENV, &self.state_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl Handoff for ProcessHandoff {
    fn hand_off(&self, job: WorkerJob) -> anyhow::Result<()> {
        let mut child = self.command(&job).spawn().map_err(|e| {
            anyhow::anyhow!("cannot start worker {}: {e}", self.exe.display())
        })?;
        let pid = child.id();
        tracing::info!(repo = %job.repo, event = job.event.name(), pid, "worker started");

        // Reap in the background so finished workers do not linger as zombies.
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!(pid, code = status.code().unwrap_or(-1), "worker failed")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(pid, error = %e, "cannot wait for worker"),
        });
        Ok(())
    }
}
