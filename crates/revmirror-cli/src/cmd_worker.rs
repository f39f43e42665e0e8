use std::path::PathBuf;
use std::time::Duration;

use revmirror_core::GitRepo;
use revmirror_mirror::{MirrorWorker, PostReceiveHook, SyncOptions, WorkerJob};
use revmirror_store::paths::is_plain_component;
use revmirror_store::{Config, StatePaths};

pub fn execute(
    paths: &StatePaths,
    repo: String,
    repo_path: PathBuf,
    event: &str,
    push: &[String],
) -> anyhow::Result<()> {
    if !is_plain_component(&repo) {
        anyhow::bail!("invalid repository name: {repo:?}");
    }
    let job = WorkerJob::from_parts(repo, repo_path, event, push)?;
    let config = Config::load(paths)?;
    let options = SyncOptions {
        max_attempts: config.max_attempts,
        backoff: Duration::from_secs(config.backoff_secs),
    };

    let mirror = GitRepo::new(&job.repo_path);
    let hook = PostReceiveHook::new(&job.repo_path);
    let worker = MirrorWorker::new(paths.repo(&job.repo), &mirror, &hook, options);
    let outcome = worker.run(&job.event)?;

    if outcome.status.succeeded() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!(
            "git remote update failed after {} attempt(s); {} action(s) queued (see {})",
            outcome.status.attempts(),
            outcome.queued,
            paths.repo(&job.repo).log_file.display()
        )
    }
}
