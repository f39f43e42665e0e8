use revmirror_mirror::{PendingQueue, RepoLock};
use revmirror_store::paths::is_plain_component;
use revmirror_store::StatePaths;

pub fn execute(paths: &StatePaths, repo: &str, json: bool) -> anyhow::Result<()> {
    if !is_plain_component(repo) {
        anyhow::bail!("invalid repository name: {repo:?}");
    }
    let repo_paths = paths.repo(repo);
    // Waits for a running worker so the listing is consistent.
    let lock = RepoLock::acquire(&repo_paths)?;
    let actions = PendingQueue::new(&repo_paths).load(&lock)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
    } else if actions.is_empty() {
        println!("(queue empty)");
    } else {
        for action in &actions {
            print!("{}", action.hook_line());
        }
    }
    Ok(())
}
