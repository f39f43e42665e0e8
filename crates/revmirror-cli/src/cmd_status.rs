use revmirror_ledger::SqliteStore;
use revmirror_mirror::{PendingQueue, RepoLock};
use revmirror_store::lock::read_holder;
use revmirror_store::{Config, StatePaths};

pub fn execute(paths: &StatePaths) -> anyhow::Result<()> {
    if !paths.is_initialized() {
        anyhow::bail!(
            "no state at {} (run `revmirror init` first)",
            paths.root.display()
        );
    }
    let config = Config::load(paths)?;
    println!("State: {}", paths.root.display());
    println!("Tracked ref: {}", config.tracked_ref);
    match &config.project_root {
        Some(root) => println!("Project root: {}", root.display()),
        None => println!("Project root: (not set)"),
    }
    println!(
        "Webhook secret: {}",
        if config.secret.is_some() { "set" } else { "(not set)" }
    );

    if paths.ledger_db.exists() {
        let store = SqliteStore::open(&paths.ledger_db)?;
        match store.tail()? {
            Some(tail) => println!(
                "Ledger: {} commits, tail #{} {} \"{}\"",
                store.commit_count()?,
                tail.seq,
                tail.commit.hash,
                tail.commit.subject()
            ),
            None => println!("Ledger: empty (run `revmirror seed <rev>`)"),
        }
        let waiting = store.todo_count()?;
        if waiting > 0 {
            println!("Staged links waiting: {waiting}");
        }
    } else {
        println!("Ledger: (not created)");
    }

    let mut repos: Vec<_> = match std::fs::read_dir(&paths.repos_dir) {
        Ok(dir) => dir
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect(),
        Err(_) => Vec::new(),
    };
    repos.sort();
    if repos.is_empty() {
        println!("Mirrors: (none updated yet)");
    }
    for repo in repos {
        let repo_paths = paths.repo(&repo);
        // Don't block on a running worker; report it instead.
        let Ok(lock) = RepoLock::try_acquire(&repo_paths) else {
            let pid = read_holder(&repo_paths.lock_file).unwrap_or_else(|| "?".into());
            println!("  {repo}: worker running (pid {pid})");
            continue;
        };
        let queued = PendingQueue::new(&repo_paths).load(&lock)?.len();
        println!("  {repo}: {queued} queued");
    }
    Ok(())
}
