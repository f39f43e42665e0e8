use revmirror_ledger::SqliteStore;
use revmirror_store::{Config, StatePaths};

pub fn execute(paths: &StatePaths) -> anyhow::Result<()> {
    let existed = paths.config_json.exists();
    paths.ensure_layout()?;

    // Creates the schema on first open; a no-op afterwards.
    let store = SqliteStore::open_or_create(&paths.ledger_db)?;

    if !existed {
        Config::default().save(paths)?;
        println!("Initialized revmirror state at {}", paths.root.display());
    } else {
        println!("Already initialized at {}", paths.root.display());
    }
    println!("  config: {}", paths.config_json.display());
    println!(
        "  ledger: {} ({} commits)",
        paths.ledger_db.display(),
        store.commit_count()?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_keeps_config() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StatePaths::discover(tmp.path().join("state"));
        execute(&paths).unwrap();
        assert!(paths.ledger_db.exists());
        assert!(paths.repos_dir.is_dir());

        let mut config = Config::load_file(&paths.config_json).unwrap();
        config.port = 9000;
        config.save(&paths).unwrap();

        execute(&paths).unwrap();
        assert_eq!(Config::load_file(&paths.config_json).unwrap().port, 9000);
    }
}
