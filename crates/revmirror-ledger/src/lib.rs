pub mod builder;
pub mod sqlite_store;

pub use builder::{chain_links, AdvanceReport, IngestReport, LedgerBuilder};
pub use sqlite_store::SqliteStore;

use revmirror_store::{LockGuard, StatePaths};

/// Take the global ledger lock and open the store behind it.
///
/// The store must not outlive the guard; keep both alive for the whole
/// stage/advance cycle.
pub fn open_locked(paths: &StatePaths) -> anyhow::Result<(LockGuard, SqliteStore)> {
    let guard = LockGuard::acquire(&paths.ledger_lock)?;
    let store = SqliteStore::open_or_create(&paths.ledger_db)?;
    Ok((guard, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_locked_holds_global_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StatePaths::discover(tmp.path());
        let (guard, store) = open_locked(&paths).unwrap();
        assert_eq!(store.commit_count().unwrap(), 0);
        assert!(LockGuard::try_acquire(&paths.ledger_lock).is_err());
        drop(store);
        drop(guard);
        assert!(LockGuard::try_acquire(&paths.ledger_lock).is_ok());
    }
}
