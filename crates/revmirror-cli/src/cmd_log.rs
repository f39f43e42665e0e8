use revmirror_core::LedgerEntry;
use revmirror_ledger::SqliteStore;
use revmirror_store::StatePaths;
use time::format_description::well_known::Rfc3339;

pub fn execute(paths: &StatePaths, limit: usize, json: bool) -> anyhow::Result<()> {
    let store = SqliteStore::open(&paths.ledger_db)?;
    let entries = store.recent_commits(limit)?;

    if json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }
    if entries.is_empty() {
        println!("(ledger is empty)");
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &LedgerEntry) -> String {
    let c = &entry.commit;
    let ts = c
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| c.timestamp.unix_timestamp().to_string());
    let short = &c.hash.as_str()[..c.hash.as_str().len().min(10)];
    format!(
        "{:>6}  {short}  {ts}  {} <{}>  {}",
        entry.seq,
        c.author_name,
        c.author_email,
        c.subject()
    )
}
