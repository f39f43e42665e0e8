//! Grows the ledger from staged revision ranges.
//!
//! Ranges are expanded into single-step links keyed by their `old` end, so
//! overlapping or repeated submissions converge on the same staging set and
//! `advance` can make partial progress while a missing link is still in flight.

use std::io::BufRead;

use revmirror_core::{
    Commit, CommitId, Error, RefUpdate, RevisionRange, RevisionSource, TodoEntry,
};

use crate::sqlite_store::SqliteStore;

/// What a single `advance` pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Commits appended in this pass, in ledger order.
    pub appended: Vec<CommitId>,
    /// Ledger tail after the pass.
    pub tail: CommitId,
    /// Links still staged but not connected to the tail.
    pub waiting: u64,
}

impl AdvanceReport {
    /// Staged links exist that do not yet connect to the tail.
    pub fn has_gap(&self) -> bool {
        self.waiting > 0
    }
}

/// Outcome of feeding post-receive lines into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub staged_links: usize,
    pub skipped_lines: usize,
    /// Tracked-ref ranges the revision source could not list.
    pub failed_ranges: usize,
    pub advance: AdvanceReport,
}

/// Stages ranges and folds contiguous links into the ledger.
///
/// Callers hold the global ledger lock for the lifetime of a builder.
pub struct LedgerBuilder<'a, S: RevisionSource + ?Sized> {
    store: &'a SqliteStore,
    source: &'a S,
}

impl<'a, S: RevisionSource + ?Sized> LedgerBuilder<'a, S> {
    pub fn new(store: &'a SqliteStore, source: &'a S) -> Self {
        Self { store, source }
    }

    /// Expand `range` into chain links and upsert them. Returns the number of links.
    pub fn stage(&self, range: &RevisionRange) -> anyhow::Result<usize> {
        if range.old.is_null() || range.new.is_null() {
            tracing::debug!(old = %range.old, new = %range.new, "skipping branch create/delete");
            return Ok(0);
        }
        let commits = self.source.list_range(&range.old, &range.new)?;
        let links = chain_links(&range.old, &commits);
        self.store.upsert_todos(&links)?;
        tracing::debug!(
            old = %range.old,
            new = %range.new,
            links = links.len(),
            "staged range"
        );
        Ok(links.len())
    }

    /// Append every staged commit that chains from the current tail.
    ///
    /// Stops quietly at the first missing link. A metadata failure aborts the
    /// pass with the link left staged for the next run.
    pub fn advance(&self) -> anyhow::Result<AdvanceReport> {
        let mut tail = self.require_tail()?;
        let mut appended = Vec::new();

        while let Some(next) = self.store.todo_after(&tail)? {
            let meta = self.source.metadata_of(&next).map_err(|e| {
                tracing::warn!(
                    commit = %next,
                    appended = appended.len(),
                    error = %e,
                    "metadata fetch failed, stopping"
                );
                e
            })?;
            let commit = Commit::from_meta(next.clone(), meta);
            let seq = self.store.append_and_consume(&tail, &commit)?;
            tracing::info!(seq, commit = %next, subject = %commit.subject(), "appended");
            appended.push(next.clone());
            tail = next;
        }

        let waiting = self.store.todo_count()?;
        if waiting > 0 {
            tracing::debug!(%tail, waiting, "waiting for missing link");
        }
        Ok(AdvanceReport {
            appended,
            tail,
            waiting,
        })
    }

    /// Stage every `old new ref` line whose ref is `tracked_ref`, then advance.
    ///
    /// Hook input cannot be replayed, so a range the source fails to list is
    /// logged and counted and the remaining lines are still staged.
    pub fn ingest_ref_updates<R: BufRead>(
        &self,
        reader: R,
        tracked_ref: &str,
    ) -> anyhow::Result<IngestReport> {
        self.require_tail()?;
        let mut staged_links = 0;
        let mut skipped_lines = 0;
        let mut failed_ranges = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let update: RefUpdate = match line.parse() {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(line = %line, error = %e, "ignoring malformed ref update");
                    skipped_lines += 1;
                    continue;
                }
            };
            if update.ref_name != tracked_ref {
                skipped_lines += 1;
                continue;
            }
            let range = RevisionRange::new(update.old, update.new);
            match self.stage(&range) {
                Ok(links) => staged_links += links,
                Err(e) if is_transient(&e) => {
                    tracing::warn!(
                        old = %range.old,
                        new = %range.new,
                        error = %e,
                        "cannot list range, continuing"
                    );
                    failed_ranges += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let advance = self.advance()?;
        Ok(IngestReport {
            staged_links,
            skipped_lines,
            failed_ranges,
            advance,
        })
    }

    /// Stage everything between the ledger tail and the current tip of `tracked_ref`.
    pub fn catch_up(&self, tracked_ref: &str) -> anyhow::Result<AdvanceReport> {
        let tail = self.require_tail()?;
        let tip = self.source.resolve(tracked_ref)?;
        if tip != tail {
            let links = self.stage(&RevisionRange::new(tail.clone(), tip.clone()))?;
            tracing::info!(%tail, %tip, links, "catching up");
        }
        self.advance()
    }

    fn require_tail(&self) -> anyhow::Result<CommitId> {
        self.store.tail_hash()?.ok_or_else(|| {
            Error::FatalState(
                "ledger has never been seeded; run `revmirror seed <rev>` first".to_string(),
            )
            .into()
        })
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Error>().is_some_and(Error::is_retryable)
}

/// `(old, c1), (c1, c2), … (c[n-2], c[n-1])` for `commits = [c1 … c[n-1]]`.
pub fn chain_links(old: &CommitId, commits: &[CommitId]) -> Vec<TodoEntry> {
    let mut prev = old;
    let mut links = Vec::with_capacity(commits.len());
    for commit in commits {
        links.push(TodoEntry {
            old: prev.clone(),
            new: commit.clone(),
        });
        prev = commit;
    }
    links
}
