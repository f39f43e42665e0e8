use std::io::BufRead;
use std::path::Path;

use revmirror_core::{Commit, GitRepo, RevisionSource};
use revmirror_ledger::{open_locked, AdvanceReport, LedgerBuilder};
use revmirror_store::{Config, StatePaths};

/// `--repo`, else `ledger_repo` from config, else the working directory
/// (post-receive hooks run inside the repository).
fn source_repo(config: &Config, repo: Option<&Path>) -> anyhow::Result<GitRepo> {
    let dir = match repo {
        Some(dir) => dir.to_path_buf(),
        None => config.ledger_repo_or(&std::env::current_dir()?),
    };
    Ok(GitRepo::new(dir))
}

fn tracked_ref(config: &Config, explicit: Option<&str>) -> String {
    explicit.map_or_else(|| config.tracked_ref.clone(), str::to_string)
}

// ── seed ──

pub fn seed(paths: &StatePaths, rev: &str, repo: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(paths)?;
    let source = source_repo(&config, repo)?;
    let commit = seed_from(paths, &source, rev)?;
    println!("Seeded ledger at {} \"{}\"", commit.hash, commit.subject());
    Ok(())
}

fn seed_from<S: RevisionSource + ?Sized>(
    paths: &StatePaths,
    source: &S,
    rev: &str,
) -> anyhow::Result<Commit> {
    let hash = source.resolve(rev)?;
    let meta = source.metadata_of(&hash)?;
    let commit = Commit::from_meta(hash, meta);
    let (_lock, store) = open_locked(paths)?;
    store.seed(&commit)?;
    tracing::info!(hash = %commit.hash, "ledger seeded");
    Ok(commit)
}

// ── ingest ──

pub fn ingest<R: BufRead>(
    paths: &StatePaths,
    reader: R,
    explicit_ref: Option<&str>,
    repo: Option<&Path>,
) -> anyhow::Result<()> {
    let config = Config::load(paths)?;
    let source = source_repo(&config, repo)?;
    let tracked = tracked_ref(&config, explicit_ref);

    let (_lock, store) = open_locked(paths)?;
    let report = LedgerBuilder::new(&store, &source).ingest_ref_updates(reader, &tracked)?;
    tracing::info!(
        staged = report.staged_links,
        skipped = report.skipped_lines,
        failed = report.failed_ranges,
        appended = report.advance.appended.len(),
        "ingested ref updates"
    );
    if report.failed_ranges > 0 {
        println!(
            "{} range(s) could not be listed; run `revmirror catch-up` once the repository has them",
            report.failed_ranges
        );
    }
    print_advance(&report.advance);
    Ok(())
}

// ── catch-up ──

pub fn catch_up(
    paths: &StatePaths,
    explicit_ref: Option<&str>,
    repo: Option<&Path>,
) -> anyhow::Result<()> {
    let config = Config::load(paths)?;
    let source = source_repo(&config, repo)?;
    let tracked = tracked_ref(&config, explicit_ref);

    let (_lock, store) = open_locked(paths)?;
    let report = LedgerBuilder::new(&store, &source).catch_up(&tracked)?;
    print_advance(&report);
    Ok(())
}

fn print_advance(report: &AdvanceReport) {
    println!(
        "Appended {} commit(s); tail {}",
        report.appended.len(),
        report.tail
    );
    if report.has_gap() {
        println!(
            "{} staged link(s) waiting for a missing range",
            report.waiting
        );
    }
}
