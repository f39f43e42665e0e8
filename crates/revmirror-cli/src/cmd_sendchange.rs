use std::io::BufRead;
use std::path::Path;

use revmirror_core::GitRepo;
use revmirror_mirror::{send_ref_updates, BuildbotSendchange};
use revmirror_store::{Config, StatePaths};

/// `revmirror sendchange`: post-receive consumer that notifies buildbot.
pub fn execute<R: BufRead>(
    paths: &StatePaths,
    reader: R,
    explicit_ref: Option<&str>,
    repo: Option<&Path>,
    program: Option<&Path>,
) -> anyhow::Result<()> {
    let config = Config::load(paths)?;
    let tracked = explicit_ref.map_or_else(|| config.tracked_ref.clone(), str::to_string);
    let dir = match repo {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let mut sender = BuildbotSendchange::new(&config.buildbot_master, &config.buildbot_repository);
    if let Some(program) = program {
        sender = sender.with_program(program);
    }

    let report = send_ref_updates(reader, &tracked, &GitRepo::new(dir), &sender)?;
    tracing::info!(
        sent = report.sent,
        skipped = report.skipped_lines,
        failed = report.failed,
        master = %config.buildbot_master,
        "sendchange finished"
    );
    if report.failed > 0 {
        anyhow::bail!("{} change(s) could not be sent", report.failed);
    }
    Ok(())
}
