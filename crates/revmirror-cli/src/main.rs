mod cmd_config;
mod cmd_init;
mod cmd_ledger;
mod cmd_log;
mod cmd_queue;
mod cmd_sendchange;
mod cmd_serve;
mod cmd_status;
mod cmd_worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use revmirror_store::StatePaths;

#[derive(Parser)]
#[command(
    name = "revmirror",
    version,
    about = "Mirror updates on push and a linear ledger of tracked-branch commits"
)]
struct Cli {
    /// State directory (default: $REVMIRROR_STATE_DIR, else the user data dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the state directory, ledger database and default config
    Init,
    /// Record the first ledger entry
    Seed {
        /// Revision to start the ledger at (e.g. a tag or commit id)
        rev: String,
        /// Repository to read the revision from (default: config ledger_repo, else cwd)
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Read `old new ref` lines from stdin (post-receive hook) and extend the ledger
    Ingest {
        /// Only lines for this ref are staged (default: config tracked_ref)
        #[arg(long = "ref")]
        tracked_ref: Option<String>,
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Stage everything between the ledger tail and the tracked ref's tip
    CatchUp {
        #[arg(long = "ref")]
        tracked_ref: Option<String>,
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Read `old new ref` lines from stdin and report tracked-ref pushes to buildbot
    Sendchange {
        #[arg(long = "ref")]
        tracked_ref: Option<String>,
        /// Repository to describe commits from (default: cwd)
        #[arg(long)]
        repo: Option<PathBuf>,
        /// buildbot executable (default: `buildbot` on PATH)
        #[arg(long)]
        buildbot: Option<PathBuf>,
    },
    /// Update one mirror and replay queued pushes (normally started by `serve`)
    Worker {
        repo: String,
        repo_path: PathBuf,
        /// `push` or `pull_request`
        event: String,
        /// For push: <before> <after> <ref>
        push: Vec<String>,
    },
    /// Run the webhook gate
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show recent ledger entries
    Log {
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize ledger and mirror state
    Status,
    /// Show pending post-receive invocations for a repository
    Queue {
        repo: String,
        #[arg(long)]
        json: bool,
    },
    /// Manage revmirror.json
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let paths = match cli.state_dir {
        Some(dir) => StatePaths::discover(dir),
        None => StatePaths::from_env(),
    };

    match cli.cmd {
        Command::Init => cmd_init::execute(&paths),
        Command::Seed { rev, repo } => cmd_ledger::seed(&paths, &rev, repo.as_deref()),
        Command::Ingest { tracked_ref, repo } => {
            let stdin = std::io::stdin();
            cmd_ledger::ingest(
                &paths,
                stdin.lock(),
                tracked_ref.as_deref(),
                repo.as_deref(),
            )
        }
        Command::CatchUp { tracked_ref, repo } => {
            cmd_ledger::catch_up(&paths, tracked_ref.as_deref(), repo.as_deref())
        }
        Command::Sendchange {
            tracked_ref,
            repo,
            buildbot,
        } => {
            let stdin = std::io::stdin();
            cmd_sendchange::execute(
                &paths,
                stdin.lock(),
                tracked_ref.as_deref(),
                repo.as_deref(),
                buildbot.as_deref(),
            )
        }
        Command::Worker {
            repo,
            repo_path,
            event,
            push,
        } => cmd_worker::execute(&paths, repo, repo_path, &event, &push),
        Command::Serve { bind, port } => cmd_serve::execute(&paths, bind, port),
        Command::Log { limit, json } => cmd_log::execute(&paths, limit, json),
        Command::Status => cmd_status::execute(&paths),
        Command::Queue { repo, json } => cmd_queue::execute(&paths, &repo, json),
        Command::Config { cmd } => cmd_config::run(cmd, &paths),
    }
}
