//! Narrow interfaces over the version-control tool.
//!
//! The ledger builder and the mirror worker only ever talk to these traits;
//! [`GitRepo`] is the production implementation and shells out to `git`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::types::{CommitId, CommitMeta};

/// Read-only view of the commit graph.
pub trait RevisionSource {
    /// Commits reachable from `new` but not from `old`, oldest first.
    fn list_range(&self, old: &CommitId, new: &CommitId) -> Result<Vec<CommitId>>;

    /// Author, timestamp and message of a single commit.
    fn metadata_of(&self, id: &CommitId) -> Result<CommitMeta>;

    /// Resolve a ref name (or any revision expression) to a commit.
    fn resolve(&self, rev: &str) -> Result<CommitId>;
}

/// Result of one remote-fetch attempt: exit status plus everything it printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub exit_code: i32,
    pub output: Vec<u8>,
}

impl FetchOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Pulls upstream changes into a mirror.
pub trait RemoteFetcher {
    fn fetch_remote(&self) -> Result<FetchOutput>;
}

/// A local git repository (bare or not) driven through the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitRepo {
    dir: PathBuf,
}

impl GitRepo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn git(&self, operation: &'static str, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| Error::transient(operation, format!("cannot run git: {e}")))
    }

    /// `git show --raw --pretty=full`: headers, indented message and a
    /// `:mode mode sha sha status\tpath` line per changed file.
    pub fn show_raw(&self, id: &CommitId) -> Result<String> {
        self.git_stdout(
            "git show",
            &["show", "--raw", "--pretty=full", id.as_str()],
        )
    }

    fn git_bytes(&self, operation: &'static str, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.git(operation, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transient(
                operation,
                format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }
        Ok(output.stdout)
    }

    fn git_stdout(&self, operation: &'static str, args: &[&str]) -> Result<String> {
        let stdout = self.git_bytes(operation, args)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

impl RevisionSource for GitRepo {
    fn list_range(&self, old: &CommitId, new: &CommitId) -> Result<Vec<CommitId>> {
        let range = format!("{old}..{new}");
        let stdout = self.git_stdout("git rev-list", &["rev-list", "--reverse", &range])?;
        stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    fn metadata_of(&self, id: &CommitId) -> Result<CommitMeta> {
        let stdout = self.git_bytes(
            "git show",
            &[
                "show",
                "-s",
                "--encoding=none",
                "--format=%an%x00%ae%x00%ct%x00%B",
                id.as_str(),
            ],
        )?;
        parse_show_output(&stdout)
    }

    fn resolve(&self, rev: &str) -> Result<CommitId> {
        let revspec = format!("{rev}^{{commit}}");
        let stdout = self.git_stdout("git rev-parse", &["rev-parse", "--verify", &revspec])?;
        stdout.trim().parse()
    }
}

impl RemoteFetcher for GitRepo {
    fn fetch_remote(&self) -> Result<FetchOutput> {
        let out = self.git("git remote update", &["remote", "update"])?;
        let mut output = out.stdout;
        output.extend_from_slice(&out.stderr);
        Ok(FetchOutput {
            exit_code: out.status.code().unwrap_or(-1),
            output,
        })
    }
}

/// Parse `%an%x00%ae%x00%ct%x00%B` output. The message stays raw bytes.
fn parse_show_output(stdout: &[u8]) -> Result<CommitMeta> {
    let mut fields = stdout.splitn(4, |&b| b == 0);
    let (Some(name), Some(email), Some(ts), Some(message)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(Error::transient(
            "git show",
            format!("unexpected output: {:?}", String::from_utf8_lossy(stdout)),
        ));
    };
    let text = |field: &[u8]| String::from_utf8_lossy(field).trim().to_string();
    let ts = text(ts);
    let epoch: i64 = ts
        .parse()
        .map_err(|_| Error::transient("git show", format!("bad commit timestamp {ts:?}")))?;
    let timestamp = OffsetDateTime::from_unix_timestamp(epoch)
        .map_err(|e| Error::transient("git show", e.to_string()))?;
    Ok(CommitMeta {
        author_name: text(name),
        author_email: text(email),
        timestamp,
        message: message.trim_ascii().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn commit(dir: &Path, file: &str, msg: &str) -> String {
        std::fs::write(dir.join(file), msg).unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", msg]);
        git(dir, &["rev-parse", "HEAD"])
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "dev@example.org"]);
        git(dir, &["config", "user.name", "Dev Eloper"]);
    }

    #[test]
    fn parse_show_output_splits_fields() {
        let meta = parse_show_output(b"Jane\0jane@example.org\01500000000\0Subject\n\nBody\n\n")
            .unwrap();
        assert_eq!(meta.author_name, "Jane");
        assert_eq!(meta.author_email, "jane@example.org");
        assert_eq!(meta.timestamp.unix_timestamp(), 1_500_000_000);
        assert_eq!(meta.message, b"Subject\n\nBody");
    }

    #[test]
    fn parse_show_output_rejects_truncated() {
        let err = parse_show_output(b"Jane\0jane@example.org").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn list_range_and_metadata_against_real_repo() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let a = commit(dir.path(), "a.txt", "first");
        let b = commit(dir.path(), "b.txt", "second");
        let c = commit(dir.path(), "c.txt", "third");

        let repo = GitRepo::new(dir.path());
        let range = repo
            .list_range(&a.parse().unwrap(), &c.parse().unwrap())
            .unwrap();
        let got: Vec<&str> = range.iter().map(CommitId::as_str).collect();
        assert_eq!(got, vec![b.as_str(), c.as_str()]);

        let meta = repo.metadata_of(&b.parse().unwrap()).unwrap();
        assert_eq!(meta.author_name, "Dev Eloper");
        assert_eq!(meta.author_email, "dev@example.org");
        assert_eq!(meta.message, b"second");

        assert_eq!(repo.resolve("HEAD").unwrap().as_str(), c);
    }

    #[test]
    fn latin1_message_bytes_survive() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        git(dir.path(), &["add", "."]);
        std::fs::write(dir.path().join("msg"), b"caf\xe9 fix\n").unwrap();
        git(dir.path(), &["commit", "-q", "-F", "msg"]);
        let head = git(dir.path(), &["rev-parse", "HEAD"]);

        let meta = GitRepo::new(dir.path())
            .metadata_of(&head.parse().unwrap())
            .unwrap();
        assert_eq!(meta.message, b"caf\xe9 fix");
    }

    #[test]
    fn failing_git_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitRepo::new(dir.path()).resolve("HEAD").unwrap_err();
        assert!(err.is_retryable());
    }
}
