//! Reports commits pushed to the tracked branch to a buildbot master.
//!
//! Installed as (or called from) a mirror's post-receive hook, this is the
//! consumer the pending queue replays pushes into.

use std::ffi::OsString;
use std::io::{BufRead, ErrorKind, Write};
use std::process::{Command, Stdio};

use revmirror_core::{CommitId, GitRepo, RefUpdate};

/// Category given to changes that touch the regression test suite.
pub const ROSTESTS_CATEGORY: &str = "rostests";

/// One commit as buildbot sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub revision: CommitId,
    pub author: String,
    /// Commit message with git's four-space indent removed.
    pub comments: String,
    pub files: Vec<String>,
}

impl ChangeSet {
    /// Parse `git show --raw --pretty=full` output.
    pub fn parse(revision: CommitId, show_raw: &str) -> Self {
        let mut author = String::new();
        let mut comments = String::new();
        let mut files = Vec::new();

        for line in show_raw.lines() {
            if let Some(text) = line.strip_prefix("    ") {
                comments.push_str(text);
                comments.push('\n');
            } else if let Some(path) = raw_diff_path(line) {
                files.push(path.to_string());
            } else if let Some(who) = line.strip_prefix("Author:") {
                author = who.trim().to_string();
            }
        }

        Self {
            revision,
            author,
            comments,
            files,
        }
    }

    pub fn category(&self) -> Option<&'static str> {
        self.files
            .iter()
            .any(|f| f.contains("/rostests/"))
            .then_some(ROSTESTS_CATEGORY)
    }
}

/// Path from a `:100644 100644 <sha> <sha> M\tpath` line. Renames and
/// copies report the destination path.
fn raw_diff_path(line: &str) -> Option<&str> {
    let (header, paths) = line.strip_prefix(':')?.split_once('\t')?;
    let status = header.split_whitespace().last()?;
    if !status.starts_with(['M', 'A', 'D', 'T', 'R', 'C']) {
        return None;
    }
    paths.rsplit('\t').next().filter(|p| !p.is_empty())
}

/// Where change descriptions come from.
pub trait ChangeSource {
    fn change_of(&self, revision: &CommitId) -> anyhow::Result<ChangeSet>;
}

impl ChangeSource for GitRepo {
    fn change_of(&self, revision: &CommitId) -> anyhow::Result<ChangeSet> {
        let raw = self.show_raw(revision)?;
        Ok(ChangeSet::parse(revision.clone(), &raw))
    }
}

/// Where change descriptions go.
pub trait ChangeSink {
    fn send(&self, change: &ChangeSet) -> anyhow::Result<()>;
}

/// `buildbot sendchange`, with the commit message on stdin.
#[derive(Debug, Clone)]
pub struct BuildbotSendchange {
    program: OsString,
    master: String,
    repository: String,
}

impl BuildbotSendchange {
    pub fn new(master: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            program: "buildbot".into(),
            master: master.into(),
            repository: repository.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn args(&self, change: &ChangeSet) -> Vec<String> {
        let mut args = vec!["sendchange".to_string()];
        if let Some(category) = change.category() {
            args.push("--category".to_string());
            args.push(category.to_string());
        }
        args.extend(
            [
                "--logfile",
                "-",
                "--master",
                self.master.as_str(),
                "--repository",
                self.repository.as_str(),
                "--revision",
                change.revision.as_str(),
                "--who",
                change.author.as_str(),
                "--vc",
                "git",
            ]
            .map(str::to_string),
        );
        args.extend(change.files.iter().cloned());
        args
    }
}

impl ChangeSink for BuildbotSendchange {
    fn send(&self, change: &ChangeSet) -> anyhow::Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args(change))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("cannot run {:?}: {e}", self.program))?;

        let written = child
            .stdin
            .take()
            .map(|mut stdin| stdin.write_all(change.comments.as_bytes()))
            .transpose();
        let status = child.wait()?;
        if !status.success() {
            anyhow::bail!(
                "buildbot sendchange exited with code {}",
                status.code().unwrap_or(-1)
            );
        }
        match written {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub skipped_lines: usize,
    pub failed: usize,
}

/// Send one change per `old new ref` line on `tracked_ref`.
///
/// Deletions and commits that change no files are skipped. A failure for
/// one line is logged and counted and the rest are still sent.
pub fn send_ref_updates<R, S, K>(
    reader: R,
    tracked_ref: &str,
    source: &S,
    sink: &K,
) -> anyhow::Result<SendReport>
where
    R: BufRead,
    S: ChangeSource + ?Sized,
    K: ChangeSink + ?Sized,
{
    let mut report = SendReport::default();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let update: RefUpdate = match line.parse() {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(line = %line, error = %e, "ignoring malformed ref update");
                report.skipped_lines += 1;
                continue;
            }
        };
        if update.ref_name != tracked_ref || update.new.is_null() {
            report.skipped_lines += 1;
            continue;
        }

        let change = match source.change_of(&update.new) {
            Ok(change) => change,
            Err(e) => {
                tracing::warn!(revision = %update.new, error = %e, "cannot describe commit");
                report.failed += 1;
                continue;
            }
        };
        if change.files.is_empty() {
            tracing::debug!(revision = %update.new, "no changed files, not sending");
            report.skipped_lines += 1;
            continue;
        }
        match sink.send(&change) {
            Ok(()) => {
                tracing::info!(
                    revision = %change.revision,
                    files = change.files.len(),
                    category = change.category().unwrap_or("-"),
                    "change sent"
                );
                report.sent += 1;
            }
            Err(e) => {
                tracing::warn!(revision = %change.revision, error = %e, "sendchange failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const SHOW_RAW: &str = "\
commit 2222222222222222222222222222222222222222
Author: Jane Dev <jane@example.org>
Commit: Jane Dev <jane@example.org>

    [KERNEL32_APITEST] Add a test for GetFullPathName
\x20\x20\x20\x20
    Also fix a typo.

:100644 100644 1111111 2222222 M\tmodules/rostests/apitests/kernel32/path.c
:000000 100644 0000000 3333333 A\tmodules/rostests/apitests/kernel32/testlist.c
:100644 000000 4444444 0000000 D\tdll/win32/kernel32/old.c
:100644 100644 5555555 6666666 R087\tsdk/a.h\tsdk/b.h
";

    fn id(s: &str) -> CommitId {
        s.parse().unwrap()
    }

    fn change(files: &[&str]) -> ChangeSet {
        ChangeSet {
            revision: id("abcd1234"),
            author: "Jane Dev <jane@example.org>".into(),
            comments: "Fix\n".into(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn parses_author_message_and_files() {
        let c = ChangeSet::parse(id("2222"), SHOW_RAW);
        assert_eq!(c.author, "Jane Dev <jane@example.org>");
        assert_eq!(
            c.comments,
            "[KERNEL32_APITEST] Add a test for GetFullPathName\n\nAlso fix a typo.\n"
        );
        assert_eq!(
            c.files,
            vec![
                "modules/rostests/apitests/kernel32/path.c",
                "modules/rostests/apitests/kernel32/testlist.c",
                "dll/win32/kernel32/old.c",
                "sdk/b.h",
            ]
        );
    }

    #[test]
    fn rostests_paths_set_the_category() {
        assert_eq!(
            change(&["modules/rostests/winetests/foo.c", "ntoskrnl/ke/bug.c"]).category(),
            Some(ROSTESTS_CATEGORY)
        );
        assert_eq!(change(&["ntoskrnl/ke/bug.c"]).category(), None);
        assert_eq!(change(&["rostests.txt"]).category(), None);
    }

    #[test]
    fn sendchange_arguments() {
        let sender = BuildbotSendchange::new("localhost:9990", "git://example.org/r.git");
        let args = sender.args(&change(&["modules/rostests/x.c", "a b.c"]));
        assert_eq!(
            args,
            vec![
                "sendchange",
                "--category",
                "rostests",
                "--logfile",
                "-",
                "--master",
                "localhost:9990",
                "--repository",
                "git://example.org/r.git",
                "--revision",
                "abcd1234",
                "--who",
                "Jane Dev <jane@example.org>",
                "--vc",
                "git",
                "modules/rostests/x.c",
                "a b.c",
            ]
        );
        assert!(!sender.args(&change(&["boot/x.c"])).contains(&"--category".to_string()));
    }

    struct FakeRepo(HashMap<CommitId, ChangeSet>);

    impl ChangeSource for FakeRepo {
        fn change_of(&self, revision: &CommitId) -> anyhow::Result<ChangeSet> {
            self.0
                .get(revision)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown revision {revision}"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<CommitId>>,
        refuse: Option<CommitId>,
    }

    impl ChangeSink for Recorder {
        fn send(&self, change: &ChangeSet) -> anyhow::Result<()> {
            if self.refuse.as_ref() == Some(&change.revision) {
                anyhow::bail!("master unreachable");
            }
            self.sent.borrow_mut().push(change.revision.clone());
            Ok(())
        }
    }

    #[test]
    fn only_tracked_ref_with_files_is_sent() {
        let mut known = HashMap::new();
        for (rev, files) in [("bbbb", vec!["a.c"]), ("cccc", vec![]), ("dddd", vec!["d.c"])] {
            let mut c = change(&files);
            c.revision = id(rev);
            known.insert(id(rev), c);
        }
        let repo = FakeRepo(known);
        let sink = Recorder {
            refuse: Some(id("dddd")),
            ..Recorder::default()
        };
        let input = "\
aaaa bbbb refs/heads/master
aaaa bbbb refs/heads/feature
bbbb cccc refs/heads/master
cccc eeee refs/heads/master
not a line
cccc dddd refs/heads/master
dddd 0000000000000000000000000000000000000000 refs/heads/master
";
        let report = send_ref_updates(input.as_bytes(), "refs/heads/master", &repo, &sink).unwrap();
        assert_eq!(*sink.sent.borrow(), vec![id("bbbb")]);
        assert_eq!(
            report,
            SendReport {
                sent: 1,
                skipped_lines: 4,
                failed: 2,
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn runs_program_with_message_on_stdin() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("buildbot");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{0}/args'\ncat > '{0}/log'\n",
                tmp.path().display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sender = BuildbotSendchange::new("m:1", "r").with_program(&script);
        sender.send(&change(&["modules/rostests/t.c"])).unwrap();

        let args = std::fs::read_to_string(tmp.path().join("args")).unwrap();
        assert!(args.starts_with("sendchange\n--category\nrostests\n"));
        assert!(args.ends_with("--vc\ngit\nmodules/rostests/t.c\n"));
        assert_eq!(std::fs::read_to_string(tmp.path().join("log")).unwrap(), "Fix\n");
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("buildbot");
        std::fs::write(&script, "#!/bin/sh\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = BuildbotSendchange::new("m:1", "r")
            .with_program(&script)
            .send(&change(&["a.c"]))
            .unwrap_err();
        assert!(err.to_string().contains("code 2"));
    }

    #[test]
    fn describes_real_commit() {
        use std::path::Path;

        fn git(dir: &Path, args: &[&str]) -> String {
            let out = Command::new("git").args(args).current_dir(dir).output().unwrap();
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "dev@example.org"]);
        git(dir, &["config", "user.name", "Dev Eloper"]);
        std::fs::create_dir_all(dir.join("modules/rostests")).unwrap();
        std::fs::write(dir.join("modules/rostests/t.c"), "int x;\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "Add a test\n\nWith a body."]);
        let head = git(dir, &["rev-parse", "HEAD"]);

        let c = GitRepo::new(dir).change_of(&id(&head)).unwrap();
        assert_eq!(c.author, "Dev Eloper <dev@example.org>");
        assert_eq!(c.files, vec!["modules/rostests/t.c"]);
        assert_eq!(c.comments, "Add a test\n\nWith a body.\n");
        assert_eq!(c.category(), Some(ROSTESTS_CATEGORY));
    }
}
