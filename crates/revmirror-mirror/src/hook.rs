use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use revmirror_core::PendingAction;

/// Downstream consumer of queued push notifications.
pub trait HookDispatcher {
    fn dispatch(&self, action: &PendingAction) -> anyhow::Result<()>;
}

/// Runs `<repo>/hooks/post-receive` exactly as git would after a push:
/// one `before after ref` line on stdin, output discarded.
#[derive(Debug, Clone)]
pub struct PostReceiveHook {
    repo_path: PathBuf,
}

impl PostReceiveHook {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn hook_path(&self) -> PathBuf {
        self.repo_path.join("hooks").join("post-receive")
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}

impl HookDispatcher for PostReceiveHook {
    fn dispatch(&self, action: &PendingAction) -> anyhow::Result<()> {
        let hook = self.hook_path();
        let mut child = Command::new(&hook)
            .current_dir(&self.repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("cannot run {}: {e}", hook.display()))?;

        let written = child
            .stdin
            .take()
            .map(|mut stdin| stdin.write_all(action.hook_line().as_bytes()))
            .transpose();
        // Always reap the child, even when it stopped reading early.
        let status = child.wait()?;
        if !status.success() {
            anyhow::bail!(
                "{} exited with code {}",
                hook.display(),
                status.code().unwrap_or(-1)
            );
        }
        match written {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                tracing::debug!(hook = %hook.display(), "hook exited without reading stdin");
            }
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        tracing::debug!(after = %action.after, ref_name = %action.ref_name, "post-receive ran");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install_hook(repo: &Path, script: &str) {
        let hooks = repo.join("hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let path = hooks.join("post-receive");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn hook_receives_line_on_stdin() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("received.txt");
        install_hook(
            tmp.path(),
            &format!("#!/bin/sh\ncat >> '{}'\n", out.display()),
        );

        let hook = PostReceiveHook::new(tmp.path());
        hook.dispatch(&PendingAction::new("aaaa", "bbbb", "refs/heads/master"))
            .unwrap();
        hook.dispatch(&PendingAction::new("bbbb", "cccc", "refs/heads/master"))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "aaaa bbbb refs/heads/master\nbbbb cccc refs/heads/master\n"
        );
    }

    #[test]
    fn failing_hook_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        install_hook(tmp.path(), "#!/bin/sh\ncat > /dev/null\nexit 3\n");
        let err = PostReceiveHook::new(tmp.path())
            .dispatch(&PendingAction::new("aaaa", "bbbb", "refs/heads/master"))
            .unwrap_err();
        assert!(err.to_string().contains("code 3"));
    }

    #[test]
    fn hook_that_ignores_stdin_is_judged_by_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let hook = PostReceiveHook::new(tmp.path());
        let action = PendingAction::new("aaaa", "bbbb", "refs/heads/master");

        install_hook(tmp.path(), "#!/bin/sh\nexit 0\n");
        hook.dispatch(&action).unwrap();

        install_hook(tmp.path(), "#!/bin/sh\nexit 5\n");
        let err = hook.dispatch(&action).unwrap_err();
        assert!(err.to_string().contains("code 5"));
    }

    #[test]
    fn missing_hook_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(PostReceiveHook::new(tmp.path())
            .dispatch(&PendingAction::new("aaaa", "bbbb", "refs/heads/master"))
            .is_err());
    }
}
