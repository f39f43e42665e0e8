use std::path::{Path, PathBuf};

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "REVMIRROR_STATE_DIR";

/// All well-known paths under the state directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub config_json: PathBuf,
    pub ledger_db: PathBuf,
    pub ledger_lock: PathBuf,
    pub repos_dir: PathBuf,
}

impl StatePaths {
    /// Derive all paths from a state root. Pure computation, no I/O.
    pub fn discover(state_root: impl Into<PathBuf>) -> Self {
        let root = state_root.into();
        Self {
            config_json: root.join("revmirror.json"),
            ledger_db: root.join("ledger.db"),
            ledger_lock: root.join("ledger.lock"),
            repos_dir: root.join("repos"),
            root,
        }
    }

    /// `$REVMIRROR_STATE_DIR`, else the per-user data dir.
    pub fn from_env() -> Self {
        match std::env::var_os(STATE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::discover(dir),
            _ => Self::discover(default_state_root()),
        }
    }

    /// Create the state root and `repos/`. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.repos_dir)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.root.is_dir()
    }

    /// Per-repository worker paths under `repos/<repo>/`.
    pub fn repo(&self, repo: &str) -> RepoPaths {
        RepoPaths::new(self.repos_dir.join(repo))
    }
}

/// Files owned by one repository's mirror worker.
#[derive(Debug, Clone)]
pub struct RepoPaths {
    pub dir: PathBuf,
    pub lock_file: PathBuf,
    pub log_file: PathBuf,
    pub queue_json: PathBuf,
}

impl RepoPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            lock_file: dir.join("worker.lock"),
            log_file: dir.join("remote-update.log"),
            queue_json: dir.join("queue.json"),
            dir,
        }
    }

    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

fn default_state_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("revmirror")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".revmirror")
    } else {
        PathBuf::from(".revmirror")
    }
}

/// A repository name is usable as a single path component.
pub fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).components().count() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_builds_correct_paths() {
        let p = StatePaths::discover("/var/lib/revmirror");
        assert_eq!(p.ledger_db, PathBuf::from("/var/lib/revmirror/ledger.db"));
        assert_eq!(p.ledger_lock, PathBuf::from("/var/lib/revmirror/ledger.lock"));
        assert_eq!(
            p.config_json,
            PathBuf::from("/var/lib/revmirror/revmirror.json")
        );

        let r = p.repo("reactos");
        assert_eq!(r.dir, PathBuf::from("/var/lib/revmirror/repos/reactos"));
        assert_eq!(
            r.lock_file,
            PathBuf::from("/var/lib/revmirror/repos/reactos/worker.lock")
        );
        assert_eq!(
            r.log_file,
            PathBuf::from("/var/lib/revmirror/repos/reactos/remote-update.log")
        );
        assert_eq!(
            r.queue_json,
            PathBuf::from("/var/lib/revmirror/repos/reactos/queue.json")
        );
    }

    #[test]
    fn ensure_layout_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let p = StatePaths::discover(tmp.path().join("state"));
        assert!(!p.is_initialized());
        p.ensure_layout().unwrap();
        assert!(p.is_initialized());
        assert!(p.repos_dir.is_dir());
        p.repo("web").ensure_layout().unwrap();
        assert!(p.repos_dir.join("web").is_dir());
    }

    #[test]
    fn plain_components_only() {
        assert!(is_plain_component("reactos"));
        assert!(is_plain_component("rosapps.v2"));
        assert!(!is_plain_component(""));
        assert!(!is_plain_component(".."));
        assert!(!is_plain_component("a/b"));
        assert!(!is_plain_component("..\\x"));
    }
}
