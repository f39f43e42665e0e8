//! Deployment settings, stored as `revmirror.json` in the state directory.
//!
//! `GIT_PROJECT_ROOT` and `GITHUB_SECRET` override the file so the webhook
//! can be configured the same way a CGI deployment would be.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::StatePaths;

pub const PROJECT_ROOT_ENV: &str = "GIT_PROJECT_ROOT";
pub const SECRET_ENV: &str = "GITHUB_SECRET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the mirrors as `<name>.git`.
    pub project_root: Option<PathBuf>,
    /// Pre-shared webhook secret.
    pub secret: Option<String>,
    /// Branch whose history is recorded in the ledger.
    pub tracked_ref: String,
    /// Repository the ledger reads commit metadata from.
    pub ledger_repo: Option<PathBuf>,
    pub bind: String,
    pub port: u16,
    /// Accept webhooks that did not arrive over TLS (local testing only).
    pub allow_insecure: bool,
    pub max_attempts: u32,
    pub backoff_secs: u64,
    /// `host:port` of the buildbot master that `sendchange` notifies.
    pub buildbot_master: String,
    /// Repository URL reported to buildbot with each change.
    pub buildbot_repository: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: None,
            secret: None,
            tracked_ref: "refs/heads/master".to_string(),
            ledger_repo: None,
            bind: "127.0.0.1".to_string(),
            port: 8080,
            allow_insecure: false,
            max_attempts: 5,
            backoff_secs: 3,
            buildbot_master: "localhost:9990".to_string(),
            buildbot_repository: "git://git.reactos.org/reactos.git".to_string(),
        }
    }
}

impl Config {
    /// Read `revmirror.json` (defaults if absent), then apply env overrides.
    pub fn load(paths: &StatePaths) -> anyhow::Result<Self> {
        let mut config = Self::load_file(&paths.config_json)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        Ok(crate::read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, paths: &StatePaths) -> anyhow::Result<()> {
        crate::write_json(&paths.config_json, self)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(PROJECT_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.project_root = Some(PathBuf::from(root));
        }
        if let Some(secret) = lookup(SECRET_ENV).filter(|v| !v.is_empty()) {
            self.secret = Some(secret);
        }
    }

    /// Mirror path for a repository name: `<project_root>/<name>.git`.
    pub fn repo_path(&self, repo: &str) -> Option<PathBuf> {
        self.project_root
            .as_ref()
            .map(|root| root.join(format!("{repo}.git")))
    }

    /// Repository used by `ingest`/`catch-up` when none is given explicitly.
    pub fn ledger_repo_or(&self, fallback: &Path) -> PathBuf {
        self.ledger_repo
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}
