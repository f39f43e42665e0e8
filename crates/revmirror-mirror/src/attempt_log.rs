//! Human-readable log of the latest mirror update.
//!
//! Truncated at the start of every synchronize run, then appended to per
//! attempt. Write failures are logged and otherwise ignored: the log is a
//! diagnostic aid, never a reason to abort an update.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct AttemptLog {
    path: PathBuf,
}

impl AttemptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh log for this run.
    pub fn reset(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&self.path, b"") {
            tracing::warn!(log = %self.path.display(), error = %e, "cannot reset attempt log");
        }
    }

    pub fn attempt_header(&self, attempt: u32) {
        self.append(format!("================ ATTEMPT {attempt} ================\n").as_bytes());
    }

    /// Raw output of the fetch command.
    pub fn output(&self, output: &[u8]) {
        self.append(output);
    }

    pub fn failure(&self, exit_code: i32) {
        self.append(format!("remote update exited with code {exit_code}\n\n").as_bytes());
    }

    pub fn read(&self) -> String {
        fs::read_to_string(&self.path).unwrap_or_default()
    }

    fn append(&self, data: &[u8]) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(data));
        if let Err(e) = result {
            tracing::warn!(log = %self.path.display(), error = %e, "cannot write attempt log");
        }
    }
}
