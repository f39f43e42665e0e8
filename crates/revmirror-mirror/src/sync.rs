use std::time::Duration;

use revmirror_core::RemoteFetcher;

use crate::attempt_log::AttemptLog;
use crate::RepoLock;

/// Retry policy for the remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub max_attempts: u32,
    /// Fixed wait between attempts. No growth, no jitter.
    pub backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, last_exit_code: i32 },
}

impl SyncStatus {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Retries the remote fetch for one repository and records every attempt.
pub struct Synchronizer<'a, F: RemoteFetcher + ?Sized> {
    fetcher: &'a F,
    log: &'a AttemptLog,
    options: SyncOptions,
}

impl<'a, F: RemoteFetcher + ?Sized> Synchronizer<'a, F> {
    pub fn new(fetcher: &'a F, log: &'a AttemptLog, options: SyncOptions) -> Self {
        Self {
            fetcher,
            log,
            options,
        }
    }

    /// Run up to `max_attempts` fetches, stopping at the first exit code 0.
    ///
    /// Must be called inside the repository's critical section.
    pub fn synchronize(&self, _lock: &RepoLock) -> SyncStatus {
        self.log.reset();
        let max = self.options.max_attempts.max(1);
        let mut last_exit_code = -1;

        for attempt in 0..max {
            if attempt > 0 && !self.options.backoff.is_zero() {
                std::thread::sleep(self.options.backoff);
            }
            self.log.attempt_header(attempt);
            tracing::info!(attempt, "remote update");

            last_exit_code = match self.fetcher.fetch_remote() {
                Ok(out) => {
                    self.log.output(&out.output);
                    out.exit_code
                }
                Err(e) => {
                    self.log.output(format!("{e}\n").as_bytes());
                    -1
                }
            };
            if last_exit_code == 0 {
                return SyncStatus::Succeeded {
                    attempts: attempt + 1,
                };
            }
            self.log.failure(last_exit_code);
            tracing::warn!(attempt, exit_code = last_exit_code, "remote update failed");
        }

        tracing::error!(attempts = max, "remote update failed on every attempt");
        SyncStatus::Failed {
            attempts: max,
            last_exit_code,
        }
    }
}
