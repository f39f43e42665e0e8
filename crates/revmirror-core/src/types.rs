use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::Error;

/// Default branch whose history is recorded in the ledger.
pub const DEFAULT_TRACKED_REF: &str = "refs/heads/master";

/// A commit identifier as printed by git (abbreviated or full hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// GitHub and git use the all-zero id for "no commit" (branch creation/deletion).
    pub fn is_null(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }
}

impl FromStr for CommitId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let well_formed =
            (4..=64).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(Error::InvalidCommitId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for CommitId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything reachable from `new` but not from `old`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub old: CommitId,
    pub new: CommitId,
}

impl RevisionRange {
    pub fn new(old: CommitId, new: CommitId) -> Self {
        Self { old, new }
    }
}

/// A single-step chain link waiting to be folded into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TodoEntry {
    pub old: CommitId,
    pub new: CommitId,
}

/// Commit metadata as reported by the revision source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub author_name: String,
    pub author_email: String,
    pub timestamp: OffsetDateTime,
    /// Raw message bytes; git does not guarantee an encoding.
    pub message: Vec<u8>,
}

/// A canonical ledger commit. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub hash: CommitId,
    pub author_name: String,
    pub author_email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(serialize_with = "lossy_text")]
    pub message: Vec<u8>,
}

impl Commit {
    pub fn from_meta(hash: CommitId, meta: CommitMeta) -> Self {
        Self {
            hash,
            author_name: meta.author_name,
            author_email: meta.author_email,
            timestamp: meta.timestamp,
            message: meta.message,
        }
    }

    /// The message for display. Invalid UTF-8 becomes U+FFFD.
    pub fn message_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    /// First line of the commit message, for display.
    pub fn subject(&self) -> Cow<'_, str> {
        let first = self.message.split(|&b| b == b'\n').next().unwrap_or_default();
        String::from_utf8_lossy(first.strip_suffix(b"\r").unwrap_or(first))
    }
}

fn lossy_text<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// A ledger row: the commit plus its insertion sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub seq: i64,
    #[serde(flatten)]
    pub commit: Commit,
}

/// One queued post-receive invocation, recorded per push notification.
///
/// `before`/`after` stay raw strings: pushes that create or delete a branch
/// carry the all-zero id and the downstream hook expects them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub before: String,
    pub after: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

impl PendingAction {
    pub fn new(
        before: impl Into<String>,
        after: impl Into<String>,
        ref_name: impl Into<String>,
    ) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            ref_name: ref_name.into(),
        }
    }

    /// The line a post-receive hook reads on stdin.
    pub fn hook_line(&self) -> String {
        format!("{} {} {}\n", self.before, self.after, self.ref_name)
    }
}

/// One `old new ref` line as delivered to a post-receive hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old: CommitId,
    pub new: CommitId,
    pub ref_name: String,
}

impl FromStr for RefUpdate {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(old), Some(new), Some(ref_name)) => Ok(Self {
                old: old.parse()?,
                new: new.parse()?,
                ref_name: ref_name.to_string(),
            }),
            _ => Err(Error::Protocol(format!("malformed ref update line: {line:?}"))),
        }
    }
}
