//! Inbound webhook events.
//!
//! Only the fields the mirror needs are modelled; everything else in the
//! sender's payload is ignored.

use revmirror_core::{Error, PendingAction};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub repository: RepoRef,
    pub before: String,
    pub after: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

impl PushPayload {
    pub fn action(&self) -> PendingAction {
        PendingAction::new(&self.before, &self.after, &self.ref_name)
    }
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    repository: RepoRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Ping,
    Push(PushPayload),
    PullRequest(RepoRef),
    Other(String),
}

impl Notification {
    /// Classify by event name alone. Payload-carrying events come back
    /// as `Other` until [`Notification::decode`] fills them in.
    pub fn kind(event: &str) -> EventKind {
        match event {
            "ping" => EventKind::Ping,
            "push" => EventKind::Push,
            "pull_request" => EventKind::PullRequest,
            _ => EventKind::Other,
        }
    }

    /// Decode the payload for a `push` or `pull_request` event.
    ///
    /// `body` is either the JSON document itself or a form body carrying it
    /// in a `payload` field, as selected by `form_encoded`.
    pub fn decode(event: &str, body: &[u8], form_encoded: bool) -> Result<Self, Error> {
        let json = if form_encoded {
            form_payload(body).ok_or_else(invalid_payload)?
        } else {
            body.to_vec()
        };
        match Self::kind(event) {
            EventKind::Ping => Ok(Self::Ping),
            EventKind::Push => serde_json::from_slice::<PushPayload>(&json)
                .map(Self::Push)
                .map_err(|_| invalid_payload()),
            EventKind::PullRequest => serde_json::from_slice::<PullRequestPayload>(&json)
                .map(|p| Self::PullRequest(p.repository))
                .map_err(|_| invalid_payload()),
            EventKind::Other => Ok(Self::Other(event.to_string())),
        }
    }

    pub fn repository(&self) -> Option<&str> {
        match self {
            Self::Push(p) => Some(&p.repository.name),
            Self::PullRequest(r) => Some(&r.name),
            Self::Ping | Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ping,
    Push,
    PullRequest,
    Other,
}

fn form_payload(body: &[u8]) -> Option<Vec<u8>> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned().into_bytes())
}

fn invalid_payload() -> Error {
    Error::Protocol("Invalid payload".to_string())
}
