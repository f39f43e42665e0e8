//! Ordered admission checks for one webhook delivery.
//!
//! Each stage short-circuits. The order matters: nothing about the body is
//! trusted until the signature has been verified.

use std::path::PathBuf;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use revmirror_core::Error;
use revmirror_mirror::{JobEvent, WorkerJob};
use revmirror_store::paths::is_plain_component;

use crate::notification::{EventKind, Notification};
use crate::signature;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const EVENT_HEADER: &str = "x-github-event";
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// The subset of deployment settings the gate reads.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    pub project_root: Option<PathBuf>,
    pub secret: Option<String>,
    pub allow_insecure: bool,
}

impl From<&revmirror_store::Config> for GateConfig {
    fn from(config: &revmirror_store::Config) -> Self {
        Self {
            project_root: config.project_root.clone(),
            secret: config.secret.clone(),
            allow_insecure: config.allow_insecure,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Pong,
    Job(WorkerJob),
}

/// A refused delivery: status plus the short plain-text reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub reason: String,
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Transport | Error::Auth(_) => StatusCode::FORBIDDEN,
            Error::Protocol(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let reason = match err {
            Error::Config(_) => "Environment variables not set".to_string(),
            other => other.to_string(),
        };
        Self { status, reason }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status, self.reason).into_response()
    }
}

pub fn admit(
    config: &GateConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Admission, Rejection> {
    // transport
    let secure = header_str(headers, FORWARDED_PROTO_HEADER)
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
    if !secure && !config.allow_insecure {
        return Err(Error::Transport.into());
    }

    // configuration
    let (Some(project_root), Some(secret)) = (&config.project_root, &config.secret) else {
        tracing::error!("webhook received but project_root or secret is not configured");
        return Err(Error::Config("project_root and secret are required".into()).into());
    };

    // signature
    let hex_sig = signature::split_signature(header_str(headers, SIGNATURE_HEADER))?;
    if let Err(e) = signature::verify(secret.as_bytes(), body, hex_sig) {
        tracing::warn!(bytes = body.len(), "webhook signature mismatch, possible forgery");
        return Err(e.into());
    }

    // event
    let event = header_str(headers, EVENT_HEADER)
        .ok_or_else(|| Error::Protocol("No event".to_string()))?;
    match Notification::kind(event) {
        EventKind::Ping => return Ok(Admission::Pong),
        EventKind::Push | EventKind::PullRequest => {}
        EventKind::Other => {
            tracing::debug!(event, "ignoring event");
            return Err(Error::Protocol("Wrong event".to_string()).into());
        }
    }

    // payload
    let notification = Notification::decode(event, body, is_form(headers))?;

    // repository
    let repo = notification.repository().unwrap_or_default().to_string();
    let repo_path = project_root.join(format!("{repo}.git"));
    if !is_plain_component(&repo) || !repo_path.is_dir() {
        tracing::warn!(repo = %repo, "webhook for unknown repository");
        return Err(Error::Validation(repo).into());
    }

    let event = match notification {
        Notification::Push(payload) => JobEvent::Push(payload.action()),
        _ => JobEvent::PullRequest,
    };
    Ok(Admission::Job(WorkerJob {
        repo,
        repo_path,
        event,
    }))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_form(headers: &HeaderMap) -> bool {
    header_str(headers, header::CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}
