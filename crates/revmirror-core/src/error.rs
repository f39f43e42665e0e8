use thiserror::Error;

/// Failure taxonomy shared by the ledger builder, the mirror worker and the
/// webhook gate.
#[derive(Debug, Error)]
pub enum Error {
    /// Request did not arrive over a secure channel.
    #[error("TLS required")]
    Transport,

    /// Required settings are missing; an operator has to fix the deployment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or mismatching request signature.
    #[error("{0}")]
    Auth(String),

    /// Unparseable payload or unknown event.
    #[error("{0}")]
    Protocol(String),

    /// Unknown or nonexistent repository.
    #[error("Invalid repo: {0}")]
    Validation(String),

    /// An external command failed; the caller may retry.
    #[error("{operation} failed: {detail}")]
    TransientExternal {
        operation: &'static str,
        detail: String,
    },

    /// Persistent state is unusable without operator intervention.
    #[error("{0}")]
    FatalState(String),

    #[error("invalid commit id: {0:?}")]
    InvalidCommitId(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transient(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::TransientExternal {
            operation,
            detail: detail.into(),
        }
    }

    /// Whether the next trigger should simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientExternal { .. } | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_messages_are_plain_text() {
        assert_eq!(Error::Transport.to_string(), "TLS required");
        assert_eq!(
            Error::Validation("reactos".into()).to_string(),
            "Invalid repo: reactos"
        );
        assert_eq!(
            Error::Auth("Invalid signature".into()).to_string(),
            "Invalid signature"
        );
    }

    #[test]
    fn only_external_failures_are_retryable() {
        assert!(Error::transient("git rev-list", "exit 128").is_retryable());
        assert!(!Error::FatalState("empty ledger".into()).is_retryable());
        assert!(!Error::Transport.is_retryable());
    }
}
