//! Error types for the notification engine.

use crate::types::NotificationId;
use thiserror::Error;

/// Failure reported by one of the backend collaborators (REST API,
/// realtime transport, push dispatcher, device registry).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The server understood the request and refused it.
    #[error("rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never produced a server answer.
    #[error("network error: {0}")]
    Network(String),

    /// The collaborator is not available in this session.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A paged load or unread-count refresh failed. Prior cache state is kept.
    #[error("fetch failed: {0}")]
    Fetch(BackendError),

    /// The server refused a read-state change. The local change was reverted.
    #[error("mutation rejected for {id}: {source}")]
    MutationRejected {
        id: NotificationId,
        #[source]
        source: BackendError,
    },

    /// The server refused a mark-all-read. The cache was resynchronized.
    #[error("mark-all-read rejected: {0}")]
    BatchRejected(BackendError),

    /// The realtime channel failed. Requires an explicit re-subscribe.
    #[error("transport error: {0}")]
    Transport(String),

    /// The realtime channel dropped. Recovered by the delayed reconnect.
    #[error("transport disconnected")]
    TransportDisconnected,

    /// The session was closed while the operation was outstanding.
    #[error("session closed")]
    SessionClosed,

    /// Another load of the same page is already running.
    #[error("page {0} is already loading")]
    LoadInProgress(u32),

    /// The last loaded page reported no successor.
    #[error("no more pages")]
    NoMorePages,

    /// The connection supervisor thread has stopped.
    #[error("connection supervisor stopped")]
    SupervisorStopped,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Short machine-readable name, used on the status stream.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(_) => "fetch",
            SyncError::MutationRejected { .. } => "mutation_rejected",
            SyncError::BatchRejected(_) => "batch_rejected",
            SyncError::Transport(_) => "transport",
            SyncError::TransportDisconnected => "transport_disconnected",
            SyncError::SessionClosed => "session_closed",
            SyncError::LoadInProgress(_) => "load_in_progress",
            SyncError::NoMorePages => "no_more_pages",
            SyncError::SupervisorStopped => "supervisor_stopped",
            SyncError::Serialization(_) => "serialization",
            SyncError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(_)
            | SyncError::TransportDisconnected
            | SyncError::LoadInProgress(_) => true,
            SyncError::MutationRejected { source, .. } => {
                !matches!(source, BackendError::Rejected { .. })
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Fetch(BackendError::Network("timeout".into())).is_retryable());
        assert!(!SyncError::SessionClosed.is_retryable());

        let rejected = SyncError::MutationRejected {
            id: NotificationId::from("n-1"),
            source: BackendError::Rejected {
                status: 403,
                message: "forbidden".into(),
            },
        };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.kind(), "mutation_rejected");
    }

    #[test]
    fn test_messages_are_lowercase() {
        let errors = [
            SyncError::Serialization("eof".into()),
            SyncError::InvalidConfig("page_size".into()),
            SyncError::Fetch(BackendError::Network("timeout".into())),
            SyncError::SessionClosed,
        ];
        for error in errors {
            let message = error.to_string();
            assert!(message.starts_with(|c: char| c.is_ascii_lowercase()), "{}", message);
        }
        assert_eq!(
            SyncError::InvalidConfig("x".into()).to_string(),
            "invalid configuration: x"
        );
    }
}
