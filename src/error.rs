//! Error types for download-dispatcher
//!
//! Handlers never surface these to the engine. Every error is either logged
//! and absorbed at the handler boundary, or reported once to the user through
//! the task's [`Listener`](crate::listener::Listener).

use crate::types::{Gid, LifecycleState, TaskId};
use thiserror::Error;

/// Result type alias for download-dispatcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for download-dispatcher
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// Download engine query or command failed
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Messaging collaborator failed to send, delete or refresh a message
    #[error("messaging error: {0}")]
    Messaging(String),

    /// Remote storage listing failed
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A task record already tracks this handle
    #[error("handle {0} is already tracked by another task")]
    DuplicateGid(Gid),

    /// Lifecycle transition not allowed by the state machine
    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task whose transition was rejected
        task_id: TaskId,
        /// Current state
        from: LifecycleState,
        /// Requested state
        to: LifecycleState,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors reported by the download engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has no transfer with this handle (finished, removed or purged)
    #[error("no transfer with handle {gid}")]
    NotFound {
        /// The handle that was looked up
        gid: Gid,
    },

    /// Transport or protocol failure talking to the engine
    #[error("engine RPC failed: {0}")]
    Rpc(String),

    /// The engine understood the request but refused it
    #[error("engine rejected request for {gid}: {reason}")]
    Rejected {
        /// The handle the request targeted
        gid: Gid,
        /// Reason given by the engine
        reason: String,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error means the transfer no longer exists on the engine side
    ///
    /// Handlers treat these as a lost race rather than a failure.
    pub fn is_gone(&self) -> bool {
        matches!(self, Error::Engine(EngineError::NotFound { .. }))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_not_found_is_reported_as_gone() {
        let err = Error::from(EngineError::NotFound {
            gid: Gid::from("2089b05ecca3d829"),
        });
        assert!(err.is_gone());
        assert_eq!(
            err.to_string(),
            "engine error: no transfer with handle 2089b05ecca3d829"
        );
    }

    #[test]
    fn rpc_and_rejection_are_not_gone() {
        let rpc = Error::from(EngineError::Rpc("connection reset".into()));
        let rejected = Error::from(EngineError::Rejected {
            gid: Gid::from("g1"),
            reason: "seed-time=0".into(),
        });
        assert!(!rpc.is_gone());
        assert!(!rejected.is_gone());
        assert!(!Error::Messaging("flood wait".into()).is_gone());
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = Error::InvalidTransition {
            task_id: TaskId(7),
            from: LifecycleState::Removed,
            to: LifecycleState::Seeding,
        };
        assert_eq!(err.to_string(), "task 7 cannot move from removed to seeding");
    }

    #[test]
    fn config_helper_records_the_key() {
        match Error::config("base_url", "must be absolute") {
            Error::Config { message, key } => {
                assert_eq!(message, "must be absolute");
                assert_eq!(key.as_deref(), Some("base_url"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
