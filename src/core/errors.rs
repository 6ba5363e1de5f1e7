/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process-handle errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("fork() failed. The system may be out of processes or memory.")
    )]
    SpawnFailed(String),

    #[error("Failed to create stdio pipe: {0}")]
    #[diagnostic(
        code(process::pipe_failed),
        help("The process may have run out of file descriptors.")
    )]
    PipeFailed(String),

    #[error("Invalid executable: {0}")]
    #[diagnostic(
        code(process::invalid_executable),
        help("Paths, arguments and environment entries must not contain NUL bytes.")
    )]
    InvalidExecutable(String),

    #[error("Operation '{operation}' is not supported by the '{backend}' backend")]
    #[diagnostic(
        code(process::unsupported),
        help("Use a backend that reports this capability via Backend::supports().")
    )]
    Unsupported {
        backend: String,
        operation: String,
    },

    #[error("Failed to start watcher for PID {pid}: {reason}")]
    #[diagnostic(
        code(process::watcher_failed),
        help("The system refused to create a thread. Try WatchStrategy::Shared.")
    )]
    WatcherFailed { pid: u32, reason: String },

    #[error("Failed to query status of PID {pid}: {reason}")]
    #[diagnostic(code(process::wait_failed))]
    WaitFailed { pid: u32, reason: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(process::io))]
    Io(String),
}

impl ProcessError {
    /// Error for an operation a backend does not provide
    pub fn unsupported(backend: &str, operation: &str) -> Self {
        ProcessError::Unsupported {
            backend: backend.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        ProcessError::Io(err.to_string())
    }
}

impl From<nix::errno::Errno> for ProcessError {
    fn from(err: nix::errno::Errno) -> Self {
        ProcessError::Io(err.desc().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message() {
        let err = ProcessError::unsupported("null", "spawn");
        assert_eq!(
            err.to_string(),
            "Operation 'spawn' is not supported by the 'null' backend"
        );
    }

    #[test]
    fn test_error_serialization() {
        let err = ProcessError::SpawnFailed("EAGAIN".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"error_type":"spawn_failed","details":"EAGAIN"}"#);
    }
}
