use std::fmt;

use shared::error::UpdatesErrorPayload;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOperation {
    CheckForUpdate,
    DownloadUpdate,
    ReadLogEntries,
    Reload,
}

impl NativeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            NativeOperation::CheckForUpdate => "check_for_update",
            NativeOperation::DownloadUpdate => "download_update",
            NativeOperation::ReadLogEntries => "read_log_entries",
            NativeOperation::Reload => "reload",
        }
    }

    /// Error code the engine itself uses for a failure of this call.
    pub fn error_code(self) -> &'static str {
        match self {
            NativeOperation::CheckForUpdate => "ERR_UPDATES_CHECK",
            NativeOperation::DownloadUpdate => "ERR_UPDATES_FETCH",
            NativeOperation::ReadLogEntries => "ERR_UPDATES_READ_LOGS",
            NativeOperation::Reload => "ERR_UPDATES_RELOAD",
        }
    }
}

impl fmt::Display for NativeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum UpdatesClientError {
    #[error("event channel must be initialized before events are published")]
    NotInitialized,
    #[error("native {operation} call failed: {message}")]
    NativeCall {
        operation: NativeOperation,
        message: String,
    },
    #[error("malformed {field} in native state change: {source}")]
    MalformedContext {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl UpdatesClientError {
    pub fn native(operation: NativeOperation, source: &anyhow::Error) -> Self {
        Self::NativeCall {
            operation,
            message: format!("{source:#}"),
        }
    }

    /// The form in which this error is surfaced through published state.
    pub fn to_payload(&self) -> UpdatesErrorPayload {
        match self {
            UpdatesClientError::NativeCall { operation, message } => {
                UpdatesErrorPayload::with_code(operation.error_code(), message.clone())
            }
            other => UpdatesErrorPayload::new(other.to_string()),
        }
    }
}
