use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error object as carried by the engine in `checkError` / `downloadError`,
/// and as mirrored into published state when a command fails.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct UpdatesErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl UpdatesErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: None,
            code: Some(code.into()),
            message: message.into(),
        }
    }
}
