use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::UpdateId,
    error::UpdatesErrorPayload,
    protocol::{LogEntry, Manifest, RawContext},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub update_id: Option<UpdateId>,
    pub created_at: Option<DateTime<Utc>>,
    pub manifest: Option<Manifest>,
    pub is_rollback: bool,
}

/// Snapshot handed to the UI. Never mutated after publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesState {
    pub is_checking: bool,
    pub is_downloading: bool,
    pub is_update_available: bool,
    pub is_update_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_update: Option<UpdateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_update: Option<UpdateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UpdatesErrorPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_for_update_time_since_restart: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_entries: Option<Vec<LogEntry>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatesEvent {
    /// A native context snapshot, manifest strings already decoded.
    StateChange(RawContext),
    /// A command failed at the native boundary.
    Error(UpdatesErrorPayload),
    /// A `read_log_entries` call completed.
    ReadLogEntriesComplete(Vec<LogEntry>),
}

impl UpdatesEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            UpdatesEvent::StateChange(_) => "state_change",
            UpdatesEvent::Error(_) => "error",
            UpdatesEvent::ReadLogEntriesComplete(_) => "read_log_entries_complete",
        }
    }
}
