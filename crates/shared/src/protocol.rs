use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{LogEntryCode, LogEntryLevel, ReleaseChannel, RuntimeVersion, UpdateId},
    error::UpdatesErrorPayload,
};

/// Metadata describing one fetchable update bundle. Kept as the raw JSON
/// object the engine delivered; only a few well-known keys are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub Map<String, Value>);

impl Manifest {
    pub fn from_json(encoded: &str) -> serde_json::Result<Self> {
        serde_json::from_str(encoded)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn id(&self) -> Option<UpdateId> {
        self.get("id").and_then(Value::as_str).map(UpdateId::from)
    }

    /// `createdAt` when set, otherwise the legacy `publishedTime`.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.timestamp_value("createdAt") {
            Some(value) => parse_timestamp(value),
            None => self.timestamp_value("publishedTime").and_then(parse_timestamp),
        }
    }

    fn timestamp_value(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|value| match value {
            Value::String(raw) => !raw.is_empty(),
            Value::Number(_) => true,
            _ => false,
        })
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// One snapshot of the native state machine context. Every field is optional;
/// unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_checking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_downloading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_update_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_update_pending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_rollback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_restarting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_manifest_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_manifest_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_error: Option<UpdatesErrorPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_error: Option<UpdatesErrorPayload>,
}

impl RawContext {
    /// The context of an engine that has not done anything yet.
    pub fn idle() -> Self {
        Self {
            is_checking: Some(false),
            is_downloading: Some(false),
            is_update_available: Some(false),
            is_update_pending: Some(false),
            is_rollback: Some(false),
            is_restarting: Some(false),
            ..Self::default()
        }
    }

    /// Fields set on `self` win; everything else comes from `base`.
    pub fn merged_over(self, base: RawContext) -> RawContext {
        RawContext {
            is_checking: self.is_checking.or(base.is_checking),
            is_downloading: self.is_downloading.or(base.is_downloading),
            is_update_available: self.is_update_available.or(base.is_update_available),
            is_update_pending: self.is_update_pending.or(base.is_update_pending),
            is_rollback: self.is_rollback.or(base.is_rollback),
            is_restarting: self.is_restarting.or(base.is_restarting),
            latest_manifest: self.latest_manifest.or(base.latest_manifest),
            latest_manifest_string: self.latest_manifest_string.or(base.latest_manifest_string),
            downloaded_manifest: self.downloaded_manifest.or(base.downloaded_manifest),
            downloaded_manifest_string: self
                .downloaded_manifest_string
                .or(base.downloaded_manifest_string),
            check_error: self.check_error.or(base.check_error),
            download_error: self.download_error.or(base.download_error),
        }
    }
}

/// Payload broadcast by the engine on every state machine transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeStateChangeEvent {
    #[serde(default)]
    pub context: RawContext,
}

impl NativeStateChangeEvent {
    /// Some platforms deliver the whole payload JSON-encoded as a string.
    pub fn from_payload(payload: Value) -> serde_json::Result<Self> {
        match payload {
            Value::String(encoded) => serde_json::from_str(&encoded),
            other => serde_json::from_value(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: i64,
    pub message: String,
    pub code: LogEntryCode,
    pub level: LogEntryLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default)]
    pub is_rollback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub is_new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default)]
    pub is_rollback: bool,
}

/// What the engine launched at process start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentlyRunningInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<UpdateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ReleaseChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub is_embedded_launch: bool,
    pub is_emergency_launch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<RuntimeVersion>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn manifest(value: Value) -> Manifest {
        serde_json::from_value(value).expect("manifest")
    }

    #[test]
    fn created_at_prefers_created_at_over_published_time() {
        let m = manifest(json!({
            "id": "0000-2222",
            "createdAt": "2024-01-01T00:00:00Z",
            "publishedTime": "2023-06-01T00:00:00Z",
        }));
        assert_eq!(
            m.created_at().map(|t| t.to_rfc3339()),
            Some("2024-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn created_at_falls_back_to_published_time() {
        let m = manifest(json!({ "id": "legacy", "publishedTime": "2023-06-01T12:30:00.000Z" }));
        assert_eq!(
            m.created_at().map(|t| t.timestamp()),
            Some(1_685_622_600)
        );

        let empty_created = manifest(json!({ "createdAt": "", "publishedTime": 1_000 }));
        assert_eq!(
            empty_created.created_at().map(|t| t.timestamp_millis()),
            Some(1_000)
        );
    }

    #[test]
    fn created_at_is_none_without_timestamps() {
        assert_eq!(manifest(json!({ "id": "x" })).created_at(), None);
        assert_eq!(manifest(json!({ "createdAt": "not a date" })).created_at(), None);
    }

    #[test]
    fn id_ignores_non_string_values() {
        assert_eq!(manifest(json!({ "id": 12 })).id(), None);
        assert_eq!(manifest(json!({ "id": "abc" })).id(), Some(UpdateId::from("abc")));
    }

    #[test]
    fn empty_id_is_kept_as_is() {
        assert_eq!(manifest(json!({ "id": "" })).id(), Some(UpdateId::from("")));
        assert_eq!(manifest(json!({})).id(), None);
    }

    #[test]
    fn payload_decodes_from_object_and_from_string() {
        let object = json!({
            "context": { "isChecking": true, "somethingNew": 1 }
        });
        let encoded = Value::String(object.to_string());

        let from_object = NativeStateChangeEvent::from_payload(object).expect("object payload");
        let from_string = NativeStateChangeEvent::from_payload(encoded).expect("string payload");

        assert_eq!(from_object, from_string);
        assert_eq!(from_object.context.is_checking, Some(true));
        assert_eq!(from_object.context.is_downloading, None);
    }

    #[test]
    fn payload_rejects_garbage_strings() {
        assert!(NativeStateChangeEvent::from_payload(Value::String("{".into())).is_err());
    }

    #[test]
    fn merged_over_keeps_base_for_unset_fields() {
        let native = RawContext {
            is_update_available: Some(true),
            ..RawContext::default()
        };
        let merged = native.merged_over(RawContext::idle());
        assert_eq!(merged.is_update_available, Some(true));
        assert_eq!(merged.is_checking, Some(false));
        assert_eq!(merged.is_restarting, Some(false));
    }

    #[test]
    fn log_entry_keeps_unknown_codes_readable() {
        let entry: LogEntry = serde_json::from_value(json!({
            "timestamp": 100,
            "message": "Message 1",
            "code": "SomethingAddedLater",
            "level": "info",
        }))
        .expect("log entry");
        assert_eq!(entry.code, LogEntryCode::Unknown);
        assert_eq!(entry.level, LogEntryLevel::Info);

        let js_error: LogEntryCode = serde_json::from_value(json!("JSRuntimeError")).expect("code");
        assert_eq!(js_error, LogEntryCode::JsRuntimeError);
    }
}
