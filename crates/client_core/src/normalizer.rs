//! Typed extraction of update information from raw native contexts.

use shared::protocol::{Manifest, RawContext};
use tracing::warn;

use crate::{error::UpdatesClientError, types::UpdateInfo};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedUpdates {
    pub available_update: Option<UpdateInfo>,
    pub downloaded_update: Option<UpdateInfo>,
}

/// Both values are `None` when the context carries neither a manifest nor a
/// rollback directive for that slot.
pub fn normalize(context: &RawContext) -> NormalizedUpdates {
    let is_rollback = context.is_rollback.unwrap_or(false);
    let latest = resolve_manifest(
        "latestManifestString",
        context.latest_manifest.as_ref(),
        context.latest_manifest_string.as_deref(),
    );
    let downloaded = resolve_manifest(
        "downloadedManifestString",
        context.downloaded_manifest.as_ref(),
        context.downloaded_manifest_string.as_deref(),
    );

    NormalizedUpdates {
        available_update: update_info(latest, is_rollback),
        downloaded_update: update_info(downloaded, is_rollback),
    }
}

pub fn update_info(manifest: Option<Manifest>, is_rollback: bool) -> Option<UpdateInfo> {
    if manifest.is_none() && !is_rollback {
        return None;
    }
    Some(UpdateInfo {
        update_id: manifest.as_ref().and_then(Manifest::id),
        created_at: manifest.as_ref().and_then(Manifest::created_at),
        manifest,
        is_rollback,
    })
}

/// Replaces every `*ManifestString` field with its decoded object form. A
/// string that does not decode leaves that manifest absent.
pub fn reconcile_manifest_strings(mut context: RawContext) -> RawContext {
    if let Some(encoded) = context.latest_manifest_string.take() {
        context.latest_manifest = decode_or_warn("latestManifestString", &encoded);
    }
    if let Some(encoded) = context.downloaded_manifest_string.take() {
        context.downloaded_manifest = decode_or_warn("downloadedManifestString", &encoded);
    }
    context
}

pub fn decode_manifest(field: &'static str, encoded: &str) -> Result<Manifest, UpdatesClientError> {
    Manifest::from_json(encoded).map_err(|source| UpdatesClientError::MalformedContext { field, source })
}

fn resolve_manifest(
    field: &'static str,
    object: Option<&Manifest>,
    encoded: Option<&str>,
) -> Option<Manifest> {
    match encoded {
        Some(encoded) => decode_or_warn(field, encoded),
        None => object.cloned(),
    }
}

fn decode_or_warn(field: &'static str, encoded: &str) -> Option<Manifest> {
    match decode_manifest(field, encoded) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            warn!(field, error = %err, "updates: treating undecodable manifest as absent");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/normalizer_tests.rs"]
mod tests;
