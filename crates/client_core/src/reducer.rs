//! State machine core: folds events into the published `UpdatesState`.

use chrono::{DateTime, Utc};
use shared::protocol::RawContext;

use crate::{
    normalizer::{normalize, NormalizedUpdates},
    types::{UpdatesEvent, UpdatesState},
};

pub fn reduce_event(state: &UpdatesState, event: &UpdatesEvent, now: DateTime<Utc>) -> UpdatesState {
    match event {
        UpdatesEvent::StateChange(context) => reduce_context(state, context, now),
        UpdatesEvent::Error(error) => UpdatesState {
            error: Some(error.clone()),
            ..state.clone()
        },
        UpdatesEvent::ReadLogEntriesComplete(entries) => UpdatesState {
            log_entries: Some(entries.clone()),
            ..state.clone()
        },
    }
}

/// A checking context only flips `is_checking` and stamps the check time;
/// every other field of that context is ignored, and prior state (including
/// an in-flight `is_downloading`) is kept. Any other context is authoritative
/// for the four phase flags, the two update slots and `error`.
pub fn reduce_context(state: &UpdatesState, context: &RawContext, now: DateTime<Utc>) -> UpdatesState {
    if context.is_checking.unwrap_or(false) {
        return UpdatesState {
            is_checking: true,
            last_check_for_update_time_since_restart: Some(now),
            ..state.clone()
        };
    }

    let NormalizedUpdates {
        available_update,
        downloaded_update,
    } = normalize(context);
    let is_rollback = available_update
        .as_ref()
        .is_some_and(|update| update.is_rollback);

    UpdatesState {
        is_checking: false,
        is_downloading: context.is_downloading.unwrap_or(false),
        is_update_available: context.is_update_available.unwrap_or(false),
        is_update_pending: context.is_update_pending.unwrap_or(false) || is_rollback,
        available_update,
        downloaded_update,
        error: context
            .check_error
            .clone()
            .or_else(|| context.download_error.clone()),
        ..state.clone()
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
