use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::commands::TrackerState;
use crate::db::store::DocumentChange;
use crate::services::daily::{self, DaySnapshot};
use crate::services::intake::IntakeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureSlot {
    Morning,
    Evening,
}

/// Current state of the active date
pub async fn get_day(state: &TrackerState) -> Result<DaySnapshot, String> {
    let session = state.lock().map_err(|e| e.to_string())?;
    Ok(session.view.snapshot())
}

/// Switch to a date given as `YYYY-MM-DD`
pub async fn open_day(state: &TrackerState, date: String) -> Result<DaySnapshot, String> {
    let date = daily::parse_date_key(&date).map_err(|e| e.to_string())?;
    open_date(state, date).await
}

/// Move by whole days (previous/next arrows)
pub async fn shift_day(state: &TrackerState, days: i64) -> Result<DaySnapshot, String> {
    let current = state.lock().map_err(|e| e.to_string())?.view.date();
    let target = current
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| format!("Date out of range: {} + {} days", current, days))?;
    open_date(state, target).await
}

pub async fn open_date(state: &TrackerState, date: NaiveDate) -> Result<DaySnapshot, String> {
    let record = state.store.load_daily(date).await.map_err(|e| {
        log::error!("Error fetching daily data: {}", e);
        e.to_string()
    })?;
    let mut session = state.lock().map_err(|e| e.to_string())?;
    session.view.load(date, record);
    Ok(session.view.snapshot())
}

/// Flip the taken state of a medication on the active date
pub async fn toggle_medication(
    state: &TrackerState,
    rule_id: String,
) -> Result<IntakeRecord, String> {
    let mut session = state.lock().map_err(|e| e.to_string())?;
    let identity = session.identity.stamp().to_string();
    session
        .view
        .toggle(&rule_id, &identity, Utc::now())
        .map_err(|e| e.to_string())
}

pub async fn set_pressure(
    state: &TrackerState,
    slot: PressureSlot,
    value: String,
) -> Result<(), String> {
    let mut session = state.lock().map_err(|e| e.to_string())?;
    match slot {
        PressureSlot::Morning => session.view.set_morning_pressure(&value),
        PressureSlot::Evening => session.view.set_evening_pressure(&value),
    }
    Ok(())
}

pub async fn set_daily_notes(state: &TrackerState, notes: String) -> Result<(), String> {
    let mut session = state.lock().map_err(|e| e.to_string())?;
    session.view.set_notes(&notes);
    Ok(())
}

/// Persist edits of the active date. Returns false when there was nothing
/// to save. On failure local edits are kept for another attempt, and edits
/// made while the write was in flight stay unsaved.
pub async fn save_day(state: &TrackerState) -> Result<bool, String> {
    let now = Utc::now();
    let (date, editor, patch) = {
        let session = state.lock().map_err(|e| e.to_string())?;
        let editor = session.identity.stamp().to_string();
        let patch = session.view.save_patch(&editor, now).map_err(|e| e.to_string())?;
        (session.view.date(), editor, patch)
    };
    let Some(patch) = patch else {
        return Ok(false);
    };

    if let Err(e) = state.store.save_daily(date, &patch.body).await {
        log::error!("Error al guardar los datos: {}", e);
        return Err(format!("Hubo un error al guardar los datos: {}", e));
    }

    let mut session = state.lock().map_err(|e| e.to_string())?;
    if session.view.date() == date && !session.view.mark_saved(&patch, &editor, now) {
        log::info!("Edits made while saving {} are still pending", date);
    }
    Ok(true)
}

/// Dates with a stored record, for the history calendar
pub async fn recorded_dates(state: &TrackerState) -> Result<Vec<NaiveDate>, String> {
    state.store.recorded_dates().await.map_err(|e| e.to_string())
}

/// Re-read a changed document and re-run reconciliation. Read errors are
/// logged and the last known state is kept.
pub async fn apply_change(state: &TrackerState, change: &DocumentChange) {
    match change {
        DocumentChange::Daily(date) => {
            let active = match state.lock() {
                Ok(session) => session.view.date(),
                Err(e) => {
                    log::error!("{}", e);
                    return;
                }
            };
            if *date != active {
                return;
            }
            match state.store.load_daily(*date).await {
                Ok(record) => {
                    if let Ok(mut session) = state.lock() {
                        if session.view.date() == *date {
                            session.view.apply_remote(record);
                        }
                    }
                }
                Err(e) => log::error!("Error fetching daily data: {}", e),
            }
        }
        DocumentChange::Definitions => match state.store.load_definitions().await {
            Ok(Some(rules)) => {
                if let Ok(mut session) = state.lock() {
                    session.view.set_rules(rules);
                }
            }
            Ok(None) => log::warn!("Medication definitions document is empty"),
            Err(e) => log::error!("Error fetching medication definitions: {}", e),
        },
        DocumentChange::Profile(_) => {}
    }
}

/// Follow store changes until the channel closes.
pub async fn follow_changes(
    state: Arc<TrackerState>,
    mut changes: broadcast::Receiver<DocumentChange>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => apply_change(&state, &change).await,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Missed {} change notifications, refreshing", skipped);
                apply_change(&state, &DocumentChange::Definitions).await;
                let active = match state.lock() {
                    Ok(session) => session.view.date(),
                    Err(_) => continue,
                };
                apply_change(&state, &DocumentChange::Daily(active)).await;
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Background tasks keeping the active date in step with the store.
/// Dropping it stops them.
pub struct LiveUpdates {
    watcher: JoinHandle<()>,
    follower: JoinHandle<()>,
}

impl Drop for LiveUpdates {
    fn drop(&mut self) {
        self.watcher.abort();
        self.follower.abort();
    }
}

/// Start following writes from this and other processes.
pub async fn start_live_updates(state: Arc<TrackerState>) -> Result<LiveUpdates, String> {
    let changes = state.store.subscribe();
    let watcher = state
        .store
        .watch(state.settings.watch_interval())
        .await
        .map_err(|e| e.to_string())?;
    let follower = tokio::spawn(follow_changes(state, changes));
    Ok(LiveUpdates { watcher, follower })
}
