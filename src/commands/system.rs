use chrono::NaiveDate;
use serde::Serialize;

use crate::commands::TrackerState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub app_id: String,
    pub active_date: NaiveDate,
    pub medication_count: usize,
    pub unplaced_medications: Vec<String>,
    pub unsaved_changes: bool,
}

/// Get current system status
pub async fn get_system_status(state: &TrackerState) -> Result<SystemStatus, String> {
    let session = state.lock().map_err(|e| e.to_string())?;
    let schedule = session.view.schedule();

    Ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        app_id: state.settings.app_id.clone(),
        active_date: session.view.date(),
        medication_count: session.view.rules().len(),
        unplaced_medications: schedule.unplaced.iter().map(|r| r.id.clone()).collect(),
        unsaved_changes: session.view.has_unsaved_changes(),
    })
}
