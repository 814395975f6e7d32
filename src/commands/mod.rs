// Commands — the boundary the UI shell calls into.
// Each command locks the session only around in-memory work; store calls
// happen with the lock released.

use chrono::{Local, NaiveDate};
use std::sync::{Mutex, MutexGuard};

use crate::db::store::RecordStore;
use crate::db::Database;
use crate::error::{TrackerError, TrackerResult};
use crate::services::daily::DayView;

pub mod day;
pub mod medications;
pub mod profile;
pub mod settings;
pub mod system;

use settings::AppSettings;

/// Who is using this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub device_id: String,
    pub display_name: Option<String>,
}

impl Identity {
    /// Name recorded on intake and save stamps.
    pub fn stamp(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.device_id)
    }
}

pub struct Session {
    pub view: DayView,
    pub identity: Identity,
    pub editing_unlocked: bool,
}

/// Application state owned by the shell.
pub struct TrackerState {
    pub store: RecordStore,
    pub settings: AppSettings,
    pub session: Mutex<Session>,
}

impl TrackerState {
    /// Load definitions (seeding them if needed), the profile and `date`.
    pub async fn bootstrap(
        db: Database,
        settings: AppSettings,
        date: NaiveDate,
    ) -> TrackerResult<Self> {
        db.run_migrations()?;
        let store = RecordStore::new(db, &settings.app_id, settings.retry_policy());

        let rules = match store.ensure_definitions().await {
            Ok(rules) => rules,
            Err(e) => {
                log::error!("Error fetching medication definitions: {}", e);
                Vec::new()
            }
        };
        let stored_name = match store.load_profile(&settings.device_id).await {
            Ok(profile) => profile.map(|p| p.name),
            Err(e) => {
                log::error!("Error loading user profile: {}", e);
                None
            }
        };
        let identity = Identity {
            device_id: settings.device_id.clone(),
            display_name: settings.user_name.clone().or(stored_name),
        };

        let mut view = DayView::new(date, rules);
        match store.load_daily(date).await {
            Ok(record) => view.load(date, record),
            Err(e) => log::error!("Error fetching daily data: {}", e),
        }

        log::info!("Tracker ready for {} ({} medications)", date, view.rules().len());
        Ok(Self {
            store,
            settings,
            session: Mutex::new(Session { view, identity, editing_unlocked: false }),
        })
    }

    pub fn lock(&self) -> TrackerResult<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|e| TrackerError::Lock(e.to_string()))
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_seeds_and_opens_date() {
        let state = test_support::state().await;
        let session = state.lock().unwrap();
        assert_eq!(session.view.date(), test_support::march_5());
        assert_eq!(session.view.intake().len(), 15);
        assert_eq!(session.identity.stamp(), "Luis");
        assert!(!session.editing_unlocked);
    }

    #[tokio::test]
    async fn bootstrap_skips_unreadable_definitions() {
        let db = Database::open_in_memory().unwrap();
        db.set_document(
            "artifacts/default-app-id/public/data/medicationDefinitions/currentDefinitions",
            &serde_json::json!({"medications": [
                {"id": "T4", "name": "T4", "dose": "1", "timeOfDay": "Ayunas", "frequency": "daily"},
                {"id": "roto", "name": null, "dose": "1", "timeOfDay": "Noche", "frequency": "daily"}
            ]}),
        )
        .unwrap();
        let state = TrackerState::bootstrap(db, test_support::settings(), test_support::march_5())
            .await
            .unwrap();
        let session = state.lock().unwrap();
        assert_eq!(session.view.rules().len(), 1);
        assert_eq!(session.view.intake().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_opens_empty_view_when_definitions_fail() {
        let db = Database::open_in_memory().unwrap();
        db.set_document(
            "artifacts/default-app-id/public/data/medicationDefinitions/currentDefinitions",
            &serde_json::json!({"medications": {"not": "a list"}}),
        )
        .unwrap();
        let state = TrackerState::bootstrap(db, test_support::settings(), test_support::march_5())
            .await
            .unwrap();
        let session = state.lock().unwrap();
        assert!(session.view.rules().is_empty());
        assert_eq!(session.view.date(), test_support::march_5());
    }

    #[test]
    fn stamp_falls_back_to_device_id() {
        let identity = Identity { device_id: "dev".into(), display_name: None };
        assert_eq!(identity.stamp(), "dev");
    }
}
