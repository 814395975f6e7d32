use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::error::{TrackerError, TrackerResult};
use crate::services::daily::{self, DailyRecord};
use crate::services::medication::{self, MedicationRule};

/// Which document changed. Sent after every write by this store and for
/// writes by other processes found by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    Definitions,
    Daily(NaiveDate),
    Profile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

const MAX_BACKOFF: Duration = Duration::from_secs(5);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, base_delay: Duration::from_millis(50) }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (0-based), doubling each time
    /// and capped at five seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

/// Persistence client for definitions, daily records and profiles.
/// Built once at startup and handed to whoever owns application state.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Mutex<Database>>,
    app_id: String,
    retry: RetryPolicy,
    changes: broadcast::Sender<DocumentChange>,
}

impl RecordStore {
    pub fn new(db: Database, app_id: &str, retry: RetryPolicy) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            db: Arc::new(Mutex::new(db)),
            app_id: app_id.to_string(),
            retry,
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }

    fn definitions_path(&self) -> String {
        format!("artifacts/{}/public/data/medicationDefinitions/currentDefinitions", self.app_id)
    }

    fn daily_prefix(&self) -> String {
        format!("artifacts/{}/public/data/dailyRecords/", self.app_id)
    }

    fn daily_path(&self, date: NaiveDate) -> String {
        format!("{}{}", self.daily_prefix(), daily::date_key(date))
    }

    fn profile_path(&self, user_id: &str) -> String {
        format!("artifacts/{}/users/{}/profile/userProfile", self.app_id, user_id)
    }

    /// Run `op` against the database, retrying transient failures with
    /// exponential backoff.
    async fn with_retry<T, F>(&self, what: &str, mut op: F) -> TrackerResult<T>
    where
        F: FnMut(&mut Database) -> TrackerResult<T>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let mut db = self.db.lock().map_err(|e| TrackerError::Lock(e.to_string()))?;
                op(&mut db)
            };
            match result {
                Err(e) if e.is_transient() && attempt + 1 < self.retry.attempts => {
                    let delay = self.retry.delay_for(attempt);
                    log::warn!("{} failed ({}), retrying in {:?}", what, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn notify(&self, change: DocumentChange) {
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    /// Document that `path` names, if it belongs to this app.
    fn change_for_path(&self, path: &str) -> Option<DocumentChange> {
        if path == self.definitions_path() {
            return Some(DocumentChange::Definitions);
        }
        if let Some(key) = path.strip_prefix(&self.daily_prefix()) {
            return daily::parse_date_key(key).ok().map(DocumentChange::Daily);
        }
        path.strip_prefix(&format!("artifacts/{}/users/", self.app_id))
            .and_then(|rest| rest.strip_suffix("/profile/userProfile"))
            .map(|user_id| DocumentChange::Profile(user_id.to_string()))
    }

    /// Broadcast every document written after `since`, including writes
    /// by other processes on the same file. Returns the new high mark.
    pub async fn poll_changes(&self, since: i64) -> TrackerResult<i64> {
        let changed = self.with_retry("poll changes", |db| db.changed_since(since)).await?;
        let mut latest = since;
        for (path, revision) in changed {
            latest = latest.max(revision);
            if let Some(change) = self.change_for_path(&path) {
                self.notify(change);
            }
        }
        Ok(latest)
    }

    /// Poll for changed documents every `every` until the task is aborted.
    /// Only writes made after this call are reported.
    pub async fn watch(&self, every: Duration) -> TrackerResult<JoinHandle<()>> {
        let mut since = self.with_retry("read revision", |db| db.latest_revision()).await?;
        let store = self.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.poll_changes(since).await {
                    Ok(latest) => since = latest,
                    Err(e) => log::error!("Error polling for changes: {}", e),
                }
            }
        }))
    }

    /// Stored rule list, `None` when the document or its list is missing.
    /// Entries that cannot be read are logged and skipped.
    pub async fn load_definitions(&self) -> TrackerResult<Option<Vec<MedicationRule>>> {
        let path = self.definitions_path();
        let doc = self.with_retry("load definitions", |db| db.get_document(&path)).await?;
        let list = match doc.and_then(|mut d| d.get_mut("medications").map(Value::take)) {
            Some(Value::Null) | None => return Ok(None),
            Some(Value::Array(list)) => list,
            Some(other) => {
                return Err(TrackerError::Validation(format!(
                    "medications is not a list: {}",
                    other
                )))
            }
        };

        let mut rules = Vec::with_capacity(list.len());
        for (index, entry) in list.into_iter().enumerate() {
            match serde_json::from_value::<MedicationRule>(entry) {
                Ok(rule) => rules.push(rule),
                Err(e) => log::warn!("Skipping medication definition #{}: {}", index, e),
            }
        }
        Ok(Some(rules))
    }

    /// Stored rules, seeding the initial definitions when there are none.
    pub async fn ensure_definitions(&self) -> TrackerResult<Vec<MedicationRule>> {
        if let Some(rules) = self.load_definitions().await? {
            return Ok(rules);
        }
        let initial = medication::default_definitions();
        match self.save_definitions(&initial).await {
            Ok(()) => log::info!("Initial medication definitions saved"),
            Err(e) => log::error!("Failed to save initial medication definitions: {}", e),
        }
        Ok(initial)
    }

    /// Write the whole rule list.
    pub async fn save_definitions(&self, rules: &[MedicationRule]) -> TrackerResult<()> {
        let path = self.definitions_path();
        let patch = json!({ "medications": serde_json::to_value(rules)? });
        self.with_retry("save definitions", |db| db.merge_document(&path, &patch))
            .await?;
        self.notify(DocumentChange::Definitions);
        Ok(())
    }

    pub async fn load_daily(&self, date: NaiveDate) -> TrackerResult<Option<DailyRecord>> {
        let path = self.daily_path(date);
        let doc = self.with_retry("load daily record", |db| db.get_document(&path)).await?;
        doc.map(serde_json::from_value).transpose().map_err(TrackerError::from)
    }

    /// Merge-save a patch into the day's document.
    pub async fn save_daily(&self, date: NaiveDate, patch: &Value) -> TrackerResult<()> {
        let path = self.daily_path(date);
        self.with_retry("save daily record", |db| db.merge_document(&path, patch))
            .await?;
        log::info!("Daily record {} saved", daily::date_key(date));
        self.notify(DocumentChange::Daily(date));
        Ok(())
    }

    /// Dates that have a stored record, oldest first.
    pub async fn recorded_dates(&self) -> TrackerResult<Vec<NaiveDate>> {
        let prefix = self.daily_prefix();
        let paths = self.with_retry("list daily records", |db| db.list_paths(&prefix)).await?;
        Ok(paths
            .iter()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter_map(|key| daily::parse_date_key(key).ok())
            .collect())
    }

    pub async fn load_profile(&self, user_id: &str) -> TrackerResult<Option<UserProfile>> {
        let path = self.profile_path(user_id);
        let doc = self.with_retry("load profile", |db| db.get_document(&path)).await?;
        doc.map(serde_json::from_value).transpose().map_err(TrackerError::from)
    }

    pub async fn save_profile(&self, user_id: &str, profile: &UserProfile) -> TrackerResult<()> {
        let path = self.profile_path(user_id);
        let patch = serde_json::to_value(profile)?;
        self.with_retry("save profile", |db| db.merge_document(&path, &patch))
            .await?;
        self.notify(DocumentChange::Profile(user_id.to_string()));
        Ok(())
    }
}
