use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TrackerError, TrackerResult};
use crate::services::intake::{self, IntakeMap, IntakeRecord};
use crate::services::medication::MedicationRule;
use crate::services::schedule::{self, DaySchedule};

/// Free-text blood pressure readings, e.g. "120/80".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureReadings {
    #[serde(default)]
    pub morning: String,
    #[serde(default)]
    pub evening: String,
}

/// Persisted document for one calendar date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    #[serde(default)]
    pub medication_schedule: IntakeMap,
    #[serde(default)]
    pub pressure_readings: PressureReadings,
    #[serde(default)]
    pub daily_notes: String,
    #[serde(default)]
    pub last_updated_by: Option<String>,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// Document key for a date.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> TrackerResult<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d")
        .map_err(|e| TrackerError::Validation(format!("Invalid date '{}': {}", key, e)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Dirty {
    intake: bool,
    pressure: bool,
    notes: bool,
}

impl Dirty {
    fn any(self) -> bool {
        self.intake || self.pressure || self.notes
    }
}

/// In-memory state of the active date, reconciled against the rule list.
#[derive(Debug, Clone)]
pub struct DayView {
    date: NaiveDate,
    rules: Vec<MedicationRule>,
    stored_intake: IntakeMap,
    intake: IntakeMap,
    pressure: PressureReadings,
    notes: String,
    last_updated_by: Option<String>,
    last_updated_at: Option<DateTime<Utc>>,
    dirty: Dirty,
    /// Bumped on every local edit and on load.
    revision: u64,
}

/// Patch for one save, tied to the edits it covers.
#[derive(Debug, Clone)]
pub struct SavePatch {
    pub body: Value,
    revision: u64,
}

/// Serializable view handed to the shell.
#[derive(Debug, Clone, Serialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub schedule: DaySchedule,
    pub intake: IntakeMap,
    pub pressure_readings: PressureReadings,
    pub daily_notes: String,
    pub last_updated_by: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub unsaved_changes: bool,
}

impl DayView {
    pub fn new(date: NaiveDate, rules: Vec<MedicationRule>) -> Self {
        let intake = intake::reconcile(&rules, &IntakeMap::new());
        Self {
            date,
            rules,
            stored_intake: IntakeMap::new(),
            intake,
            pressure: PressureReadings::default(),
            notes: String::new(),
            last_updated_by: None,
            last_updated_at: None,
            dirty: Dirty::default(),
            revision: 0,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn rules(&self) -> &[MedicationRule] {
        &self.rules
    }

    pub fn intake(&self) -> &IntakeMap {
        &self.intake
    }

    pub fn pressure(&self) -> &PressureReadings {
        &self.pressure
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty.any()
    }

    /// Switch to `date` with its stored document (`None` when never saved).
    /// Unsaved edits of the previous date are discarded.
    pub fn load(&mut self, date: NaiveDate, record: Option<DailyRecord>) {
        self.date = date;
        self.dirty = Dirty::default();
        self.revision += 1;
        self.apply_record(record.unwrap_or_default());
    }

    /// A change pushed by the store for the active date. Fields edited
    /// locally and not yet saved keep their local value.
    pub fn apply_remote(&mut self, record: Option<DailyRecord>) {
        self.apply_record(record.unwrap_or_default());
    }

    fn apply_record(&mut self, record: DailyRecord) {
        self.stored_intake = record.medication_schedule;
        if !self.dirty.intake {
            self.intake = intake::reconcile(&self.rules, &self.stored_intake);
        }
        if !self.dirty.pressure {
            self.pressure = record.pressure_readings;
        }
        if !self.dirty.notes {
            self.notes = record.daily_notes;
        }
        self.last_updated_by = record.last_updated_by;
        self.last_updated_at = record.last_updated_at;
    }

    /// The rule list changed. Intake state of surviving rules is kept,
    /// deleted rules drop out and new ones start as not taken.
    pub fn set_rules(&mut self, rules: Vec<MedicationRule>) {
        let mut known = self.stored_intake.clone();
        known.extend(self.intake.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.intake = intake::reconcile(&rules, &known);
        self.rules = rules;
    }

    pub fn toggle(
        &mut self,
        rule_id: &str,
        identity: &str,
        now: DateTime<Utc>,
    ) -> TrackerResult<IntakeRecord> {
        let current = self.intake.get(rule_id).ok_or_else(|| TrackerError::NotFound {
            entity: "medication".into(),
            id: rule_id.into(),
        })?;
        let next = intake::toggle(current, identity, now);
        self.intake.insert(rule_id.to_string(), next.clone());
        self.dirty.intake = true;
        self.revision += 1;
        Ok(next)
    }

    pub fn set_morning_pressure(&mut self, value: &str) {
        self.pressure.morning = value.to_string();
        self.dirty.pressure = true;
        self.revision += 1;
    }

    pub fn set_evening_pressure(&mut self, value: &str) {
        self.pressure.evening = value.to_string();
        self.dirty.pressure = true;
        self.revision += 1;
    }

    pub fn set_notes(&mut self, value: &str) {
        self.notes = value.to_string();
        self.dirty.notes = true;
        self.revision += 1;
    }

    pub fn schedule(&self) -> DaySchedule {
        schedule::build_day_schedule(&self.rules, self.date)
    }

    pub fn snapshot(&self) -> DaySnapshot {
        DaySnapshot {
            date: self.date,
            schedule: self.schedule(),
            intake: self.intake.clone(),
            pressure_readings: self.pressure.clone(),
            daily_notes: self.notes.clone(),
            last_updated_by: self.last_updated_by.clone(),
            last_updated_at: self.last_updated_at,
            unsaved_changes: self.dirty.any(),
        }
    }

    /// Merge patch holding only the edited fields plus editor metadata.
    /// `None` when there is nothing to save.
    pub fn save_patch(&self, editor: &str, now: DateTime<Utc>) -> TrackerResult<Option<SavePatch>> {
        if !self.dirty.any() {
            return Ok(None);
        }
        let mut patch = Map::new();
        if self.dirty.intake {
            patch.insert("medicationSchedule".into(), serde_json::to_value(&self.intake)?);
        }
        if self.dirty.pressure {
            patch.insert("pressureReadings".into(), serde_json::to_value(&self.pressure)?);
        }
        if self.dirty.notes {
            patch.insert("dailyNotes".into(), Value::String(self.notes.clone()));
        }
        patch.insert("lastUpdatedBy".into(), Value::String(editor.to_string()));
        patch.insert("lastUpdatedAt".into(), serde_json::to_value(now)?);
        Ok(Some(SavePatch { body: Value::Object(patch), revision: self.revision }))
    }

    /// `saved` was persisted. Edits made after it was built stay pending,
    /// returns whether the view is now clean.
    pub fn mark_saved(&mut self, saved: &SavePatch, editor: &str, now: DateTime<Utc>) -> bool {
        self.last_updated_by = Some(editor.to_string());
        self.last_updated_at = Some(now);
        if saved.revision != self.revision {
            return false;
        }
        if self.dirty.intake {
            self.stored_intake
                .extend(self.intake.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self.dirty = Dirty::default();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::medication::{default_definitions, remove_rule};
    use chrono::TimeZone;

    fn march_5() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
    }

    fn stored() -> DailyRecord {
        let mut schedule = IntakeMap::new();
        schedule.insert(
            "T4".into(),
            IntakeRecord { taken: true, taken_by: Some("Ana".into()), taken_at: Some(now()) },
        );
        DailyRecord {
            medication_schedule: schedule,
            pressure_readings: PressureReadings { morning: "120/80".into(), evening: String::new() },
            daily_notes: "Bien".into(),
            last_updated_by: Some("Ana".into()),
            last_updated_at: Some(now()),
        }
    }

    #[test]
    fn date_keys() {
        assert_eq!(date_key(march_5()), "2024-03-05");
        assert_eq!(parse_date_key("2024-03-05").unwrap(), march_5());
        assert!(parse_date_key("05/03/2024").is_err());
    }

    #[test]
    fn load_reconciles_every_rule() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.load(march_5(), Some(stored()));
        assert_eq!(view.intake().len(), 15);
        assert!(view.intake()["T4"].taken);
        assert!(!view.intake()["Reorex"].taken);
        assert_eq!(view.pressure().morning, "120/80");
        assert!(!view.has_unsaved_changes());
    }

    #[test]
    fn load_missing_document_defaults() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.set_notes("borrador");
        view.load(march_5().succ_opt().unwrap(), None);
        assert_eq!(view.notes(), "");
        assert!(view.intake().values().all(|r| !r.taken));
        assert!(!view.has_unsaved_changes());
    }

    #[test]
    fn notes_only_patch() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.load(march_5(), Some(stored()));
        view.set_notes("Mareos por la tarde");
        let patch = view.save_patch("Luis", now()).unwrap().unwrap().body;
        let keys: Vec<&str> = patch.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 3);
        assert!(patch.get("pressureReadings").is_none());
        assert!(patch.get("medicationSchedule").is_none());
        assert_eq!(patch["dailyNotes"], "Mareos por la tarde");
        assert_eq!(patch["lastUpdatedBy"], "Luis");
    }

    #[test]
    fn clean_view_has_no_patch() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.load(march_5(), Some(stored()));
        assert!(view.save_patch("Luis", now()).unwrap().is_none());
        view.set_morning_pressure("130/85");
        let patch = view.save_patch("Luis", now()).unwrap().unwrap();
        assert!(view.mark_saved(&patch, "Luis", now()));
        assert!(view.save_patch("Luis", now()).unwrap().is_none());
    }

    #[test]
    fn toggle_marks_intake_dirty() {
        let mut view = DayView::new(march_5(), default_definitions());
        let record = view.toggle("Reorex", "Luis", now()).unwrap();
        assert!(record.taken);
        let patch = view.save_patch("Luis", now()).unwrap().unwrap().body;
        assert_eq!(patch["medicationSchedule"]["Reorex"]["takenBy"], "Luis");
        assert!(matches!(
            view.toggle("nope", "Luis", now()),
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[test]
    fn remote_change_keeps_local_edits() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.load(march_5(), None);
        view.set_notes("local");
        view.apply_remote(Some(stored()));
        assert_eq!(view.notes(), "local");
        assert_eq!(view.pressure().morning, "120/80");
        assert!(view.intake()["T4"].taken);
    }

    #[test]
    fn rule_changes_rereconcile() {
        let rules = default_definitions();
        let mut view = DayView::new(march_5(), rules.clone());
        view.load(march_5(), Some(stored()));
        view.toggle("Reorex", "Luis", now()).unwrap();

        view.set_rules(remove_rule(&rules, "T4"));
        assert_eq!(view.intake().len(), 14);
        assert!(!view.intake().contains_key("T4"));
        assert!(view.intake()["Reorex"].taken);

        // re-adding a rule brings back its stored state
        view.set_rules(rules);
        assert!(view.intake()["T4"].taken);
    }

    #[test]
    fn edit_during_save_stays_pending() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.load(march_5(), None);
        view.toggle("T4", "Luis", now()).unwrap();
        let in_flight = view.save_patch("Luis", now()).unwrap().unwrap();
        assert_eq!(in_flight.body["medicationSchedule"]["Reorex"]["taken"], false);

        view.toggle("Reorex", "Luis", now()).unwrap();
        assert!(!view.mark_saved(&in_flight, "Luis", now()));
        assert!(view.has_unsaved_changes());

        let next = view.save_patch("Luis", now()).unwrap().unwrap();
        assert_eq!(next.body["medicationSchedule"]["Reorex"]["taken"], true);
        assert!(view.mark_saved(&next, "Luis", now()));
        assert!(!view.has_unsaved_changes());
    }

    #[test]
    fn reload_during_save_is_not_marked_saved() {
        let mut view = DayView::new(march_5(), default_definitions());
        view.set_notes("borrador");
        let in_flight = view.save_patch("Luis", now()).unwrap().unwrap();
        view.load(march_5(), Some(stored()));
        view.set_notes("otra");
        assert!(!view.mark_saved(&in_flight, "Luis", now()));
        assert!(view.has_unsaved_changes());
    }
}
