use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::services::medication::MedicationRule;

/// Taken / not-taken state of one rule on one date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRecord {
    #[serde(default)]
    pub taken: bool,
    #[serde(default)]
    pub taken_by: Option<String>,
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
}

/// Rule id → intake state for the active date.
pub type IntakeMap = BTreeMap<String, IntakeRecord>;

/// One entry per rule: the stored record when there is one, else not-taken.
/// Records of rules no longer defined are left out.
pub fn reconcile(rules: &[MedicationRule], stored: &IntakeMap) -> IntakeMap {
    rules
        .iter()
        .map(|rule| {
            let record = stored.get(&rule.id).cloned().unwrap_or_default();
            (rule.id.clone(), record)
        })
        .collect()
}

/// Flip `taken`. Marking as taken stamps who and when, unmarking clears both.
pub fn toggle(record: &IntakeRecord, identity: &str, now: DateTime<Utc>) -> IntakeRecord {
    if record.taken {
        IntakeRecord::default()
    } else {
        IntakeRecord {
            taken: true,
            taken_by: Some(identity.to_string()),
            taken_at: Some(now),
        }
    }
}
