use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};
use crate::services::recurrence::{self, Frequency, WeekdayKey};

/// A recurring intake rule. Independent of any specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RuleRecord", from = "RuleRecord")]
pub struct MedicationRule {
    pub id: String,
    pub name: String,
    pub dose: String,
    pub time_of_day: String,
    pub frequency: Frequency,
}

impl MedicationRule {
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        recurrence::applies(&self.frequency, date)
    }
}

/// Stored shape of a rule inside the definitions document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    dose: String,
    #[serde(default)]
    time_of_day: String,
    #[serde(default)]
    frequency: String,
    #[serde(default, alias = "days", skip_serializing_if = "Option::is_none")]
    days_of_week: Option<Vec<String>>,
}

impl From<RuleRecord> for MedicationRule {
    fn from(record: RuleRecord) -> Self {
        let frequency = Frequency::from_stored(&record.frequency, record.days_of_week.as_deref());
        if let Frequency::Weekly { days } = &frequency {
            if days.is_empty() {
                log::warn!("Weekly rule '{}' has no days and will never be shown", record.id);
            }
        }
        MedicationRule {
            id: record.id,
            name: record.name,
            dose: record.dose,
            time_of_day: record.time_of_day,
            frequency,
        }
    }
}

impl From<MedicationRule> for RuleRecord {
    fn from(rule: MedicationRule) -> Self {
        let days_of_week = match &rule.frequency {
            Frequency::Weekly { days } => Some(days.iter().map(|d| String::from(*d)).collect()),
            _ => None,
        };
        RuleRecord {
            frequency: rule.frequency.tag(),
            id: rule.id,
            name: rule.name,
            dose: rule.dose,
            time_of_day: rule.time_of_day,
            days_of_week,
        }
    }
}

/// Editor input for adding or changing a rule.
/// The frequency is chosen explicitly, never inferred from free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationDraft {
    pub name: String,
    pub dose: String,
    pub time_of_day: String,
    pub frequency: DraftFrequency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DraftFrequency {
    Daily,
    Weekly { days: Vec<WeekdayKey> },
    MonthlyLastWeekday { weekday: WeekdayKey },
}

impl MedicationDraft {
    /// Trim and validate, producing a rule with the given id.
    pub fn into_rule(self, id: String) -> TrackerResult<MedicationRule> {
        let name = self.name.trim().to_string();
        let dose = self.dose.trim().to_string();
        let time_of_day = self.time_of_day.trim().to_string();

        if name.is_empty() || dose.is_empty() || time_of_day.is_empty() {
            return Err(TrackerError::Validation(
                "Por favor, completa todos los campos del medicamento.".into(),
            ));
        }

        let frequency = match self.frequency {
            DraftFrequency::Daily => Frequency::Daily,
            DraftFrequency::Weekly { days } => {
                if days.is_empty() {
                    return Err(TrackerError::Validation(
                        "Selecciona al menos un día de la semana.".into(),
                    ));
                }
                Frequency::Weekly { days: days.into_iter().collect() }
            }
            DraftFrequency::MonthlyLastWeekday { weekday } => {
                Frequency::MonthlyLastWeekday { weekday }
            }
        };

        Ok(MedicationRule { id, name, dose, time_of_day, frequency })
    }
}

/// Fresh id for a rule created in the editor.
pub fn new_rule_id() -> String {
    format!("med_{}", uuid::Uuid::new_v4().simple())
}

/// Replace the rule with the same id in place, or append it.
pub fn upsert_rule(rules: &[MedicationRule], rule: MedicationRule) -> Vec<MedicationRule> {
    let mut updated = rules.to_vec();
    match updated.iter_mut().find(|r| r.id == rule.id) {
        Some(existing) => *existing = rule,
        None => updated.push(rule),
    }
    updated
}

pub fn remove_rule(rules: &[MedicationRule], id: &str) -> Vec<MedicationRule> {
    rules.iter().filter(|r| r.id != id).cloned().collect()
}

/// Definitions written the first time the store has none.
pub fn default_definitions() -> Vec<MedicationRule> {
    fn rule(id: &str, name: &str, dose: &str, time_of_day: &str, frequency: Frequency) -> MedicationRule {
        MedicationRule {
            id: id.into(),
            name: name.into(),
            dose: dose.into(),
            time_of_day: time_of_day.into(),
            frequency,
        }
    }

    let post = "Mañana Post Desayuno";
    vec![
        rule("T4", "T4", "30 min previos al desayuno", "Ayunas", Frequency::Daily),
        rule("Levecom_morning", "Levecom", "1 pastilla", post, Frequency::Daily),
        rule("Deslefex", "Deslefex", "1 pastilla", post, Frequency::Daily),
        rule("Lukast", "Lukast", "1 pastilla", post, Frequency::Daily),
        rule("Hidrotisona_morning", "Hidrotisona", "1 pastilla de 10mg", post, Frequency::Daily),
        rule("Valsartan", "Valsartan", "1 pastilla de 160mg", post, Frequency::Daily),
        rule("Amlodipina", "Amlodipina", "1/2 pastilla de 5mg", post, Frequency::Daily),
        rule("Dexlansoprazol", "Dexlansoprazol", "1 pastilla", post, Frequency::Daily),
        rule("Hidrotisona_lunch", "Hidrotisona", "1 pastilla", "Antes de Comer", Frequency::Daily),
        rule(
            "B12",
            "B12",
            "Sublingual",
            "Antes de Comer",
            Frequency::weekly([Weekday::Tue, Weekday::Thu, Weekday::Sat]),
        ),
        rule("Hidrotisona_evening", "Hidrotisona", "1/2 pastilla", "Tarde", Frequency::Daily),
        rule("Levecom_night", "Levecom", "1 pastilla", "Noche", Frequency::Daily),
        rule("NovoInsomnium", "Novo Insomnium", "1 pastilla", "Noche", Frequency::Daily),
        rule("Reorex", "Reorex", "1 pastilla de 10mg", "Noche", Frequency::Daily),
        rule(
            "VitaminaD",
            "Vitamina D",
            "1 vez por mes",
            "Último Martes del Mes",
            Frequency::monthly_last(Weekday::Tue),
        ),
    ]
}
