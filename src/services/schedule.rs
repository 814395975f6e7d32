use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::services::medication::MedicationRule;
use crate::services::recurrence::WeekdayKey;

const MONTHS_ES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio",
    "julio", "agosto", "septiembre", "octubre", "noviembre", "diciembre",
];

/// Header text for a date, e.g. "martes, 5 de marzo de 2024".
pub fn format_long_date_es(date: NaiveDate) -> String {
    let weekday = WeekdayKey::from(date.weekday()).display_name_es().to_lowercase();
    let month = MONTHS_ES[date.month0() as usize];
    format!("{}, {} de {} de {}", weekday, date.day(), month, date.year())
}

/// Display sections for the day, always shown in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Fasting,
    PostBreakfast,
    BeforeLunch,
    Afternoon,
    Night,
    LastTuesdayOfMonth,
}

impl TimeOfDay {
    pub const ORDERED: [TimeOfDay; 6] = [
        TimeOfDay::Fasting,
        TimeOfDay::PostBreakfast,
        TimeOfDay::BeforeLunch,
        TimeOfDay::Afternoon,
        TimeOfDay::Night,
        TimeOfDay::LastTuesdayOfMonth,
    ];

    /// The grouping key stored on rules.
    pub fn label(self) -> &'static str {
        match self {
            TimeOfDay::Fasting => "Ayunas",
            TimeOfDay::PostBreakfast => "Mañana Post Desayuno",
            TimeOfDay::BeforeLunch => "Antes de Comer",
            TimeOfDay::Afternoon => "Tarde",
            TimeOfDay::Night => "Noche",
            TimeOfDay::LastTuesdayOfMonth => "Último Martes del Mes",
        }
    }

    /// Heading shown to the user.
    pub fn heading(self) -> &'static str {
        match self {
            TimeOfDay::BeforeLunch => "Antes de Comer (13 hs)",
            TimeOfDay::Afternoon => "Tarde (18 hs)",
            other => other.label(),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ORDERED.into_iter().find(|t| t.label() == label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSection {
    pub time_of_day: TimeOfDay,
    pub heading: String,
    pub rules: Vec<MedicationRule>,
}

/// What to show for one date.
#[derive(Debug, Clone, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub sections: Vec<ScheduleSection>,
    /// Due rules whose time of day matches no section.
    pub unplaced: Vec<MedicationRule>,
}

/// Filter rules due on `date` and bucket them by time of day.
pub fn build_day_schedule(rules: &[MedicationRule], date: NaiveDate) -> DaySchedule {
    let mut sections: Vec<ScheduleSection> = TimeOfDay::ORDERED
        .into_iter()
        .map(|t| ScheduleSection {
            time_of_day: t,
            heading: t.heading().to_string(),
            rules: Vec::new(),
        })
        .collect();
    let mut unplaced = Vec::new();

    for rule in rules.iter().filter(|r| r.applies_on(date)) {
        match TimeOfDay::from_label(&rule.time_of_day) {
            Some(t) => {
                if let Some(section) = sections.iter_mut().find(|s| s.time_of_day == t) {
                    section.rules.push(rule.clone());
                }
            }
            None => {
                log::warn!(
                    "Medication '{}' has unknown time of day '{}'",
                    rule.id,
                    rule.time_of_day
                );
                unplaced.push(rule.clone());
            }
        }
    }

    DaySchedule { date, sections, unplaced }
}
