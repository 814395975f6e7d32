// Seguimiento — Core Library
// Family medication, blood pressure and notes tracker

pub mod commands;
pub mod db;
pub mod error;
pub mod services;

use anyhow::Context;

use crate::services::daily::{self, DaySnapshot};
use crate::services::schedule;

/// Open the store, load the requested day (default today) and print it.
pub async fn run() -> anyhow::Result<()> {
    env_logger::init();

    let settings = commands::settings::get_settings()
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to load settings")?;

    let date = match std::env::args().nth(1) {
        Some(arg) => daily::parse_date_key(&arg)?,
        None => commands::today(),
    };

    let db_path = settings.resolved_db_path().map_err(anyhow::Error::msg)?;
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir).context("Failed to create data dir")?;
    }
    let db = db::Database::new(&db_path).context("Failed to open database")?;
    log::info!("Seguimiento started — Database at {:?}", db_path);

    let state = commands::TrackerState::bootstrap(db, settings, date).await?;
    let snapshot = commands::day::get_day(&state).await.map_err(anyhow::Error::msg)?;
    print!("{}", render_day(&snapshot));
    Ok(())
}

/// Plain-text rendering of a day for the terminal.
pub fn render_day(day: &DaySnapshot) -> String {
    let mut out = format!("{}\n", schedule::format_long_date_es(day.date));
    for section in &day.schedule.sections {
        out.push_str(&format!("\n{}\n", section.heading));
        if section.rules.is_empty() {
            out.push_str("  (sin medicamentos)\n");
        }
        for rule in &section.rules {
            let mark = match day.intake.get(&rule.id) {
                Some(record) if record.taken => "[x]",
                _ => "[ ]",
            };
            out.push_str(&format!("  {} {} — {}", mark, rule.name, rule.dose));
            if let Some(record) = day.intake.get(&rule.id).filter(|r| r.taken) {
                if let (Some(by), Some(at)) = (&record.taken_by, record.taken_at) {
                    let local = at.with_timezone(&chrono::Local);
                    out.push_str(&format!(" (Tomado por: {} a las {})", by, local.format("%H:%M")));
                }
            }
            out.push('\n');
        }
    }
    if !day.schedule.unplaced.is_empty() {
        out.push_str("\nSin momento del día reconocido:\n");
        for rule in &day.schedule.unplaced {
            out.push_str(&format!("  {} ({})\n", rule.name, rule.time_of_day));
        }
    }
    out.push_str(&format!(
        "\nPresión arterial: mañana {} / noche {}\n",
        or_dash(&day.pressure_readings.morning),
        or_dash(&day.pressure_readings.evening)
    ));
    out.push_str(&format!("Notas: {}\n", or_dash(&day.daily_notes)));
    if let Some(by) = &day.last_updated_by {
        out.push_str(&format!("Última actualización por {}\n", by));
    }
    out
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { "-" } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::daily::DayView;
    use crate::services::medication::default_definitions;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn renders_sections_and_marks() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let mut view = DayView::new(date, default_definitions());
        view.toggle("T4", "Luis", Utc::now()).unwrap();
        view.set_morning_pressure("120/80");
        let text = render_day(&view.snapshot());

        assert!(text.starts_with("miércoles, 6 de marzo de 2024"));
        assert!(text.contains("[x] T4"));
        assert!(text.contains("Tomado por: Luis"));
        assert!(text.contains("[ ] Reorex"));
        assert!(!text.contains("B12"));
        assert!(text.contains("mañana 120/80 / noche -"));
        let fasting = text.find("Ayunas").unwrap();
        let night = text.find("Noche").unwrap();
        assert!(fasting < night);
    }
}
