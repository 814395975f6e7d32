use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// Recurrence Evaluator
// Decides whether a medication rule applies on a calendar date.
// Months are 1-based (January = 1) and weekdays are `chrono::Weekday`,
// so matching never depends on the runtime locale.

/// When a medication is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly { days: BTreeSet<WeekdayKey> },
    MonthlyLastWeekday { weekday: WeekdayKey },
    /// Stored value we could not interpret; treated as always due.
    Unrecognized(String),
}

/// `chrono::Weekday` with a total order (Monday first), usable in sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct WeekdayKey(u8);

impl WeekdayKey {
    pub fn weekday(self) -> Weekday {
        match self.0 {
            0 => Weekday::Mon,
            1 => Weekday::Tue,
            2 => Weekday::Wed,
            3 => Weekday::Thu,
            4 => Weekday::Fri,
            5 => Weekday::Sat,
            _ => Weekday::Sun,
        }
    }

    /// Canonical storage name (`Monday` … `Sunday`).
    pub fn canonical_name(self) -> &'static str {
        match self.weekday() {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    /// Spanish display name, only for the presentation boundary.
    pub fn display_name_es(self) -> &'static str {
        match self.weekday() {
            Weekday::Mon => "Lunes",
            Weekday::Tue => "Martes",
            Weekday::Wed => "Miércoles",
            Weekday::Thu => "Jueves",
            Weekday::Fri => "Viernes",
            Weekday::Sat => "Sábado",
            Weekday::Sun => "Domingo",
        }
    }

    /// Accepts canonical English names and the Spanish names found in older
    /// documents. Case and accents are ignored.
    pub fn parse(name: &str) -> Option<Self> {
        let folded: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'á' => 'a',
                'é' => 'e',
                'í' => 'i',
                'ó' => 'o',
                'ú' => 'u',
                other => other,
            })
            .collect();

        let weekday = match folded.as_str() {
            "monday" | "mon" | "lunes" => Weekday::Mon,
            "tuesday" | "tue" | "martes" => Weekday::Tue,
            "wednesday" | "wed" | "miercoles" => Weekday::Wed,
            "thursday" | "thu" | "jueves" => Weekday::Thu,
            "friday" | "fri" | "viernes" => Weekday::Fri,
            "saturday" | "sat" | "sabado" => Weekday::Sat,
            "sunday" | "sun" | "domingo" => Weekday::Sun,
            _ => return None,
        };
        Some(weekday.into())
    }
}

impl From<Weekday> for WeekdayKey {
    fn from(weekday: Weekday) -> Self {
        WeekdayKey(weekday.num_days_from_monday() as u8)
    }
}

impl From<WeekdayKey> for String {
    fn from(key: WeekdayKey) -> Self {
        key.canonical_name().to_string()
    }
}

impl TryFrom<String> for WeekdayKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WeekdayKey::parse(&value).ok_or_else(|| format!("Unknown weekday: {}", value))
    }
}

impl Frequency {
    pub fn weekly<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        Frequency::Weekly {
            days: days.into_iter().map(WeekdayKey::from).collect(),
        }
    }

    pub fn monthly_last(weekday: Weekday) -> Self {
        Frequency::MonthlyLastWeekday { weekday: weekday.into() }
    }

    /// Stored tag: `daily`, `weekly`, `monthly_last_<weekday>` or the raw value.
    pub fn tag(&self) -> String {
        match self {
            Frequency::Daily => "daily".to_string(),
            Frequency::Weekly { .. } => "weekly".to_string(),
            Frequency::MonthlyLastWeekday { weekday } => {
                format!("monthly_last_{}", weekday.canonical_name().to_lowercase())
            }
            Frequency::Unrecognized(raw) => raw.clone(),
        }
    }

    /// Rebuild from the stored tag and optional day list.
    pub fn from_stored(tag: &str, days: Option<&[String]>) -> Self {
        let tag = tag.trim();
        match tag {
            "daily" | "" => Frequency::Daily,
            "weekly" => {
                let parsed: BTreeSet<WeekdayKey> = days
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|d| {
                        let key = WeekdayKey::parse(d);
                        if key.is_none() {
                            log::warn!("Ignoring unknown weekday '{}' in weekly rule", d);
                        }
                        key
                    })
                    .collect();
                Frequency::Weekly { days: parsed }
            }
            other => match other
                .strip_prefix("monthly_last_")
                .and_then(WeekdayKey::parse)
            {
                Some(weekday) => Frequency::MonthlyLastWeekday { weekday },
                None => Frequency::Unrecognized(other.to_string()),
            },
        }
    }
}

/// Whether a rule with `frequency` is due on `date`.
pub fn applies(frequency: &Frequency, date: NaiveDate) -> bool {
    match frequency {
        Frequency::Daily => true,
        Frequency::Weekly { days } => days.contains(&WeekdayKey::from(date.weekday())),
        Frequency::MonthlyLastWeekday { weekday } => {
            last_weekday_of_month(date.year(), date.month(), weekday.weekday()) == Some(date)
        }
        Frequency::Unrecognized(raw) => {
            log::warn!("Unrecognized frequency '{}', treating as daily", raw);
            true
        }
    }
}

/// Number of days in a 1-based month, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    last_day_of_month(year, month).map(|d| d.day())
}

/// Last calendar day of a 1-based month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .filter(|_| (1..=12).contains(&month))
        .and_then(|first_of_next| first_of_next.pred_opt())
}

/// Walks back from the end of the month to the last `weekday`.
pub fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let mut day = last_day_of_month(year, month)?;
    while day.weekday() != weekday {
        day = day - Duration::days(1);
    }
    Some(day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_tue_thu_sat() {
        let freq = Frequency::weekly([Weekday::Tue, Weekday::Thu, Weekday::Sat]);
        assert!(!applies(&freq, ymd(2024, 3, 6))); // Wednesday
        assert!(applies(&freq, ymd(2024, 3, 7))); // Thursday
        assert!(applies(&freq, ymd(2024, 3, 5))); // Tuesday
        assert!(!applies(&freq, ymd(2024, 3, 10))); // Sunday
    }

    #[test]
    fn weekly_matches_membership_for_a_whole_year() {
        let freq = Frequency::weekly([Weekday::Mon, Weekday::Fri]);
        let mut day = ymd(2025, 1, 1);
        while day.year() == 2025 {
            let expected = matches!(day.weekday(), Weekday::Mon | Weekday::Fri);
            assert_eq!(applies(&freq, day), expected, "{}", day);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn empty_weekly_never_applies() {
        let freq = Frequency::Weekly { days: BTreeSet::new() };
        assert!(!applies(&freq, ymd(2024, 3, 5)));
    }

    #[test]
    fn last_tuesday_thirty_day_month_starting_friday() {
        // November 2024 starts on a Friday.
        assert_eq!(ymd(2024, 11, 1).weekday(), Weekday::Fri);
        let freq = Frequency::monthly_last(Weekday::Tue);
        assert!(applies(&freq, ymd(2024, 11, 26)));
        assert!(!applies(&freq, ymd(2024, 11, 19)));
        assert!(!applies(&freq, ymd(2024, 11, 30)));
    }

    #[test]
    fn last_tuesday_thirty_day_month_starting_sunday() {
        // September 2024 starts on a Sunday.
        assert_eq!(ymd(2024, 9, 1).weekday(), Weekday::Sun);
        assert_eq!(last_weekday_of_month(2024, 9, Weekday::Tue), Some(ymd(2024, 9, 24)));
    }

    #[test]
    fn last_tuesday_february() {
        assert_eq!(last_weekday_of_month(2024, 2, Weekday::Tue), Some(ymd(2024, 2, 27)));
        assert_eq!(last_weekday_of_month(2023, 2, Weekday::Tue), Some(ymd(2023, 2, 28)));
    }

    #[test]
    fn last_tuesday_exactly_once_per_month() {
        let freq = Frequency::monthly_last(Weekday::Tue);
        for year in 1990..=2040 {
            for month in 1..=12 {
                let len = days_in_month(year, month).unwrap();
                let hits: Vec<NaiveDate> = (1..=len)
                    .map(|d| ymd(year, month, d))
                    .filter(|d| applies(&freq, *d))
                    .collect();
                assert_eq!(hits.len(), 1, "{}-{}", year, month);
                assert_eq!(hits[0].weekday(), Weekday::Tue);
                assert!(hits[0].day() + 7 > len);
            }
        }
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(1900, 2), Some(28));
        assert_eq!(days_in_month(2000, 2), Some(29));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 13), None);
        assert_eq!(days_in_month(2024, 0), None);
    }

    #[test]
    fn unrecognized_is_permissive() {
        let freq = Frequency::from_stored("fortnightly", None);
        assert_eq!(freq, Frequency::Unrecognized("fortnightly".into()));
        assert!(applies(&freq, ymd(2024, 3, 5)));
    }

    #[test]
    fn stored_tags_parse() {
        let days = vec!["Martes".to_string(), "jueves".to_string(), "Sábado".to_string()];
        assert_eq!(
            Frequency::from_stored("weekly", Some(&days)),
            Frequency::weekly([Weekday::Tue, Weekday::Thu, Weekday::Sat])
        );
        assert_eq!(
            Frequency::from_stored("monthly_last_tuesday", None),
            Frequency::monthly_last(Weekday::Tue)
        );
        assert_eq!(Frequency::monthly_last(Weekday::Fri).tag(), "monthly_last_friday");
        assert_eq!(Frequency::from_stored("", None), Frequency::Daily);
    }

    #[test]
    fn weekday_names() {
        assert_eq!(WeekdayKey::parse("Miercoles"), Some(Weekday::Wed.into()));
        assert_eq!(WeekdayKey::parse(" SUNDAY "), Some(Weekday::Sun.into()));
        assert_eq!(WeekdayKey::parse("Funday"), None);
        let key: WeekdayKey = Weekday::Sat.into();
        assert_eq!(key.canonical_name(), "Saturday");
        assert_eq!(key.display_name_es(), "Sábado");
        assert_eq!(key.weekday(), Weekday::Sat);
    }
}
