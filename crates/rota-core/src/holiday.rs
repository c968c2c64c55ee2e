use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::datetime::date_key;
use crate::model::{Entry, Holiday};

/// Category suffix → compact marker. Longest suffixes first so
/// "Special Non-Working Holiday" never matches a shorter entry.
const HOLIDAY_ABBREVIATIONS: &[(&str, &str)] = &[
    ("special non-working holiday", "SNWH"),
    ("special working holiday", "SWH"),
    ("regular holiday", "RH"),
    ("local holiday", "LH"),
];

const GENERIC_HOLIDAY_MARKER: &str = "H";

/// Holidays keyed by normalized date string, never by instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidaySet {
    by_date: BTreeMap<String, Holiday>,
}

impl HolidaySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[Entry]) -> Self {
        let mut set = Self::new();
        for entry in entries {
            if let Some(holiday) = &entry.holiday {
                set.insert(entry.date, holiday.clone());
            }
        }
        set
    }

    pub fn insert(&mut self, date: NaiveDate, holiday: Holiday) {
        self.by_date.insert(date_key(date), holiday);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Holiday> {
        self.by_date.get(&date_key(date))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_date.contains_key(key.trim())
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

pub fn is_holiday(date: NaiveDate, holidays: &HolidaySet) -> bool {
    holidays.contains_key(&date_key(date))
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn should_mark_red(date: NaiveDate, holidays: &HolidaySet) -> bool {
    is_weekend(date) || is_holiday(date, holidays)
}

/// Compact marker for a holiday name or category such as
/// "Independence Day - Regular Holiday".
pub fn holiday_abbreviation(name: &str) -> &'static str {
    let lower = name.trim().to_ascii_lowercase();
    HOLIDAY_ABBREVIATIONS
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix))
        .map(|(_, abbr)| *abbr)
        .unwrap_or(GENERIC_HOLIDAY_MARKER)
}

/// Prefers the explicit category, then the name suffix.
pub fn marker_for(holiday: &Holiday) -> &'static str {
    holiday
        .kind
        .as_deref()
        .map(holiday_abbreviation)
        .filter(|abbr| *abbr != GENERIC_HOLIDAY_MARKER)
        .unwrap_or_else(|| holiday_abbreviation(&holiday.name))
}
