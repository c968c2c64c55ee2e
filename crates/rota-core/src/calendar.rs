use chrono::{Datelike, NaiveDate, Weekday};

use crate::datetime::{first_day_of_month, last_day_of_month, parse_iso_date};

pub const DAYS_PER_WEEK: usize = 7;

/// One grid row. `None` cells are padding outside the range.
pub type Week = [Option<NaiveDate>; DAYS_PER_WEEK];

/// Inclusive, restartable day sequence. Cloning yields a fresh cursor at
/// the current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDays {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl CalendarDays {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            next: (start <= end).then_some(start),
            end,
        }
    }

    pub fn empty() -> Self {
        Self {
            next: None,
            end: NaiveDate::MIN,
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.next
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.next.is_some_and(|start| start <= date && date <= self.end)
    }
}

impl Iterator for CalendarDays {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = current.succ_opt().filter(|next| *next <= self.end);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .next
            .map(|start| (self.end - start).num_days() as usize + 1)
            .unwrap_or(0);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CalendarDays {}

pub fn calendar_days(start: NaiveDate, end: NaiveDate) -> CalendarDays {
    CalendarDays::new(start, end)
}

/// First and last day of the month containing `date`.
pub fn month_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    (first_day_of_month(date), last_day_of_month(date))
}

/// The display range of a schedule is the month of its end date.
/// Unparseable input yields an empty sequence.
#[tracing::instrument]
pub fn display_range_for(end_date: &str) -> CalendarDays {
    match parse_iso_date(end_date) {
        Some(end) => {
            let (first, last) = month_range(end);
            CalendarDays::new(first, last)
        }
        None => {
            tracing::debug!("no display range for unparseable end date");
            CalendarDays::empty()
        }
    }
}

/// Column index of `date` in a grid whose first column is `week_start`.
pub fn weekday_offset(date: NaiveDate, week_start: Weekday) -> usize {
    let day = date.weekday().num_days_from_monday();
    let first = week_start.num_days_from_monday();
    ((day + 7 - first) % 7) as usize
}

/// Lays `days` out in 7-column rows, padding the head so the first day
/// sits under its weekday column and the tail so the last row is full.
pub fn generate_calendar_weeks<I>(days: I, week_start: Weekday) -> Vec<Week>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut days = days.into_iter().peekable();
    let Some(first) = days.peek().copied() else {
        return Vec::new();
    };

    let mut cells: Vec<Option<NaiveDate>> = vec![None; weekday_offset(first, week_start)];
    cells.extend(days.map(Some));
    while cells.len() % DAYS_PER_WEEK != 0 {
        cells.push(None);
    }

    cells
        .chunks_exact(DAYS_PER_WEEK)
        .map(|chunk| {
            let mut week: Week = [None; DAYS_PER_WEEK];
            week.copy_from_slice(chunk);
            week
        })
        .collect()
}

pub fn weekday_labels(week_start: Weekday) -> [&'static str; DAYS_PER_WEEK] {
    let mut labels = [""; DAYS_PER_WEEK];
    let mut day = week_start;
    for label in &mut labels {
        *label = match day {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        };
        day = day.succ();
    }
    labels
}
