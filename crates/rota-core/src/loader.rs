use chrono::{NaiveDate, Weekday};
use tracing::{debug, info, instrument, warn};

use crate::adapter::schedule_from_snapshot;
use crate::backend::{BackendError, ScheduleBackend};
use crate::calendar::{CalendarDays, Week, display_range_for, generate_calendar_weeks};
use crate::grouping::{AssignmentGroup, employees_for_date};
use crate::holiday::HolidaySet;
use crate::model::{DutySchedule, Entry};
use crate::wire::SnapshotSchedule;

pub const REFRESHED_MESSAGE: &str = "Schedule refreshed";

/// Identifies one issued fetch. Responses are applied in arrival order;
/// an older ticket arriving late still overwrites newer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub schedule_id: String,
    pub employee_id: Option<String>,
    pub seq: u64,
    pub manual: bool,
}

/// Loads one schedule snapshot and derives what the calendar view needs.
#[derive(Debug, Clone)]
pub struct ScheduleLoader {
    schedule_id: Option<String>,
    employee_id: Option<String>,
    loading: bool,
    error: Option<String>,
    success: Option<String>,
    schedule: Option<DutySchedule>,
    days: CalendarDays,
    issued: u64,
}

impl Default for ScheduleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleLoader {
    pub fn new() -> Self {
        Self {
            schedule_id: None,
            employee_id: None,
            loading: false,
            error: None,
            success: None,
            schedule: None,
            days: CalendarDays::empty(),
            issued: 0,
        }
    }

    /// Records the identifiers; a ticket comes back only when they differ
    /// from the current ones.
    #[instrument(skip(self))]
    pub fn set_target(
        &mut self,
        schedule_id: &str,
        employee_id: Option<&str>,
    ) -> Option<FetchTicket> {
        let unchanged = self.schedule_id.as_deref() == Some(schedule_id)
            && self.employee_id.as_deref() == employee_id;
        if unchanged {
            debug!("target unchanged; no fetch");
            return None;
        }
        self.schedule_id = Some(schedule_id.to_string());
        self.employee_id = employee_id.map(str::to_string);
        self.issue(false)
    }

    /// Re-issues the fetch for the current identifiers.
    pub fn begin_refresh(&mut self) -> Option<FetchTicket> {
        self.issue(true)
    }

    fn issue(&mut self, manual: bool) -> Option<FetchTicket> {
        let schedule_id = self.schedule_id.clone()?;
        self.issued += 1;
        self.loading = true;
        Some(FetchTicket {
            schedule_id,
            employee_id: self.employee_id.clone(),
            seq: self.issued,
            manual,
        })
    }

    #[instrument(skip(self, result), fields(schedule = %ticket.schedule_id, seq = ticket.seq))]
    pub fn receive(
        &mut self,
        ticket: FetchTicket,
        result: Result<SnapshotSchedule, BackendError>,
    ) {
        if ticket.seq < self.issued {
            debug!(latest = self.issued, "applying response from an older request");
        }
        self.loading = false;

        match result {
            Ok(record) => {
                let schedule = schedule_from_snapshot(record);
                self.days = display_range_for(&schedule.end_date);
                for issue in schedule.validate() {
                    warn!(%issue, "schedule data issue");
                }
                info!(
                    entries = schedule.entries.len(),
                    days = self.days.len(),
                    "schedule loaded"
                );
                self.schedule = Some(schedule);
                if ticket.manual {
                    self.success = Some(REFRESHED_MESSAGE.to_string());
                }
            }
            Err(err) => {
                warn!(error = %err, "schedule fetch failed");
                self.error = Some(err.user_message());
            }
        }
    }

    /// Sets the target and, if it changed, fetches synchronously.
    pub fn load(
        &mut self,
        backend: &dyn ScheduleBackend,
        schedule_id: &str,
        employee_id: Option<&str>,
    ) {
        if let Some(ticket) = self.set_target(schedule_id, employee_id) {
            self.run(backend, ticket);
        }
    }

    pub fn refresh(&mut self, backend: &dyn ScheduleBackend) {
        if let Some(ticket) = self.begin_refresh() {
            self.run(backend, ticket);
        }
    }

    fn run(&mut self, backend: &dyn ScheduleBackend, ticket: FetchTicket) {
        let result = backend.fetch_snapshot(&ticket.schedule_id, ticket.employee_id.as_deref());
        self.receive(ticket, result);
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    pub fn take_success(&mut self) -> Option<String> {
        self.success.take()
    }

    pub fn schedule(&self) -> Option<&DutySchedule> {
        self.schedule.as_ref()
    }

    pub fn entries(&self) -> &[Entry] {
        self.schedule
            .as_ref()
            .map(|schedule| schedule.entries.as_slice())
            .unwrap_or_default()
    }

    pub fn days(&self) -> CalendarDays {
        self.days.clone()
    }

    pub fn weeks(&self, week_start: Weekday) -> Vec<Week> {
        generate_calendar_weeks(self.days(), week_start)
    }

    pub fn holidays(&self) -> HolidaySet {
        HolidaySet::from_entries(self.entries())
    }

    pub fn groups_for(&self, date: NaiveDate) -> Vec<AssignmentGroup> {
        employees_for_date(self.entries(), date)
    }
}
