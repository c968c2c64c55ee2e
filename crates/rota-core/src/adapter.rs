//! Converts both backend entry shapes into the one domain model the rest
//! of the crate works with.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::datetime::parse_iso_date;
use crate::model::{
    AssignmentKind, AssignmentType, DutySchedule, EmployeeAssignment, EmployeeRef, Entry,
    LeaveTemplate, ShiftTemplate,
};
use crate::wire::{
    Directory, EntryRecord, LiveAssignment, LiveSchedule, ScheduleRecord, SnapshotAssignment,
    SnapshotSchedule,
};

#[tracing::instrument(skip(record), fields(id = %record.id))]
pub fn schedule_from_snapshot(record: SnapshotSchedule) -> DutySchedule {
    build_schedule(record, assignment_from_snapshot)
}

#[tracing::instrument(skip(record, directory), fields(id = %record.id))]
pub fn schedule_from_live(record: LiveSchedule, directory: &Directory) -> DutySchedule {
    build_schedule(record, |assignment| assignment_from_live(assignment, directory))
}

pub fn assignment_from_snapshot(assignment: SnapshotAssignment) -> EmployeeAssignment {
    let employee = EmployeeRef {
        id: assignment.employee_id,
        first_name: assignment.first_name,
        surname: assignment.surname,
    };
    EmployeeAssignment {
        kind: resolve_kind(
            &employee.id,
            assignment.assignment_type,
            assignment.shift_template,
            assignment.leave_template,
        ),
        employee,
        remark: non_blank(assignment.remarks),
    }
}

pub fn assignment_from_live(
    assignment: LiveAssignment,
    directory: &Directory,
) -> EmployeeAssignment {
    let employee = directory
        .employee(&assignment.employee_id)
        .cloned()
        .unwrap_or_else(|| {
            warn!(employee = %assignment.employee_id, "employee missing from directory");
            EmployeeRef {
                id: assignment.employee_id.clone(),
                ..Default::default()
            }
        });
    let shift = assignment
        .shift_template_id
        .as_deref()
        .and_then(|id| directory.shift(id))
        .cloned();
    let leave = assignment
        .leave_template_id
        .as_deref()
        .and_then(|id| directory.leave(id))
        .cloned();

    EmployeeAssignment {
        kind: resolve_kind(&employee.id, assignment.assignment_type, shift, leave),
        employee,
        remark: non_blank(assignment.remarks),
    }
}

/// Strips a snapshot down to ids.
pub fn live_from_snapshot(record: &SnapshotSchedule) -> LiveSchedule {
    map_entries(record.clone(), |assignment| LiveAssignment {
        employee_id: assignment.employee_id,
        assignment_type: assignment.assignment_type,
        shift_template_id: assignment.shift_template.map(|shift| shift.id),
        leave_template_id: assignment.leave_template.map(|leave| leave.id),
        remarks: assignment.remarks,
    })
}

/// Collects every employee and template referenced by the snapshots.
pub fn directory_from_snapshots<'a, I>(records: I) -> Directory
where
    I: IntoIterator<Item = &'a SnapshotSchedule>,
{
    let mut directory = Directory::default();
    let mut employees = BTreeSet::new();
    let mut shifts = BTreeSet::new();
    let mut leaves = BTreeSet::new();

    for record in records {
        for assignment in record.entries.iter().flat_map(|entry| &entry.employees) {
            if employees.insert(assignment.employee_id.clone()) {
                directory.employees.push(EmployeeRef {
                    id: assignment.employee_id.clone(),
                    first_name: assignment.first_name.clone(),
                    surname: assignment.surname.clone(),
                });
            }
            if let Some(shift) = &assignment.shift_template
                && shifts.insert(shift.id.clone())
            {
                directory.shift_templates.push(shift.clone());
            }
            if let Some(leave) = &assignment.leave_template
                && leaves.insert(leave.id.clone())
            {
                directory.leave_templates.push(leave.clone());
            }
        }
    }

    directory
}

fn resolve_kind(
    employee_id: &str,
    assignment_type: AssignmentType,
    shift: Option<ShiftTemplate>,
    leave: Option<LeaveTemplate>,
) -> AssignmentKind {
    match assignment_type {
        AssignmentType::Duty => {
            if leave.is_some() {
                warn!(employee = employee_id, "duty assignment carried a leave template; ignored");
            }
            AssignmentKind::Duty { shift }
        }
        AssignmentType::Leave => {
            if shift.is_some() {
                warn!(employee = employee_id, "leave assignment carried a shift template; ignored");
            }
            AssignmentKind::Leave { leave }
        }
        AssignmentType::Off => AssignmentKind::Off,
        AssignmentType::HolidayOff => AssignmentKind::HolidayOff,
    }
}

fn build_schedule<A, F>(record: ScheduleRecord<A>, mut convert: F) -> DutySchedule
where
    F: FnMut(A) -> EmployeeAssignment,
{
    let entries = normalize_entries(record.entries, &mut convert);
    DutySchedule {
        id: record.id,
        name: record.name,
        department: record.department,
        start_date: record.start_date,
        end_date: record.end_date,
        status: record.status,
        entries,
        prepared_by: record.prepared_by,
        director_approval: record.director_approval,
        hr_approval: record.hr_approval,
    }
}

/// Parses entry dates into local calendar dates. Unparseable dates and
/// repeated dates (first one wins) are dropped.
fn normalize_entries<A, F>(records: Vec<EntryRecord<A>>, convert: &mut F) -> Vec<Entry>
where
    F: FnMut(A) -> EmployeeAssignment,
{
    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let Some(date) = parse_iso_date(&record.date) else {
            warn!(date = %record.date, "dropping entry with unparseable date");
            continue;
        };
        if !seen.insert(date) {
            warn!(%date, "dropping duplicate entry");
            continue;
        }
        entries.push(Entry {
            date,
            holiday: record.holiday,
            assignments: record.employees.into_iter().map(&mut *convert).collect(),
        });
    }

    entries.sort_by_key(|entry| entry.date);
    debug!(count = entries.len(), "normalized entries");
    entries
}

fn map_entries<A, B, F>(record: ScheduleRecord<A>, mut convert: F) -> ScheduleRecord<B>
where
    F: FnMut(A) -> B,
{
    ScheduleRecord {
        id: record.id,
        name: record.name,
        department: record.department,
        start_date: record.start_date,
        end_date: record.end_date,
        status: record.status,
        entries: record
            .entries
            .into_iter()
            .map(|entry| EntryRecord {
                date: entry.date,
                holiday: entry.holiday,
                employees: entry.employees.into_iter().map(&mut convert).collect(),
            })
            .collect(),
        prepared_by: record.prepared_by,
        director_approval: record.director_approval,
        hr_approval: record.hr_approval,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
