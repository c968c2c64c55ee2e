use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::datetime::{format_clock_label, parse_clock_minutes};
use crate::model::{AssignmentKind, AssignmentType, EmployeeAssignment, Entry, ShiftTemplate};

pub const MISSING_SHIFT_LABEL: &str = "N/A";
pub const LEAVE_GROUP_LABEL: &str = "LEAVE";
pub const OFF_LABEL: &str = "OFF";
pub const HOLIDAY_OFF_LABEL: &str = "HOLIDAY OFF";

const LEAVE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("sick leave", "SL"),
    ("vacation leave", "VL"),
    ("maternity leave", "ML"),
    ("paternity leave", "PL"),
    ("special privilege leave", "SPL"),
    ("solo parent leave", "SOLO"),
    ("emergency leave", "EL"),
    ("bereavement leave", "BL"),
    ("forced leave", "FL"),
    ("study leave", "STL"),
    ("rehabilitation leave", "RL"),
];

/// One employee line in a day cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentDisplay {
    pub employee_id: String,
    pub display_name: String,
    pub surname: String,
    pub assignment_type: AssignmentType,
    /// Shift label, leave abbreviation or fixed off marker.
    pub label: String,
    /// Leave type name or shift time range.
    pub detail: Option<String>,
    /// Minute of day the shift starts; `None` sorts last.
    pub sort_minute: Option<u32>,
    pub color: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentGroup {
    pub assignment_type: AssignmentType,
    pub label: String,
    pub start_minute: Option<u32>,
    pub color: Option<String>,
    pub members: Vec<AssignmentDisplay>,
}

impl AssignmentGroup {
    /// Splits the consolidated LEAVE bucket by leave abbreviation, keeping
    /// member order. Other groups come back as a single bucket.
    pub fn leave_subgroups(&self) -> Vec<(&str, Vec<&AssignmentDisplay>)> {
        if self.assignment_type != AssignmentType::Leave {
            return vec![(self.label.as_str(), self.members.iter().collect())];
        }

        let mut out: Vec<(&str, Vec<&AssignmentDisplay>)> = Vec::new();
        for member in &self.members {
            match out.iter_mut().find(|(abbr, _)| *abbr == member.label) {
                Some((_, bucket)) => bucket.push(member),
                None => out.push((member.label.as_str(), vec![member])),
            }
        }
        out
    }
}

pub fn display_record(assignment: &EmployeeAssignment) -> AssignmentDisplay {
    let employee = &assignment.employee;
    let (label, detail, sort_minute, color) = match &assignment.kind {
        AssignmentKind::Duty { shift: Some(shift) } => (
            shift_label(shift),
            shift_time_range(shift),
            shift_start_minute(shift),
            shift.color.clone(),
        ),
        AssignmentKind::Duty { shift: None } => {
            (MISSING_SHIFT_LABEL.to_string(), None, None, None)
        }
        AssignmentKind::Leave { leave } => {
            let name = leave.as_ref().map(|l| l.name.clone()).unwrap_or_default();
            (leave_abbreviation(&name), Some(name).filter(|n| !n.is_empty()), None, None)
        }
        AssignmentKind::Off => (OFF_LABEL.to_string(), None, None, None),
        AssignmentKind::HolidayOff => (HOLIDAY_OFF_LABEL.to_string(), None, None, None),
    };

    AssignmentDisplay {
        employee_id: employee.id.clone(),
        display_name: employee.display_name(),
        surname: employee.surname.trim().to_string(),
        assignment_type: assignment.kind.assignment_type(),
        label,
        detail,
        sort_minute,
        color,
        remark: assignment.remark.clone(),
    }
}

/// Shift name, or its time range when unnamed.
pub fn shift_label(shift: &ShiftTemplate) -> String {
    let name = shift.name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    shift_time_range(shift).unwrap_or_else(|| MISSING_SHIFT_LABEL.to_string())
}

/// `7AM-3PM`, or `7AM-11AM/1PM-5PM` for split shifts.
pub fn shift_time_range(shift: &ShiftTemplate) -> Option<String> {
    let span = |start: &Option<String>, end: &Option<String>| -> Option<String> {
        let start = parse_clock_minutes(start.as_deref()?)?;
        let end = parse_clock_minutes(end.as_deref()?)?;
        Some(format!("{}-{}", format_clock_label(start), format_clock_label(end)))
    };

    if shift.is_split() {
        let morning = span(&shift.morning_start, &shift.morning_end)?;
        let afternoon = span(&shift.afternoon_start, &shift.afternoon_end)?;
        return Some(format!("{morning}/{afternoon}"));
    }
    span(&shift.start_time, &shift.end_time)
}

/// Start minute from the template times, else from a `7AM-3PM` style name.
pub fn shift_start_minute(shift: &ShiftTemplate) -> Option<u32> {
    shift
        .start_time
        .as_deref()
        .or(shift.morning_start.as_deref())
        .and_then(parse_clock_minutes)
        .or_else(|| {
            let head = shift.name.split(['-', '/']).next()?;
            parse_clock_minutes(head)
        })
}

pub fn leave_abbreviation(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    if let Some((_, abbr)) = LEAVE_ABBREVIATIONS.iter().find(|(full, _)| *full == lower) {
        return (*abbr).to_string();
    }

    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    if initials.is_empty() {
        "LV".to_string()
    } else {
        initials
    }
}

fn group_key(record: &AssignmentDisplay) -> (AssignmentType, String) {
    let label = match record.assignment_type {
        AssignmentType::Duty => record.label.clone(),
        AssignmentType::Leave => LEAVE_GROUP_LABEL.to_string(),
        AssignmentType::Off => OFF_LABEL.to_string(),
        AssignmentType::HolidayOff => HOLIDAY_OFF_LABEL.to_string(),
    };
    (record.assignment_type, label)
}

/// Buckets records and orders buckets by type precedence, then (for duty)
/// by earliest start minute with untimed buckets last. Members are ordered
/// by surname, case-insensitively. All sorts are stable, so ties keep
/// insertion order.
pub fn group_records<I>(records: I) -> Vec<AssignmentGroup>
where
    I: IntoIterator<Item = AssignmentDisplay>,
{
    let mut groups: Vec<AssignmentGroup> = Vec::new();
    let mut index: HashMap<(AssignmentType, String), usize> = HashMap::new();

    for record in records {
        let key = group_key(&record);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(AssignmentGroup {
                assignment_type: key.0,
                label: key.1,
                start_minute: None,
                color: None,
                members: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.start_minute = match (group.start_minute, record.sort_minute) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        group.members.push(record);
    }

    for group in &mut groups {
        group.members.sort_by_key(|member| member.surname.to_lowercase());
        group.color = group
            .members
            .iter()
            .find_map(|member| member.color.clone());
    }
    groups.sort_by_key(|group| {
        let minute = match group.assignment_type {
            AssignmentType::Duty => group.start_minute.unwrap_or(u32::MAX),
            _ => 0,
        };
        (group.assignment_type.precedence(), minute)
    });

    groups
}

pub fn flatten_groups(groups: &[AssignmentGroup]) -> Vec<AssignmentDisplay> {
    groups
        .iter()
        .flat_map(|group| group.members.iter().cloned())
        .collect()
}

/// Groups the assignments of the entry dated `date`. No entry, no groups.
pub fn employees_for_date(entries: &[Entry], date: NaiveDate) -> Vec<AssignmentGroup> {
    let Some(entry) = entries.iter().find(|entry| entry.date == date) else {
        return Vec::new();
    };
    group_records(entry.assignments.iter().map(display_record))
}
