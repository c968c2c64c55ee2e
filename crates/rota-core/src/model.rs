use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::parse_iso_date;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Draft,
    Submitted,
    ManagerApproved,
    DirectorApproved,
    HrApproved,
    Rejected,
}

impl ScheduleStatus {
    pub const ALL: [ScheduleStatus; 6] = [
        ScheduleStatus::Draft,
        ScheduleStatus::Submitted,
        ScheduleStatus::ManagerApproved,
        ScheduleStatus::DirectorApproved,
        ScheduleStatus::HrApproved,
        ScheduleStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "draft",
            ScheduleStatus::Submitted => "submitted",
            ScheduleStatus::ManagerApproved => "manager_approved",
            ScheduleStatus::DirectorApproved => "director_approved",
            ScheduleStatus::HrApproved => "hr_approved",
            ScheduleStatus::Rejected => "rejected",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "Draft",
            ScheduleStatus::Submitted => "Pending Director Approval",
            ScheduleStatus::ManagerApproved => "Manager Approved",
            ScheduleStatus::DirectorApproved => "Pending HR Approval",
            ScheduleStatus::HrApproved => "Approved",
            ScheduleStatus::Rejected => "Rejected",
        }
    }

    /// Informationally immutable once final.
    pub fn is_final(self) -> bool {
        matches!(self, ScheduleStatus::HrApproved | ScheduleStatus::Rejected)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ScheduleStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| anyhow!("unknown schedule status: {s}"))
    }
}

/// Assignment category. The declaration order is the display precedence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Duty,
    Leave,
    Off,
    HolidayOff,
}

impl AssignmentType {
    pub fn precedence(self) -> u8 {
        match self {
            AssignmentType::Duty => 1,
            AssignmentType::Leave => 2,
            AssignmentType::Off => 3,
            AssignmentType::HolidayOff => 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRef {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub surname: String,
}

impl EmployeeRef {
    /// `Surname, F.`; falls back to whichever part is present.
    pub fn display_name(&self) -> String {
        let surname = self.surname.trim();
        let initial = self.first_name.trim().chars().next();
        match (surname.is_empty(), initial) {
            (false, Some(ch)) => format!("{surname}, {}.", ch.to_uppercase()),
            (false, None) => surname.to_string(),
            (true, Some(_)) => self.first_name.trim().to_string(),
            (true, None) => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShiftTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub morning_start: Option<String>,
    #[serde(default)]
    pub morning_end: Option<String>,
    #[serde(default)]
    pub afternoon_start: Option<String>,
    #[serde(default)]
    pub afternoon_end: Option<String>,
}

impl ShiftTemplate {
    pub fn is_split(&self) -> bool {
        self.morning_start.is_some() && self.afternoon_start.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// What an employee does on a day. The payload makes the shift and leave
/// templates mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignmentKind {
    Duty { shift: Option<ShiftTemplate> },
    Leave { leave: Option<LeaveTemplate> },
    Off,
    HolidayOff,
}

impl AssignmentKind {
    pub fn assignment_type(&self) -> AssignmentType {
        match self {
            AssignmentKind::Duty { .. } => AssignmentType::Duty,
            AssignmentKind::Leave { .. } => AssignmentType::Leave,
            AssignmentKind::Off => AssignmentType::Off,
            AssignmentKind::HolidayOff => AssignmentType::HolidayOff,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmployeeAssignment {
    pub employee: EmployeeRef,
    #[serde(flatten)]
    pub kind: AssignmentKind,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub date: NaiveDate,
    #[serde(default)]
    pub holiday: Option<Holiday>,
    #[serde(default)]
    pub assignments: Vec<EmployeeAssignment>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub approver_id: String,
    #[serde(default)]
    pub approver_name: String,
    pub decided_at: DateTime<Utc>,
    pub decision: Decision,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DutySchedule {
    pub id: String,
    pub name: String,
    pub department: DepartmentRef,
    pub start_date: String,
    pub end_date: String,
    pub status: ScheduleStatus,
    pub entries: Vec<Entry>,
    pub prepared_by: Option<ApprovalRecord>,
    pub director_approval: Option<ApprovalRecord>,
    pub hr_approval: Option<ApprovalRecord>,
}

impl DutySchedule {
    pub fn start(&self) -> Option<NaiveDate> {
        parse_iso_date(&self.start_date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        parse_iso_date(&self.end_date)
    }

    /// Problems with entry dates: duplicates and dates outside the range.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let (start, end) = (self.start(), self.end());
        if start.is_none() {
            issues.push(format!("unparseable start date: {}", self.start_date));
        }
        if end.is_none() {
            issues.push(format!("unparseable end date: {}", self.end_date));
        }

        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.date) {
                issues.push(format!("duplicate entry for {}", entry.date));
            }
            if let (Some(start), Some(end)) = (start, end)
                && (entry.date < start || entry.date > end)
            {
                issues.push(format!("entry {} outside {start}..{end}", entry.date));
            }
        }
        issues
    }
}
