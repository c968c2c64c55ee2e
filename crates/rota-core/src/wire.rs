//! Shapes exchanged with the schedule backend.
//!
//! Two entry shapes exist: the snapshot shape carries employee, shift and
//! leave data inline; the live shape only carries ids that are resolved
//! against a department [`Directory`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::approval::Action;
use crate::model::{
    ApprovalRecord, AssignmentType, DepartmentRef, EmployeeRef, Holiday, LeaveTemplate,
    ScheduleStatus, ShiftTemplate,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", bound(deserialize = "A: Deserialize<'de>"))]
pub struct ScheduleRecord<A> {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department: DepartmentRef,
    pub start_date: String,
    pub end_date: String,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub entries: Vec<EntryRecord<A>>,
    #[serde(default)]
    pub prepared_by: Option<ApprovalRecord>,
    #[serde(default)]
    pub director_approval: Option<ApprovalRecord>,
    #[serde(default)]
    pub hr_approval: Option<ApprovalRecord>,
}

impl<A> ScheduleRecord<A> {
    pub fn summary(&self) -> ScheduleSummary {
        ScheduleSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            department: self.department.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", bound(deserialize = "A: Deserialize<'de>"))]
pub struct EntryRecord<A> {
    pub date: String,
    #[serde(default)]
    pub holiday: Option<Holiday>,
    #[serde(default)]
    pub employees: Vec<A>,
}

pub type SnapshotSchedule = ScheduleRecord<SnapshotAssignment>;
pub type LiveSchedule = ScheduleRecord<LiveAssignment>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotAssignment {
    pub employee_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(rename = "type")]
    pub assignment_type: AssignmentType,
    #[serde(default)]
    pub shift_template: Option<ShiftTemplate>,
    #[serde(default)]
    pub leave_template: Option<LeaveTemplate>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveAssignment {
    pub employee_id: String,
    #[serde(rename = "type")]
    pub assignment_type: AssignmentType,
    #[serde(default)]
    pub shift_template_id: Option<String>,
    #[serde(default)]
    pub leave_template_id: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(default)]
    pub employees: Vec<EmployeeRef>,
    #[serde(default)]
    pub shift_templates: Vec<ShiftTemplate>,
    #[serde(default)]
    pub leave_templates: Vec<LeaveTemplate>,
}

impl Directory {
    pub fn employee(&self, id: &str) -> Option<&EmployeeRef> {
        self.employees.iter().find(|e| e.id == id)
    }

    pub fn shift(&self, id: &str) -> Option<&ShiftTemplate> {
        self.shift_templates.iter().find(|s| s.id == id)
    }

    pub fn leave(&self, id: &str) -> Option<&LeaveTemplate> {
        self.leave_templates.iter().find(|l| l.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department: DepartmentRef,
    pub start_date: String,
    pub end_date: String,
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub schedule_id: String,
    pub action: Action,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("schedule_id", &self.schedule_id)
            .field("action", &self.action)
            .field("password", &"***")
            .field("remarks", &self.remarks)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}
