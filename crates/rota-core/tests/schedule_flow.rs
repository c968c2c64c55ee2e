use std::cell::Cell;

use chrono::{NaiveDate, Weekday};
use rota_core::approval::{
    Action, ApprovalController, ApprovalError, Navigation, Notice, REMARKS_REQUIRED, Role,
};
use rota_core::backend::{BackendError, ScheduleBackend};
use rota_core::commands::{CommandArgs, cmd_list, cmd_print, cmd_show_schedule, import_schedules};
use rota_core::config::Config;
use rota_core::grouping::{LEAVE_GROUP_LABEL, employees_for_date};
use rota_core::loader::ScheduleLoader;
use rota_core::model::{AssignmentType, ScheduleStatus};
use rota_core::render::Renderer;
use rota_core::store::ScheduleStore;
use rota_core::wire::{
    ApprovalRequest, Directory, LiveSchedule, Page, PageQuery, ScheduleSummary, SnapshotSchedule,
};
use tempfile::tempdir;

const MAY_ROSTER: &str = r##"{
  "id": "s-may",
  "name": "May 2025 Nursing Roster",
  "department": {"id": "d1", "name": "Nursing Service"},
  "startDate": "2025-05-01",
  "endDate": "2025-05-31",
  "status": "submitted",
  "entries": [
    {
      "date": "2025-05-01",
      "holiday": {"name": "Labor Day", "type": "Regular Holiday"},
      "employees": [
        {"employeeId": "e3", "firstName": "Carla", "surname": "Bautista", "type": "off"},
        {"employeeId": "e2", "firstName": "Ana", "surname": "Reyes", "type": "leave",
         "leaveTemplate": {"id": "l1", "name": "Sick Leave"}},
        {"employeeId": "e1", "firstName": "Maria", "surname": "Santos", "type": "duty",
         "shiftTemplate": {"id": "sh2", "name": "PM", "startTime": "15:00", "endTime": "23:00"}},
        {"employeeId": "e4", "firstName": "Jose", "surname": "Cruz", "type": "duty",
         "shiftTemplate": {"id": "sh1", "name": "AM", "startTime": "07:00", "endTime": "15:00"}},
        {"employeeId": "e5", "firstName": "Liza", "surname": "Aquino", "type": "leave",
         "leaveTemplate": {"id": "l2", "name": "Vacation Leave"}}
      ]
    },
    {
      "date": "2025-05-02",
      "employees": [
        {"employeeId": "e1", "firstName": "Maria", "surname": "Santos", "type": "duty",
         "shiftTemplate": {"id": "sh1", "name": "AM", "startTime": "07:00", "endTime": "15:00"}}
      ]
    }
  ]
}"##;

/// Backend that answers every mutation with a scripted result and counts calls.
struct ScriptedBackend {
    status: ScheduleStatus,
    /// `Err` text comes back as an authorization failure.
    reply: Result<String, String>,
    submit_calls: Cell<usize>,
    director_calls: Cell<usize>,
    hr_calls: Cell<usize>,
}

impl ScriptedBackend {
    fn new(status: ScheduleStatus, reply: Result<String, String>) -> Self {
        Self {
            status,
            reply,
            submit_calls: Cell::new(0),
            director_calls: Cell::new(0),
            hr_calls: Cell::new(0),
        }
    }

    fn total_calls(&self) -> usize {
        self.submit_calls.get() + self.director_calls.get() + self.hr_calls.get()
    }

    fn answer(&self, counter: &Cell<usize>) -> Result<String, BackendError> {
        counter.set(counter.get() + 1);
        self.reply.clone().map_err(BackendError::Unauthorized)
    }

    fn snapshot(&self) -> SnapshotSchedule {
        let mut record: SnapshotSchedule = serde_json::from_str(MAY_ROSTER).expect("fixture");
        record.status = self.status;
        record
    }
}

impl ScheduleBackend for ScriptedBackend {
    fn fetch_schedule(&self, _schedule_id: &str) -> Result<LiveSchedule, BackendError> {
        Ok(rota_core::adapter::live_from_snapshot(&self.snapshot()))
    }

    fn fetch_directory(&self, _department_id: &str) -> Result<Directory, BackendError> {
        let snapshot = self.snapshot();
        Ok(rota_core::adapter::directory_from_snapshots([&snapshot]))
    }

    fn fetch_snapshot(
        &self,
        _schedule_id: &str,
        _employee_id: Option<&str>,
    ) -> Result<SnapshotSchedule, BackendError> {
        Ok(self.snapshot())
    }

    fn list_by_department(
        &self,
        _department_id: &str,
        query: &PageQuery,
    ) -> Result<Page<ScheduleSummary>, BackendError> {
        Ok(Page {
            items: vec![self.snapshot().summary()],
            page: query.page,
            limit: query.limit,
            total: 1,
        })
    }

    fn submit_for_approval(&self, _request: &ApprovalRequest) -> Result<String, BackendError> {
        self.answer(&self.submit_calls)
    }

    fn director_approval(&self, _request: &ApprovalRequest) -> Result<String, BackendError> {
        self.answer(&self.director_calls)
    }

    fn hr_approval(&self, _request: &ApprovalRequest) -> Result<String, BackendError> {
        self.answer(&self.hr_calls)
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn reject_without_remarks_never_dispatches() {
    let backend = ScriptedBackend::new(ScheduleStatus::Submitted, Ok("rejected".to_string()));
    let mut controller = ApprovalController::new("s-may", Role::Director, ScheduleStatus::Submitted);

    controller.open(Action::Reject).expect("reject is offered");
    controller.set_password("secret");
    controller.set_remarks("   ");

    let err = controller.submit(&backend).expect_err("validation");
    assert_eq!(err, ApprovalError::Validation(REMARKS_REQUIRED));
    assert_eq!(backend.total_calls(), 0);
    assert_eq!(
        controller.take_notice(),
        Some(Notice::Error(REMARKS_REQUIRED.to_string()))
    );
    assert!(controller.is_open());
    assert_eq!(controller.status(), ScheduleStatus::Submitted);
}

#[test]
fn approve_without_remarks_dispatches_once_by_role() {
    let backend = ScriptedBackend::new(
        ScheduleStatus::Submitted,
        Ok("Duty schedule approved by director".to_string()),
    );
    let mut controller = ApprovalController::new("s-may", Role::Director, ScheduleStatus::Submitted);

    controller.open(Action::Approve).expect("approve is offered");
    controller.set_password("secret");

    let nav = controller.submit(&backend).expect("approved");
    assert_eq!(nav, Navigation::Back);
    assert_eq!(backend.director_calls.get(), 1);
    assert_eq!(backend.total_calls(), 1);
    assert_eq!(controller.status(), ScheduleStatus::DirectorApproved);
    assert!(!controller.is_open());
    assert!(controller.form.password.is_empty());
    assert_eq!(
        controller.take_notice(),
        Some(Notice::Success("Duty schedule approved by director".to_string()))
    );
}

#[test]
fn manager_withdraw_dispatches_to_submission() {
    let backend = ScriptedBackend::new(
        ScheduleStatus::Submitted,
        Ok("Duty schedule returned to draft".to_string()),
    );
    let mut controller = ApprovalController::new("s-may", Role::Manager, ScheduleStatus::Submitted);

    assert!(controller.open(Action::Approve).is_err());
    controller.open(Action::ReturnToDraft).expect("withdraw is offered");
    controller.set_password("secret");

    let nav = controller.submit(&backend).expect("withdrawn");
    assert_eq!(nav, Navigation::Back);
    assert_eq!(backend.submit_calls.get(), 1);
    assert_eq!(backend.total_calls(), 1);
    assert_eq!(controller.status(), ScheduleStatus::Draft);
    assert_eq!(
        controller.take_notice(),
        Some(Notice::Success("Duty schedule returned to draft".to_string()))
    );
}

#[test]
fn backend_failure_keeps_the_form() {
    let backend = ScriptedBackend::new(
        ScheduleStatus::DirectorApproved,
        Err("Invalid password".to_string()),
    );
    let mut controller = ApprovalController::new("s-may", Role::Hr, ScheduleStatus::DirectorApproved);

    controller.open(Action::Reject).expect("reject is offered");
    controller.set_password("wrong");
    controller.set_remarks("Missing night coverage");

    assert!(controller.submit(&backend).is_err());
    assert!(!controller.is_submitting());
    assert_eq!(backend.hr_calls.get(), 1);
    assert!(controller.is_open());
    assert_eq!(controller.open_action(), Some(Action::Reject));
    assert_eq!(controller.form.password, "wrong");
    assert_eq!(controller.form.remarks, "Missing night coverage");
    assert_eq!(controller.status(), ScheduleStatus::DirectorApproved);
    assert_eq!(
        controller.take_notice(),
        Some(Notice::Error("Invalid password".to_string()))
    );
    assert_eq!(controller.take_notice(), None);
}

#[test]
fn director_controls_follow_status() {
    let pending = ApprovalController::new("s-may", Role::Director, ScheduleStatus::Submitted);
    assert!(pending.shows_controls());

    let mut draft = ApprovalController::new("s-may", Role::Director, ScheduleStatus::Draft);
    assert!(!draft.shows_controls());
    assert!(draft.open(Action::Approve).is_err());
    assert!(!draft.is_open());
}

#[test]
fn loader_groups_the_labor_day_example() {
    let backend = ScriptedBackend::new(ScheduleStatus::Submitted, Ok(String::new()));
    let mut loader = ScheduleLoader::new();
    loader.load(&backend, "s-may", None);

    assert!(loader.take_error().is_none());
    assert_eq!(loader.days().len(), 31);
    assert_eq!(loader.weeks(Weekday::Sun).len(), 5);
    assert_eq!(loader.holidays().len(), 1);

    let groups = loader.groups_for(ymd(2025, 5, 1));
    let summary: Vec<(AssignmentType, &str, usize)> = groups
        .iter()
        .map(|group| (group.assignment_type, group.label.as_str(), group.members.len()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (AssignmentType::Duty, "AM", 1),
            (AssignmentType::Duty, "PM", 1),
            (AssignmentType::Leave, LEAVE_GROUP_LABEL, 2),
            (AssignmentType::Off, "OFF", 1),
        ]
    );
    let leave_names: Vec<&str> = groups[2]
        .members
        .iter()
        .map(|member| member.display_name.as_str())
        .collect();
    assert_eq!(leave_names, vec!["Aquino, L.", "Reyes, A."]);

    assert!(loader.groups_for(ymd(2025, 5, 3)).is_empty());
}

#[test]
fn live_and_snapshot_paths_agree() {
    let backend = ScriptedBackend::new(ScheduleStatus::Submitted, Ok(String::new()));
    let from_snapshot = rota_core::adapter::schedule_from_snapshot(backend.snapshot());
    let live = backend.fetch_schedule("s-may").expect("live");
    let directory = backend.fetch_directory("d1").expect("directory");
    let from_live = rota_core::adapter::schedule_from_live(live, &directory);

    for day in [ymd(2025, 5, 1), ymd(2025, 5, 2)] {
        assert_eq!(
            employees_for_date(&from_snapshot.entries, day),
            employees_for_date(&from_live.entries, day)
        );
    }
}

#[test]
fn file_store_end_to_end() {
    let temp = tempdir().expect("tempdir");
    let store = ScheduleStore::open(temp.path()).expect("open store");
    assert_eq!(import_schedules(&store, MAY_ROSTER).expect("import"), 1);

    let cfg = Config::default();
    let renderer = Renderer::plain();

    let mut out = Vec::new();
    cmd_list(
        &store,
        &cfg,
        &renderer,
        &CommandArgs::parse(&["d1".to_string(), "search:nursing".to_string()]),
        &mut out,
    )
    .expect("list");
    let listing = String::from_utf8(out).expect("utf8");
    assert!(listing.contains("s-may"));
    assert!(listing.contains("[Pending Director Approval]"));

    let mut out = Vec::new();
    cmd_show_schedule(
        &store,
        &renderer,
        &CommandArgs::parse(&["s-may".to_string(), "employee:e1".to_string()]),
        &mut out,
    )
    .expect("show");
    let shown = String::from_utf8(out).expect("utf8");
    assert!(shown.contains("2025-05-02 Fri"));
    assert!(shown.contains("Santos, M."));
    assert!(!shown.contains("Reyes, A."));

    let mut out = Vec::new();
    cmd_print(
        &store,
        &cfg,
        &renderer,
        &CommandArgs::parse(&["s-may".to_string()]),
        &mut out,
    )
    .expect("print");
    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.contains("May 2025 Nursing Roster"));
    assert!(printed.contains(" 1* RH"));
    assert!(printed.contains("Noted by:"));

    let err = cmd_show_schedule(
        &store,
        &renderer,
        &CommandArgs::parse(&["nope".to_string()]),
        &mut Vec::new(),
    )
    .expect_err("unknown schedule");
    assert!(format!("{err:#}").contains("schedule not found: nope"));
}
