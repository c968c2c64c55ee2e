use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{directory_from_snapshots, live_from_snapshot};
use crate::approval::{Action, PASSWORD_REQUIRED, REMARKS_REQUIRED, Role, transition};
use crate::backend::{BackendError, ScheduleBackend};
use crate::model::{ApprovalRecord, Decision};
use crate::wire::{
    ApprovalRequest, Directory, LiveSchedule, Page, PageQuery, ScheduleSummary, SnapshotSchedule,
};

/// Who the local store records as approver.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

/// File-backed schedule backend: one snapshot per line in
/// `schedules.data`, rewritten atomically on every change.
#[derive(Debug)]
pub struct ScheduleStore {
    pub data_dir: PathBuf,
    pub schedules_path: PathBuf,
    actor: Actor,
    password: Option<String>,
}

impl ScheduleStore {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let schedules_path = data_dir.join("schedules.data");
        if !schedules_path.exists() {
            fs::write(&schedules_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            schedules = %schedules_path.display(),
            "opened schedule store"
        );

        Ok(Self {
            data_dir,
            schedules_path,
            actor: Actor::default(),
            password: None,
        })
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    /// When set, approval requests must carry exactly this password.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    #[instrument(skip(self))]
    pub fn load_all(&self) -> anyhow::Result<Vec<SnapshotSchedule>> {
        load_jsonl(&self.schedules_path).context("failed to load schedules.data")
    }

    #[instrument(skip(self, records))]
    pub fn save_all(&self, records: &[SnapshotSchedule]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.schedules_path, records).context("failed to save schedules.data")
    }

    /// Inserts or replaces by id. A blank id gets a fresh one.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub fn upsert(&self, mut record: SnapshotSchedule) -> anyhow::Result<String> {
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();

        let mut records = self.load_all()?;
        match records.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => {
                debug!("replacing schedule");
                *existing = record;
            }
            None => records.push(record),
        }
        self.save_all(&records)?;
        Ok(id)
    }

    pub fn find(&self, schedule_id: &str) -> anyhow::Result<Option<SnapshotSchedule>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|record| record.id == schedule_id))
    }

    #[instrument(skip(self, request), fields(schedule = %request.schedule_id, action = ?request.action))]
    fn apply(&self, role: Role, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.check_password(&request.password)?;
        let remarks = request
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        if request.action.requires_remarks() && remarks.is_none() {
            return Err(BackendError::Conflict(
                REMARKS_REQUIRED.to_string(),
            ));
        }

        let mut records = self.load_all().map_err(to_backend)?;
        let record = records
            .iter_mut()
            .find(|record| record.id == request.schedule_id)
            .ok_or_else(|| BackendError::NotFound(request.schedule_id.clone()))?;

        let next = transition(role, record.status, request.action)
            .map_err(|err| BackendError::Conflict(err.to_string()))?;

        let decision = if request.action == Action::Reject {
            Decision::Rejected
        } else {
            Decision::Approved
        };
        let approval = ApprovalRecord {
            approver_id: self.actor.id.clone(),
            approver_name: self.actor.name.clone(),
            decided_at: Utc::now(),
            decision,
            remarks,
        };

        match (role, request.action) {
            (Role::Manager, Action::Submit) => record.prepared_by = Some(approval),
            (Role::Manager, _) => record.prepared_by = None,
            (Role::Director, _) => record.director_approval = Some(approval),
            (Role::Hr, _) => record.hr_approval = Some(approval),
        }

        info!(from = %record.status, to = %next, "schedule status changed");
        record.status = next;
        self.save_all(&records).map_err(to_backend)?;

        Ok(outcome_message(role, request.action).to_string())
    }

    fn check_password(&self, password: &str) -> Result<(), BackendError> {
        if password.is_empty() {
            return Err(BackendError::Unauthorized(
                PASSWORD_REQUIRED.to_string(),
            ));
        }
        if let Some(expected) = &self.password
            && expected != password
        {
            warn!("approval rejected: password mismatch");
            return Err(BackendError::Unauthorized("Invalid password".to_string()));
        }
        Ok(())
    }
}

impl ScheduleBackend for ScheduleStore {
    fn fetch_schedule(&self, schedule_id: &str) -> Result<LiveSchedule, BackendError> {
        let record = self
            .find(schedule_id)
            .map_err(to_backend)?
            .ok_or_else(|| BackendError::NotFound(schedule_id.to_string()))?;
        Ok(live_from_snapshot(&record))
    }

    fn fetch_directory(&self, department_id: &str) -> Result<Directory, BackendError> {
        let records = self.load_all().map_err(to_backend)?;
        Ok(directory_from_snapshots(
            records.iter().filter(|record| record.department.id == department_id),
        ))
    }

    #[instrument(skip(self))]
    fn fetch_snapshot(
        &self,
        schedule_id: &str,
        employee_id: Option<&str>,
    ) -> Result<SnapshotSchedule, BackendError> {
        let mut record = self
            .find(schedule_id)
            .map_err(to_backend)?
            .ok_or_else(|| BackendError::NotFound(schedule_id.to_string()))?;

        if let Some(employee_id) = employee_id {
            for entry in &mut record.entries {
                entry.employees.retain(|row| row.employee_id == employee_id);
            }
        }
        Ok(record)
    }

    #[instrument(skip(self))]
    fn list_by_department(
        &self,
        department_id: &str,
        query: &PageQuery,
    ) -> Result<Page<ScheduleSummary>, BackendError> {
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let matching: Vec<ScheduleSummary> = self
            .load_all()
            .map_err(to_backend)?
            .iter()
            .filter(|record| record.department.id == department_id)
            .filter(|record| {
                needle
                    .as_ref()
                    .is_none_or(|needle| record.name.to_lowercase().contains(needle))
            })
            .map(|record| record.summary())
            .collect();

        let page = query.page.max(1);
        let limit = query.limit.max(1);
        let skip = (page as usize - 1) * limit as usize;
        Ok(Page {
            total: matching.len() as u64,
            items: matching.into_iter().skip(skip).take(limit as usize).collect(),
            page,
            limit,
        })
    }

    fn submit_for_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.apply(Role::Manager, request)
    }

    fn director_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.apply(Role::Director, request)
    }

    fn hr_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.apply(Role::Hr, request)
    }
}

fn outcome_message(role: Role, action: Action) -> &'static str {
    match (role, action) {
        (_, Action::Reject) => "Duty schedule rejected",
        (_, Action::Submit) => "Duty schedule submitted for approval",
        (_, Action::ReturnToDraft) => "Duty schedule returned to draft",
        (Role::Hr, Action::Approve) => "Duty schedule approved by HR",
        (_, Action::Approve) => "Duty schedule approved by director",
    }
}

fn to_backend(err: anyhow::Error) -> BackendError {
    match err.downcast::<std::io::Error>() {
        Ok(io) => BackendError::io(io, "schedule store"),
        Err(other) => BackendError::Io {
            context: format!("{other:#}"),
            source: std::io::Error::other(other.to_string()),
        },
    }
}

#[instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<SnapshotSchedule>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: SnapshotSchedule = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded schedules from jsonl");
    Ok(out)
}

#[instrument(skip(path, records))]
fn save_jsonl_atomic(path: &Path, records: &[SnapshotSchedule]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
