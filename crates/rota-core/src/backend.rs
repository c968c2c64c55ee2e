use reqwest::StatusCode;
use thiserror::Error;

use crate::wire::{
    ApprovalRequest, Directory, LiveSchedule, Page, PageQuery, ScheduleSummary, SnapshotSchedule,
};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schedule not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("API error {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("invalid backend configuration: {0}")]
    Config(String),

    #[error("invalid identifier: '{0}'")]
    InvalidId(String),
}

impl BackendError {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        BackendError::Io {
            context: context.into(),
            source,
        }
    }

    /// Message suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Api { message, .. }
            | BackendError::Unauthorized(message)
            | BackendError::Conflict(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Operations the schedule views consume from the HRIS backend.
pub trait ScheduleBackend {
    fn fetch_schedule(&self, schedule_id: &str) -> Result<LiveSchedule, BackendError>;

    fn fetch_directory(&self, department_id: &str) -> Result<Directory, BackendError>;

    /// Denormalized schedule, optionally narrowed to one employee's rows.
    fn fetch_snapshot(
        &self,
        schedule_id: &str,
        employee_id: Option<&str>,
    ) -> Result<SnapshotSchedule, BackendError>;

    fn list_by_department(
        &self,
        department_id: &str,
        query: &PageQuery,
    ) -> Result<Page<ScheduleSummary>, BackendError>;

    fn submit_for_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError>;

    fn director_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError>;

    fn hr_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError>;
}
