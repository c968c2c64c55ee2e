//! Approval workflow: which role may do what in which status, and the
//! confirmation form that gates every transition.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, ScheduleBackend};
use crate::model::ScheduleStatus;
use crate::wire::ApprovalRequest;

pub const PASSWORD_REQUIRED: &str = "Password is required";
pub const REMARKS_REQUIRED: &str = "Remarks are required for rejection";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Director,
    Hr,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Role::Manager),
            "director" => Ok(Role::Director),
            "hr" => Ok(Role::Hr),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Manager => "manager",
            Role::Director => "director",
            Role::Hr => "hr",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    ReturnToDraft,
    Approve,
    Reject,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::Submit => "Submit for approval",
            Action::ReturnToDraft => "Return to draft",
            Action::Approve => "Approve",
            Action::Reject => "Reject",
        }
    }

    pub fn requires_remarks(self) -> bool {
        self == Action::Reject
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("{role} cannot {action} a schedule in status {status}")]
    NotPermitted {
        role: Role,
        status: ScheduleStatus,
        action: Action,
    },

    #[error("no approval action is open")]
    NotOpen,

    #[error("{0}")]
    Backend(String),
}

impl From<BackendError> for ApprovalError {
    fn from(err: BackendError) -> Self {
        ApprovalError::Backend(err.user_message())
    }
}

impl ScheduleStatus {
    /// Structural edges of the status graph, independent of role.
    /// Forward steps, rejection from any in-review state, and the
    /// manager's withdrawal of a submission nobody has acted on yet.
    pub fn can_advance_to(self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Draft)
                | (Submitted, ManagerApproved)
                | (Submitted, DirectorApproved)
                | (ManagerApproved, DirectorApproved)
                | (DirectorApproved, HrApproved)
                | (Submitted, Rejected)
                | (ManagerApproved, Rejected)
                | (DirectorApproved, Rejected)
        )
    }
}

/// Role-gated action table. Anything not listed here renders as the status
/// badge only.
pub fn allowed_actions(role: Role, status: ScheduleStatus) -> BTreeSet<Action> {
    use ScheduleStatus::*;
    let actions: &[Action] = match (role, status) {
        (Role::Manager, Draft) => &[Action::Submit],
        (Role::Manager, Submitted) => &[Action::ReturnToDraft],
        (Role::Director, Submitted) => &[Action::Approve, Action::Reject],
        (Role::Hr, DirectorApproved) => &[Action::Approve, Action::Reject],
        _ => &[],
    };
    actions.iter().copied().collect()
}

/// Target status of `action`, if `role` may take it from `status`.
pub fn transition(
    role: Role,
    status: ScheduleStatus,
    action: Action,
) -> Result<ScheduleStatus, ApprovalError> {
    if !allowed_actions(role, status).contains(&action) {
        return Err(ApprovalError::NotPermitted {
            role,
            status,
            action,
        });
    }

    let next = match (role, action) {
        (_, Action::Reject) => ScheduleStatus::Rejected,
        (Role::Manager, Action::Submit) => ScheduleStatus::Submitted,
        (Role::Manager, Action::ReturnToDraft) => ScheduleStatus::Draft,
        (Role::Director, Action::Approve) => ScheduleStatus::DirectorApproved,
        (Role::Hr, Action::Approve) => ScheduleStatus::HrApproved,
        _ => {
            return Err(ApprovalError::NotPermitted {
                role,
                status,
                action,
            });
        }
    };
    debug_assert!(status.can_advance_to(next));
    Ok(next)
}

/// Password and remarks typed into the confirmation dialog.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApprovalForm {
    pub password: String,
    pub remarks: String,
}

impl fmt::Debug for ApprovalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalForm")
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("remarks", &self.remarks)
            .finish()
    }
}

impl ApprovalForm {
    pub fn validate(&self, action: Action) -> Result<(), ApprovalError> {
        if self.password.is_empty() {
            return Err(ApprovalError::Validation(PASSWORD_REQUIRED));
        }
        if action.requires_remarks() && self.remarks.trim().is_empty() {
            return Err(ApprovalError::Validation(REMARKS_REQUIRED));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.password.clear();
        self.remarks.clear();
    }

    fn remarks(&self) -> Option<String> {
        let trimmed = self.remarks.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Transient message for the user. Taken once, then gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Return to the view that opened the dialog.
    Back,
}

/// Modal state and submission for one schedule viewed by one role.
#[derive(Debug, Clone)]
pub struct ApprovalController {
    schedule_id: String,
    role: Role,
    status: ScheduleStatus,
    open: Option<Action>,
    submitting: bool,
    pub form: ApprovalForm,
    notice: Option<Notice>,
}

impl ApprovalController {
    pub fn new(schedule_id: impl Into<String>, role: Role, status: ScheduleStatus) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            role,
            status,
            open: None,
            submitting: false,
            form: ApprovalForm::default(),
            notice: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> ScheduleStatus {
        self.status
    }

    /// Actions to render as buttons; empty means badge only.
    pub fn available_actions(&self) -> BTreeSet<Action> {
        allowed_actions(self.role, self.status)
    }

    pub fn shows_controls(&self) -> bool {
        !self.available_actions().is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_action(&self) -> Option<Action> {
        self.open
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    #[instrument(skip(self), fields(schedule = %self.schedule_id, role = %self.role))]
    pub fn open(&mut self, action: Action) -> Result<(), ApprovalError> {
        if !self.available_actions().contains(&action) {
            return Err(ApprovalError::NotPermitted {
                role: self.role,
                status: self.status,
                action,
            });
        }
        debug!(?action, "opening approval dialog");
        self.open = Some(action);
        Ok(())
    }

    pub fn close(&mut self) {
        self.open = None;
        self.form.clear();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.form.password = password.into();
    }

    pub fn set_remarks(&mut self, remarks: impl Into<String>) {
        self.form.remarks = remarks.into();
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Validates, dispatches to the backend endpoint for this role, and
    /// applies the outcome. Validation and backend failures leave the
    /// dialog open with its fields as typed.
    #[instrument(skip(self, backend), fields(schedule = %self.schedule_id, role = %self.role))]
    pub fn submit(&mut self, backend: &dyn ScheduleBackend) -> Result<Navigation, ApprovalError> {
        let action = self.open.ok_or(ApprovalError::NotOpen)?;

        if let Err(err) = self.form.validate(action) {
            warn!(error = %err, "approval blocked by validation");
            self.notice = Some(Notice::Error(err.to_string()));
            return Err(err);
        }
        let next = transition(self.role, self.status, action)?;

        let request = ApprovalRequest {
            schedule_id: self.schedule_id.clone(),
            action,
            password: self.form.password.clone(),
            remarks: self.form.remarks(),
        };

        self.submitting = true;
        let result = match self.role {
            Role::Manager => backend.submit_for_approval(&request),
            Role::Director => backend.director_approval(&request),
            Role::Hr => backend.hr_approval(&request),
        };
        self.submitting = false;

        match result {
            Ok(message) => {
                info!(?action, status = %next, "approval action accepted");
                self.status = next;
                self.close();
                self.notice = Some(Notice::Success(message));
                Ok(Navigation::Back)
            }
            Err(err) => {
                warn!(error = %err, "approval action failed");
                let err = ApprovalError::from(err);
                self.notice = Some(Notice::Error(err.to_string()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_role_gates() {
        for status in ScheduleStatus::ALL {
            let manager = allowed_actions(Role::Manager, status);
            let director = allowed_actions(Role::Director, status);
            let hr = allowed_actions(Role::Hr, status);

            assert_eq!(
                !manager.is_empty(),
                matches!(status, ScheduleStatus::Draft | ScheduleStatus::Submitted)
            );
            assert_eq!(!director.is_empty(), status == ScheduleStatus::Submitted);
            assert_eq!(!hr.is_empty(), status == ScheduleStatus::DirectorApproved);
        }
    }

    #[test]
    fn every_permitted_transition_follows_the_graph() {
        for role in [Role::Manager, Role::Director, Role::Hr] {
            for status in ScheduleStatus::ALL {
                for action in allowed_actions(role, status) {
                    let next = transition(role, status, action).expect("permitted");
                    assert!(status.can_advance_to(next), "{status} -> {next}");
                }
            }
        }
    }

    #[test]
    fn final_states_are_absorbing() {
        for next in ScheduleStatus::ALL {
            assert!(!ScheduleStatus::HrApproved.can_advance_to(next));
            assert!(!ScheduleStatus::Rejected.can_advance_to(next));
        }
    }

    #[test]
    fn director_cannot_act_on_draft() {
        assert!(allowed_actions(Role::Director, ScheduleStatus::Draft).is_empty());
        assert_eq!(
            transition(Role::Director, ScheduleStatus::Draft, Action::Approve),
            Err(ApprovalError::NotPermitted {
                role: Role::Director,
                status: ScheduleStatus::Draft,
                action: Action::Approve,
            })
        );
    }

    #[test]
    fn form_validation_messages() {
        let mut form = ApprovalForm {
            password: "x".to_string(),
            remarks: "   ".to_string(),
        };
        assert_eq!(
            form.validate(Action::Reject),
            Err(ApprovalError::Validation(REMARKS_REQUIRED))
        );
        assert_eq!(form.validate(Action::Approve), Ok(()));
        assert!(!format!("{form:?}").contains('x'));

        form.password = "  ".to_string();
        assert_eq!(form.validate(Action::Approve), Ok(()));

        form.password.clear();
        assert_eq!(
            form.validate(Action::Approve),
            Err(ApprovalError::Validation(PASSWORD_REQUIRED))
        );
    }

    #[test]
    fn roles_parse() {
        assert_eq!("HR".parse::<Role>().expect("hr"), Role::Hr);
        assert!("janitor".parse::<Role>().is_err());
    }
}
