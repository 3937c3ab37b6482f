//! Task and subtask records.
//!
//! A task belongs to an assignment through a link array and carries its approval
//! sub-workflow state inline. Subtasks are checklist items linked to a task.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval;
use crate::board::BoardEntity;
use crate::error::{DecodeError, RejectionReason};
use crate::fields::*;
use crate::join::{ChildOf, Keyed};
use crate::rows::{self, field, Fields, FromRow, Row};

/// Approval fields embedded in a task row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalState {
    pub needs_approval: bool,
    pub approval_status: ApprovalStatus,
    pub started_by: Option<String>,
    pub approved_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
}

impl ApprovalState {
    /// State of a task that must be reviewed before completion.
    pub fn gated() -> Self {
        ApprovalState { needs_approval: true, ..Default::default() }
    }

    /// Every approval field, in record-store form.
    pub fn to_fields(&self) -> Fields {
        let mut f = Fields::new();
        f.insert(field::NEEDS_APPROVAL.into(), Value::Bool(self.needs_approval));
        f.insert(field::APPROVAL_STATUS.into(), Value::from(self.approval_status.label()));
        f.insert(field::STARTED_BY.into(), rows::opt_string(self.started_by.as_deref()));
        f.insert(field::APPROVED_BY.into(), rows::opt_string(self.approved_by.as_deref()));
        f.insert(field::SUBMITTED_AT.into(), rows::opt_timestamp(self.submitted_at));
        f.insert(field::APPROVED_AT.into(), rows::opt_timestamp(self.approved_at));
        f.insert(field::APPROVAL_NOTES.into(), rows::opt_string(self.approval_notes.as_deref()));
        f
    }

    fn from_row(row: &Row, id: RowId) -> Result<Self, DecodeError> {
        let approval_status = match rows::select(row, field::APPROVAL_STATUS) {
            None => ApprovalStatus::None,
            Some(label) => ApprovalStatus::from_label(&label).ok_or(DecodeError::InvalidValue {
                row: id,
                field: field::APPROVAL_STATUS,
                value: label,
            })?,
        };
        Ok(ApprovalState {
            needs_approval: rows::boolean(row, field::NEEDS_APPROVAL),
            approval_status,
            started_by: rows::text(row, field::STARTED_BY),
            approved_by: rows::text(row, field::APPROVED_BY),
            submitted_at: rows::timestamp(row, field::SUBMITTED_AT),
            approved_at: rows::timestamp(row, field::APPROVED_AT),
            approval_notes: rows::text(row, field::APPROVAL_NOTES),
        })
    }
}

/// A unit of work inside an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RowId,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Option<Priority>,
    pub deadline: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub assignment: Vec<LinkRef>,
    #[serde(default)]
    pub approval: ApprovalState,
}

impl Task {
    pub fn new(id: RowId, description: impl Into<String>, status: TaskStatus) -> Self {
        Task {
            id,
            description: description.into(),
            status,
            priority: None,
            deadline: None,
            assignee: None,
            assignment: Vec::new(),
            approval: ApprovalState::default(),
        }
    }

    pub fn with_assignment(mut self, assignment: RowId) -> Self {
        self.assignment = vec![LinkRef::new(assignment, "")];
        self
    }

    pub fn with_assignee(mut self, who: impl Into<String>) -> Self {
        self.assignee = Some(who.into());
        self
    }

    pub fn with_approval(mut self, approval: ApprovalState) -> Self {
        self.approval = approval;
        self
    }
}

impl FromRow for Task {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let id = rows::row_id(row)?;
        let status = match rows::select(row, field::STATUS) {
            None => TaskStatus::Todo,
            Some(label) => TaskStatus::from_label(&label).ok_or(DecodeError::InvalidValue {
                row: id,
                field: field::STATUS,
                value: label,
            })?,
        };
        Ok(Task {
            id,
            description: rows::text(row, field::DESCRIPTION)
                .or_else(|| rows::text(row, field::NAME))
                .unwrap_or_default(),
            status,
            priority: rows::select(row, field::PRIORITY).and_then(|p| Priority::from_label(&p)),
            deadline: rows::date(row, field::DEADLINE),
            assignee: rows::text(row, field::ASSIGNEE),
            assignment: rows::links(row, field::ASSIGNMENT),
            approval: ApprovalState::from_row(row, id)?,
        })
    }
}

impl BoardEntity for Task {
    type Status = TaskStatus;

    fn id(&self) -> RowId {
        self.id
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    fn title(&self) -> &str {
        &self.description
    }

    fn assignee(&self) -> Option<&str> {
        self.assignee.as_deref()
    }

    fn gate(&self, target: TaskStatus) -> Result<(), RejectionReason> {
        approval::gate(self, target)
    }
}

impl Keyed for Task {
    fn key(&self) -> RowId {
        self.id
    }
}

impl ChildOf for Task {
    fn parent_links(&self) -> &[LinkRef] {
        &self.assignment
    }
}

/// A checklist item on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: RowId,
    pub name: String,
    pub done: bool,
    pub task: Vec<LinkRef>,
}

impl Subtask {
    pub fn new(id: RowId, name: impl Into<String>, task: RowId) -> Self {
        Subtask { id, name: name.into(), done: false, task: vec![LinkRef::new(task, "")] }
    }

    /// Fields for creating a new subtask under `task`.
    pub fn create_fields(name: &str, task: RowId) -> Fields {
        let mut f = Fields::new();
        f.insert(field::NAME.into(), Value::from(name));
        f.insert(field::DONE.into(), Value::Bool(false));
        f.insert(field::TASK.into(), rows::link_ids(&[task]));
        f
    }
}

impl FromRow for Subtask {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let id = rows::row_id(row)?;
        Ok(Subtask {
            id,
            name: rows::text(row, field::NAME).unwrap_or_default(),
            done: rows::boolean(row, field::DONE),
            task: rows::links(row, field::TASK),
        })
    }
}

impl Keyed for Subtask {
    fn key(&self) -> RowId {
        self.id
    }
}

impl ChildOf for Subtask {
    fn parent_links(&self) -> &[LinkRef] {
        &self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_decodes_approval_fields() {
        let row = json!({
            "id": 12,
            "Description": "File VAT return",
            "Status": {"id": 1, "value": "Ready for Review", "color": "green"},
            "Priority": {"id": 2, "value": "Urgent"},
            "Assignment": [{"id": 3, "value": "Q1 bookkeeping"}],
            "Needs Approval": true,
            "Approval Status": "Pending",
            "Started By": "mia",
            "Submitted At": "2024-04-02T09:30:00Z",
        });
        let task = Task::from_row(row.as_object().unwrap()).unwrap();
        assert_eq!(task.status, TaskStatus::ReadyForReview);
        assert_eq!(task.priority, Some(Priority::Urgent));
        assert_eq!(task.assignment, vec![LinkRef::new(3, "Q1 bookkeeping")]);
        assert!(task.approval.needs_approval);
        assert_eq!(task.approval.approval_status, ApprovalStatus::Pending);
        assert_eq!(task.approval.started_by.as_deref(), Some("mia"));
        assert!(task.approval.submitted_at.is_some());
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let row = json!({"id": 4, "Status": "Someday"});
        let err = Task::from_row(row.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { row: 4, .. }));
    }

    #[test]
    fn approval_fields_serialise_nulls() {
        let fields = ApprovalState::gated().to_fields();
        assert_eq!(fields[field::NEEDS_APPROVAL], json!(true));
        assert_eq!(fields[field::APPROVAL_STATUS], json!("None"));
        assert_eq!(fields[field::APPROVED_AT], Value::Null);
    }
}
