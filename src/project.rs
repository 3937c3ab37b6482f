//! Projects and the assignments that hang off them.
//!
//! These are the two upper levels of the work hierarchy. Neither embeds its
//! children: an assignment points back at its project (and client) through link
//! arrays, and tasks point back at their assignment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::board::BoardEntity;
use crate::error::DecodeError;
use crate::fields::*;
use crate::join::{ChildOf, Keyed};
use crate::rows::{self, field, FromRow, Row};

/// Top level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RowId,
    pub name: String,
    pub category: Option<String>,
    pub status: ProjectStatus,
    /// Supplied by the record store; never derived from children here.
    pub completion_percentage: Option<f64>,
    pub responsible_owner: Option<String>,
    pub deadline: Option<NaiveDate>,
}

impl Project {
    pub fn new(id: RowId, name: impl Into<String>) -> Self {
        Project {
            id,
            name: name.into(),
            category: None,
            status: ProjectStatus::NotStarted,
            completion_percentage: None,
            responsible_owner: None,
            deadline: None,
        }
    }
}

impl FromRow for Project {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let id = rows::row_id(row)?;
        let status = match rows::select(row, field::STATUS) {
            None => ProjectStatus::NotStarted,
            Some(label) => ProjectStatus::from_label(&label).ok_or(DecodeError::InvalidValue {
                row: id,
                field: field::STATUS,
                value: label,
            })?,
        };
        Ok(Project {
            id,
            name: rows::text(row, field::NAME).unwrap_or_default(),
            category: rows::select(row, field::CATEGORY),
            status,
            completion_percentage: rows::number(row, field::COMPLETION),
            responsible_owner: rows::text(row, field::OWNER),
            deadline: rows::date(row, field::DEADLINE),
        })
    }
}

impl Keyed for Project {
    fn key(&self) -> RowId {
        self.id
    }
}

/// A piece of client work inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: RowId,
    pub description: String,
    pub status: AssignmentStatus,
    pub kind: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub project: Vec<LinkRef>,
    pub client: Vec<LinkRef>,
    pub assignee: Option<String>,
}

impl Assignment {
    pub fn new(id: RowId, description: impl Into<String>, status: AssignmentStatus) -> Self {
        Assignment {
            id,
            description: description.into(),
            status,
            kind: None,
            deadline: None,
            project: Vec::new(),
            client: Vec::new(),
            assignee: None,
        }
    }

    pub fn with_project(mut self, project: RowId) -> Self {
        self.project = vec![LinkRef::new(project, "")];
        self
    }

    /// Display name of the owning client, if linked.
    pub fn client_name(&self) -> Option<&str> {
        self.client.first().map(|c| c.value.as_str())
    }
}

impl FromRow for Assignment {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let id = rows::row_id(row)?;
        let status = match rows::select(row, field::STATUS) {
            None => AssignmentStatus::Intake,
            Some(label) => AssignmentStatus::from_label(&label).ok_or(DecodeError::InvalidValue {
                row: id,
                field: field::STATUS,
                value: label,
            })?,
        };
        Ok(Assignment {
            id,
            description: rows::text(row, field::DESCRIPTION)
                .or_else(|| rows::text(row, field::NAME))
                .unwrap_or_default(),
            status,
            kind: rows::select(row, field::TYPE),
            deadline: rows::date(row, field::DEADLINE),
            project: rows::links(row, field::PROJECT),
            client: rows::links(row, field::CLIENT),
            assignee: rows::text(row, field::ASSIGNEE),
        })
    }
}

impl BoardEntity for Assignment {
    type Status = AssignmentStatus;

    fn id(&self) -> RowId {
        self.id
    }

    fn status(&self) -> AssignmentStatus {
        self.status
    }

    fn set_status(&mut self, status: AssignmentStatus) {
        self.status = status;
    }

    fn title(&self) -> &str {
        &self.description
    }

    fn assignee(&self) -> Option<&str> {
        self.assignee.as_deref()
    }
}

impl Keyed for Assignment {
    fn key(&self) -> RowId {
        self.id
    }
}

impl ChildOf for Assignment {
    fn parent_links(&self) -> &[LinkRef] {
        &self.project
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assignment_keeps_project_and_client_links() {
        let row = json!({
            "id": 30,
            "Description": "Annual accounts",
            "Status": "Waiting on Client",
            "Type": {"id": 1, "value": "Accounts"},
            "Project": [{"id": 2, "value": "2024 year end"}],
            "Client": [{"id": 9, "value": "Acme Ltd"}],
        });
        let a = Assignment::from_row(row.as_object().unwrap()).unwrap();
        assert_eq!(a.status, AssignmentStatus::WaitingOnClient);
        assert_eq!(a.kind.as_deref(), Some("Accounts"));
        assert_eq!(a.parent_links(), &[LinkRef::new(2, "2024 year end")]);
        assert_eq!(a.client_name(), Some("Acme Ltd"));
    }

    #[test]
    fn project_completion_is_read_not_derived() {
        let row = json!({"id": 2, "Name": "Year end", "Completion %": "42.5", "Status": null});
        let p = Project::from_row(row.as_object().unwrap()).unwrap();
        assert_eq!(p.completion_percentage, Some(42.5));
        assert_eq!(p.status, ProjectStatus::NotStarted);
    }
}
