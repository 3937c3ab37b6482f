//! Enumerations and field types for the operations console.
//!
//! This module defines the status vocabularies of every entity that appears on a
//! board, together with the [`BoardStatus`] trait that turns a status enum into an
//! ordered set of kanban columns. Labels are the single-select option values used
//! by the record store, so a column key is always the label of its status.

use std::fmt::Debug;
use std::hash::Hash;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Numeric row identifier assigned by the record store.
pub type RowId = u64;

/// A status vocabulary that can be laid out as kanban columns.
pub trait BoardStatus: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every status in column order.
    const ALL: &'static [Self];

    /// Record-store label, also used as the column key.
    fn label(self) -> &'static str;

    /// Terminal statuses admit no further transitions.
    fn is_terminal(self) -> bool {
        false
    }

    /// Parse a record-store label. Matching ignores case and separators so
    /// "In Progress", "in-progress" and "InProgress" are equivalent.
    fn from_label(s: &str) -> Option<Self> {
        let wanted = squash(s);
        Self::ALL.iter().copied().find(|st| squash(st.label()) == wanted)
    }

    /// Position of this status in [`BoardStatus::ALL`].
    fn column_index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Project lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    WaitingOnClient,
    Blocked,
    Done,
}

impl BoardStatus for ProjectStatus {
    const ALL: &'static [Self] = &[
        Self::NotStarted,
        Self::InProgress,
        Self::WaitingOnClient,
        Self::Blocked,
        Self::Done,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::WaitingOnClient => "Waiting on Client",
            Self::Blocked => "Blocked",
            Self::Done => "Done",
        }
    }
}

/// Assignment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    Intake,
    InProgress,
    WaitingOnClient,
    ReadyForReview,
    Done,
    Submitted,
}

impl BoardStatus for AssignmentStatus {
    const ALL: &'static [Self] = &[
        Self::Intake,
        Self::InProgress,
        Self::WaitingOnClient,
        Self::ReadyForReview,
        Self::Done,
        Self::Submitted,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Intake => "Intake",
            Self::InProgress => "In Progress",
            Self::WaitingOnClient => "Waiting on Client",
            Self::ReadyForReview => "Ready for Review",
            Self::Done => "Done",
            Self::Submitted => "Submitted",
        }
    }
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    ReadyForReview,
    Done,
}

impl BoardStatus for TaskStatus {
    const ALL: &'static [Self] = &[
        Self::Todo,
        Self::InProgress,
        Self::Blocked,
        Self::ReadyForReview,
        Self::Done,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Blocked => "Blocked",
            Self::ReadyForReview => "Ready for Review",
            Self::Done => "Done",
        }
    }
}

/// Sales pipeline stage of a prospect. `Won` and `Lost` are closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStatus {
    New,
    Contacted,
    Qualified,
    Quoted,
    Won,
    Lost,
}

impl BoardStatus for PipelineStatus {
    const ALL: &'static [Self] = &[
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::Quoted,
        Self::Won,
        Self::Lost,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Contacted => "Contacted",
            Self::Qualified => "Qualified",
            Self::Quoted => "Quoted",
            Self::Won => "Won",
            Self::Lost => "Lost",
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: &'static [Priority] = &[Self::Low, Self::Normal, Self::High, Self::Urgent];

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        let wanted = squash(s);
        Self::ALL.iter().copied().find(|p| squash(p.label()) == wanted)
    }
}

/// State of a task's approval sub-workflow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const ALL: &'static [ApprovalStatus] =
        &[Self::None, Self::Pending, Self::Approved, Self::Rejected];

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        let wanted = squash(s);
        Self::ALL.iter().copied().find(|a| squash(a.label()) == wanted)
    }
}

/// Outcome a reviewer can record on a pending approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for ApprovalStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// The boards the console can show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BoardKind {
    Tasks,
    Assignments,
    Pipeline,
}

impl BoardKind {
    pub const ALL: [BoardKind; 3] = [Self::Tasks, Self::Assignments, Self::Pipeline];

    pub fn title(self) -> &'static str {
        match self {
            Self::Tasks => "Tasks",
            Self::Assignments => "Assignments",
            Self::Pipeline => "Pipeline",
        }
    }

    /// Next board in tab order.
    pub fn next(self) -> Self {
        match self {
            Self::Tasks => Self::Assignments,
            Self::Assignments => Self::Pipeline,
            Self::Pipeline => Self::Tasks,
        }
    }
}

/// One element of a link-array field: a reference to a row in another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub id: RowId,
    #[serde(default)]
    pub value: String,
}

impl LinkRef {
    pub fn new(id: RowId, value: impl Into<String>) -> Self {
        LinkRef { id, value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_loosely() {
        assert_eq!(TaskStatus::from_label("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::from_label("in-progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::from_label("todo"), Some(TaskStatus::Todo));
        assert_eq!(AssignmentStatus::from_label("ready for review"), Some(AssignmentStatus::ReadyForReview));
        assert_eq!(PipelineStatus::from_label("Archived"), None);
    }

    #[test]
    fn only_won_and_lost_are_terminal() {
        let terminal: Vec<_> = PipelineStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![&PipelineStatus::Won, &PipelineStatus::Lost]);
        assert!(TaskStatus::ALL.iter().all(|s| !s.is_terminal()));
        assert!(AssignmentStatus::ALL.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn column_index_follows_declared_order() {
        assert_eq!(TaskStatus::Todo.column_index(), 0);
        assert_eq!(TaskStatus::Done.column_index(), 4);
        assert_eq!(PipelineStatus::Lost.column_index(), 5);
    }
}
