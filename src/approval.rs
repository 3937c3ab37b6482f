//! Task approval sub-workflow.
//!
//! ```text
//! None ──submit──▶ Pending ──decide──▶ Approved (final)
//!                     ▲        └─────▶ Rejected
//!                     └──resubmit──────────┘
//! ```
//!
//! The approval state lives on the task and gates exactly one primary transition:
//! a task that needs approval cannot reach `Done` until it is `Approved`.

use chrono::{DateTime, Utc};

use crate::error::RejectionReason;
use crate::fields::{ApprovalStatus, Decision, TaskStatus};
use crate::task::{ApprovalState, Task};

/// Put a task up for review. Allowed from `None` or after a rejection.
pub fn submit_for_approval(task: &Task, actor: &str, now: DateTime<Utc>) -> Result<ApprovalState, RejectionReason> {
    let state = &task.approval;
    if !state.needs_approval {
        return Err(RejectionReason::ApprovalNotRequired { task: task.id });
    }
    if !matches!(state.approval_status, ApprovalStatus::None | ApprovalStatus::Rejected) {
        return Err(RejectionReason::InvalidApprovalState {
            action: "submit for approval",
            status: state.approval_status,
        });
    }
    Ok(ApprovalState {
        approval_status: ApprovalStatus::Pending,
        submitted_at: Some(now),
        started_by: Some(actor.to_string()),
        ..state.clone()
    })
}

/// Record a reviewer's decision on a pending approval.
pub fn decide(
    task: &Task,
    outcome: Decision,
    notes: Option<String>,
    approver: &str,
    now: DateTime<Utc>,
) -> Result<ApprovalState, RejectionReason> {
    let state = &task.approval;
    if state.approval_status != ApprovalStatus::Pending {
        return Err(RejectionReason::InvalidApprovalState { action: "decide", status: state.approval_status });
    }
    Ok(ApprovalState {
        approval_status: outcome.into(),
        approved_by: Some(approver.to_string()),
        approved_at: (outcome == Decision::Approved).then_some(now),
        approval_notes: notes,
        ..state.clone()
    })
}

/// Veto `Done` on gated tasks that are not approved yet.
pub fn gate(task: &Task, target: TaskStatus) -> Result<(), RejectionReason> {
    let state = &task.approval;
    if target == TaskStatus::Done && state.needs_approval && state.approval_status != ApprovalStatus::Approved {
        return Err(RejectionReason::ApprovalRequired { task: task.id, status: state.approval_status });
    }
    Ok(())
}

pub fn is_awaiting_review(task: &Task) -> bool {
    task.approval.approval_status == ApprovalStatus::Pending
}

/// Tasks waiting on a reviewer, in source order.
pub fn review_queue<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<&'a Task> {
    tasks.into_iter().filter(|t| is_awaiting_review(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ApprovalState;

    fn gated(status: ApprovalStatus) -> Task {
        Task::new(1, "Prepare accounts", TaskStatus::InProgress)
            .with_approval(ApprovalState { approval_status: status, ..ApprovalState::gated() })
    }

    #[test]
    fn submit_moves_to_pending_and_stamps_submitter() {
        let now = Utc::now();
        let next = submit_for_approval(&gated(ApprovalStatus::None), "mia", now).unwrap();
        assert_eq!(next.approval_status, ApprovalStatus::Pending);
        assert_eq!(next.submitted_at, Some(now));
        assert_eq!(next.started_by.as_deref(), Some("mia"));
        assert!(submit_for_approval(&gated(ApprovalStatus::Rejected), "mia", now).is_ok());
    }

    #[test]
    fn submit_refused_when_pending_approved_or_ungated() {
        let now = Utc::now();
        for status in [ApprovalStatus::Pending, ApprovalStatus::Approved] {
            assert!(matches!(
                submit_for_approval(&gated(status), "mia", now),
                Err(RejectionReason::InvalidApprovalState { .. })
            ));
        }
        let plain = Task::new(2, "x", TaskStatus::Todo);
        assert_eq!(
            submit_for_approval(&plain, "mia", now),
            Err(RejectionReason::ApprovalNotRequired { task: 2 })
        );
    }

    #[test]
    fn approval_stamps_time_rejection_does_not() {
        let now = Utc::now();
        let pending = gated(ApprovalStatus::Pending);

        let ok = decide(&pending, Decision::Approved, Some("ok".into()), "reviewer1", now).unwrap();
        assert_eq!(ok.approval_status, ApprovalStatus::Approved);
        assert_eq!(ok.approved_by.as_deref(), Some("reviewer1"));
        assert_eq!(ok.approved_at, Some(now));
        assert_eq!(ok.approval_notes.as_deref(), Some("ok"));

        let no = decide(&pending, Decision::Rejected, Some("redo totals".into()), "reviewer1", now).unwrap();
        assert_eq!(no.approval_status, ApprovalStatus::Rejected);
        assert_eq!(no.approved_at, None);

        assert!(decide(&gated(ApprovalStatus::None), Decision::Approved, None, "r", now).is_err());
        assert!(decide(&gated(ApprovalStatus::Approved), Decision::Rejected, None, "r", now).is_err());
    }

    #[test]
    fn done_is_gated_until_approved() {
        for status in [ApprovalStatus::None, ApprovalStatus::Pending, ApprovalStatus::Rejected] {
            assert!(matches!(
                gate(&gated(status), TaskStatus::Done),
                Err(RejectionReason::ApprovalRequired { task: 1, .. })
            ));
            assert!(gate(&gated(status), TaskStatus::ReadyForReview).is_ok());
        }
        assert!(gate(&gated(ApprovalStatus::Approved), TaskStatus::Done).is_ok());
        assert!(gate(&Task::new(3, "plain", TaskStatus::Todo), TaskStatus::Done).is_ok());
    }

    #[test]
    fn review_queue_is_a_filter() {
        let tasks = vec![
            gated(ApprovalStatus::Pending),
            Task { id: 2, ..gated(ApprovalStatus::Approved) },
            Task { id: 3, ..gated(ApprovalStatus::Pending) },
        ];
        let queue: Vec<_> = review_queue(&tasks).iter().map(|t| t.id).collect();
        assert_eq!(queue, vec![1, 3]);
    }
}
