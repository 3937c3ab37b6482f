//! Status transition rules for board moves.
//!
//! Everything here is pure: no I/O, no state. Drag handlers call
//! [`check_drag`] when a card is picked up and [`check_transition`] when it is
//! dropped; explicit close actions (convert, mark lost) go through
//! [`check_close`] instead, which is the only way into a terminal status.

use std::collections::HashMap;

use serde::Serialize;

use crate::board::{BoardEntity, BoardStateStore};
use crate::error::RejectionReason;
use crate::fields::BoardStatus;

/// Whether a card in `current` can be picked up at all.
pub fn can_drag<S: BoardStatus>(current: S) -> bool {
    check_drag(current).is_ok()
}

/// Whether a card in `current` may be dropped on `target`.
pub fn can_accept<S: BoardStatus>(current: S, target: S) -> bool {
    check_accept(current, target).is_ok()
}

pub fn check_drag<S: BoardStatus>(current: S) -> Result<(), RejectionReason> {
    if current.is_terminal() {
        return Err(RejectionReason::ClosedRecord);
    }
    Ok(())
}

pub fn check_accept<S: BoardStatus>(current: S, target: S) -> Result<(), RejectionReason> {
    check_drag(current)?;
    if target.is_terminal() && target != current {
        return Err(RejectionReason::ClosedTarget);
    }
    Ok(())
}

/// Full drop check for a concrete entity: board rules, then the entity's own gate.
pub fn check_transition<E: BoardEntity>(entity: &E, target: E::Status) -> Result<(), RejectionReason> {
    check_accept(entity.status(), target)?;
    if entity.status() != target {
        entity.gate(target)?;
    }
    Ok(())
}

/// Explicit close action: moves an open record into a terminal status.
pub fn check_close<E: BoardEntity>(entity: &E, target: E::Status) -> Result<(), RejectionReason> {
    debug_assert!(target.is_terminal());
    check_drag(entity.status())?;
    entity.gate(target)
}

/// Soft work-in-progress limit exceeded for one actor in one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WipWarning {
    pub column: &'static str,
    pub actor: String,
    pub count: usize,
    pub limit: usize,
}

impl std::fmt::Display for WipWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} has {} cards in {} (limit {})",
            self.actor, self.count, self.column, self.limit
        )
    }
}

/// Check the soft WIP limit of `target` for `actor`, counting `moving` as if it
/// were already in the column. Never blocks a move.
///
/// Limits are keyed by column label; columns without a limit never warn.
pub fn wip_warning<E: BoardEntity>(
    board: &BoardStateStore<E>,
    moving: &E,
    target: E::Status,
    actor: &str,
    limits: &HashMap<String, usize>,
) -> Option<WipWarning> {
    let limit = *limits.get(target.label())?;
    if moving.assignee() != Some(actor) {
        return None;
    }
    let already_there = board
        .column(target)
        .cards
        .iter()
        .filter(|e| e.id() != moving.id() && e.assignee() == Some(actor))
        .count();
    let count = already_there + 1;
    (count > limit).then(|| WipWarning {
        column: target.label(),
        actor: actor.to_string(),
        count,
        limit,
    })
}
