//! In-memory kanban board state.
//!
//! A [`BoardStateStore`] holds one ordered column per status of an entity type and
//! is a transient projection of the entities' remote `status` field: building it
//! twice from the same rows yields the same columns in the same order. The store
//! never talks to the record store. Moving a card across columns rewrites the card's
//! status locally and reports the implied status change to the caller.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{BoardError, RejectionReason};
use crate::fields::{BoardStatus, RowId};

/// An entity that can be shown as a card on a board.
pub trait BoardEntity: Clone + Send + Sync + 'static {
    type Status: BoardStatus;

    fn id(&self) -> RowId;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    /// Card headline.
    fn title(&self) -> &str;

    /// Identity the card is assigned to; drives the soft WIP limit.
    fn assignee(&self) -> Option<&str> {
        None
    }

    /// Entity-specific veto on reaching `target`, checked on top of the board
    /// rules in [`crate::guard`].
    fn gate(&self, _target: Self::Status) -> Result<(), RejectionReason> {
        Ok(())
    }
}

/// A card slot: column plus index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position<S> {
    pub status: S,
    pub index: usize,
}

impl<S> Position<S> {
    pub fn new(status: S, index: usize) -> Self {
        Position { status, index }
    }
}

/// One status column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<E: BoardEntity> {
    pub status: E::Status,
    pub cards: Vec<E>,
}

/// Result of a successful move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome<S> {
    /// `Some((from, to))` when the card changed column and therefore status.
    pub status_change: Option<(S, S)>,
}

/// Immutable copy of every column, cheap to clone.
#[derive(Debug, Clone)]
pub struct BoardSnapshot<E: BoardEntity> {
    columns: Arc<Vec<Column<E>>>,
    revision: u64,
}

impl<E: BoardEntity> BoardSnapshot<E> {
    /// Board revision the snapshot was taken at.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn locate(&self, id: RowId) -> Option<(usize, usize)> {
        locate_in(&self.columns, id)
    }

    pub fn get(&self, id: RowId) -> Option<&E> {
        self.locate(id).map(|(c, i)| &self.columns[c].cards[i])
    }
}

/// Column view model for one entity type.
#[derive(Debug, Clone)]
pub struct BoardStateStore<E: BoardEntity> {
    columns: Vec<Column<E>>,
    revision: u64,
}

fn locate_in<E: BoardEntity>(columns: &[Column<E>], id: RowId) -> Option<(usize, usize)> {
    columns.iter().enumerate().find_map(|(c, col)| {
        col.cards.iter().position(|e| e.id() == id).map(|i| (c, i))
    })
}

impl<E: BoardEntity> Default for BoardStateStore<E> {
    fn default() -> Self {
        BoardStateStore {
            columns: E::Status::ALL.iter().map(|&status| Column { status, cards: Vec::new() }).collect(),
            revision: 0,
        }
    }
}

impl<E: BoardEntity> BoardStateStore<E> {
    /// Lay entities out by status, keeping source order within each column.
    pub fn from_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let mut board = Self::default();
        for entity in entities {
            let col = entity.status().column_index();
            board.columns[col].cards.push(entity);
        }
        board
    }

    pub fn columns(&self) -> &[Column<E>] {
        &self.columns
    }

    pub fn column(&self, status: E::Status) -> &Column<E> {
        &self.columns[status.column_index()]
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.columns.iter().flat_map(|c| c.cards.iter())
    }

    /// Column and index of an entity.
    pub fn locate(&self, id: RowId) -> Option<(usize, usize)> {
        locate_in(&self.columns, id)
    }

    pub fn position_of(&self, id: RowId) -> Option<Position<E::Status>> {
        self.locate(id).map(|(c, i)| Position::new(self.columns[c].status, i))
    }

    pub fn get(&self, id: RowId) -> Option<&E> {
        self.locate(id).map(|(c, i)| &self.columns[c].cards[i])
    }

    /// Move `entity_id` from `from` to `to`.
    ///
    /// `from` must name the entity's current slot; a mismatch means the caller acted
    /// on a stale view and nothing is changed. `to.index` is clamped to the target
    /// column's length.
    pub fn move_entity(
        &mut self,
        entity_id: RowId,
        from: Position<E::Status>,
        to: Position<E::Status>,
    ) -> Result<MoveOutcome<E::Status>, BoardError> {
        let from_col = from.status.column_index();
        let at_slot = self.columns[from_col].cards.get(from.index).map(BoardEntity::id);
        if at_slot != Some(entity_id) {
            return Err(match self.locate(entity_id) {
                None => BoardError::UnknownEntity(entity_id),
                Some(_) => BoardError::StalePosition {
                    entity: entity_id,
                    column: from.status.label(),
                    index: from.index,
                },
            });
        }

        let mut entity = self.columns[from_col].cards.remove(from.index);
        let status_change = (from.status != to.status).then(|| {
            entity.set_status(to.status);
            (from.status, to.status)
        });
        let target = &mut self.columns[to.status.column_index()].cards;
        let index = to.index.min(target.len());
        target.insert(index, entity);
        self.revision += 1;

        tracing::debug!(
            entity = entity_id,
            from = from.status.label(),
            to = to.status.label(),
            index,
            "card moved"
        );
        Ok(MoveOutcome { status_change })
    }

    /// Replace an entity's fields in place. A status change relocates the card to
    /// the end of its new column.
    pub fn replace_entity(&mut self, entity: E) -> Result<(), BoardError> {
        let (c, i) = self.locate(entity.id()).ok_or(BoardError::UnknownEntity(entity.id()))?;
        if self.columns[c].status == entity.status() {
            self.columns[c].cards[i] = entity;
        } else {
            self.columns[c].cards.remove(i);
            self.columns[entity.status().column_index()].cards.push(entity);
        }
        self.revision += 1;
        Ok(())
    }

    /// Add a freshly created entity at the end of its column.
    pub fn insert(&mut self, entity: E) {
        let col = entity.status().column_index();
        self.columns[col].cards.push(entity);
        self.revision += 1;
    }

    pub fn snapshot(&self) -> BoardSnapshot<E> {
        BoardSnapshot { columns: Arc::new(self.columns.clone()), revision: self.revision }
    }

    /// Reset every column to `snapshot`.
    pub fn restore(&mut self, snapshot: &BoardSnapshot<E>) {
        self.columns = snapshot.columns.as_ref().clone();
        self.revision += 1;
    }

    /// Put a single entity back where `snapshot` had it, leaving every other card
    /// alone. Entities absent from the snapshot are removed.
    pub fn restore_entity(&mut self, snapshot: &BoardSnapshot<E>, id: RowId) {
        if let Some((c, i)) = self.locate(id) {
            self.columns[c].cards.remove(i);
        }
        if let Some((c, i)) = snapshot.locate(id) {
            let entity = snapshot.columns[c].cards[i].clone();
            let cards = &mut self.columns[c].cards;
            let index = i.min(cards.len());
            cards.insert(index, entity);
        }
        self.revision += 1;
    }

    /// Column membership as ids, for comparisons and display.
    pub fn layout(&self) -> Vec<(E::Status, Vec<RowId>)> {
        self.columns
            .iter()
            .map(|c| (c.status, c.cards.iter().map(BoardEntity::id).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::TaskStatus;
    use crate::task::Task;
    use proptest::prelude::*;

    fn tasks() -> Vec<Task> {
        vec![
            Task::new(1, "a", TaskStatus::Todo),
            Task::new(2, "b", TaskStatus::InProgress),
            Task::new(3, "c", TaskStatus::Todo),
            Task::new(4, "d", TaskStatus::Done),
        ]
    }

    #[test]
    fn columns_follow_status_and_source_order() {
        let board = BoardStateStore::from_entities(tasks());
        assert_eq!(board.column(TaskStatus::Todo).cards.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(board.column(TaskStatus::Blocked).cards.len(), 0);
        assert_eq!(board.columns().len(), TaskStatus::ALL.len());
        assert_eq!(board.len(), 4);
    }

    #[test]
    fn reorder_within_column_keeps_status() {
        let mut board = BoardStateStore::from_entities(tasks());
        let out = board
            .move_entity(3, Position::new(TaskStatus::Todo, 1), Position::new(TaskStatus::Todo, 0))
            .unwrap();
        assert_eq!(out.status_change, None);
        assert_eq!(board.column(TaskStatus::Todo).cards.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(board.get(3).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn cross_column_move_rewrites_status() {
        let mut board = BoardStateStore::from_entities(tasks());
        let out = board
            .move_entity(1, Position::new(TaskStatus::Todo, 0), Position::new(TaskStatus::InProgress, 9))
            .unwrap();
        assert_eq!(out.status_change, Some((TaskStatus::Todo, TaskStatus::InProgress)));
        assert_eq!(board.get(1).unwrap().status, TaskStatus::InProgress);
        assert_eq!(board.position_of(1), Some(Position::new(TaskStatus::InProgress, 1)));
    }

    #[test]
    fn stale_source_slot_changes_nothing() {
        let mut board = BoardStateStore::from_entities(tasks());
        let before = board.layout();
        let err = board
            .move_entity(1, Position::new(TaskStatus::Todo, 1), Position::new(TaskStatus::Done, 0))
            .unwrap_err();
        assert!(matches!(err, BoardError::StalePosition { entity: 1, .. }));
        assert_eq!(
            board.move_entity(42, Position::new(TaskStatus::Todo, 0), Position::new(TaskStatus::Done, 0)),
            Err(BoardError::UnknownEntity(42))
        );
        assert_eq!(board.layout(), before);
    }

    #[test]
    fn restore_entity_leaves_other_cards_alone() {
        let mut board = BoardStateStore::from_entities(tasks());
        let snap = board.snapshot();
        board.move_entity(1, Position::new(TaskStatus::Todo, 0), Position::new(TaskStatus::Done, 0)).unwrap();
        board.move_entity(2, Position::new(TaskStatus::InProgress, 0), Position::new(TaskStatus::Blocked, 0)).unwrap();

        board.restore_entity(&snap, 1);

        assert_eq!(board.position_of(1), Some(Position::new(TaskStatus::Todo, 0)));
        assert_eq!(board.get(1).unwrap().status, TaskStatus::Todo);
        assert_eq!(board.get(2).unwrap().status, TaskStatus::Blocked);
    }

    #[test]
    fn replace_relocates_on_status_change() {
        let mut board = BoardStateStore::from_entities(tasks());
        let mut t = board.get(1).unwrap().clone();
        t.assignee = Some("mia".into());
        board.replace_entity(t.clone()).unwrap();
        assert_eq!(board.position_of(1), Some(Position::new(TaskStatus::Todo, 0)));
        t.status = TaskStatus::Blocked;
        board.replace_entity(t).unwrap();
        assert_eq!(board.position_of(1), Some(Position::new(TaskStatus::Blocked, 0)));
    }

    fn arb_status() -> impl Strategy<Value = TaskStatus> {
        prop::sample::select(TaskStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn rebuilding_from_the_same_rows_is_deterministic(
            statuses in proptest::collection::vec(arb_status(), 0..30),
        ) {
            let rows: Vec<Task> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| Task::new(i as u64 + 1, "t", *s))
                .collect();
            let a = BoardStateStore::from_entities(rows.clone());
            let b = BoardStateStore::from_entities(rows);
            prop_assert_eq!(a.layout(), b.layout());
            prop_assert_eq!(a.columns(), b.columns());
        }

        #[test]
        fn restore_returns_exactly_to_the_snapshot(
            statuses in proptest::collection::vec(arb_status(), 1..15),
            moves in proptest::collection::vec((any::<prop::sample::Index>(), arb_status(), 0usize..20), 1..20),
        ) {
            let rows: Vec<Task> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| Task::new(i as u64 + 1, "t", *s))
                .collect();
            let mut board = BoardStateStore::from_entities(rows);
            let s0 = board.snapshot();
            let before = board.columns().to_vec();

            for (pick, to, index) in moves {
                let ids: Vec<RowId> = board.iter().map(|t| t.id).collect();
                let id = ids[pick.index(ids.len())];
                let from = board.position_of(id).unwrap();
                board.move_entity(id, from, Position::new(to, index)).unwrap();
            }

            board.restore(&s0);
            prop_assert_eq!(board.columns(), &before[..]);
        }
    }
}
