//! Optimistic mutations with per-entity ordering and rollback.
//!
//! [`OptimisticMutationCoordinator::apply`] changes the board first and asks the
//! record store second. Each mutation captures its own [`BoardSnapshot`] before it
//! touches the board, so a failure can be undone without looking at whatever the
//! board has become in the meantime.
//!
//! Remote updates run on tokio tasks. Results come back over a channel and are
//! applied by the board's owner through [`drain`](OptimisticMutationCoordinator::drain)
//! or [`next_events`](OptimisticMutationCoordinator::next_events); the board itself is
//! never shared with the tasks. Dropping the coordinator aborts outstanding requests
//! and discards their results.
//!
//! Ordering: at most one request per entity is in flight. Later changes to the
//! same entity wait in a FIFO lane. When a request fails, the entity is rolled back
//! to the failed mutation's snapshot and every change still waiting behind it is
//! reverted too, since it was built on top of the state that just got undone.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::board::{BoardEntity, BoardSnapshot, BoardStateStore, Position};
use crate::config::RetryConfig;
use crate::error::{BoardError, StoreError};
use crate::fields::{BoardStatus, RowId};
use crate::rows::{field, Fields};
use crate::store::{RecordStore, TableId};

pub type MutationId = u64;

/// A change to one entity on the board.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<E: BoardEntity> {
    /// Drag a card between (or within) columns.
    Move { entity_id: RowId, from: Position<E::Status>, to: Position<E::Status> },
    /// Replace an entity's fields; `fields` is the remote patch.
    Edit { entity: E, fields: Fields },
}

impl<E: BoardEntity> Change<E> {
    pub fn entity_id(&self) -> RowId {
        match self {
            Change::Move { entity_id, .. } => *entity_id,
            Change::Edit { entity, .. } => entity.id(),
        }
    }
}

/// Handle for a change whose remote update has been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMutation {
    pub id: MutationId,
    pub entity_id: RowId,
    /// Waiting behind an earlier request for the same entity.
    pub queued: bool,
}

/// Why the store refused a mutation, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub message: String,
    pub transient: bool,
    pub attempts: u32,
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt{})", self.message, self.attempts, if self.attempts == 1 { "" } else { "s" })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertCause {
    /// The store rejected this mutation.
    Remote(RemoteFailure),
    /// An earlier mutation of the same entity failed and took this one with it.
    PredecessorFailed(MutationId),
}

/// What happened to a scheduled mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEvent<E: BoardEntity> {
    Confirmed { mutation: MutationId, entity_id: RowId },
    Reverted { mutation: MutationId, entity_id: RowId, cause: RevertCause, change: Change<E> },
}

struct Settlement {
    mutation: MutationId,
    entity_id: RowId,
    result: Result<(), RemoteFailure>,
}

struct InFlight<E: BoardEntity> {
    id: MutationId,
    snapshot: BoardSnapshot<E>,
    /// Board revision right after the optimistic apply.
    applied_at: u64,
    change: Change<E>,
    fields: Fields,
    handle: Option<JoinHandle<()>>,
}

struct Lane<E: BoardEntity> {
    active: InFlight<E>,
    waiting: VecDeque<InFlight<E>>,
}

/// Applies changes optimistically and reconciles them with the record store.
pub struct OptimisticMutationCoordinator<E: BoardEntity> {
    store: Arc<dyn RecordStore>,
    table: TableId,
    retry: RetryConfig,
    lanes: HashMap<RowId, Lane<E>>,
    tx: mpsc::UnboundedSender<Settlement>,
    rx: mpsc::UnboundedReceiver<Settlement>,
    next_id: MutationId,
}

impl<E: BoardEntity> OptimisticMutationCoordinator<E> {
    pub fn new(store: Arc<dyn RecordStore>, table: TableId, retry: RetryConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        OptimisticMutationCoordinator { store, table, retry, lanes: HashMap::new(), tx, rx, next_id: 1 }
    }

    /// Whether a request for `entity_id` is outstanding.
    pub fn is_busy(&self, entity_id: RowId) -> bool {
        self.lanes.contains_key(&entity_id)
    }

    /// Number of mutations not yet settled, queued ones included.
    pub fn pending(&self) -> usize {
        self.lanes.values().map(|l| 1 + l.waiting.len()).sum()
    }

    /// Apply `change` to `board` now and schedule the remote update.
    ///
    /// Returns `Ok(None)` for a pure reorder within one column: card order is not
    /// stored remotely, so there is nothing to send.
    pub fn apply(
        &mut self,
        board: &mut BoardStateStore<E>,
        change: Change<E>,
    ) -> Result<Option<PendingMutation>, BoardError> {
        let snapshot = board.snapshot();
        let fields = match &change {
            Change::Move { entity_id, from, to } => {
                let outcome = board.move_entity(*entity_id, *from, *to)?;
                let Some((_, status)) = outcome.status_change else { return Ok(None) };
                let mut f = Fields::new();
                f.insert(field::STATUS.into(), Value::from(status.label()));
                f
            }
            Change::Edit { entity, fields } => {
                board.replace_entity(entity.clone())?;
                fields.clone()
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        let entity_id = change.entity_id();
        let flight = InFlight { id, snapshot, applied_at: board.revision(), change, fields, handle: None };

        let queued = match self.lanes.get_mut(&entity_id) {
            Some(lane) => {
                tracing::debug!(mutation = id, entity = entity_id, "queued behind in-flight update");
                lane.waiting.push_back(flight);
                true
            }
            None => {
                let mut lane = Lane { active: flight, waiting: VecDeque::new() };
                self.start(entity_id, &mut lane.active);
                self.lanes.insert(entity_id, lane);
                false
            }
        };
        Ok(Some(PendingMutation { id, entity_id, queued }))
    }

    fn start(&self, entity_id: RowId, flight: &mut InFlight<E>) {
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        let table = self.table;
        let retry = self.retry;
        let fields = flight.fields.clone();
        let mutation = flight.id;
        flight.handle = Some(tokio::spawn(async move {
            let result = push_update(store.as_ref(), table, entity_id, fields, retry).await;
            // Receiver gone means the board was torn down; drop the result.
            let _ = tx.send(Settlement { mutation, entity_id, result });
        }));
    }

    /// Apply every settlement that has already arrived. Never waits.
    pub fn drain(&mut self, board: &mut BoardStateStore<E>) -> Vec<MutationEvent<E>> {
        let mut events = Vec::new();
        while let Ok(s) = self.rx.try_recv() {
            events.extend(self.settle(board, s));
        }
        events
    }

    /// Wait for the next settlement and apply it. `None` when nothing is pending.
    pub async fn next_events(&mut self, board: &mut BoardStateStore<E>) -> Option<Vec<MutationEvent<E>>> {
        if self.lanes.is_empty() {
            return None;
        }
        let s = self.rx.recv().await?;
        Some(self.settle(board, s))
    }

    /// Wait until every pending mutation has settled.
    pub async fn settle_all(&mut self, board: &mut BoardStateStore<E>) -> Vec<MutationEvent<E>> {
        let mut events = Vec::new();
        while let Some(batch) = self.next_events(board).await {
            events.extend(batch);
        }
        events
    }

    fn settle(&mut self, board: &mut BoardStateStore<E>, s: Settlement) -> Vec<MutationEvent<E>> {
        let Some(mut lane) = self.lanes.remove(&s.entity_id) else { return Vec::new() };
        if lane.active.id != s.mutation {
            self.lanes.insert(s.entity_id, lane);
            return Vec::new();
        }

        match s.result {
            Ok(()) => {
                tracing::debug!(mutation = s.mutation, entity = s.entity_id, "remote update confirmed");
                if let Some(mut next) = lane.waiting.pop_front() {
                    self.start(s.entity_id, &mut next);
                    lane.active = next;
                    self.lanes.insert(s.entity_id, lane);
                }
                vec![MutationEvent::Confirmed { mutation: s.mutation, entity_id: s.entity_id }]
            }
            Err(failure) => {
                let untouched = lane.waiting.is_empty() && board.revision() == lane.active.applied_at;
                if untouched {
                    board.restore(&lane.active.snapshot);
                } else {
                    board.restore_entity(&lane.active.snapshot, s.entity_id);
                }
                tracing::warn!(
                    mutation = s.mutation,
                    entity = s.entity_id,
                    error = %failure,
                    dropped = lane.waiting.len(),
                    "remote update failed, rolled back"
                );

                let failed = lane.active.id;
                let mut events = vec![MutationEvent::Reverted {
                    mutation: failed,
                    entity_id: s.entity_id,
                    cause: RevertCause::Remote(failure),
                    change: lane.active.change,
                }];
                events.extend(lane.waiting.into_iter().map(|w| MutationEvent::Reverted {
                    mutation: w.id,
                    entity_id: s.entity_id,
                    cause: RevertCause::PredecessorFailed(failed),
                    change: w.change,
                }));
                events
            }
        }
    }
}

impl<E: BoardEntity> Drop for OptimisticMutationCoordinator<E> {
    fn drop(&mut self) {
        for lane in self.lanes.values() {
            if let Some(h) = &lane.active.handle {
                h.abort();
            }
        }
    }
}

/// Send one update, retrying transient failures with exponential backoff.
async fn push_update(
    store: &dyn RecordStore,
    table: TableId,
    row: RowId,
    fields: Fields,
    retry: RetryConfig,
) -> Result<(), RemoteFailure> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.update_row(table, row, fields.clone()).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = retry.delay_after(attempt);
                tracing::warn!(table, row, attempt, ?delay, error = %e, "update failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(failure(&e, attempt)),
        }
    }
}

fn failure(e: &StoreError, attempts: u32) -> RemoteFailure {
    RemoteFailure { message: e.to_string(), transient: e.is_transient(), attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::fields::TaskStatus;
    use crate::rows::Row;
    use crate::store::Filter;
    use crate::task::Task;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Store that records updates, fails on a per-row script, and can hold
    /// requests until the test releases them.
    #[derive(Default)]
    struct ScriptedStore {
        calls: StdMutex<Vec<(RowId, Fields)>>,
        script: StdMutex<HashMap<RowId, VecDeque<Option<u16>>>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedStore {
        fn gated() -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            (ScriptedStore { gate: Some(gate.clone()), ..Default::default() }, gate)
        }

        fn script(self, row: RowId, outcomes: Vec<Option<u16>>) -> Self {
            self.script.lock().unwrap().insert(row, outcomes.into());
            self
        }

        fn calls(&self) -> Vec<(RowId, Fields)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordStore for ScriptedStore {
        async fn list_rows(&self, _table: TableId, _filters: &[Filter]) -> StoreResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn update_row(&self, _table: TableId, row_id: RowId, fields: Fields) -> StoreResult<Row> {
            self.calls.lock().unwrap().push((row_id, fields.clone()));
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let outcome = self.script.lock().unwrap().get_mut(&row_id).and_then(VecDeque::pop_front).flatten();
            match outcome {
                Some(status) => Err(StoreError::Server { status, message: "scripted".into() }),
                None => Ok(fields),
            }
        }

        async fn create_row(&self, _table: TableId, fields: Fields) -> StoreResult<Row> {
            Ok(fields)
        }
    }


    fn board() -> BoardStateStore<Task> {
        BoardStateStore::from_entities(vec![
            Task::new(1, "draft letter", TaskStatus::Todo),
            Task::new(2, "collect receipts", TaskStatus::Todo),
            Task::new(3, "file return", TaskStatus::InProgress),
        ])
    }

    fn fast() -> RetryConfig {
        RetryConfig { max_attempts: 3, base_delay_ms: 1, max_delay_ms: 5 }
    }

    fn to(board: &BoardStateStore<Task>, id: RowId, status: TaskStatus) -> Change<Task> {
        let from = board.position_of(id).unwrap();
        Change::Move { entity_id: id, from, to: Position::new(status, 0) }
    }

    fn status_patch(label: &str) -> Fields {
        let mut f = Fields::new();
        f.insert(field::STATUS.into(), Value::from(label));
        f
    }

    #[tokio::test]
    async fn confirmed_move_keeps_the_optimistic_state() {
        let store = Arc::new(ScriptedStore::default());
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let change = to(&board, 1, TaskStatus::InProgress);
        let pending = coord.apply(&mut board, change).unwrap().unwrap();
        assert!(!pending.queued);
        assert_eq!(board.get(1).unwrap().status, TaskStatus::InProgress);
        assert!(coord.is_busy(1));

        let events = coord.settle_all(&mut board).await;
        assert_eq!(events, vec![MutationEvent::Confirmed { mutation: pending.id, entity_id: 1 }]);
        assert_eq!(board.get(1).unwrap().status, TaskStatus::InProgress);
        assert_eq!(store.calls(), vec![(1, status_patch("In Progress"))]);
        assert_eq!(coord.pending(), 0);
    }

    #[tokio::test]
    async fn reorder_within_a_column_is_local_only() {
        let store = Arc::new(ScriptedStore::default());
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let change = Change::Move {
            entity_id: 2,
            from: Position::new(TaskStatus::Todo, 1),
            to: Position::new(TaskStatus::Todo, 0),
        };
        assert_eq!(coord.apply(&mut board, change).unwrap(), None);
        assert_eq!(board.position_of(2), Some(Position::new(TaskStatus::Todo, 0)));
        assert!(coord.next_events(&mut board).await.is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_update_restores_the_exact_prior_board() {
        let store = Arc::new(ScriptedStore::default().script(1, vec![Some(400)]));
        let mut board = board();
        let before = board.columns().to_vec();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let change = to(&board, 1, TaskStatus::Blocked);
        let pending = coord.apply(&mut board, change.clone()).unwrap().unwrap();
        let events = coord.settle_all(&mut board).await;

        assert_eq!(board.columns(), &before[..]);
        match &events[..] {
            [MutationEvent::Reverted { mutation, entity_id: 1, cause: RevertCause::Remote(f), change: c }] => {
                assert_eq!(*mutation, pending.id);
                assert!(!f.transient);
                assert_eq!(f.attempts, 1);
                assert_eq!(c, &change);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(ScriptedStore::default().script(1, vec![Some(503), Some(429)]));
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let change = to(&board, 1, TaskStatus::Done);
        coord.apply(&mut board, change).unwrap();
        let events = coord.settle_all(&mut board).await;

        assert!(matches!(events[..], [MutationEvent::Confirmed { entity_id: 1, .. }]));
        assert_eq!(store.calls().len(), 3);
        assert_eq!(board.get(1).unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn exhausted_retries_revert() {
        let store = Arc::new(ScriptedStore::default().script(1, vec![Some(503); 3]));
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let change = to(&board, 1, TaskStatus::Done);
        coord.apply(&mut board, change).unwrap();
        let events = coord.settle_all(&mut board).await;

        match &events[..] {
            [MutationEvent::Reverted { cause: RevertCause::Remote(f), .. }] => {
                assert!(f.transient);
                assert_eq!(f.attempts, 3);
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(board.get(1).unwrap().status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn same_entity_updates_go_out_one_at_a_time() {
        let (store, gate) = ScriptedStore::gated();
        let store = Arc::new(store);
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let first = to(&board, 1, TaskStatus::InProgress);
        let p1 = coord.apply(&mut board, first).unwrap().unwrap();
        let second = to(&board, 1, TaskStatus::Blocked);
        let p2 = coord.apply(&mut board, second).unwrap().unwrap();
        assert!(p2.queued);
        assert_eq!(board.get(1).unwrap().status, TaskStatus::Blocked);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.calls().len(), 1);

        gate.add_permits(1);
        let events = coord.next_events(&mut board).await.unwrap();
        assert_eq!(events, vec![MutationEvent::Confirmed { mutation: p1.id, entity_id: 1 }]);

        gate.add_permits(1);
        let events = coord.next_events(&mut board).await.unwrap();
        assert_eq!(events, vec![MutationEvent::Confirmed { mutation: p2.id, entity_id: 1 }]);

        let sent: Vec<_> = store.calls().into_iter().map(|(_, f)| f).collect();
        assert_eq!(sent, vec![status_patch("In Progress"), status_patch("Blocked")]);
    }

    #[tokio::test]
    async fn failed_predecessor_takes_queued_successors_with_it() {
        let (store, gate) = ScriptedStore::gated();
        let store = Arc::new(store.script(1, vec![Some(422)]));
        let mut board = board();
        let before = board.columns().to_vec();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let first = to(&board, 1, TaskStatus::InProgress);
        let p1 = coord.apply(&mut board, first).unwrap().unwrap();
        let second = to(&board, 1, TaskStatus::Blocked);
        let p2 = coord.apply(&mut board, second).unwrap().unwrap();

        gate.add_permits(1);
        let events = coord.settle_all(&mut board).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            MutationEvent::Reverted { mutation, cause: RevertCause::Remote(_), .. } if *mutation == p1.id
        ));
        assert!(matches!(
            &events[1],
            MutationEvent::Reverted { mutation, cause: RevertCause::PredecessorFailed(failed), .. }
                if *mutation == p2.id && *failed == p1.id
        ));
        assert_eq!(board.columns(), &before[..]);
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn rollback_of_one_entity_keeps_other_confirmed_moves() {
        let store = Arc::new(ScriptedStore::default().script(1, vec![Some(400)]));
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let a = to(&board, 1, TaskStatus::Blocked);
        coord.apply(&mut board, a).unwrap();
        let b = to(&board, 3, TaskStatus::Done);
        coord.apply(&mut board, b).unwrap();
        coord.settle_all(&mut board).await;

        assert_eq!(board.position_of(1), Some(Position::new(TaskStatus::Todo, 0)));
        assert_eq!(board.get(3).unwrap().status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn edits_patch_the_given_fields() {
        let store = Arc::new(ScriptedStore::default());
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let edited = board.get(2).unwrap().clone().with_assignee("mia");
        let mut patch = Fields::new();
        patch.insert(field::ASSIGNEE.into(), Value::from("mia"));
        coord.apply(&mut board, Change::Edit { entity: edited, fields: patch.clone() }).unwrap();

        assert_eq!(board.get(2).unwrap().assignee.as_deref(), Some("mia"));
        coord.settle_all(&mut board).await;
        assert_eq!(store.calls(), vec![(2, patch)]);
    }

    #[tokio::test]
    async fn dropping_the_coordinator_cancels_outstanding_requests() {
        let (store, _gate) = ScriptedStore::gated();
        let store = Arc::new(store);
        let mut board = board();
        let mut coord = OptimisticMutationCoordinator::new(store.clone(), 3, fast());

        let change = to(&board, 1, TaskStatus::Done);
        coord.apply(&mut board, change).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.calls().len(), 1);

        drop(coord);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Only the test's handle remains once the aborted request is gone.
        assert_eq!(Arc::strong_count(&store), 1);
    }

    fn arb_status() -> impl Strategy<Value = TaskStatus> {
        prop::sample::select(TaskStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn failure_returns_to_the_state_before_the_failed_change(
            statuses in proptest::collection::vec(arb_status(), 1..6),
            targets in proptest::collection::vec(arb_status(), 1..8),
            fail_at in any::<prop::sample::Index>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            rt.block_on(async {
                let rows: Vec<Task> = statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| Task::new(i as u64 + 1, "t", *s))
                    .collect();
                let mut board = BoardStateStore::from_entities(rows);

                // Only cross-column moves reach the store.
                let mut moves = Vec::new();
                let mut current = board.get(1).unwrap().status;
                for t in targets {
                    if t != current {
                        moves.push(t);
                        current = t;
                    }
                }
                if moves.is_empty() {
                    return Ok(());
                }
                let k = fail_at.index(moves.len());
                let mut script = vec![None; k];
                script.push(Some(400));

                let store = Arc::new(ScriptedStore::default().script(1, script));
                let mut coord = OptimisticMutationCoordinator::new(store, 3, RetryConfig::none());

                let mut states = Vec::new();
                for status in moves {
                    states.push(board.columns().to_vec());
                    let change = to(&board, 1, status);
                    prop_assert!(coord.apply(&mut board, change).unwrap().is_some());
                }
                coord.settle_all(&mut board).await;

                prop_assert_eq!(board.columns(), &states[k][..]);
                Ok(())
            })?;
        }
    }
}
