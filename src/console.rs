//! The operations console: what a board UI talks to.
//!
//! A [`Console`] owns one board per [`BoardKind`], each with its own
//! [`BoardStateStore`] and [`OptimisticMutationCoordinator`], plus the project and
//! subtask lists needed to show the work hierarchy. Every action returns
//! immediately. Validation failures come back as a [`RejectionReason`] and leave
//! the board untouched; remote outcomes arrive later as [`Notice`]s.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::approval;
use crate::board::{BoardEntity, BoardStateStore, Position};
use crate::config::{Config, RetryConfig, TablesConfig};
use crate::coordinator::{Change, MutationEvent, MutationId, OptimisticMutationCoordinator, PendingMutation, RevertCause};
use crate::error::{ConsoleError, RejectionReason, StoreError, StoreResult};
use crate::fields::*;
use crate::guard::{self, WipWarning};
use crate::join::{self, AssignmentTree, ProjectTree};
use crate::pipeline::PipelineCard;
use crate::project::{Assignment, Project};
use crate::rows::{self, field, Fields, FromRow};
use crate::store::RecordStore;
use crate::task::{Subtask, Task};
use crate::webhook::{WebhookClient, WebhookPayload};

/// One end of a drag: column label plus index within the column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub column: String,
    pub index: usize,
}

impl Slot {
    pub fn new(column: impl Into<String>, index: usize) -> Self {
        Slot { column: column.into(), index }
    }
}

/// A finished drag gesture. `destination` is `None` when the card was dropped
/// outside any column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEvent {
    pub entity_id: RowId,
    pub source: Slot,
    pub destination: Option<Slot>,
}

impl DragEvent {
    pub fn new(entity_id: RowId, source: Slot, destination: Option<Slot>) -> Self {
        DragEvent { entity_id, source, destination }
    }
}

/// An accepted drag. `pending` is `None` when nothing needs saving (dropped
/// outside, or reordered within a column).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DragAccepted {
    pub pending: Option<PendingMutation>,
    pub warning: Option<WipWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub id: RowId,
    pub title: String,
    pub assignee: Option<String>,
    pub draggable: bool,
    /// A save for this card is still outstanding.
    pub saving: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnView {
    pub key: &'static str,
    /// Closed columns are never offered as drop targets.
    pub accepts_drops: bool,
    pub cards: Vec<CardView>,
}

/// Names a reverted change that can be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryHandle {
    pub board: BoardKind,
    pub mutation: MutationId,
}

/// Outcome of a remote save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Confirmed { board: BoardKind, entity_id: RowId, mutation: MutationId },
    /// The change was rolled back after the store refused it (or an earlier
    /// change to the same record).
    Reverted { board: BoardKind, entity_id: RowId, cause: RevertCause, retry: RetryHandle },
}

impl Notice {
    pub fn is_revert(&self) -> bool {
        matches!(self, Notice::Reverted { .. })
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Confirmed { board, entity_id, .. } => write!(f, "{} #{} saved", board.title(), entity_id),
            Notice::Reverted { board, entity_id, cause: RevertCause::Remote(failure), .. } => {
                write!(f, "{} #{} reverted: {}", board.title(), entity_id, failure)
            }
            Notice::Reverted { board, entity_id, cause: RevertCause::PredecessorFailed(_), .. } => {
                write!(f, "{} #{} reverted: an earlier change to it failed", board.title(), entity_id)
            }
        }
    }
}

/// One board: its state and the coordinator that saves changes to it.
pub struct Board<E: BoardEntity> {
    kind: BoardKind,
    state: BoardStateStore<E>,
    coordinator: OptimisticMutationCoordinator<E>,
    failed: HashMap<MutationId, Change<E>>,
    /// Ids in the order the store listed them; new rows are appended.
    order: Vec<RowId>,
}

impl<E: BoardEntity> Board<E> {
    fn new(kind: BoardKind, store: Arc<dyn RecordStore>, tables: &TablesConfig, retry: RetryConfig, entities: Vec<E>) -> Self {
        Board {
            kind,
            order: entities.iter().map(BoardEntity::id).collect(),
            state: BoardStateStore::from_entities(entities),
            coordinator: OptimisticMutationCoordinator::new(store, tables.for_board(kind), retry),
            failed: HashMap::new(),
        }
    }

    /// Current entities, listed in source order rather than column order.
    fn in_source_order(&self) -> Vec<E> {
        self.order.iter().filter_map(|id| self.state.get(*id).cloned()).collect()
    }

    fn insert(&mut self, entity: E) {
        self.order.push(entity.id());
        self.state.insert(entity);
    }

    pub fn state(&self) -> &BoardStateStore<E> {
        &self.state
    }

    pub fn pending(&self) -> usize {
        self.coordinator.pending()
    }

    fn columns(&self) -> Vec<ColumnView> {
        self.state
            .columns()
            .iter()
            .map(|col| ColumnView {
                key: col.status.label(),
                accepts_drops: !col.status.is_terminal(),
                cards: col
                    .cards
                    .iter()
                    .map(|e| CardView {
                        id: e.id(),
                        title: e.title().to_string(),
                        assignee: e.assignee().map(str::to_string),
                        draggable: guard::can_drag(e.status()),
                        saving: self.coordinator.is_busy(e.id()),
                    })
                    .collect(),
            })
            .collect()
    }

    fn drag(
        &mut self,
        event: &DragEvent,
        actor: &str,
        limits: &HashMap<String, usize>,
    ) -> Result<DragAccepted, RejectionReason> {
        let Some(dest) = &event.destination else { return Ok(DragAccepted::default()) };
        let from = Position::new(parse_column::<E::Status>(&event.source.column)?, event.source.index);
        let to = Position::new(parse_column::<E::Status>(&dest.column)?, dest.index);

        let entity = self.state.get(event.entity_id).ok_or(RejectionReason::UnknownEntity(event.entity_id))?;
        if let Err(reason) = guard::check_transition(entity, to.status) {
            tracing::info!(board = ?self.kind, entity = event.entity_id, to = to.status.label(), %reason, "drag rejected");
            return Err(reason);
        }
        let warning = if from.status != to.status {
            guard::wip_warning(&self.state, entity, to.status, actor, limits)
        } else {
            None
        };
        if let Some(w) = &warning {
            tracing::warn!(board = ?self.kind, %w, "soft WIP limit exceeded");
        }

        let pending = self.coordinator.apply(&mut self.state, Change::Move { entity_id: event.entity_id, from, to })?;
        Ok(DragAccepted { pending, warning })
    }

    /// Move a card by id, as if dragged from where it currently sits. `index`
    /// defaults to the end of the target column.
    fn move_card(
        &mut self,
        id: RowId,
        column: &str,
        index: Option<usize>,
        actor: &str,
        limits: &HashMap<String, usize>,
    ) -> Result<DragAccepted, RejectionReason> {
        let from = self.state.position_of(id).ok_or(RejectionReason::UnknownEntity(id))?;
        let event = DragEvent::new(
            id,
            Slot::new(from.status.label(), from.index),
            Some(Slot::new(column, index.unwrap_or(usize::MAX))),
        );
        self.drag(&event, actor, limits)
    }

    fn edit(&mut self, entity: E, fields: Fields) -> Result<PendingMutation, RejectionReason> {
        let id = entity.id();
        self.coordinator
            .apply(&mut self.state, Change::Edit { entity, fields })?
            .ok_or(RejectionReason::UnknownEntity(id))
    }

    fn is_failed(&self, mutation: MutationId) -> bool {
        self.failed.contains_key(&mutation)
    }

    fn forget_failed(&mut self, mutation: MutationId) {
        self.failed.remove(&mutation);
    }

    /// Replay a reverted move from wherever the card sits now.
    fn retry_move(&mut self, mutation: MutationId) -> Result<Option<PendingMutation>, RejectionReason> {
        let Some(Change::Move { entity_id, to, .. }) = self.failed.get(&mutation).cloned() else {
            return Err(RejectionReason::NothingToRetry(mutation));
        };
        let current = self.state.get(entity_id).ok_or(RejectionReason::UnknownEntity(entity_id))?;
        guard::check_transition(current, to.status)?;
        let from = self.state.position_of(entity_id).ok_or(RejectionReason::UnknownEntity(entity_id))?;

        let pending = self.coordinator.apply(&mut self.state, Change::Move { entity_id, from, to })?;
        self.failed.remove(&mutation);
        tracing::info!(board = ?self.kind, entity = entity_id, failed = mutation, "retrying reverted move");
        Ok(pending)
    }

    fn absorb(&mut self, events: Vec<MutationEvent<E>>) -> Vec<Notice> {
        events
            .into_iter()
            .map(|event| match event {
                MutationEvent::Confirmed { mutation, entity_id } => {
                    Notice::Confirmed { board: self.kind, entity_id, mutation }
                }
                MutationEvent::Reverted { mutation, entity_id, cause, change } => {
                    self.failed.insert(mutation, change);
                    Notice::Reverted {
                        board: self.kind,
                        entity_id,
                        cause,
                        retry: RetryHandle { board: self.kind, mutation },
                    }
                }
            })
            .collect()
    }

    fn drain(&mut self) -> Vec<Notice> {
        let events = self.coordinator.drain(&mut self.state);
        self.absorb(events)
    }

    async fn next_notices(&mut self) -> Option<Vec<Notice>> {
        let events = self.coordinator.next_events(&mut self.state).await?;
        Some(self.absorb(events))
    }
}

fn parse_column<S: BoardStatus>(label: &str) -> Result<S, RejectionReason> {
    S::from_label(label).ok_or_else(|| RejectionReason::UnknownColumn(label.to_string()))
}

/// Every table the console reads, fetched together.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub projects: Vec<Project>,
    pub assignments: Vec<Assignment>,
    pub tasks: Vec<Task>,
    pub subtasks: Vec<Subtask>,
    pub prospects: Vec<PipelineCard>,
}

impl Snapshot {
    pub async fn fetch(store: &dyn RecordStore, tables: &TablesConfig) -> StoreResult<Self> {
        let (projects, assignments, tasks, subtasks, prospects) = tokio::try_join!(
            store.list_rows(tables.projects, &[]),
            store.list_rows(tables.assignments, &[]),
            store.list_rows(tables.tasks, &[]),
            store.list_rows(tables.subtasks, &[]),
            store.list_rows(tables.prospects, &[]),
        )?;
        let snapshot = Snapshot {
            projects: rows::decode_all(&projects, "projects"),
            assignments: rows::decode_all(&assignments, "assignments"),
            tasks: rows::decode_all(&tasks, "tasks"),
            subtasks: rows::decode_all(&subtasks, "subtasks"),
            prospects: rows::decode_all(&prospects, "prospects"),
        };
        tracing::info!(
            projects = snapshot.projects.len(),
            assignments = snapshot.assignments.len(),
            tasks = snapshot.tasks.len(),
            subtasks = snapshot.subtasks.len(),
            prospects = snapshot.prospects.len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }
}

pub struct Console {
    store: Arc<dyn RecordStore>,
    tables: TablesConfig,
    actor: String,
    wip_limits: HashMap<String, usize>,
    webhook: Option<WebhookClient>,
    projects: Vec<Project>,
    subtasks: Vec<Subtask>,
    tasks: Board<Task>,
    assignments: Board<Assignment>,
    pipeline: Board<PipelineCard>,
    edits: HashMap<(BoardKind, MutationId), Edit>,
    /// Webhooks waiting on their edit's save.
    deferred: HashMap<(BoardKind, MutationId), WebhookPayload>,
}

/// A field edit as the caller asked for it, kept so a reverted edit can be
/// rebuilt on top of the record's current state.
#[derive(Debug, Clone)]
enum Edit {
    Submit { task: RowId },
    Decide { task: RowId, outcome: Decision, notes: Option<String> },
    Priority { task: RowId, priority: Priority },
    Assign { task: RowId, assignee: Option<String> },
    Close { prospect: RowId, target: PipelineStatus },
}

impl Console {
    /// Fetch every table and build the boards.
    pub async fn load(store: Arc<dyn RecordStore>, config: &Config) -> Result<Self, ConsoleError> {
        let snapshot = Snapshot::fetch(store.as_ref(), &config.tables).await?;
        let webhook = WebhookClient::from_config(&config.webhook)?;
        Ok(Self::new(store, config, snapshot, webhook))
    }

    pub fn new(store: Arc<dyn RecordStore>, config: &Config, snapshot: Snapshot, webhook: Option<WebhookClient>) -> Self {
        let t = &config.tables;
        let retry = config.retry;
        Console {
            tasks: Board::new(BoardKind::Tasks, Arc::clone(&store), t, retry, snapshot.tasks),
            assignments: Board::new(BoardKind::Assignments, Arc::clone(&store), t, retry, snapshot.assignments),
            pipeline: Board::new(BoardKind::Pipeline, Arc::clone(&store), t, retry, snapshot.prospects),
            store,
            tables: t.clone(),
            actor: config.board.actor.clone(),
            wip_limits: config.board.wip_limits.clone(),
            webhook,
            projects: snapshot.projects,
            subtasks: snapshot.subtasks,
            edits: HashMap::new(),
            deferred: HashMap::new(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn set_actor(&mut self, actor: impl Into<String>) {
        self.actor = actor.into();
    }

    pub fn tasks(&self) -> &BoardStateStore<Task> {
        self.tasks.state()
    }

    pub fn assignments(&self) -> &BoardStateStore<Assignment> {
        self.assignments.state()
    }

    pub fn pipeline(&self) -> &BoardStateStore<PipelineCard> {
        self.pipeline.state()
    }

    pub fn get_columns(&self, kind: BoardKind) -> Vec<ColumnView> {
        match kind {
            BoardKind::Tasks => self.tasks.columns(),
            BoardKind::Assignments => self.assignments.columns(),
            BoardKind::Pipeline => self.pipeline.columns(),
        }
    }

    pub fn on_drag_end(&mut self, kind: BoardKind, event: DragEvent) -> Result<DragAccepted, RejectionReason> {
        match kind {
            BoardKind::Tasks => self.tasks.drag(&event, &self.actor, &self.wip_limits),
            BoardKind::Assignments => self.assignments.drag(&event, &self.actor, &self.wip_limits),
            BoardKind::Pipeline => self.pipeline.drag(&event, &self.actor, &self.wip_limits),
        }
    }

    /// Move a card by id to the column labelled `column`, under the same rules as
    /// a drag.
    pub fn move_card(
        &mut self,
        kind: BoardKind,
        id: RowId,
        column: &str,
        index: Option<usize>,
    ) -> Result<DragAccepted, RejectionReason> {
        match kind {
            BoardKind::Tasks => self.tasks.move_card(id, column, index, &self.actor, &self.wip_limits),
            BoardKind::Assignments => self.assignments.move_card(id, column, index, &self.actor, &self.wip_limits),
            BoardKind::Pipeline => self.pipeline.move_card(id, column, index, &self.actor, &self.wip_limits),
        }
    }

    pub fn set_task_status(&mut self, id: RowId, status: TaskStatus) -> Result<DragAccepted, RejectionReason> {
        self.move_card(BoardKind::Tasks, id, status.label(), None)
    }

    fn task(&self, id: RowId) -> Result<&Task, RejectionReason> {
        self.tasks.state.get(id).ok_or(RejectionReason::UnknownEntity(id))
    }

    pub fn submit_for_approval(&mut self, task_id: RowId) -> Result<PendingMutation, RejectionReason> {
        let task = self.task(task_id)?;
        let approval = approval::submit_for_approval(task, &self.actor, Utc::now())?;
        let fields = approval.to_fields();
        let updated = Task { approval, ..task.clone() };
        tracing::info!(task = task_id, actor = %self.actor, "submitted for approval");
        let pending = self.tasks.edit(updated, fields)?;
        self.record(BoardKind::Tasks, pending, Edit::Submit { task: task_id }, None);
        Ok(pending)
    }

    /// Record the acting identity's decision on a pending approval.
    pub fn decide(
        &mut self,
        task_id: RowId,
        outcome: Decision,
        notes: Option<String>,
    ) -> Result<PendingMutation, RejectionReason> {
        let task = self.task(task_id)?;
        let approval = approval::decide(task, outcome, notes.clone(), &self.actor, Utc::now())?;
        let fields = approval.to_fields();
        let updated = Task { approval, ..task.clone() };
        let payload = WebhookPayload::new("taskApprovalDecided")
            .with("taskId", task_id)
            .with("task", updated.description.as_str())
            .with("outcome", updated.approval.approval_status.label())
            .with("approver", self.actor.as_str())
            .with("notes", rows::opt_string(updated.approval.approval_notes.as_deref()));
        tracing::info!(task = task_id, ?outcome, approver = %self.actor, "approval decided");
        let pending = self.tasks.edit(updated, fields)?;
        self.record(BoardKind::Tasks, pending, Edit::Decide { task: task_id, outcome, notes }, Some(payload));
        Ok(pending)
    }

    /// Tasks waiting on a reviewer.
    pub fn get_review_queue(&self) -> Vec<&Task> {
        approval::review_queue(self.tasks.state.iter())
    }

    pub fn set_priority(&mut self, task_id: RowId, priority: Priority) -> Result<PendingMutation, RejectionReason> {
        let task = self.task(task_id)?;
        let updated = Task { priority: Some(priority), ..task.clone() };
        let mut fields = Fields::new();
        fields.insert(field::PRIORITY.into(), Value::from(priority.label()));
        let pending = self.tasks.edit(updated, fields)?;
        self.record(BoardKind::Tasks, pending, Edit::Priority { task: task_id, priority }, None);
        Ok(pending)
    }

    pub fn assign_task(&mut self, task_id: RowId, assignee: Option<String>) -> Result<PendingMutation, RejectionReason> {
        let task = self.task(task_id)?;
        let mut fields = Fields::new();
        fields.insert(field::ASSIGNEE.into(), rows::opt_string(assignee.as_deref()));
        let updated = Task { assignee: assignee.clone(), ..task.clone() };
        let pending = self.tasks.edit(updated, fields)?;
        self.record(BoardKind::Tasks, pending, Edit::Assign { task: task_id, assignee }, None);
        Ok(pending)
    }

    /// Close a prospect as won.
    pub fn convert(&mut self, prospect_id: RowId) -> Result<PendingMutation, RejectionReason> {
        self.close(prospect_id, PipelineStatus::Won, "prospectConverted")
    }

    /// Close a prospect as lost.
    pub fn mark_lost(&mut self, prospect_id: RowId) -> Result<PendingMutation, RejectionReason> {
        self.close(prospect_id, PipelineStatus::Lost, "prospectLost")
    }

    fn close(
        &mut self,
        id: RowId,
        target: PipelineStatus,
        webhook_type: &str,
    ) -> Result<PendingMutation, RejectionReason> {
        let card = self.pipeline.state.get(id).ok_or(RejectionReason::UnknownEntity(id))?;
        guard::check_close(card, target)?;

        let updated = PipelineCard { status: target, ..card.clone() };
        let mut fields = Fields::new();
        fields.insert(field::STATUS.into(), Value::from(target.label()));
        let mut payload = WebhookPayload::new(webhook_type)
            .with("prospectId", id)
            .with("name", updated.name.as_str())
            .with("closedBy", self.actor.as_str());
        if let Some(v) = updated.expected_value {
            payload = payload.with("expectedValue", v);
        }

        tracing::info!(prospect = id, status = target.label(), "prospect closed");
        let pending = self.pipeline.edit(updated, fields)?;
        self.record(BoardKind::Pipeline, pending, Edit::Close { prospect: id, target }, Some(payload));
        Ok(pending)
    }

    /// Remember how an edit was asked for, and the webhook owed once it is saved.
    fn record(&mut self, board: BoardKind, pending: PendingMutation, edit: Edit, payload: Option<WebhookPayload>) {
        self.edits.insert((board, pending.id), edit);
        if let Some(payload) = payload {
            self.deferred.insert((board, pending.id), payload);
        }
    }

    /// Run an edit again against the record as it is now.
    fn replay(&mut self, edit: Edit) -> Result<PendingMutation, RejectionReason> {
        match edit {
            Edit::Submit { task } => self.submit_for_approval(task),
            Edit::Decide { task, outcome, notes } => self.decide(task, outcome, notes),
            Edit::Priority { task, priority } => self.set_priority(task, priority),
            Edit::Assign { task, assignee } => self.assign_task(task, assignee),
            Edit::Close { prospect, target: PipelineStatus::Won } => self.convert(prospect),
            Edit::Close { prospect, .. } => self.mark_lost(prospect),
        }
    }

    /// Bookkeeping on settled saves: webhooks go out only for confirmed edits.
    fn observe(&mut self, notices: &[Notice]) {
        for notice in notices {
            match notice {
                Notice::Confirmed { board, mutation, .. } => {
                    self.edits.remove(&(*board, *mutation));
                    if let Some(payload) = self.deferred.remove(&(*board, *mutation)) {
                        self.notify(payload);
                    }
                }
                Notice::Reverted { retry, .. } => {
                    if let Some(payload) = self.deferred.remove(&(retry.board, retry.mutation)) {
                        tracing::info!(webhook = %payload.webhook_type, "save reverted, webhook withheld");
                    }
                }
            }
        }
    }

    fn notify(&self, payload: WebhookPayload) {
        match &self.webhook {
            Some(client) => client.fire(payload),
            None => tracing::debug!(webhook = %payload.webhook_type, "no webhook endpoint configured"),
        }
    }

    /// Create a subtask under `task_id`. Waits for the store since the new row's
    /// id comes from it.
    pub async fn add_subtask(&mut self, task_id: RowId, name: &str) -> Result<Subtask, ConsoleError> {
        self.task(task_id)?;
        let row = self.store.create_row(self.tables.subtasks, Subtask::create_fields(name, task_id)).await?;
        let subtask = Subtask::from_row(&row).map_err(StoreError::from)?;
        tracing::info!(task = task_id, subtask = subtask.id, "subtask created");
        self.subtasks.push(subtask.clone());
        Ok(subtask)
    }

    /// Create a prospect in the `New` column.
    pub async fn add_prospect(&mut self, name: &str, expected_value: Option<f64>) -> Result<PipelineCard, ConsoleError> {
        let row = self
            .store
            .create_row(self.tables.prospects, PipelineCard::create_fields(name, expected_value))
            .await?;
        let card = PipelineCard::from_row(&row).map_err(StoreError::from)?;
        tracing::info!(prospect = card.id, "prospect created");
        self.pipeline.insert(card.clone());
        Ok(card)
    }

    /// Project → Assignment → Task → Subtask as currently shown, plus assignments
    /// that are not filed under a known project.
    pub fn hierarchy(&self) -> (Vec<ProjectTree>, Vec<AssignmentTree>) {
        join::assemble_projects(
            self.projects.clone(),
            self.assignments.in_source_order(),
            self.tasks.in_source_order(),
            self.subtasks.clone(),
        )
    }

    /// Send a reverted change again.
    ///
    /// Moves are replayed from the card's current slot. Edits are rebuilt from
    /// the current record, so approval rules are checked again and later changes
    /// to other fields are kept.
    pub fn retry(&mut self, handle: RetryHandle) -> Result<Option<PendingMutation>, RejectionReason> {
        let failed = match handle.board {
            BoardKind::Tasks => self.tasks.is_failed(handle.mutation),
            BoardKind::Assignments => self.assignments.is_failed(handle.mutation),
            BoardKind::Pipeline => self.pipeline.is_failed(handle.mutation),
        };
        if !failed {
            return Err(RejectionReason::NothingToRetry(handle.mutation));
        }

        let key = (handle.board, handle.mutation);
        let Some(edit) = self.edits.get(&key).cloned() else {
            return match handle.board {
                BoardKind::Tasks => self.tasks.retry_move(handle.mutation),
                BoardKind::Assignments => self.assignments.retry_move(handle.mutation),
                BoardKind::Pipeline => self.pipeline.retry_move(handle.mutation),
            };
        };
        let pending = self.replay(edit)?;
        self.edits.remove(&key);
        match handle.board {
            BoardKind::Tasks => self.tasks.forget_failed(handle.mutation),
            BoardKind::Assignments => self.assignments.forget_failed(handle.mutation),
            BoardKind::Pipeline => self.pipeline.forget_failed(handle.mutation),
        }
        tracing::info!(board = ?handle.board, failed = handle.mutation, retry = pending.id, "retrying reverted edit");
        Ok(Some(pending))
    }

    /// Saves not yet settled across all boards.
    pub fn pending(&self) -> usize {
        self.tasks.pending() + self.assignments.pending() + self.pipeline.pending()
    }

    /// Outcomes that have already arrived. Never waits.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = self.tasks.drain();
        notices.extend(self.assignments.drain());
        notices.extend(self.pipeline.drain());
        self.observe(&notices);
        notices
    }

    /// Wait for the next outcome on any board. `None` when nothing is pending.
    pub async fn next_notices(&mut self) -> Option<Vec<Notice>> {
        let (tasks_busy, assignments_busy, pipeline_busy) =
            (self.tasks.pending() > 0, self.assignments.pending() > 0, self.pipeline.pending() > 0);
        let notices = tokio::select! {
            Some(n) = self.tasks.next_notices(), if tasks_busy => n,
            Some(n) = self.assignments.next_notices(), if assignments_busy => n,
            Some(n) = self.pipeline.next_notices(), if pipeline_busy => n,
            else => return None,
        };
        self.observe(&notices);
        Some(notices)
    }

    /// Wait until every save has settled.
    pub async fn settle(&mut self) -> Vec<Notice> {
        let mut notices = self.drain_notices();
        while let Some(batch) = self.next_notices().await {
            notices.extend(batch);
        }
        notices
    }
}
