//! Client-side relational joins over link-array foreign keys.
//!
//! The record store cannot join tables, so the hierarchy is rebuilt in memory:
//! every child names its parent through a link array and [`join`] buckets the
//! children under the parent they point at. [`Nested`] is itself keyed and linked
//! through its root item, so levels compose without extra join code:
//!
//! ```ignore
//! let tree = join(projects, join(assignments, join(tasks, subtasks)));
//! ```
//!
//! Children keep the order of their flat source collection. A child whose parent
//! is not part of the same snapshot is an orphan: it is left out of the tree and
//! logged as a data-quality signal, never reported as an error.

use std::collections::HashMap;

use serde::Serialize;

use crate::fields::{LinkRef, RowId};
use crate::project::{Assignment, Project};
use crate::task::{Subtask, Task};

/// Anything with a row id that children can point at.
pub trait Keyed {
    fn key(&self) -> RowId;
}

/// Anything that belongs to a parent through a link array.
pub trait ChildOf {
    fn parent_links(&self) -> &[LinkRef];
}

/// Resolve a belongs-to link array. More than one element is a data error and the
/// first element wins.
pub fn parent_of(child: RowId, links: &[LinkRef]) -> Option<RowId> {
    if links.len() > 1 {
        tracing::warn!(
            child,
            links = links.len(),
            "belongs-to link holds several parents, using the first"
        );
    }
    links.first().map(|l| l.id)
}

/// A parent with its resolved children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nested<P, C> {
    pub item: P,
    pub children: Vec<C>,
}

impl<P: Keyed, C> Keyed for Nested<P, C> {
    fn key(&self) -> RowId {
        self.item.key()
    }
}

impl<P: ChildOf, C> ChildOf for Nested<P, C> {
    fn parent_links(&self) -> &[LinkRef] {
        self.item.parent_links()
    }
}

/// Everything a join produced, including the children it could not place.
#[derive(Debug)]
pub struct Joined<P, C> {
    pub roots: Vec<Nested<P, C>>,
    /// Children pointing at a parent absent from the snapshot.
    pub orphans: Vec<C>,
    /// Children with an empty link array.
    pub unlinked: Vec<C>,
}

/// Attach `children` to `parents`, keeping leftovers.
pub fn join_with_leftovers<P, C>(parents: Vec<P>, children: Vec<C>) -> Joined<P, C>
where
    P: Keyed,
    C: Keyed + ChildOf,
{
    let mut buckets: HashMap<RowId, Vec<C>> = HashMap::new();
    let mut unlinked = Vec::new();
    for child in children {
        match parent_of(child.key(), child.parent_links()) {
            Some(parent) => buckets.entry(parent).or_default().push(child),
            None => unlinked.push(child),
        }
    }

    let roots: Vec<Nested<P, C>> = parents
        .into_iter()
        .map(|item| {
            let children = buckets.remove(&item.key()).unwrap_or_default();
            Nested { item, children }
        })
        .collect();

    // Whatever is left points at a parent outside this snapshot. Sort by key so the
    // leftovers (and the log line) do not depend on hash order.
    let mut orphans: Vec<C> = buckets.into_values().flatten().collect();
    orphans.sort_by_key(Keyed::key);
    if !orphans.is_empty() {
        let ids: Vec<RowId> = orphans.iter().map(Keyed::key).collect();
        tracing::warn!(
            count = ids.len(),
            ?ids,
            "children reference parents missing from this snapshot; stale or partial fetch?"
        );
    }

    Joined { roots, orphans, unlinked }
}

/// Attach `children` to `parents`. Unplaceable children are logged and dropped.
pub fn join<P, C>(parents: Vec<P>, children: Vec<C>) -> Vec<Nested<P, C>>
where
    P: Keyed,
    C: Keyed + ChildOf,
{
    join_with_leftovers(parents, children).roots
}

pub type TaskTree = Nested<Task, Subtask>;
pub type AssignmentTree = Nested<Assignment, TaskTree>;
pub type ProjectTree = Nested<Project, AssignmentTree>;

/// Build `Assignment → Task[] → Subtask[]` from one fetch snapshot.
pub fn assemble(assignments: Vec<Assignment>, tasks: Vec<Task>, subtasks: Vec<Subtask>) -> Vec<AssignmentTree> {
    join(assignments, join(tasks, subtasks))
}

/// The full four-level hierarchy. Assignments not filed under any project of the
/// snapshot are returned separately so progress views can still show them.
pub fn assemble_projects(
    projects: Vec<Project>,
    assignments: Vec<Assignment>,
    tasks: Vec<Task>,
    subtasks: Vec<Subtask>,
) -> (Vec<ProjectTree>, Vec<AssignmentTree>) {
    let joined = join_with_leftovers(projects, assemble(assignments, tasks, subtasks));
    let mut unfiled = joined.unlinked;
    unfiled.extend(joined.orphans);
    (joined.roots, unfiled)
}

/// Completed vs. total subtasks of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubtaskProgress {
    pub done: usize,
    pub total: usize,
}

impl SubtaskProgress {
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        Some(((self.done * 100) / self.total) as u8)
    }
}

impl std::ops::Add for SubtaskProgress {
    type Output = SubtaskProgress;

    fn add(self, rhs: Self) -> Self {
        SubtaskProgress { done: self.done + rhs.done, total: self.total + rhs.total }
    }
}

impl TaskTree {
    pub fn progress(&self) -> SubtaskProgress {
        SubtaskProgress {
            done: self.children.iter().filter(|s| s.done).count(),
            total: self.children.len(),
        }
    }
}

impl AssignmentTree {
    /// Subtask progress summed over all tasks of the assignment.
    pub fn progress(&self) -> SubtaskProgress {
        self.children.iter().map(TaskTree::progress).fold(SubtaskProgress::default(), |a, b| a + b)
    }
}
