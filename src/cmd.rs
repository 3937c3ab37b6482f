//! Command implementations for the CLI interface.
//!
//! Every command except `board` and `completions` loads the console, performs
//! one action, waits for the resulting saves to settle and prints what happened.
//! A save the store refused is reported and turns into a non-zero exit.

use anyhow::{bail, Context};
use clap::Subcommand;
use clap_complete::{generate, Shell};

use crate::console::{ColumnView, Console, DragAccepted};
use crate::coordinator::PendingMutation;
use crate::fields::*;
use crate::join::{AssignmentTree, TaskTree};
use crate::tui::workflow_run::run_board_tui;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive kanban board.
    Board {
        #[arg(value_enum, default_value_t = BoardKind::Tasks)]
        kind: BoardKind,
    },

    /// Print a board's columns.
    Columns {
        #[arg(value_enum, default_value_t = BoardKind::Tasks)]
        kind: BoardKind,
    },

    /// Print the project → assignment → task → subtask tree with progress.
    Tree,

    /// Move a card to another column (or position).
    Move {
        #[arg(value_enum)]
        kind: BoardKind,
        /// Row id of the card.
        id: RowId,
        /// Target column label, e.g. "In Progress".
        to: String,
        /// Position within the target column; defaults to the end.
        #[arg(long)]
        index: Option<usize>,
    },

    /// Submit a task for approval.
    Submit { id: RowId },

    /// Approve or reject a pending task.
    Decide {
        id: RowId,
        #[arg(value_enum)]
        outcome: Decision,
        /// Reviewer notes.
        #[arg(long)]
        notes: Option<String>,
    },

    /// List tasks waiting for review.
    Review,

    /// Set a task's priority.
    Priority {
        id: RowId,
        #[arg(value_enum)]
        priority: Priority,
    },

    /// Assign a task; omit the name to unassign.
    Assign { id: RowId, who: Option<String> },

    /// Close a prospect as won.
    Convert { id: RowId },

    /// Close a prospect as lost.
    Lose { id: RowId },

    /// Add a subtask to a task.
    AddSubtask { task: RowId, name: String },

    /// Add a prospect to the pipeline.
    AddProspect {
        name: String,
        /// Expected deal value.
        #[arg(long)]
        value: Option<f64>,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Run a one-shot command against a loaded console.
pub async fn dispatch(console: &mut Console, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Columns { kind } => {
            cmd_columns(console, kind);
            Ok(())
        }
        Commands::Tree => {
            cmd_tree(console);
            Ok(())
        }
        Commands::Review => {
            cmd_review(console);
            Ok(())
        }
        Commands::Move { kind, id, to, index } => cmd_move(console, kind, id, &to, index).await,
        Commands::Submit { id } => {
            let pending = console.submit_for_approval(id)?;
            report(console, pending, format!("Task #{id} submitted for approval")).await
        }
        Commands::Decide { id, outcome, notes } => {
            let verb = match outcome {
                Decision::Approved => "approved",
                Decision::Rejected => "rejected",
            };
            let message = format!("Task #{id} {verb} by {}", console.actor());
            let pending = console.decide(id, outcome, notes)?;
            report(console, pending, message).await
        }
        Commands::Priority { id, priority } => {
            let pending = console.set_priority(id, priority)?;
            report(console, pending, format!("Task #{id} priority set to {}", priority.label())).await
        }
        Commands::Assign { id, who } => {
            let message = match &who {
                Some(w) => format!("Task #{id} assigned to {w}"),
                None => format!("Task #{id} unassigned"),
            };
            let pending = console.assign_task(id, who)?;
            report(console, pending, message).await
        }
        Commands::Convert { id } => {
            let pending = console.convert(id)?;
            report(console, pending, format!("Prospect #{id} converted")).await
        }
        Commands::Lose { id } => {
            let pending = console.mark_lost(id)?;
            report(console, pending, format!("Prospect #{id} marked lost")).await
        }
        Commands::AddSubtask { task, name } => {
            let sub = console.add_subtask(task, &name).await?;
            println!("Added subtask #{} '{}' to task #{}", sub.id, sub.name, task);
            Ok(())
        }
        Commands::AddProspect { name, value } => {
            let card = console.add_prospect(&name, value).await?;
            println!("Added prospect #{} '{}' to {}", card.id, card.name, card.status.label());
            Ok(())
        }
        Commands::Board { .. } | Commands::Completions { .. } => {
            unreachable!("handled before the console is loaded")
        }
    }
}

/// Wait for outstanding saves and print their outcome.
pub async fn settle_and_print(console: &mut Console) -> anyhow::Result<()> {
    let notices = console.settle().await;
    let mut failures = 0;
    for notice in &notices {
        if notice.is_revert() {
            failures += 1;
            eprintln!("{notice}");
        } else {
            tracing::debug!(%notice, "save settled");
        }
    }
    if failures > 0 {
        bail!("{failures} change(s) were not saved");
    }
    Ok(())
}

async fn report(console: &mut Console, pending: PendingMutation, message: String) -> anyhow::Result<()> {
    tracing::debug!(mutation = pending.id, entity = pending.entity_id, "waiting for save");
    settle_and_print(console).await?;
    println!("{message}");
    Ok(())
}

pub async fn cmd_move(
    console: &mut Console,
    kind: BoardKind,
    id: RowId,
    to: &str,
    index: Option<usize>,
) -> anyhow::Result<()> {
    let DragAccepted { pending, warning } = console.move_card(kind, id, to, index)?;
    if let Some(w) = warning {
        eprintln!("Warning: {w}");
    }
    if pending.is_none() {
        println!("Reordered #{id} within {to}");
        return Ok(());
    }
    settle_and_print(console).await?;
    println!("Moved #{id} to {to}");
    Ok(())
}

pub fn cmd_columns(console: &Console, kind: BoardKind) {
    println!("{} board", kind.title());
    for column in console.get_columns(kind) {
        print_column(&column);
    }
}

fn print_column(column: &ColumnView) {
    let closed = if column.accepts_drops { "" } else { " (closed)" };
    println!("\n{} [{}]{}", column.key, column.cards.len(), closed);
    if column.cards.is_empty() {
        println!("  -");
    }
    for card in &column.cards {
        println!("  #{:<5} {}  ({})", card.id, card.title, card.assignee.as_deref().unwrap_or("-"));
    }
}

pub fn cmd_tree(console: &Console) {
    let (projects, unfiled) = console.hierarchy();
    if projects.is_empty() && unfiled.is_empty() {
        println!("No projects or assignments.");
        return;
    }
    for project in &projects {
        let completion = project
            .item
            .completion_percentage
            .map(|p| format!("{p:.0}%"))
            .unwrap_or_else(|| "-".into());
        println!("{} [{}] {}", project.item.name, project.item.status.label(), completion);
        for assignment in &project.children {
            print_assignment(assignment, 1);
        }
    }
    if !unfiled.is_empty() {
        println!("(no project)");
        for assignment in &unfiled {
            print_assignment(assignment, 1);
        }
    }
}

fn print_assignment(tree: &AssignmentTree, depth: usize) {
    let progress = tree.progress();
    let pct = progress.percent().map(|p| format!(" {p}%")).unwrap_or_default();
    println!(
        "{}- {} [{}] (#{}){}",
        "  ".repeat(depth),
        tree.item.description,
        tree.item.status.label(),
        tree.item.id,
        pct
    );
    for task in &tree.children {
        print_task(task, depth + 1);
    }
}

fn print_task(tree: &TaskTree, depth: usize) {
    let t = &tree.item;
    let approval = match t.approval.approval_status {
        ApprovalStatus::None if !t.approval.needs_approval => String::new(),
        status => format!(" approval:{}", status.label()),
    };
    println!("{}- {} [{}] (#{}){}", "  ".repeat(depth), t.description, t.status.label(), t.id, approval);
    for s in &tree.children {
        let mark = if s.done { "x" } else { " " };
        println!("{}[{}] {} (#{})", "  ".repeat(depth + 1), mark, s.name, s.id);
    }
}

pub fn cmd_review(console: &Console) {
    let queue = console.get_review_queue();
    if queue.is_empty() {
        println!("Nothing waiting for review.");
        return;
    }
    for task in queue {
        let submitted = task
            .approval
            .submitted_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "#{:<5} {}  by {} at {}",
            task.id,
            task.description,
            task.approval.started_by.as_deref().unwrap_or("-"),
            submitted
        );
    }
}

/// Run the terminal board. Hands the console back so outstanding saves can be
/// awaited once the screen is restored.
pub fn cmd_board(console: Console, kind: BoardKind) -> anyhow::Result<Console> {
    run_board_tui(console, kind).context("terminal board failed")
}

pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}
