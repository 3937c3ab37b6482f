//! Interactive kanban board.
//!
//! Cards are laid out in one column per status. Moving a card goes through the
//! console exactly like a drag would: the board updates at once, the save runs
//! in the background and its outcome shows up in the status bar on a later tick.
//! A reverted save can be sent again with `r`.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};

use crate::console::{CardView, ColumnView, Console, DragAccepted, DragEvent, Notice, RetryHandle, Slot};
use crate::fields::*;
use crate::tui::colors::{board_accent, DARK_PURPLE, DARK_RED, GOLD};

const HELP: &str = "Ctrl+←/→: Move | Shift+↑/↓: Reorder | a: Submit | y/n: Approve/Reject | \
                    w/l: Won/Lost | r: Retry | Tab: Board | Enter: Details | Esc: Exit";

/// Board application state
pub struct BoardApp {
    console: Console,
    kind: BoardKind,
    columns: Vec<ColumnView>,
    selected_column: usize,
    selected_card: usize,
    column_scroll_offsets: Vec<usize>,
    status_message: String,
    show_detail: bool,
    last_failure: Option<RetryHandle>,
}

impl BoardApp {
    pub fn new(console: Console, kind: BoardKind) -> Self {
        let mut app = BoardApp {
            console,
            kind,
            columns: Vec::new(),
            selected_column: 0,
            selected_card: 0,
            column_scroll_offsets: Vec::new(),
            status_message: String::new(),
            show_detail: false,
            last_failure: None,
        };
        app.update_columns();
        app
    }

    /// Give the console back once the board closes.
    pub fn into_console(self) -> Console {
        self.console
    }

    fn update_columns(&mut self) {
        self.columns = self.console.get_columns(self.kind);
        self.column_scroll_offsets.resize(self.columns.len(), 0);
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        if self.selected_column >= self.columns.len() {
            self.selected_column = self.columns.len().saturating_sub(1);
        }
        let len = self.columns.get(self.selected_column).map_or(0, |c| c.cards.len());
        if self.selected_card >= len {
            self.selected_card = len.saturating_sub(1);
        }
    }

    fn selected(&self) -> Option<&CardView> {
        self.columns.get(self.selected_column)?.cards.get(self.selected_card)
    }

    fn select_card(&mut self, id: RowId) {
        for (ci, column) in self.columns.iter().enumerate() {
            if let Some(pos) = column.cards.iter().position(|c| c.id == id) {
                self.selected_column = ci;
                self.selected_card = pos;
                return;
            }
        }
        self.clamp_selection();
    }

    fn set_status_message(&mut self, message: String) {
        self.status_message = message;
    }

    /// Pull in save outcomes that have arrived since the last tick.
    fn absorb_notices(&mut self) {
        let notices = self.console.drain_notices();
        if notices.is_empty() {
            return;
        }
        for notice in notices {
            match &notice {
                Notice::Reverted { retry, .. } => {
                    self.last_failure = Some(*retry);
                    self.set_status_message(format!("{notice} (r to retry)"));
                }
                Notice::Confirmed { .. } => {
                    if self.status_message.is_empty() {
                        self.set_status_message(notice.to_string());
                    }
                }
            }
        }
        let keep = self.selected().map(|c| c.id);
        self.update_columns();
        if let Some(id) = keep {
            self.select_card(id);
        }
    }

    fn accepted(&mut self, id: RowId, verb: String, accepted: DragAccepted) {
        self.update_columns();
        self.select_card(id);
        match accepted.warning {
            Some(w) => self.set_status_message(format!("{verb} | Warning: {w}")),
            None => self.set_status_message(verb),
        }
    }

    /// Move the selected card to the nearest column in `step` direction that accepts drops.
    fn move_card(&mut self, step: isize) {
        let Some(card) = self.selected() else { return };
        let id = card.id;
        let source = Slot::new(self.columns[self.selected_column].key, self.selected_card);

        let mut target = self.selected_column as isize + step;
        while target >= 0 && (target as usize) < self.columns.len() && !self.columns[target as usize].accepts_drops {
            target += step;
        }
        if target < 0 || target as usize >= self.columns.len() {
            self.set_status_message("No open column in that direction".to_string());
            return;
        }
        let key = self.columns[target as usize].key;

        let event = DragEvent::new(id, source, Some(Slot::new(key, usize::MAX)));
        match self.console.on_drag_end(self.kind, event) {
            Ok(accepted) => self.accepted(id, format!("Moved #{id} to {key}"), accepted),
            Err(reason) => self.set_status_message(reason.to_string()),
        }
    }

    /// Shift the selected card up or down within its column.
    fn reorder(&mut self, up: bool) {
        let Some(card) = self.selected() else { return };
        let id = card.id;
        let column = &self.columns[self.selected_column];
        let to = if up {
            match self.selected_card.checked_sub(1) {
                Some(i) => i,
                None => return,
            }
        } else if self.selected_card + 1 < column.cards.len() {
            self.selected_card + 1
        } else {
            return;
        };
        let event = DragEvent::new(
            id,
            Slot::new(column.key, self.selected_card),
            Some(Slot::new(column.key, to)),
        );
        match self.console.on_drag_end(self.kind, event) {
            Ok(_) => {
                self.update_columns();
                self.select_card(id);
            }
            Err(reason) => self.set_status_message(reason.to_string()),
        }
    }

    fn submit(&mut self) {
        let Some(id) = self.task_selected() else { return };
        match self.console.submit_for_approval(id) {
            Ok(_) => {
                self.update_columns();
                self.set_status_message(format!("Task #{id} submitted for approval"));
            }
            Err(reason) => self.set_status_message(reason.to_string()),
        }
    }

    fn decide(&mut self, outcome: Decision) {
        let Some(id) = self.task_selected() else { return };
        match self.console.decide(id, outcome, None) {
            Ok(_) => {
                self.update_columns();
                let verb = match outcome {
                    Decision::Approved => "approved",
                    Decision::Rejected => "rejected",
                };
                self.set_status_message(format!("Task #{id} {verb}"));
            }
            Err(reason) => self.set_status_message(reason.to_string()),
        }
    }

    fn close_prospect(&mut self, won: bool) {
        if self.kind != BoardKind::Pipeline {
            self.set_status_message("Only prospects can be closed".to_string());
            return;
        }
        let Some(id) = self.selected().map(|c| c.id) else { return };
        let result = if won { self.console.convert(id) } else { self.console.mark_lost(id) };
        match result {
            Ok(_) => {
                self.update_columns();
                self.select_card(id);
                let outcome = if won { "won" } else { "lost" };
                self.set_status_message(format!("Prospect #{id} closed as {outcome}"));
            }
            Err(reason) => self.set_status_message(reason.to_string()),
        }
    }

    fn retry(&mut self) {
        let Some(handle) = self.last_failure.take() else {
            self.set_status_message("Nothing to retry".to_string());
            return;
        };
        match self.console.retry(handle) {
            Ok(_) => {
                self.update_columns();
                self.set_status_message("Retrying...".to_string());
            }
            Err(reason) => self.set_status_message(reason.to_string()),
        }
    }

    fn task_selected(&mut self) -> Option<RowId> {
        if self.kind != BoardKind::Tasks {
            self.set_status_message("Approvals apply to tasks only".to_string());
            return None;
        }
        self.selected().map(|c| c.id)
    }

    fn switch_board(&mut self) {
        self.kind = self.kind.next();
        self.selected_column = 0;
        self.selected_card = 0;
        self.column_scroll_offsets.clear();
        self.show_detail = false;
        self.update_columns();
        self.set_status_message(format!("Switched to {} board", self.kind.title()));
    }

    /// Apply one key press. Returns true when the board should close.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        self.status_message.clear();
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        match key.code {
            KeyCode::Char('c') if ctrl => return true,
            KeyCode::Char('q') if ctrl => return true,
            KeyCode::Esc => {
                if self.show_detail {
                    self.show_detail = false;
                } else {
                    return true;
                }
            }
            KeyCode::Enter => self.show_detail = !self.show_detail,

            KeyCode::Left if ctrl => self.move_card(-1),
            KeyCode::Right if ctrl => self.move_card(1),
            KeyCode::Up if shift => self.reorder(true),
            KeyCode::Down if shift => self.reorder(false),

            KeyCode::Left => {
                if self.selected_column > 0 {
                    self.selected_column -= 1;
                    self.clamp_selection();
                }
            }
            KeyCode::Right => {
                if self.selected_column + 1 < self.columns.len() {
                    self.selected_column += 1;
                    self.clamp_selection();
                }
            }
            KeyCode::Up => self.selected_card = self.selected_card.saturating_sub(1),
            KeyCode::Down => {
                let len = self.columns.get(self.selected_column).map_or(0, |c| c.cards.len());
                if self.selected_card + 1 < len {
                    self.selected_card += 1;
                }
            }

            KeyCode::Tab => self.switch_board(),
            KeyCode::Char('a') => self.submit(),
            KeyCode::Char('y') => self.decide(Decision::Approved),
            KeyCode::Char('n') => self.decide(Decision::Rejected),
            KeyCode::Char('w') => self.close_prospect(true),
            KeyCode::Char('l') => self.close_prospect(false),
            KeyCode::Char('r') => self.retry(),
            KeyCode::Char('h') => self.set_status_message(format!("Help: {HELP}")),
            _ => {}
        }
        false
    }

    /// Poll for one key press. Returns true when the board should close.
    fn handle_input(&mut self) -> io::Result<bool> {
        self.absorb_notices();
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(self.handle_key(key));
                }
            }
        }
        Ok(false)
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Board
                Constraint::Length(1), // Status bar
            ])
            .split(f.area());

        self.render_header(f, chunks[0]);
        self.render_board(f, chunks[1]);
        self.render_status_bar(f, chunks[2]);

        if self.show_detail {
            self.render_detail_popup(f);
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let pending = self.console.pending();
        let context = format!(
            "Board: {}  Actor: {}  Saving: {}",
            self.kind.title(),
            self.console.actor(),
            pending
        );
        let header = Paragraph::new(Line::from(vec![
            Span::styled("OPERATIONS BOARD", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(context, Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC)),
        ]))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
        f.render_widget(header, area);
    }

    fn render_board(&mut self, f: &mut Frame, area: Rect) {
        if self.columns.is_empty() {
            return;
        }
        let count = self.columns.len() as u16;
        let constraints: Vec<Constraint> = (0..count).map(|_| Constraint::Ratio(1, count as u32)).collect();
        let areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        for (i, &column_area) in areas.iter().enumerate() {
            self.render_column(f, column_area, i);
        }
    }

    fn render_column(&mut self, f: &mut Frame, area: Rect, index: usize) {
        let is_selected = index == self.selected_column;
        let column = &self.columns[index];
        let accent = board_accent(self.kind);

        let border_style = if is_selected {
            Style::default().fg(accent).add_modifier(Modifier::BOLD)
        } else if !column.accepts_drops {
            Style::default().fg(DARK_RED)
        } else {
            Style::default()
        };
        let title = if column.accepts_drops {
            format!("{} ({})", column.key, column.cards.len())
        } else {
            format!("{} ({}) closed", column.key, column.cards.len())
        };
        let block = Block::default().borders(Borders::ALL).title(title).border_style(border_style);
        let inner = block.inner(area);
        f.render_widget(block, area);

        if column.cards.is_empty() {
            return;
        }

        let card_height = 5;
        let available_height = inner.height as usize;
        let visible_cards = available_height / card_height;

        let scroll_offset = if is_selected {
            let start = self.column_scroll_offsets[index];
            if self.selected_card < start {
                self.selected_card
            } else if visible_cards > 0 && self.selected_card >= start + visible_cards {
                self.selected_card + 1 - visible_cards
            } else {
                start
            }
        } else {
            self.column_scroll_offsets[index]
        };
        self.column_scroll_offsets[index] = scroll_offset;

        let column = &self.columns[index];
        let mut current_y = 0;
        let mut rendered = 0;
        for (card_index, card) in column.cards.iter().enumerate().skip(scroll_offset) {
            if current_y + card_height > available_height {
                break;
            }
            let card_area = Rect {
                x: inner.x,
                y: inner.y + current_y as u16,
                width: inner.width,
                height: card_height as u16,
            };
            self.render_card(f, card_area, card, is_selected && card_index == self.selected_card);
            current_y += card_height;
            rendered += 1;
        }

        if scroll_offset > 0 {
            let indicator = Paragraph::new(format!("▲ +{scroll_offset} above")).style(Style::default().fg(Color::Cyan));
            f.render_widget(indicator, Rect { x: inner.x, y: inner.y, width: inner.width, height: 1 });
        }
        let remaining = column.cards.len() - scroll_offset - rendered;
        if remaining > 0 {
            let indicator = Paragraph::new(format!("▼ +{remaining} below")).style(Style::default().fg(Color::Cyan));
            f.render_widget(
                indicator,
                Rect { x: inner.x, y: inner.y + inner.height - 1, width: inner.width, height: 1 },
            );
        }
    }

    fn render_card(&self, f: &mut Frame, area: Rect, card: &CardView, is_selected: bool) {
        let style = if is_selected {
            Style::default().bg(board_accent(self.kind)).fg(Color::Black).add_modifier(Modifier::BOLD)
        } else if card.saving {
            Style::default().bg(DARK_PURPLE)
        } else {
            Style::default().bg(Color::DarkGray)
        };

        let mut text = vec![Line::from(format!("#{}", card.id))];
        text.extend(wrap_title(&card.title, area.width.saturating_sub(2) as usize).into_iter().map(Line::from));

        let mut footer = card.assignee.clone().unwrap_or_else(|| "-".to_string());
        if let Some(badge) = self.approval_badge(card.id) {
            footer.push_str(" | ");
            footer.push_str(badge);
        }
        if card.saving {
            footer.push_str(" | saving");
        }
        text.push(Line::from(footer));

        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL))
            .style(style)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn approval_badge(&self, id: RowId) -> Option<&'static str> {
        if self.kind != BoardKind::Tasks {
            return None;
        }
        let task = self.console.tasks().get(id)?;
        match task.approval.approval_status {
            ApprovalStatus::None if task.approval.needs_approval => Some("needs approval"),
            ApprovalStatus::None => None,
            status => Some(status.label()),
        }
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else {
            let total: usize = self.columns.iter().map(|c| c.cards.len()).sum();
            format!("{}: {} | {} | h: Help", self.kind.title(), total, HELP)
        };
        let accent = board_accent(self.kind);
        let text_color = match accent {
            GOLD => Color::Rgb(20, 20, 20),
            _ => Color::White,
        };
        let status = Paragraph::new(text)
            .style(Style::default().bg(accent).fg(text_color))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn detail_lines(&self, id: RowId) -> Vec<Line<'static>> {
        let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_else(|| "-".into())
        };
        let or_dash = |s: Option<&str>| s.unwrap_or("-").to_string();
        let links = |l: &[LinkRef]| {
            if l.is_empty() {
                "-".to_string()
            } else {
                l.iter().map(|r| format!("#{} {}", r.id, r.value)).collect::<Vec<_>>().join(", ")
            }
        };
        let bold = Style::default().add_modifier(Modifier::BOLD);

        match self.kind {
            BoardKind::Tasks => {
                let Some(t) = self.console.tasks().get(id) else { return Vec::new() };
                let a = &t.approval;
                vec![
                    Line::from(Span::styled(format!("Task #{}: {}", t.id, t.description), bold)),
                    Line::from(""),
                    Line::from(format!("Status:         {}", t.status.label())),
                    Line::from(format!("Priority:       {}", or_dash(t.priority.map(|p| p.label())))),
                    Line::from(format!("Assignee:       {}", or_dash(t.assignee.as_deref()))),
                    Line::from(format!("Deadline:       {}", t.deadline.map_or("-".into(), |d| d.to_string()))),
                    Line::from(format!("Assignment:     {}", links(&t.assignment))),
                    Line::from(""),
                    Line::from(format!("Needs approval: {}", if a.needs_approval { "yes" } else { "no" })),
                    Line::from(format!("Approval:       {}", a.approval_status.label())),
                    Line::from(format!("Submitted by:   {} at {}", or_dash(a.started_by.as_deref()), when(a.submitted_at))),
                    Line::from(format!("Decided by:     {} at {}", or_dash(a.approved_by.as_deref()), when(a.approved_at))),
                    Line::from(format!("Notes:          {}", or_dash(a.approval_notes.as_deref()))),
                ]
            }
            BoardKind::Assignments => {
                let Some(a) = self.console.assignments().get(id) else { return Vec::new() };
                vec![
                    Line::from(Span::styled(format!("Assignment #{}: {}", a.id, a.description), bold)),
                    Line::from(""),
                    Line::from(format!("Status:   {}", a.status.label())),
                    Line::from(format!("Type:     {}", or_dash(a.kind.as_deref()))),
                    Line::from(format!("Assignee: {}", or_dash(a.assignee.as_deref()))),
                    Line::from(format!("Deadline: {}", a.deadline.map_or("-".into(), |d| d.to_string()))),
                    Line::from(format!("Project:  {}", links(&a.project))),
                    Line::from(format!("Client:   {}", or_dash(a.client_name()))),
                ]
            }
            BoardKind::Pipeline => {
                let Some(p) = self.console.pipeline().get(id) else { return Vec::new() };
                vec![
                    Line::from(Span::styled(format!("Prospect #{}: {}", p.id, p.name), bold)),
                    Line::from(""),
                    Line::from(format!("Stage:          {}", p.status.label())),
                    Line::from(format!("Expected value: {}", p.expected_value.map_or("-".into(), |v| format!("{v:.2}")))),
                    Line::from(format!(
                        "Next action:    {}",
                        p.next_action_date.map_or("-".into(), |d| d.to_string())
                    )),
                ]
            }
        }
    }

    fn render_detail_popup(&self, f: &mut Frame) {
        let Some(card) = self.selected() else { return };
        let lines = self.detail_lines(card.id);

        let popup_area = {
            let area = f.area();
            let width = (area.width * 80) / 100;
            let height = (area.height * 80) / 100;
            Rect::new((area.width - width) / 2, (area.height - height) / 2, width, height)
        };
        f.render_widget(Clear, popup_area);

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Details (Enter to close)")
            .title_alignment(Alignment::Center)
            .border_style(Style::default().fg(board_accent(self.kind)).add_modifier(Modifier::BOLD));
        let popup = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(Color::Black));
        f.render_widget(popup, popup_area);
    }

    /// Main event loop
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;
            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

/// Word-wrap a card title to at most two lines of `width`.
fn wrap_title(title: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in title.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            if lines.len() == 2 {
                return lines;
            }
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RetryConfig, TablesConfig};
    use crate::db::{LocalDatabase, LocalRecordStore};
    use crate::rows::Fields;
    use ratatui::backend::TestBackend;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn row(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    async fn app(kind: BoardKind) -> BoardApp {
        let t = TablesConfig::default();
        let mut db = LocalDatabase::default();
        db.insert(t.tasks, row(json!({"Description": "Draft notes", "Status": "To Do", "Assignee": "mia"})));
        db.insert(
            t.tasks,
            row(json!({"Description": "File return", "Status": "Ready for Review", "Needs Approval": true})),
        );
        db.insert(t.prospects, row(json!({"Name": "Birch & Co", "Status": "Quoted"})));

        let mut config = Config::default();
        config.board.actor = "mia".into();
        config.retry = RetryConfig::none();
        let console = Console::load(Arc::new(LocalRecordStore::in_memory(db)), &config).await.unwrap();
        BoardApp::new(console, kind)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::CONTROL)
    }

    #[tokio::test]
    async fn ctrl_right_moves_card_and_follows_it() {
        let mut app = app(BoardKind::Tasks).await;
        assert_eq!(app.selected().map(|c| c.id), Some(1));

        assert!(!app.handle_key(ctrl(KeyCode::Right)));
        assert_eq!(app.columns[app.selected_column].key, "In Progress");
        assert_eq!(app.selected().map(|c| c.id), Some(1));
        assert!(app.status_message.contains("Moved #1 to In Progress"));

        let notices = app.console.settle().await;
        assert_eq!(notices.len(), 1);
        assert!(!notices[0].is_revert());
    }

    #[tokio::test]
    async fn gated_task_cannot_reach_done_from_the_board() {
        let mut app = app(BoardKind::Tasks).await;
        app.handle_key(key(KeyCode::Right));
        app.handle_key(key(KeyCode::Right));
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.selected().map(|c| c.id), Some(2));

        app.handle_key(ctrl(KeyCode::Right));
        assert_eq!(app.console.tasks().get(2).unwrap().status, TaskStatus::ReadyForReview);
        assert!(!app.status_message.is_empty());
        assert_eq!(app.console.pending(), 0);
    }

    #[tokio::test]
    async fn closed_columns_are_skipped_when_moving() {
        let mut app = app(BoardKind::Pipeline).await;
        for _ in 0..3 {
            app.handle_key(key(KeyCode::Right));
        }
        assert_eq!(app.columns[app.selected_column].key, "Quoted");

        app.handle_key(ctrl(KeyCode::Right));
        assert_eq!(app.status_message, "No open column in that direction");
        assert_eq!(app.console.pipeline().get(1).unwrap().status, PipelineStatus::Quoted);

        app.handle_key(key(KeyCode::Char('w')));
        assert_eq!(app.console.pipeline().get(1).unwrap().status, PipelineStatus::Won);
        assert_eq!(app.columns[app.selected_column].key, "Won");
        app.console.settle().await;
    }

    #[tokio::test]
    async fn approval_keys_only_act_on_tasks() {
        let mut app = app(BoardKind::Pipeline).await;
        app.handle_key(key(KeyCode::Char('a')));
        assert_eq!(app.status_message, "Approvals apply to tasks only");

        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.kind, BoardKind::Tasks);
        for _ in 0..3 {
            app.handle_key(key(KeyCode::Right));
        }
        app.handle_key(key(KeyCode::Char('a')));
        assert_eq!(app.console.tasks().get(2).unwrap().approval.approval_status, ApprovalStatus::Pending);
        app.console.settle().await;
    }

    #[tokio::test]
    async fn escape_closes_detail_before_board() {
        let mut app = app(BoardKind::Tasks).await;
        assert!(!app.handle_key(key(KeyCode::Enter)));
        assert!(app.show_detail);
        assert!(!app.handle_key(key(KeyCode::Esc)));
        assert!(app.handle_key(key(KeyCode::Esc)));
        assert!(app.handle_key(ctrl(KeyCode::Char('c'))));
    }

    #[tokio::test]
    async fn renders_columns_and_cards() {
        let mut app = app(BoardKind::Tasks).await;
        app.show_detail = true;
        let mut terminal = Terminal::new(TestBackend::new(160, 40)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();

        let screen: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(screen.contains("To Do (1)"));
        assert!(screen.contains("Draft notes"));
        assert!(screen.contains("Task #1: Draft notes"));
    }

    #[test]
    fn titles_wrap_to_two_lines() {
        assert_eq!(wrap_title("one two three four", 9), vec!["one two", "three"]);
        assert_eq!(wrap_title("short", 20), vec!["short"]);
        assert!(wrap_title("", 10).is_empty());
    }
}
