//! Board TUI entry point and setup.

use std::io;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen}
};
use ratatui::{prelude::CrosstermBackend, Terminal};

use crate::console::Console;
use crate::fields::BoardKind;
use crate::tui::workflow::BoardApp;

/// Initialise and run the board terminal user interface.
/// Must be called inside a tokio runtime context; saves are spawned onto it.
/// Returns the console so the caller can wait for saves still in flight.
pub fn run_board_tui(console: Console, kind: BoardKind) -> io::Result<Console> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = BoardApp::new(console, kind);
    let result = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    Ok(app.into_console())
}
