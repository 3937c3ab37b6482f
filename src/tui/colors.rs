//! Color constants for the terminal user interface.

use ratatui::style::Color;

use crate::fields::BoardKind;

// Native Color::Blue is used for the pipeline board

/// Used for the assignments board
pub const DARK_GREEN: Color = Color::Rgb(0, 80, 0);
/// Used for the tasks board
pub const GOLD: Color = Color::Rgb(255, 215, 0);
/// Used for closed columns
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
/// Used for cards with a save in flight
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);

/// Accent color of a board.
pub fn board_accent(kind: BoardKind) -> Color {
    match kind {
        BoardKind::Tasks => GOLD,
        BoardKind::Assignments => DARK_GREEN,
        BoardKind::Pipeline => Color::Blue,
    }
}
