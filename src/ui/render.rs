//! Main rendering module for aegis
//!
//! Renders the complete UI:
//! - Header with name and execution mode
//! - Operations module (sidebar + output)
//! - Global status bar (bottom)
//! - Popup overlays + flash messages

use crate::app::{App, PopupState};
use crate::modules::operations;
use crate::ui::widgets;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};

pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let theme = &app.theme;

    // Fill entire background
    frame.render_widget(Block::default().style(theme.block_style()), area);

    let vertical = Layout::vertical([
        Constraint::Length(1), // header
        Constraint::Min(8),    // operations
        Constraint::Length(1), // status bar
    ])
    .split(area);

    render_header(frame, app, vertical[0]);
    operations::render(frame, &app.operations, theme, vertical[1]);
    render_status_bar(frame, app, vertical[2]);

    render_popups(frame, app, area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let simulated = app.operations.tasks().profile().is_simulated();
    let mode = if simulated { " SIMULATION " } else { " LIVE " };

    let line = Line::from(vec![
        Span::styled(
            " aegis",
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" v{}  ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(theme.fg_dim),
        ),
        Span::styled(mode, theme.mode_badge(simulated)),
    ]);
    frame.render_widget(Paragraph::new(line).style(theme.block_style()), area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let state = &app.operations;

    let hints = if state.confirm.is_some() {
        "[y] Run  [n/Esc] Cancel"
    } else if state.is_running() {
        "[c] Cancel  [K] Terminate  [j/k] Navigate  [t] Theme  [q] Quit"
    } else {
        "[j/k] Navigate  [Enter] Run  [PgUp/PgDn] Scroll  [t] Theme  [q] Quit"
    };

    let left = Line::from(vec![
        Span::raw(" "),
        Span::styled(state.tasks().profile().summary(), theme.text_dim()),
        Span::styled(format!("  · {}", app.config.theme.as_str()), theme.text_dim()),
    ]);
    widgets::render_status_bar(frame, left, hints, theme, area);
}

/// Render popup overlays
fn render_popups(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;

    match &app.popup {
        PopupState::None => {}
        PopupState::Error { title, message } => {
            widgets::render_error_popup(frame, title, message, theme, area);
        }
    }

    // Flash message
    if let Some(msg) = &app.flash_message {
        widgets::render_flash_message(frame, &msg.text, msg.is_error, theme, area);
    }
}
