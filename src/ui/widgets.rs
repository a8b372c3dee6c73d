//! Reusable UI widgets
//!
//! - Popup dialogs (confirm, error)
//! - Status bar
//! - Flash messages
//! - Busy spinner
//! - Layout helpers

use crate::ui::Theme;
use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Render a centered popup dialog
pub fn render_popup(
    frame: &mut Frame,
    title: &str,
    content: Vec<Line>,
    buttons: &[(&str, char)],
    theme: &Theme,
    area: Rect,
) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = (content.len() as u16 + 6).min(area.height.saturating_sub(2));
    let popup_area = centered_rect(popup_width, popup_height, area);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .style(theme.block_style())
        .title(format!(" {} ", title))
        .title_style(theme.title())
        .borders(Borders::ALL)
        .border_style(theme.border_focused());
    frame.render_widget(block, popup_area);

    let inner = Rect {
        x: popup_area.x + 2,
        y: popup_area.y + 1,
        width: popup_area.width.saturating_sub(4),
        height: popup_area.height.saturating_sub(4),
    };
    frame.render_widget(
        Paragraph::new(content)
            .style(theme.text())
            .wrap(Wrap { trim: false }),
        inner,
    );

    if buttons.is_empty() {
        return;
    }

    let button_area = Rect {
        x: popup_area.x + 2,
        y: popup_area.y + popup_area.height.saturating_sub(2),
        width: popup_area.width.saturating_sub(4),
        height: 1,
    };
    let mut spans = Vec::new();
    for (i, (label, key)) in buttons.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("    "));
        }
        spans.push(Span::styled("[", theme.text_dim()));
        spans.push(Span::styled(
            key.to_string(),
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled("] ", theme.text_dim()));
        spans.push(Span::styled(*label, theme.text()));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        button_area,
    );
}

/// Error popup with a single dismiss button
pub fn render_error_popup(frame: &mut Frame, title: &str, message: &str, theme: &Theme, area: Rect) {
    let mut content = vec![Line::raw("")];
    content.extend(message.lines().map(|l| Line::styled(l.to_string(), theme.error())));
    render_popup(frame, title, content, &[("OK", '⏎')], theme, area);
}

/// Current spinner glyph, advancing every 100 ms
pub fn spinner_frame() -> &'static str {
    let tick = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        / 100;
    SPINNER_FRAMES[tick as usize % SPINNER_FRAMES.len()]
}

/// One-line flash message on the bottom row of `area`
pub fn render_flash_message(frame: &mut Frame, message: &str, is_error: bool, theme: &Theme, area: Rect) {
    let style = if is_error { theme.error() } else { theme.success() };
    let prefix = if is_error { "✗ " } else { "✓ " };

    let flash_area = bottom_row(area);
    frame.render_widget(Clear, flash_area);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(prefix, style),
            Span::styled(message, style),
        ])),
        flash_area,
    );
}

/// Status bar: left spans, right-aligned hint text
pub fn render_status_bar(frame: &mut Frame, left: Line, right: &str, theme: &Theme, area: Rect) {
    let status_area = bottom_row(area);
    frame.render_widget(Clear, status_area);
    frame.render_widget(Paragraph::new(left).style(theme.text_dim()), status_area);

    let right_len = right.chars().count() as u16;
    let right_area = Rect {
        x: status_area.x + status_area.width.saturating_sub(right_len + 1),
        y: status_area.y,
        width: (right_len + 1).min(status_area.width),
        height: 1,
    };
    frame.render_widget(Paragraph::new(right).style(theme.text_dim()), right_area);
}

fn bottom_row(area: Rect) -> Rect {
    Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(1),
        width: area.width,
        height: 1.min(area.height),
    }
}

/// Helper: Create a centered rect of given size
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}
