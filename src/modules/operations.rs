//! Operations module
//!
//! Sidebar: every operation, grouped by category
//! Output: the running operation (spinner) or the last report
//!
//! Destructive operations ask for confirmation first. Only one operation
//! runs at a time; the task runner rejects a second start.

use crate::security::{Category, Operation, OperationReport, OperationStatus};
use crate::tasks::{TaskError, TaskRunner};
use crate::types::{format_duration, FlashMessage};
use crate::ui::theme::Theme;
use crate::ui::widgets;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};
use std::sync::mpsc;
use std::time::Instant;
use tracing::warn;

const SIDEBAR_WIDTH: u16 = 34;
const SCROLL_PAGE: u16 = 10;

// ── Module state ──

pub struct OperationsState {
    tasks: TaskRunner,
    pub selected: usize,
    pub confirm: Option<Operation>,
    pub running: Option<(Operation, Instant)>,
    pub last_report: Option<OperationReport>,
    pub scroll: u16,
    pub flash_message: Option<FlashMessage>,
    rx: Option<mpsc::Receiver<OperationReport>>,
}

impl OperationsState {
    pub fn new(tasks: TaskRunner) -> Self {
        Self {
            tasks,
            selected: 0,
            confirm: None,
            running: None,
            last_report: None,
            scroll: 0,
            flash_message: None,
            rx: None,
        }
    }

    pub fn tasks(&self) -> &TaskRunner {
        &self.tasks
    }

    pub fn selected_operation(&self) -> Operation {
        Operation::ALL[self.selected.min(Operation::ALL.len() - 1)]
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Run the selected operation, asking first if it changes the system
    pub fn request_selected(&mut self) {
        let operation = self.selected_operation();
        if operation.is_destructive() {
            self.confirm = Some(operation);
        } else {
            self.start(operation);
        }
    }

    fn start(&mut self, operation: Operation) {
        match self.tasks.start(operation) {
            Ok(rx) => {
                self.rx = Some(rx);
                self.running = Some((operation, Instant::now()));
                self.scroll = 0;
            }
            Err(TaskError::Busy) => {
                self.flash_message = Some(FlashMessage::new(
                    "Busy: wait for the running operation or cancel it with c".to_string(),
                    true,
                ));
            }
            Err(e) => {
                warn!("Could not start {}: {}", operation.id(), e);
                self.flash_message = Some(FlashMessage::new(format!("Could not start: {}", e), true));
            }
        }
    }

    /// Pick up a finished report, if any
    pub fn poll(&mut self) {
        let Some(rx) = &self.rx else {
            return;
        };
        match rx.try_recv() {
            Ok(report) => {
                let text = format!("{}: {}", report.operation.label(), report.status.as_str());
                self.flash_message = Some(FlashMessage::new(text, !report.succeeded()));
                self.last_report = Some(report);
                self.running = None;
                self.rx = None;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {
                self.flash_message = Some(FlashMessage::new(
                    "Operation worker exited without a report".to_string(),
                    true,
                ));
                self.running = None;
                self.rx = None;
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if let Some(operation) = self.confirm {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.confirm = None;
                    self.start(operation);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.confirm = None;
                }
                _ => {}
            }
            // The popup swallows every key
            return Ok(true);
        }

        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.selected = (self.selected + 1).min(Operation::ALL.len() - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Enter => self.request_selected(),
            KeyCode::Char('c') => {
                if self.tasks.cancel() {
                    self.flash_message = Some(FlashMessage::new(
                        "Cancellation requested; stopping after the current command".to_string(),
                        false,
                    ));
                }
            }
            KeyCode::Char('K') => {
                if let Some(token) = self.tasks.cancel_token().filter(|_| self.tasks.is_busy()) {
                    token.request_terminate();
                    self.flash_message = Some(FlashMessage::new(
                        "Termination requested; the running command still finishes or times out".to_string(),
                        true,
                    ));
                }
            }
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(SCROLL_PAGE),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(SCROLL_PAGE),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

// ── Rendering ──

pub fn render(frame: &mut Frame, state: &OperationsState, theme: &Theme, area: Rect) {
    let chunks = Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)]).split(area);

    render_sidebar(frame, state, theme, chunks[0]);
    render_output(frame, state, theme, chunks[1]);

    if let Some(operation) = state.confirm {
        let mode = if state.tasks.profile().is_simulated() {
            "Simulation mode: nothing will be changed."
        } else {
            "This changes the live system."
        };
        let content = vec![
            Line::raw(""),
            Line::from(vec![
                Span::styled("Run ", theme.text()),
                Span::styled(operation.label(), theme.title()),
                Span::styled("?", theme.text()),
            ]),
            Line::styled(mode, theme.warning()),
        ];
        widgets::render_popup(
            frame,
            "Confirm",
            content,
            &[("Run", 'y'), ("Cancel", 'n')],
            theme,
            area,
        );
    }
}

fn render_sidebar(frame: &mut Frame, state: &OperationsState, theme: &Theme, area: Rect) {
    let block = Block::default()
        .style(theme.block_style())
        .title(" Operations ")
        .title_style(theme.title())
        .borders(Borders::ALL)
        .border_style(theme.border());

    let selected = state.selected_operation();
    let mut items = Vec::new();
    for category in Category::ALL {
        items.push(ListItem::new(Line::styled(
            format!(" {}", category.as_str()),
            Style::default().fg(theme.accent_dim).add_modifier(Modifier::BOLD),
        )));
        for operation in category.operations() {
            let marker = if operation.is_destructive() { "!" } else { " " };
            let line = Line::from(vec![
                Span::styled(format!("  {} ", marker), theme.warning()),
                Span::raw(operation.label()),
            ]);
            let style = if operation == selected {
                theme.selected()
            } else {
                theme.text()
            };
            items.push(ListItem::new(line).style(style));
        }
    }

    frame.render_widget(List::new(items).block(block), area);
}

fn render_output(frame: &mut Frame, state: &OperationsState, theme: &Theme, area: Rect) {
    let block = Block::default()
        .style(theme.block_style())
        .title(" Output ")
        .title_style(theme.title())
        .borders(Borders::ALL)
        .border_style(theme.border_focused());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if let Some((operation, started)) = state.running {
        let lines = vec![
            Line::raw(""),
            Line::styled(
                format!(
                    "  {} {}  {}",
                    widgets::spinner_frame(),
                    operation.label(),
                    format_duration(started.elapsed().as_secs_f64())
                ),
                Style::default().fg(theme.accent),
            ),
            Line::raw(""),
            Line::styled("  [c] cancel after this command  [K] request termination", theme.text_dim()),
        ];
        frame.render_widget(Paragraph::new(lines).style(theme.block_style()), inner);
        return;
    }

    let Some(report) = &state.last_report else {
        let mut lines = vec![
            Line::raw(""),
            Line::styled("  Select an operation and press Enter.", theme.text_dim()),
        ];
        lines.extend(backup_lines(state, theme));
        frame.render_widget(Paragraph::new(lines).style(theme.block_style()), inner);
        return;
    };

    let header_style = match report.status {
        OperationStatus::Succeeded => theme.success(),
        OperationStatus::Failed => theme.error(),
        OperationStatus::Cancelled => theme.warning(),
    };
    let text = report.render_text();
    let mut lines: Vec<Line> = text
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let style = if i == 0 {
                header_style.add_modifier(Modifier::BOLD)
            } else if line.starts_with("──") {
                theme.title()
            } else if line.starts_with("  !") || line.starts_with("  hint:") {
                theme.warning()
            } else {
                theme.text()
            };
            Line::styled(line.to_string(), style)
        })
        .collect();
    lines.extend(backup_lines(state, theme));

    frame.render_widget(
        Paragraph::new(lines)
            .style(theme.block_style())
            .scroll((state.scroll, 0)),
        inner,
    );
}

/// Backups taken this session, newest last
fn backup_lines(state: &OperationsState, theme: &Theme) -> Vec<Line<'static>> {
    let history = state.tasks.backups().history();
    if history.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![
        Line::raw(""),
        Line::styled("Backups this session", theme.title()),
    ];
    for record in history {
        let sim = if record.simulated { " (simulated)" } else { "" };
        lines.push(Line::styled(
            format!(
                "  {}  {} → {}{}",
                record.created_at.format("%H:%M:%S"),
                record.original_path.display(),
                record.backup_path.display(),
                sim
            ),
            theme.text_dim(),
        ));
    }
    lines
}
