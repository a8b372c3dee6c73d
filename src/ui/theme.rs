//! Theme definitions for aegis
//!
//! Three built-in themes: Gruvbox, Nord, and Transparent. One instance is
//! applied to the whole dashboard.

use crate::config::ThemeName;
use ratatui::style::{Color, Modifier, Style};

/// Complete theme with all required colors
#[derive(Debug, Clone)]
pub struct Theme {
    // Base colors
    pub bg: Color,
    pub fg: Color,
    pub fg_dim: Color,

    // Accent colors
    pub accent: Color,
    pub accent_dim: Color,

    // Status colors
    pub success: Color,
    pub warning: Color,
    pub error: Color,

    // UI element colors
    pub border: Color,
    pub border_focused: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,

    // Execution mode badge
    pub live: Color,
    pub simulated: Color,

    is_transparent: bool,
}

impl Theme {
    pub fn from_name(name: ThemeName) -> Self {
        match name {
            ThemeName::Gruvbox => Self::gruvbox(),
            ThemeName::Nord => Self::nord(),
            ThemeName::Transparent => Self::transparent(),
        }
    }

    /// Gruvbox dark theme (default)
    fn gruvbox() -> Self {
        Self {
            bg: Color::Rgb(40, 40, 40),
            fg: Color::Rgb(235, 219, 178),
            fg_dim: Color::Rgb(146, 131, 116),
            accent: Color::Rgb(254, 128, 25),
            accent_dim: Color::Rgb(214, 93, 14),
            success: Color::Rgb(184, 187, 38),
            warning: Color::Rgb(250, 189, 47),
            error: Color::Rgb(251, 73, 52),
            border: Color::Rgb(80, 73, 69),
            border_focused: Color::Rgb(168, 153, 132),
            selection_bg: Color::Rgb(80, 73, 69),
            selection_fg: Color::Rgb(235, 219, 178),
            live: Color::Rgb(251, 73, 52),
            simulated: Color::Rgb(131, 165, 152),
            is_transparent: false,
        }
    }

    fn nord() -> Self {
        Self {
            bg: Color::Rgb(46, 52, 64),
            fg: Color::Rgb(236, 239, 244),
            fg_dim: Color::Rgb(76, 86, 106),
            accent: Color::Rgb(136, 192, 208),
            accent_dim: Color::Rgb(94, 129, 172),
            success: Color::Rgb(163, 190, 140),
            warning: Color::Rgb(235, 203, 139),
            error: Color::Rgb(191, 97, 106),
            border: Color::Rgb(59, 66, 82),
            border_focused: Color::Rgb(136, 192, 208),
            selection_bg: Color::Rgb(76, 86, 106),
            selection_fg: Color::Rgb(236, 239, 244),
            live: Color::Rgb(191, 97, 106),
            simulated: Color::Rgb(129, 161, 193),
            is_transparent: false,
        }
    }

    /// Uses the terminal's own background
    fn transparent() -> Self {
        Self {
            bg: Color::Reset,
            fg: Color::White,
            fg_dim: Color::Gray,
            accent: Color::Cyan,
            accent_dim: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            border: Color::DarkGray,
            border_focused: Color::Cyan,
            selection_bg: Color::Reset,
            selection_fg: Color::White,
            live: Color::Red,
            simulated: Color::Blue,
            is_transparent: true,
        }
    }

    // === STYLE HELPERS ===

    /// Foreground on the theme background (no background when transparent)
    fn on_bg(&self, fg: Color) -> Style {
        if self.is_transparent {
            Style::default().fg(fg)
        } else {
            Style::default().fg(fg).bg(self.bg)
        }
    }

    pub fn text(&self) -> Style {
        self.on_bg(self.fg)
    }

    pub fn text_dim(&self) -> Style {
        self.on_bg(self.fg_dim)
    }

    pub fn title(&self) -> Style {
        self.on_bg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn selected(&self) -> Style {
        let style = Style::default()
            .fg(self.selection_fg)
            .add_modifier(Modifier::BOLD);
        if self.is_transparent {
            style.add_modifier(Modifier::REVERSED)
        } else {
            style.bg(self.selection_bg)
        }
    }

    pub fn border(&self) -> Style {
        self.on_bg(self.border)
    }

    pub fn border_focused(&self) -> Style {
        self.on_bg(self.border_focused)
    }

    pub fn success(&self) -> Style {
        self.on_bg(self.success)
    }

    pub fn warning(&self) -> Style {
        self.on_bg(self.warning)
    }

    pub fn error(&self) -> Style {
        self.on_bg(self.error)
    }

    /// Badge for the execution mode shown in the status bar
    pub fn mode_badge(&self, simulated: bool) -> Style {
        let color = if simulated { self.simulated } else { self.live };
        Style::default()
            .fg(Color::Black)
            .bg(color)
            .add_modifier(Modifier::BOLD)
    }

    pub fn block_style(&self) -> Style {
        if self.is_transparent {
            Style::default()
        } else {
            Style::default().bg(self.bg)
        }
    }
}
