//! User Interface layer for aegis
//!
//! Contains all UI-related code:
//! - Theme definitions and colors
//! - Reusable widgets
//! - Main render function, header, status bar

pub mod render;
pub mod theme;
pub mod widgets;

pub use render::render;
pub use theme::Theme;
