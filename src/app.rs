//! Application state and event handling for aegis

use crate::config::Config;
use crate::modules::operations::OperationsState;
use crate::tasks::TaskRunner;
use crate::types::FlashMessage;
use crate::ui::Theme;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::warn;

const FLASH_SECONDS: u64 = 4;

/// Main application state
pub struct App {
    pub should_quit: bool,
    pub config: Config,
    pub theme: Theme,
    pub popup: PopupState,
    pub flash_message: Option<FlashMessage>,
    pub operations: OperationsState,
    /// Where theme changes are persisted; `None` keeps them in memory
    config_path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone)]
pub enum PopupState {
    None,
    Error { title: String, message: String },
}

impl App {
    pub fn new(config: Config, tasks: TaskRunner, config_path: Option<std::path::PathBuf>) -> Self {
        Self {
            should_quit: false,
            theme: Theme::from_name(config.theme),
            config,
            popup: PopupState::None,
            flash_message: None,
            operations: OperationsState::new(tasks),
            config_path,
        }
    }

    /// Poll background work and expire flash messages
    pub fn update_timers(&mut self) -> Result<()> {
        self.operations.poll();
        if let Some(msg) = self.operations.flash_message.take() {
            self.flash_message = Some(msg);
        }

        if let Some(msg) = &self.flash_message {
            if msg.is_expired(FLASH_SECONDS) {
                self.flash_message = None;
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if let PopupState::Error { .. } = self.popup {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.popup = PopupState::None;
            }
            return Ok(());
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
            return Ok(());
        }

        if self.operations.handle_key(key)? {
            if let Some(msg) = self.operations.flash_message.take() {
                self.flash_message = Some(msg);
            }
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Char('t') => self.cycle_theme(),
            _ => {}
        }
        Ok(())
    }

    fn quit(&mut self) {
        // A running operation is left to its worker; request it to stop
        if self.operations.is_running() {
            self.operations.tasks().cancel();
        }
        self.should_quit = true;
    }

    fn cycle_theme(&mut self) {
        self.config.theme = self.config.theme.next();
        self.theme = Theme::from_name(self.config.theme);

        let Some(path) = &self.config_path else {
            return;
        };
        match self.config.save_to(path) {
            Ok(()) => {
                self.flash_message = Some(FlashMessage::new(
                    format!("Theme: {}", self.config.theme.as_str()),
                    false,
                ));
            }
            Err(e) => {
                warn!("Failed to save config: {:#}", e);
                self.popup = PopupState::Error {
                    title: "Config".to_string(),
                    message: format!("Could not save the theme:\n{:#}", e),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeName;
    use crate::security::Operation;
    use crate::security::testing::{linux_profile, Recorder};
    use std::sync::Arc;

    fn app(config_path: Option<std::path::PathBuf>) -> App {
        let config = Config::default();
        let tasks = TaskRunner::new(
            Arc::new(Recorder::default()),
            linux_profile(),
            Arc::new(config.clone()),
        );
        App::new(config, tasks, config_path)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_quit_key() {
        let mut a = app(None);
        a.handle_key(key(KeyCode::Char('q'))).unwrap();
        assert!(a.should_quit);
    }

    #[test]
    fn test_theme_cycle_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut a = app(Some(path.clone()));

        a.handle_key(key(KeyCode::Char('t'))).unwrap();
        assert_eq!(a.config.theme, ThemeName::Nord);
        assert!(a.flash_message.is_some());

        let saved = Config::load_from(&path).unwrap();
        assert_eq!(saved.theme, ThemeName::Nord);
    }

    #[test]
    fn test_error_popup_swallows_keys_until_dismissed() {
        let mut a = app(None);
        a.popup = PopupState::Error {
            title: "x".into(),
            message: "y".into(),
        };
        a.handle_key(key(KeyCode::Char('q'))).unwrap();
        assert!(!a.should_quit);
        a.handle_key(key(KeyCode::Enter)).unwrap();
        assert!(matches!(a.popup, PopupState::None));
    }

    #[test]
    fn test_confirm_popup_takes_q() {
        let mut a = app(None);
        a.operations.selected = Operation::ALL
            .iter()
            .position(|op| *op == Operation::HardenSsh)
            .unwrap();
        a.handle_key(key(KeyCode::Enter)).unwrap();
        a.handle_key(key(KeyCode::Char('q'))).unwrap();
        assert!(!a.should_quit);
        assert!(a.operations.confirm.is_some());
    }
}
