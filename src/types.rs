//! Small types shared across the UI and the operations layer

use std::time::Instant;

/// A temporary UI message shown to the user (e.g. success/error notifications)
#[derive(Clone)]
pub struct FlashMessage {
    pub text: String,
    pub is_error: bool,
    pub created: Instant,
}

impl FlashMessage {
    pub fn new(text: String, is_error: bool) -> Self {
        Self {
            text,
            is_error,
            created: Instant::now(),
        }
    }

    pub fn is_expired(&self, seconds: u64) -> bool {
        self.created.elapsed().as_secs() >= seconds
    }
}

/// Format a duration in seconds for display ("850ms", "4.2s", "3m 07s")
pub fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        format!("{}ms", (secs * 1000.0).round() as u64)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = secs.round() as u64;
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.25), "250ms");
        assert_eq!(format_duration(4.21), "4.2s");
        assert_eq!(format_duration(187.0), "3m 07s");
    }

    #[test]
    fn test_flash_message_expiry() {
        let msg = FlashMessage::new("test".into(), false);
        assert!(!msg.is_expired(3));
        assert_eq!(msg.text, "test");
        assert!(!msg.is_error);
    }
}
