//! Configuration management for aegis
//!
//! One global config file. Every field has a default, so a partial or
//! outdated file still loads.
//!
//! Config file location: ~/.config/aegis/config.toml

use crate::system::executor::DEFAULT_TIMEOUT_SECS;
use crate::system::profile::SimulationMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationMode,
    pub log_level: String,
    pub theme: ThemeName,
    /// Artificial delay of a simulated command, so the UI shows progress
    pub simulated_delay_ms: u64,
    pub timeouts: Timeouts,
    pub paths: Paths,
    pub firewall: Firewall,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: SimulationMode::Auto,
            log_level: "info".to_string(),
            theme: ThemeName::Gruvbox,
            simulated_delay_ms: 100,
            timeouts: Timeouts::default(),
            paths: Paths::default(),
            firewall: Firewall::default(),
        }
    }
}

/// Per-category command timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub default: u64,
    pub scan: u64,
    pub update: u64,
    pub install: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: DEFAULT_TIMEOUT_SECS,
            scan: 600,
            update: 300,
            install: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub ssh_config: PathBuf,
    pub web_roots: Vec<PathBuf>,
    pub malware_scan: PathBuf,
    pub report_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            ssh_config: PathBuf::from("/etc/ssh/sshd_config"),
            web_roots: vec![
                PathBuf::from("/var/www/html"),
                PathBuf::from("/usr/share/nginx/html"),
            ],
            malware_scan: PathBuf::from("/tmp"),
            report_dir: default_report_dir(),
            backup_dir: dirs::home_dir().unwrap_or_else(std::env::temp_dir),
        }
    }
}

fn default_report_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("aegis")
        .join("reports")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Firewall {
    /// Rules passed verbatim to `ufw allow`
    pub allow: Vec<String>,
}

impl Default for Firewall {
    fn default() -> Self {
        Self {
            allow: vec!["ssh".to_string(), "80/tcp".to_string(), "443/tcp".to_string()],
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("aegis");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from file, or create default if not exists
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).with_context(|| format!("Failed to write config to {:?}", path))?;

        // Paths in here point at system files; keep it private
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }
}

/// Available theme names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    #[default]
    Gruvbox,
    Nord,
    Transparent,
}

impl ThemeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeName::Gruvbox => "Gruvbox",
            ThemeName::Nord => "Nord",
            ThemeName::Transparent => "Transparent",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            ThemeName::Gruvbox => ThemeName::Nord,
            ThemeName::Nord => ThemeName::Transparent,
            ThemeName::Transparent => ThemeName::Gruvbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.theme, ThemeName::Gruvbox);
        assert_eq!(config.simulation, SimulationMode::Auto);
        assert_eq!(config.timeouts.default, 30);
        assert_eq!(config.timeouts.scan, 600);
        assert_eq!(config.firewall.allow, vec!["ssh", "80/tcp", "443/tcp"]);
        assert_eq!(config.paths.ssh_config, PathBuf::from("/etc/ssh/sshd_config"));
    }

    #[test]
    fn test_theme_cycle() {
        let mut t = ThemeName::Gruvbox;
        assert_eq!(t.next(), ThemeName::Nord);
        for _ in 0..3 {
            t = t.next();
        }
        assert_eq!(t, ThemeName::Gruvbox);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let content = "simulation = \"on\"\n\n[timeouts]\nscan = 60\n";
        let config: Config = toml::from_str(content).unwrap();

        assert_eq!(config.simulation, SimulationMode::Simulate);
        assert_eq!(config.timeouts.scan, 60);
        assert_eq!(config.timeouts.update, 300);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aegis").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.theme = ThemeName::Nord;
        config.firewall.allow = vec!["22/tcp".to_string()];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.theme, ThemeName::Nord);
        assert_eq!(loaded.firewall.allow, vec!["22/tcp"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save_to(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "simulation = \"sometimes\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
