//! Persisted settings (~/.hubos/settings.json) and state-dir helpers.
//!
//! Settings use serde defaults throughout so older files keep loading as
//! fields are added. The same state dir also holds the persisted seen-id
//! lists the notification dedup layer hydrates from.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Notification preferences, including the Do-Not-Disturb window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// Master switch; when false nothing is raised.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub email_enabled: bool,
    #[serde(default = "default_true")]
    pub notification_enabled: bool,
    #[serde(default = "default_true")]
    pub github_enabled: bool,
    #[serde(default = "default_true")]
    pub messages_enabled: bool,
    /// "HH:MM". When start > end the window wraps past midnight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnd_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnd_end: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            email_enabled: true,
            notification_enabled: true,
            github_enabled: true,
            messages_enabled: true,
            dnd_start: None,
            dnd_end: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_automations: usize,
    /// Seconds between periodic sync passes.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// IANA timezone name used by cron schedules.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Backing file, recorded by `load`/`load_from`. In-memory settings have
    /// none, and `save` refuses to guess a location for them.
    #[serde(skip)]
    path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_max_concurrent() -> usize {
    2
}
fn default_sync_interval() -> u64 {
    300
}
fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_automations: default_max_concurrent(),
            sync_interval_secs: default_sync_interval(),
            timezone: default_timezone(),
            notifications: NotificationSettings::default(),
            path: None,
        }
    }
}

impl Settings {
    /// Load from `~/.hubos/settings.json`, falling back to defaults when the
    /// file is missing. The returned settings remember the path for `save`.
    pub fn load() -> Result<Settings, String> {
        let path = state_dir()?.join("settings.json");
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Settings, String> {
        let mut settings = if path.exists() {
            let content =
                fs::read_to_string(path).map_err(|e| format!("Failed to read settings: {}", e))?;
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))?
        } else {
            Settings::default()
        };
        settings.path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Write back to the file these settings were loaded from. Settings that
    /// never came from a file have nowhere to go and this returns an error
    /// rather than writing a default location.
    pub fn save(&self) -> Result<(), String> {
        let path = self
            .path
            .as_ref()
            .ok_or("Settings were not loaded from a file, nothing to save to")?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create settings dir: {}", e))?;
            }
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Serialize error: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Write error: {}", e))
    }
}

/// Get the state directory (~/.hubos), creating it if needed.
pub fn state_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    let dir = home.join(".hubos");
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create state dir: {}", e))?;
    }
    Ok(dir)
}
