use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::alerts::scheduler::{MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub user_weight: f64,
    pub user_height: f64,
    pub user_gender: String,
    pub user_age: u32,
}

/// Persisted settings. Field names match the on-disk JSON keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub autostart: bool,
    /// Reminder interval in minutes.
    pub toast_interval: u32,
    pub toast_app: String,
    pub bad_posture_app: String,
    pub bad_posture_alert_active: bool,
    pub host: String,
    pub port: u16,
    pub saved_servers: Vec<String>,
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            autostart: false,
            toast_interval: 1,
            toast_app: String::new(),
            bad_posture_app: String::new(),
            bad_posture_alert_active: true,
            host: String::new(),
            port: 5000,
            saved_servers: Vec::new(),
            profile: UserProfile::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: UserSettings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("settings at {} are malformed, using defaults: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };
        data.toast_interval = clamp_interval(data.toast_interval);

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn set_autostart(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.autostart = enabled)
    }

    /// Clamped to 1..=60 minutes. Returns the value stored.
    pub fn set_reminder_interval(&self, minutes: u32) -> Result<u32> {
        let minutes = clamp_interval(minutes);
        self.update(|s| s.toast_interval = minutes)?;
        Ok(minutes)
    }

    pub fn set_toast_app(&self, path: &str) -> Result<()> {
        self.update(|s| s.toast_app = path.to_string())
    }

    pub fn set_bad_posture_app(&self, path: &str) -> Result<()> {
        self.update(|s| s.bad_posture_app = path.to_string())
    }

    pub fn set_bad_posture_alert_active(&self, active: bool) -> Result<()> {
        self.update(|s| s.bad_posture_alert_active = active)
    }

    pub fn set_user_profile(&self, profile: UserProfile) -> Result<()> {
        self.update(|s| s.profile = profile)
    }

    pub fn set_last_server(&self, host: &str, port: u16) -> Result<()> {
        self.update(|s| {
            s.host = host.to_string();
            s.port = port;
        })
    }

    /// Remember `host:port`. Already-known servers keep their position.
    pub fn add_saved_server(&self, host: &str, port: u16) -> Result<bool> {
        let entry = format!("{host}:{port}");
        let mut guard = self.write();
        if guard.saved_servers.contains(&entry) {
            return Ok(false);
        }
        guard.saved_servers.push(entry);
        self.persist(&guard)?;
        Ok(true)
    }

    pub fn remove_saved_server(&self, entry: &str) -> Result<bool> {
        let mut guard = self.write();
        let before = guard.saved_servers.len();
        guard.saved_servers.retain(|saved| saved != entry);
        if guard.saved_servers.len() == before {
            return Ok(false);
        }
        self.persist(&guard)?;
        Ok(true)
    }

    pub fn clear_saved_servers(&self) -> Result<()> {
        self.update(|s| s.saved_servers.clear())
    }

    pub fn save(&self) -> Result<()> {
        let guard = self.read();
        self.persist(&guard)
    }

    fn update(&self, apply: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.write();
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Split a saved `host:port` entry.
pub fn parse_server(entry: &str) -> Option<(String, u16)> {
    let (host, port) = entry.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

fn clamp_interval(minutes: u32) -> u32 {
    minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES)
}
