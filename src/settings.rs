use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{overlay::ScreenSize, pipeline::SourceKind, session::TriggerPolicy};

pub const API_URL_ENV: &str = "ISTHISTRUE_API_URL";
pub const MOCK_ENV: &str = "ISTHISTRUE_MOCK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub use_mock: bool,
    pub mock_delay_ms: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            timeout_secs: 30,
            use_mock: true,
            mock_delay_ms: 2000,
        }
    }
}

impl AnalysisSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub analysis: AnalysisSettings,
    pub trigger_policy: TriggerPolicy,
    pub preferred_source: SourceKind,
    pub bridge_timeout_secs: u64,
    pub screen: ScreenSize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            analysis: AnalysisSettings::default(),
            trigger_policy: TriggerPolicy::default(),
            preferred_source: SourceKind::default(),
            bridge_timeout_secs: 120,
            screen: ScreenSize::default(),
        }
    }
}

impl AppSettings {
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }

    /// Environment wins over the file for the backend location and mock switch.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.analysis.base_url = url.trim().to_string();
        }
        if let Some(value) = lookup(MOCK_ENV) {
            self.analysis.use_mock = value == "1" || value.eq_ignore_ascii_case("true");
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    /// A missing or unreadable-as-JSON file yields defaults; only I/O errors fail.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring invalid settings at {}: {}", path.display(), err);
                AppSettings::default()
            })
        } else {
            AppSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored settings, without environment overrides.
    pub fn get(&self) -> AppSettings {
        self.read().clone()
    }

    /// What the app actually runs with.
    pub fn effective(&self) -> AppSettings {
        self.get().with_env_overrides()
    }

    pub fn update(&self, settings: AppSettings) -> Result<()> {
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn update_trigger_policy(&self, policy: TriggerPolicy) -> Result<()> {
        let mut settings = self.get();
        settings.trigger_policy = policy;
        self.update(settings)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, AppSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
