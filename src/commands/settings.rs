use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::store::RetryPolicy;

const MAX_RETRY_ATTEMPTS: u32 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub app_id: String,
    pub edit_pin: String,
    pub device_id: String,
    pub user_name: Option<String>,
    pub db_path: Option<PathBuf>,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub watch_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_id: "default-app-id".to_string(),
            edit_pin: "1234".to_string(),
            device_id: uuid::Uuid::new_v4().to_string(),
            user_name: None,
            db_path: None,
            retry_attempts: 3,
            retry_base_delay_ms: 50,
            watch_interval_ms: 1000,
        }
    }
}

impl AppSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.clamp(1, MAX_RETRY_ATTEMPTS),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// How often other processes' writes are looked for, at least 50ms.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(50))
    }

    /// Database file, defaulting to the platform data directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf, String> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| "Cannot determine data directory".to_string())?
            .join("seguimiento");
        Ok(data_dir.join("seguimiento.db"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("SEGUIMIENTO_APP_ID") {
            if !value.is_empty() { self.app_id = value; }
        }
        if let Ok(value) = std::env::var("SEGUIMIENTO_EDIT_PIN") {
            if !value.is_empty() { self.edit_pin = value; }
        }
        if let Ok(value) = std::env::var("SEGUIMIENTO_DB_PATH") {
            if !value.is_empty() { self.db_path = Some(PathBuf::from(value)); }
        }
        if let Ok(value) = std::env::var("SEGUIMIENTO_USER_NAME") {
            if !value.trim().is_empty() { self.user_name = Some(value.trim().to_string()); }
        }
    }
}

pub fn settings_path() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| "Cannot determine config directory".to_string())?
        .join("seguimiento");
    Ok(config_dir.join("settings.json"))
}

/// Load settings from `path`, or defaults. A newly generated device id is
/// written back so the identity stays stable across runs.
pub fn load_settings_from(path: &Path) -> Result<AppSettings, String> {
    let mut settings = if path.exists() {
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;
        serde_json::from_str(&data)
            .map_err(|e| format!("Failed to parse settings: {}", e))?
    } else {
        let settings = AppSettings::default();
        save_settings_to(path, &settings)?;
        log::info!("Created settings at {:?}", path);
        settings
    };

    // Env vars take priority
    settings.apply_env_overrides();
    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;
    }
    let data = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, data)
        .map_err(|e| format!("Failed to write settings: {}", e))?;
    Ok(())
}

pub async fn get_settings() -> Result<AppSettings, String> {
    load_settings_from(&settings_path()?)
}
