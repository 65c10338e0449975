use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "SIMPLEPERF_APP_API_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfilerPaths {
    /// Pushed by host-side tooling; preferred because it is usually newer than the image copy.
    pub staging_simpleperf_path: String,
    pub image_simpleperf_path: String,
    pub tracepoint_events_path: String,
}

impl Default for ProfilerPaths {
    fn default() -> Self {
        Self {
            staging_simpleperf_path: "/data/local/tmp/simpleperf".to_string(),
            image_simpleperf_path: "/system/bin/simpleperf".to_string(),
            tracepoint_events_path: "/data/local/tmp/tracepoint_events".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertySettings {
    pub getprop_path: String,
    pub perf_harden_property: String,
    pub sdk_version_property: String,
}

impl Default for PropertySettings {
    fn default() -> Self {
        Self {
            getprop_path: "/system/bin/getprop".to_string(),
            perf_harden_property: "security.perf_harden".to_string(),
            sdk_version_property: "ro.build.version.sdk".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDataSettings {
    pub app_data_root: String,
    pub data_dir_name: String,
}

impl Default for AppDataSettings {
    fn default() -> Self {
        Self {
            app_data_root: "/data/data".to_string(),
            data_dir_name: "simpleperf_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default)]
    pub paths: ProfilerPaths,
    #[serde(default)]
    pub properties: PropertySettings,
    #[serde(default)]
    pub app_data: AppDataSettings,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            paths: ProfilerPaths::default(),
            properties: PropertySettings::default(),
            app_data: AppDataSettings::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".simpleperf_app_api.json")
}

pub fn load_config(trace_id: &str) -> Result<SessionConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<SessionConfig, AppError> {
    if !path.exists() {
        return Ok(SessionConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: SessionConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &SessionConfig,
    path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

fn reset_if_blank(value: &mut String, default: String) {
    if value.trim().is_empty() {
        *value = default;
    }
}

fn validate_config(mut config: SessionConfig) -> SessionConfig {
    let paths = ProfilerPaths::default();
    reset_if_blank(
        &mut config.paths.staging_simpleperf_path,
        paths.staging_simpleperf_path,
    );
    reset_if_blank(
        &mut config.paths.image_simpleperf_path,
        paths.image_simpleperf_path,
    );
    reset_if_blank(
        &mut config.paths.tracepoint_events_path,
        paths.tracepoint_events_path,
    );

    let properties = PropertySettings::default();
    reset_if_blank(&mut config.properties.getprop_path, properties.getprop_path);
    reset_if_blank(
        &mut config.properties.perf_harden_property,
        properties.perf_harden_property,
    );
    reset_if_blank(
        &mut config.properties.sdk_version_property,
        properties.sdk_version_property,
    );

    let app_data = AppDataSettings::default();
    reset_if_blank(&mut config.app_data.app_data_root, app_data.app_data_root);
    // The data dir name is joined onto the app dir; it must stay a single component.
    if config.app_data.data_dir_name.contains('/') || config.app_data.data_dir_name == ".." {
        config.app_data.data_dir_name = String::new();
    }
    reset_if_blank(&mut config.app_data.data_dir_name, app_data.data_dir_name);

    if config.probe_timeout_secs == 0 {
        config.probe_timeout_secs = default_probe_timeout_secs();
    }
    config
}
