use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "EVENT_HORIZON_CONFIG_PATH";
const CONFIG_FILE_NAME: &str = ".event_horizon_config.json";
const BACKUP_FILE_NAME: &str = ".event_horizon_config.backup.json";
const DATA_DIR_NAME: &str = "event_horizon";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RootSettings {
    pub su_program: String,
    pub check_args: Vec<String>,
    pub mount_master_args: Vec<String>,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            su_program: "su".to_string(),
            check_args: vec!["-c".to_string(), "id".to_string()],
            mount_master_args: vec!["--mount-master".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PathSettings {
    /// Directory holding the tweak scripts. Empty means the platform data dir.
    pub data_dir: String,
    /// Persisted flag mirror. Empty means `<data_dir>/prefs.json`.
    pub prefs_path: String,
    /// Hosts file bind-mounted by the root blocker.
    pub hosts_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TweakSettings {
    pub cpu_little_freq_khz: String,
    pub cpu_big_freq_khz: String,
    pub gpu_min_freq_mhz: String,
    pub gpu_max_freq_mhz: String,
    pub gpu_max_reset_hz: String,
}

impl Default for TweakSettings {
    fn default() -> Self {
        Self {
            cpu_little_freq_khz: "691200".to_string(),
            cpu_big_freq_khz: "691200".to_string(),
            gpu_min_freq_mhz: "285".to_string(),
            gpu_max_freq_mhz: "492".to_string(),
            gpu_max_reset_hz: "690000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub poll_interval_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub root: RootSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub tweaks: TweakSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root: RootSettings::default(),
            paths: PathSettings::default(),
            tweaks: TweakSettings::default(),
            telemetry: TelemetrySettings::default(),
            logging: LoggingSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl AppConfig {
    pub fn data_dir(&self) -> PathBuf {
        let configured = self.paths.data_dir.trim();
        if !configured.is_empty() {
            return PathBuf::from(configured);
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DATA_DIR_NAME)
    }

    pub fn prefs_path(&self) -> PathBuf {
        let configured = self.paths.prefs_path.trim();
        if !configured.is_empty() {
            return PathBuf::from(configured);
        }
        self.data_dir().join("prefs.json")
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

pub fn backup_config_path() -> PathBuf {
    let primary = config_path();
    match primary.parent() {
        Some(parent) => parent.join(BACKUP_FILE_NAME),
        None => PathBuf::from(BACKUP_FILE_NAME),
    }
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    let mut config: AppConfig = serde_json::from_value(value.clone()).unwrap_or_default();
    config = apply_legacy_overrides(config, &value);
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

// Early builds stored a flat object; keep honoring those keys.
fn apply_legacy_overrides(mut config: AppConfig, value: &serde_json::Value) -> AppConfig {
    if let Some(su_path) = value.get("su_path").and_then(|v| v.as_str()) {
        config.root.su_program = su_path.to_string();
    }
    if let Some(scripts_dir) = value.get("scripts_dir").and_then(|v| v.as_str()) {
        config.paths.data_dir = scripts_dir.to_string();
    }
    if let Some(level) = value.get("log_level").and_then(|v| v.as_str()) {
        config.logging.log_level = level.to_string();
    }
    config
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = TweakSettings::default();
    if config.root.su_program.trim().is_empty() {
        config.root.su_program = RootSettings::default().su_program;
    }
    if !is_numeric(&config.tweaks.cpu_little_freq_khz) {
        config.tweaks.cpu_little_freq_khz = defaults.cpu_little_freq_khz.clone();
    }
    if !is_numeric(&config.tweaks.cpu_big_freq_khz) {
        config.tweaks.cpu_big_freq_khz = defaults.cpu_big_freq_khz.clone();
    }
    if !is_numeric(&config.tweaks.gpu_min_freq_mhz) {
        config.tweaks.gpu_min_freq_mhz = defaults.gpu_min_freq_mhz.clone();
    }
    if !is_numeric(&config.tweaks.gpu_max_freq_mhz) {
        config.tweaks.gpu_max_freq_mhz = defaults.gpu_max_freq_mhz.clone();
    }
    if !is_numeric(&config.tweaks.gpu_max_reset_hz) {
        config.tweaks.gpu_max_reset_hz = defaults.gpu_max_reset_hz;
    }
    config.telemetry.poll_interval_ms = config.telemetry.poll_interval_ms.clamp(500, 60_000);
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = LoggingSettings::default().log_level;
    }
    config
}

fn is_numeric(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_legacy_values() {
        let value = serde_json::json!({
            "su_path": "/system/xbin/su",
            "scripts_dir": "/data/local/tmp/eh",
            "log_level": "debug"
        });
        let mut config: AppConfig = serde_json::from_value(value.clone()).unwrap_or_default();
        config = apply_legacy_overrides(config, &value);
        assert_eq!(config.root.su_program, "/system/xbin/su");
        assert_eq!(config.paths.data_dir, "/data/local/tmp/eh");
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.prefs_path(), PathBuf::from("/data/local/tmp/eh/prefs.json"));
    }

    #[test]
    fn clamps_invalid_values() {
        let mut config = AppConfig::default();
        config.root.su_program = "  ".to_string();
        config.tweaks.gpu_max_freq_mhz = "fast".to_string();
        config.tweaks.cpu_big_freq_khz = String::new();
        config.telemetry.poll_interval_ms = 1;
        let validated = validate_config(config);
        assert_eq!(validated.root.su_program, "su");
        assert_eq!(validated.tweaks.gpu_max_freq_mhz, "492");
        assert_eq!(validated.tweaks.cpu_big_freq_khz, "691200");
        assert_eq!(validated.telemetry.poll_interval_ms, 500);
    }

    #[test]
    fn round_trips_through_disk_with_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let backup = dir.path().join("config.backup.json");

        let mut config = AppConfig::default();
        config.tweaks.gpu_max_freq_mhz = "587".to_string();
        save_config_to_path(&config, &path, &backup, "trace").expect("first save");
        assert!(!backup.exists());

        config.logging.json = true;
        save_config_to_path(&config, &path, &backup, "trace").expect("second save");
        assert!(backup.exists());

        let loaded = load_config_from_path(&path, "trace").expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"tweaks": {"gpu_min_freq_mhz": "342"}}"#).expect("seed");
        let loaded = load_config_from_path(&path, "trace").expect("load");
        assert_eq!(loaded.tweaks.gpu_min_freq_mhz, "342");
        assert_eq!(loaded.tweaks.gpu_max_reset_hz, "690000000");
        assert_eq!(loaded.root.su_program, "su");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded =
            load_config_from_path(&dir.path().join("absent.json"), "trace").expect("load");
        assert_eq!(loaded, AppConfig::default());
    }
}
