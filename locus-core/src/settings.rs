//! Persisted runtime settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.locus/
//!   settings.yaml   (mode 0600, written by `locus settings init`)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SettingsError};

pub const SETTINGS_VERSION: u32 = 1;
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Tunables for the coordinator runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Minimum movement in metres before the provider reports a new fix.
    #[serde(default = "default_distance_filter")]
    pub distance_filter_m: f64,
    /// Capacity of the consumer command queue.
    #[serde(default = "default_queue_capacity")]
    pub command_queue_capacity: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            distance_filter_m: default_distance_filter(),
            command_queue_capacity: default_queue_capacity(),
            log_filter: default_log_filter(),
        }
    }
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_distance_filter() -> f64 {
    1.0
}

fn default_queue_capacity() -> usize {
    64
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// `<home>/.locus/`
pub fn locus_root(home: &Path) -> PathBuf {
    home.join(".locus")
}

/// `<home>/.locus/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    locus_root(home).join(SETTINGS_FILE)
}

/// Load settings, falling back to defaults when the file does not exist.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })?;
    Ok(settings.sanitized())
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

/// Write settings to `<home>/.locus/settings.yaml` atomically (tmp + rename).
pub fn save_at(home: &Path, settings: &Settings) -> Result<PathBuf, SettingsError> {
    let root = locus_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let path = settings_path_at(home);
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<PathBuf, SettingsError> {
    save_at(&home()?, settings)
}

impl Settings {
    /// A zero-capacity queue would panic in tokio; clamp it.
    fn sanitized(mut self) -> Self {
        if self.command_queue_capacity == 0 {
            self.command_queue_capacity = 1;
        }
        if !self.distance_filter_m.is_finite() || self.distance_filter_m < 0.0 {
            self.distance_filter_m = default_distance_filter();
        }
        self
    }
}

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}
