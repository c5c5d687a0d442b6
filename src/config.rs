//! Application configuration, loaded from a `settings.toml` file.
//!
//! Missing files and missing keys fall back to defaults. The `S3_BUCKET_NAME`
//! environment variable, when set, replaces `storage.bucket`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const CONFIG_FILE: &str = "settings.toml";
const APP_DIR: &str = "cloud-gallery";
const BUCKET_ENV: &str = "S3_BUCKET_NAME";

pub const DEFAULT_KEY_PREFIX: &str = "images/";
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 15 * 60;
pub const DEFAULT_WINDOW_WIDTH: f32 = 420.0;
pub const DEFAULT_WINDOW_HEIGHT: f32 = 760.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides the location of the registry database
    pub database_path: Option<PathBuf>,
    pub storage: StorageConfig,
    pub picker: PickerConfig,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint (MinIO, LocalStack, ...)
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    /// Prepended to every generated object key
    pub key_prefix: String,
    /// Base of the public URL recorded for uploaded objects
    pub public_base_url: Option<String>,
    pub presign_expiry_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            public_base_url: None,
            presign_expiry_secs: DEFAULT_PRESIGN_EXPIRY_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    /// Picked files are copied here before upload when set
    pub save_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_DIR);
        path.push(CONFIG_FILE);
        path
    })
}

/// Load from `path` (or the default location) and apply environment overrides.
///
/// Invalid TOML is logged and replaced by the defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    let mut config = match path {
        Some(path) if path.exists() => match load_from_path(&path) {
            Err(ConfigError::Parse(e)) => {
                warn!("Ignoring invalid settings in {}: {}", path.display(), e);
                Config::default()
            }
            other => other?,
        },
        _ => Config::default(),
    };
    apply_env(&mut config, std::env::var(BUCKET_ENV).ok());
    Ok(config)
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

fn apply_env(config: &mut Config, bucket: Option<String>) {
    if let Some(bucket) = bucket.filter(|b| !b.is_empty()) {
        config.storage.bucket = Some(bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str("[storage]\nbucket = \"photos\"\n").unwrap();

        assert_eq!(config.storage.bucket.as_deref(), Some("photos"));
        assert_eq!(config.storage.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(config.storage.presign_expiry_secs, DEFAULT_PRESIGN_EXPIRY_SECS);
        assert_eq!(config.window, WindowConfig::default());
        assert!(config.picker.save_dir.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut config = Config::default();
        config.storage.bucket = Some("photos".to_string());
        config.storage.public_base_url = Some("https://cdn.example.com".to_string());
        config.picker.save_dir = Some(PathBuf::from("/tmp/images"));

        let temp_dir = tempdir().expect("failed to create temp dir");
        let path = temp_dir.path().join("nested").join(CONFIG_FILE);

        save_to_path(&config, &path).expect("failed to save config");
        let loaded = load_from_path(&path).expect("failed to load config");

        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_toml_falls_back_to_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "not = valid = toml").unwrap();

        assert!(matches!(load_from_path(&path), Err(ConfigError::Parse(_))));

        let loaded = load(Some(&path)).expect("load should not error");
        assert_eq!(loaded.storage.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(loaded.window, WindowConfig::default());
        assert!(loaded.picker.save_dir.is_none());
    }

    #[test]
    fn bucket_env_overrides_file() {
        let mut config = Config::default();
        config.storage.bucket = Some("from-file".to_string());

        apply_env(&mut config, Some("from-env".to_string()));
        assert_eq!(config.storage.bucket.as_deref(), Some("from-env"));

        apply_env(&mut config, Some(String::new()));
        assert_eq!(config.storage.bucket.as_deref(), Some("from-env"));
    }
}
