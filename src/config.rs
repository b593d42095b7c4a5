//! Configuration file support for the viewer.
//!
//! Settings are stored as versioned JSON in the platform config directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scene::SceneSettings;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including per-tile events
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Tile rendering section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderingPreferences {
    /// Edge length of a tile in data pixels
    #[serde(default = "default_tile_edge")]
    pub tile_edge: u32,

    /// Background threads per scene
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Outline tiles that carry unrendered strokes
    #[serde(default)]
    pub show_tile_outlines: bool,
}

fn default_tile_edge() -> u32 {
    crate::constants::DEFAULT_TILE_EDGE
}

fn default_worker_threads() -> usize {
    crate::constants::DEFAULT_WORKER_THREADS
}

impl Default for RenderingPreferences {
    fn default() -> Self {
        Self {
            tile_edge: default_tile_edge(),
            worker_threads: default_worker_threads(),
            show_tile_outlines: false,
        }
    }
}

/// Label editing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditingPreferences {
    /// Undo steps kept before the oldest are dropped
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Group name the history is saved under
    #[serde(default = "default_history_group")]
    pub history_group: String,
}

fn default_history_size() -> usize {
    crate::constants::DEFAULT_HISTORY_SIZE
}

fn default_history_group() -> String {
    crate::constants::DEFAULT_HISTORY_GROUP.to_string()
}

impl Default for EditingPreferences {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            history_group: default_history_group(),
        }
    }
}

/// Viewer configuration that can be exported and imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Version of the configuration file format
    pub version: u32,

    #[serde(default)]
    pub rendering: RenderingPreferences,

    #[serde(default)]
    pub editing: EditingPreferences,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl ViewerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            rendering: RenderingPreferences::default(),
            editing: EditingPreferences::default(),
            log_level: LogLevel::default(),
        }
    }

    pub fn scene_settings(&self) -> SceneSettings {
        SceneSettings {
            tile_edge: self.rendering.tile_edge.max(1),
            worker_threads: self.rendering.worker_threads.max(1),
            show_tile_outlines: self.rendering.show_tile_outlines,
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    pub fn default_filename() -> &'static str {
        "voxlab-config.json"
    }

    /// Default config file path, in the XDG config directory or under
    /// `~/.config`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("voxlab").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("voxlab")
                    .join(Self::default_filename())
            })
        }
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded configuration from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse config file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(&path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Neither a config nor a home directory could be found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_json() {
        let mut config = ViewerConfig::new();
        config.rendering.tile_edge = 128;
        config.log_level = LogLevel::Trace;
        let json = config.to_json().unwrap();
        assert!(json.contains("\"trace\""));
        assert_eq!(ViewerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = ViewerConfig::from_json(r#"{"version": 1}"#).unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.editing.history_size, 3000);
    }

    #[test]
    fn test_rejects_newer_version() {
        let err = ViewerConfig::from_json(r#"{"version": 99}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::VersionTooNew {
                file_version: 99,
                ..
            }
        ));
    }

    #[test]
    fn test_scene_settings_are_sane() {
        let mut config = ViewerConfig::new();
        config.rendering.tile_edge = 0;
        config.rendering.worker_threads = 0;
        let settings = config.scene_settings();
        assert_eq!(settings.tile_edge, 1);
        assert_eq!(settings.worker_threads, 1);
    }

    #[test]
    fn test_default_path_file_name() {
        if let Some(path) = ViewerConfig::default_path() {
            assert!(path.ends_with("voxlab/voxlab-config.json"));
        }
    }
}
