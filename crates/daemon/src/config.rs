//! Configuration management for the multiroot daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. The platform config dir (`~/.config/multiroot/config.toml` on Linux)
//! 2. `~/.config/multiroot/config.toml` (fallback when the platform dir differs)
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use multiroot_core::Position;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure for multiroot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Layout defaults.
    pub layout: LayoutConfig,
    /// Displays used at startup.
    pub displays: DisplaysConfig,
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// IPC settings.
    pub ipc: IpcConfig,
}

/// Layout-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Edge used for displays without an explicit placement.
    #[serde(default)]
    pub default_position: PositionConfig,

    /// Offset along that edge, in DIPs.
    #[serde(default)]
    pub default_offset: i32,
}

/// Placement edge (wrapper for serialization).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionConfig {
    Top,
    #[default]
    Right,
    Bottom,
    Left,
}

impl From<PositionConfig> for Position {
    fn from(config: PositionConfig) -> Self {
        match config {
            PositionConfig::Top => Position::Top,
            PositionConfig::Right => Position::Right,
            PositionConfig::Bottom => Position::Bottom,
            PositionConfig::Left => Position::Left,
        }
    }
}

/// Startup display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaysConfig {
    /// Display spec list, e.g. `"1920x1080*2/i,2560x1440"`.
    #[serde(default = "default_initial_displays")]
    pub initial: String,
}

impl Default for DisplaysConfig {
    fn default() -> Self {
        Self {
            initial: default_initial_displays(),
        }
    }
}

/// Behavior-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether display layouts are saved to disk.
    #[serde(default = "default_true")]
    pub persist_layouts: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            persist_layouts: true,
        }
    }
}

/// IPC configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Socket path override. Defaults to the user runtime dir.
    pub socket_path: Option<PathBuf>,
}

impl IpcConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(multiroot_ipc::default_socket_path)
    }
}

// Default value functions for serde
fn default_initial_displays() -> String {
    "1920x1080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Largest default offset accepted from the config file.
const MAX_DEFAULT_OFFSET: i32 = 10_000;

// ============================================================================
// Validation
// ============================================================================

/// A config value that was replaced or clamped during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Clamp out-of-range values in place, reporting each fix.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let level = self.behavior.log_level.to_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            self.behavior.log_level = level;
        } else {
            warnings.push(ConfigWarning {
                field: "behavior.log_level",
                message: format!("unknown level '{}', using 'info'", self.behavior.log_level),
            });
            self.behavior.log_level = default_log_level();
        }

        let offset = self.layout.default_offset;
        let clamped = offset.clamp(-MAX_DEFAULT_OFFSET, MAX_DEFAULT_OFFSET);
        if clamped != offset {
            warnings.push(ConfigWarning {
                field: "layout.default_offset",
                message: format!("{} is out of range, clamped to {}", offset, clamped),
            });
            self.layout.default_offset = clamped;
        }

        if let Err(e) = multiroot_core::parse_display_specs(&self.displays.initial) {
            warnings.push(ConfigWarning {
                field: "displays.initial",
                message: format!("{}, using '{}'", e, default_initial_displays()),
            });
            self.displays.initial = default_initial_displays();
        }

        warnings
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("com", "multiroot", "multiroot") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    if let Some(home) = dirs_home() {
        let unix_style = home.join(".config").join("multiroot").join("config.toml");
        if !paths.contains(&unix_style) {
            paths.push(unix_style);
        }
    }

    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
