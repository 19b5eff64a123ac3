//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, WindowFitError};

/// Largest accepted slot-grid exponent (a 4096 × 4096 grid).
pub const MAX_GRID_EXPONENT: u32 = 12;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window cache settings.
    pub window: WindowConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Shape and access mode of a window cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    /// The slot grid is `2^grid_exponent` slots on each side.
    pub grid_exponent: u32,
    /// Chunks kept resident on each side of the center, per axis.
    pub range: u32,
    /// Subscribe chunks for writing rather than reading.
    pub writable: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g. "debug", "info,tessera_window=trace").
    pub log_level: String,
    /// Also write JSON logs to the log directory in debug builds.
    pub log_to_file: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            grid_exponent: 4,
            range: 2,
            writable: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl WindowConfig {
    /// Slots per grid side, or `None` if the exponent exceeds [`MAX_GRID_EXPONENT`].
    pub fn grid_size(&self) -> Option<u64> {
        (self.grid_exponent <= MAX_GRID_EXPONENT).then(|| 1u64 << self.grid_exponent)
    }

    /// Checks that `2 * range + 1` columns fit in the slot grid and returns
    /// the grid side.
    pub fn validate(&self) -> Result<u64, WindowFitError> {
        let grid_size = self.grid_size().ok_or(WindowFitError::GridTooLarge {
            grid_exponent: self.grid_exponent,
            max: MAX_GRID_EXPONENT,
        })?;
        let needed = 2 * u64::from(self.range) + 1;
        if needed > grid_size {
            return Err(WindowFitError::WindowTooLarge {
                range: self.range,
                needed,
                grid_size,
            });
        }
        Ok(grid_size)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for tessera (e.g. `~/.config/tessera`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tessera"))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Self = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        config.window.validate()?;
        Ok(config)
    }
}
