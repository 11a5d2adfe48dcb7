//! Persisted settings.

use crate::key::{is_bare_modifier, normalize_key_name, DEFAULT_STOP_KEY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "hotkey-capture";
const CONFIG_FILE: &str = "config.toml";

fn default_stop_key() -> String {
    DEFAULT_STOP_KEY.to_string()
}

/// User configuration, stored as TOML in the platform config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Key that ends a capture session.
    #[serde(default = "default_stop_key")]
    pub stop_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stop_key: default_stop_key(),
        }
    }
}

impl Config {
    /// Location of the config file, if the platform has a config directory.
    pub fn path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let stop_key = std::mem::take(&mut config.stop_key);
        config.set_stop_key(&stop_key);
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::path().context("No config directory available")?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Set the stop key from a logical or hand-written key name.
    ///
    /// Empty names fall back to the default. A bare modifier is accepted but
    /// can never end a capture, since modifiers alone are always swallowed.
    pub fn set_stop_key(&mut self, name: &str) {
        let key = normalize_key_name(name);
        if key.is_empty() {
            log::warn!("Empty stop key, using {}", DEFAULT_STOP_KEY);
            self.stop_key = default_stop_key();
            return;
        }
        if is_bare_modifier(&key) {
            log::warn!(
                "Stop key {:?} is a modifier and will never end a capture",
                key
            );
        }
        self.stop_key = key;
    }

    /// Whether the stop key can actually end a capture.
    pub fn stop_key_reachable(&self) -> bool {
        !is_bare_modifier(&self.stop_key)
    }
}
