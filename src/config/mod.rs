//! User configuration for the muxbuf host.
//!
//! Loaded from `~/.muxbuf/config.toml`; a missing file yields defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory plugins are loaded from. Defaults to `~/.muxbuf/plugins`.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,

    /// Plugins whose print output starts muted.
    #[serde(default)]
    pub muted: Vec<String>,
}

impl Config {
    /// Global config directory (`~/.muxbuf/`).
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".muxbuf")
    }

    /// Global config file path (`~/.muxbuf/config.toml`).
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Default plugin directory (`~/.muxbuf/plugins`).
    pub fn default_plugin_dir() -> PathBuf {
        Self::global_config_dir().join("plugins")
    }

    /// Load configuration from `path`, or from the global location when no
    /// path is given. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::global_config_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Effective plugin directory after applying the default.
    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(Self::default_plugin_dir)
    }
}
