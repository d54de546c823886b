use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::command::Tools;
use crate::interfaces_file::{InterfacesFile, DEFAULT_INTERFACES_PATH};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub default_interface: Option<String>,
    #[serde(default = "default_interfaces_file")]
    pub interfaces_file: PathBuf,
    #[serde(default)]
    pub tools: Tools,
}

fn default_interfaces_file() -> PathBuf {
    PathBuf::from(DEFAULT_INTERFACES_PATH)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_interface: None,
            interfaces_file: default_interfaces_file(),
            tools: Tools::default(),
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn interfaces_file(&self) -> InterfacesFile {
        InterfacesFile::new(&self.interfaces_file)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?;
    Ok(config_dir.join("ifupdown-wifi").join("config.toml"))
}
