use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

const DB_FILE_NAME: &str = "feeds.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Drop and recreate the database on startup.
    #[serde(default)]
    pub force_rebuild: bool,

    #[serde(default = "default_compression_enabled")]
    pub compression_enabled: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedstash")
}

fn default_compression_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            force_rebuild: false,
            compression_enabled: default_compression_enabled(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedstash")
            .join("config.toml")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Environment variables win over the config file.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("FEEDSTASH_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(value) = std::env::var("FEEDSTASH_FORCE_REBUILD") {
            self.force_rebuild = parse_switch("FEEDSTASH_FORCE_REBUILD", &value)?;
        }
        if let Ok(value) = std::env::var("FEEDSTASH_COMPRESSION") {
            self.compression_enabled = parse_switch("FEEDSTASH_COMPRESSION", &value)?;
        }
        Ok(())
    }
}

fn parse_switch(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::Config(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
