use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::catalog::{DEFAULT_API_BASE_URL, DEFAULT_PAGE_LIMIT, DEFAULT_SERVER};

pub const ENV_PREFIX: &str = "ANICAT";
pub const DEFAULT_PLAYER: &str = "mpv";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_base_url: String,
    pub server: String,
    pub page_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub player: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    pub log_level: String,
    pub log_to_file: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            server: DEFAULT_SERVER.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            data_dir: None,
            player: DEFAULT_PLAYER.to_string(),
            request_timeout_secs: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_to_file: false,
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file, then `ANICAT_*` environment variables.
    pub fn load(file_override: Option<&Path>) -> Result<Self> {
        let file = match file_override {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().ok(),
        };

        let mut builder = Config::builder()
            .set_default("api_base_url", DEFAULT_API_BASE_URL)?
            .set_default("server", DEFAULT_SERVER)?
            .set_default("page_limit", i64::from(DEFAULT_PAGE_LIMIT))?
            .set_default("player", DEFAULT_PLAYER)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .set_default("log_to_file", false)?;

        if let Some(path) = &file {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(file_override.is_some()),
            );
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.player.trim().is_empty() {
            return Err(anyhow!("`player` must not be empty"));
        }
        if self.server.trim().is_empty() {
            return Err(anyhow!("`server` must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join("anicat").join("config.toml"))
}
