//! Initialize a working directory: default config file plus the status-log directory.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{self, Config};

/// Create the default config at `config_path` (if missing) and the directory the status log
/// lives in. Returns the config that is now in effect for that path.
pub fn init_config(config_path: &Path) -> Result<Config> {
    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, keeping it", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    if let Some(log_dir) = config
        .commands
        .status_log
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("creating log directory {}", log_dir.display()))?;
            log::info!("created log directory at {}", log_dir.display());
        }
    }
    Ok(config)
}
