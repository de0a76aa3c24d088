//! Configuration loading from `~/.phasegate/config.toml` with defaults.
//!
//! A relative `data_dir` in the file is resolved against the directory the
//! config file lives in.

use phasegate_types::config::{phasegate_home, PhasegateConfig};
use phasegate_types::error::{PhasegateError, PhasegateResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load configuration from a TOML file, with defaults.
///
/// A missing, unreadable or malformed file is logged and replaced by
/// [`PhasegateConfig::default`]; this never fails.
pub fn load_config(path: Option<&Path>) -> PhasegateConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return PhasegateConfig::default();
    }

    let contents = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            return PhasegateConfig::default();
        }
    };

    match toml::from_str::<PhasegateConfig>(&contents) {
        Ok(mut config) => {
            if config.data_dir.is_relative() {
                let base = config_path.parent().unwrap_or_else(|| Path::new("."));
                config.data_dir = base.join(&config.data_dir);
            }
            info!(path = %config_path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to parse config, using defaults"
            );
            PhasegateConfig::default()
        }
    }
}

/// Write the default configuration to `path` unless a file already exists.
///
/// Returns `true` when a new file was written.
pub fn write_default_config(path: &Path) -> PhasegateResult<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(&PhasegateConfig::default())
        .map_err(|e| PhasegateError::Config(e.to_string()))?;
    std::fs::write(path, body)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(true)
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    phasegate_home().join("config.toml")
}
