use anyhow::{Context, Result};
use lifecycle::EngineConfig;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Default location of the engine settings file
pub fn config_file() -> Result<PathBuf> {
    Ok(paths::config_dir()?.join("config.toml"))
}

/// Load engine settings.
///
/// An explicit path must exist. The default file is optional; when it is
/// missing the built-in defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_file()?;
            if !path.exists() {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(EngineConfig::default());
            }
            path
        }
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let config = EngineConfig::from_toml_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}
