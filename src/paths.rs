//! Path resolution for stackwright
//!
//! # Environment Variables
//!
//! - `STACKWRIGHT_CONFIG_DIR` - Override config directory
//! - `STACKWRIGHT_STATE_DIR` - Override state directory (where records live)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STACKWRIGHT_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stackwright` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\stackwright`
//!    - macOS/Linux: `~/.config/stackwright`
//!
//! For state_dir():
//! 1. `STACKWRIGHT_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/stackwright` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\stackwright`
//!    - macOS/Linux: `~/.local/state/stackwright`

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "stackwright";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STACKWRIGHT_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STACKWRIGHT_STATE_DIR";

/// Get the stackwright config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", dirs::config_dir, &[".config"])
}

/// Get the stackwright state directory path
pub fn state_dir() -> Result<PathBuf> {
    resolve(ENV_STATE_DIR, "XDG_STATE_HOME", dirs::data_local_dir, &[".local", "state"])
}

fn resolve(
    override_var: &str,
    xdg_var: &str,
    #[cfg_attr(not(windows), allow(unused_variables))] platform: fn() -> Option<PathBuf>,
    home_relative: &[&str],
) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(override_var) {
        let path = expand(&dir);
        log::debug!("Using {override_var}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg) = std::env::var(xdg_var) {
        let path = PathBuf::from(xdg).join(APP_DIR);
        log::debug!("Using {xdg_var}: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(dir) = platform() {
            return Ok(dir.join(APP_DIR));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home_relative.iter().fold(home, |path, part| path.join(part)).join(APP_DIR))
}

/// Expand `~` and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
