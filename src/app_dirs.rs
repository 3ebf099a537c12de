//! Centralized filesystem paths for the assistant.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/ghostwire/` | `~/.local/share/ghostwire/` |
//! | Config | `~/Library/Application Support/ghostwire/` | `~/.config/ghostwire/` |
//!
//! # Environment Overrides
//!
//! - `GHOSTWIRE_DATA_DIR` overrides [`data_dir`]
//! - `GHOSTWIRE_CONFIG_DIR` overrides [`config_dir`]

use std::ffi::OsString;
use std::path::PathBuf;

const APP_DIR_NAME: &str = "ghostwire";

/// Application data root directory.
///
/// Holds the backend state file, the shared interpreter environment and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve_dir(
        std::env::var_os("GHOSTWIRE_DATA_DIR"),
        dirs::data_dir(),
        "/tmp/ghostwire-data",
    )
}

/// Application config directory (holds `config.toml`).
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve_dir(
        std::env::var_os("GHOSTWIRE_CONFIG_DIR"),
        dirs::config_dir(),
        "/tmp/ghostwire-config",
    )
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Backend state file written by the inference backend (`data_dir()/state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    data_dir().join("state.json")
}

/// Shared interpreter environment used when no script-local one exists.
#[must_use]
pub fn user_env_dir() -> PathBuf {
    data_dir().join(".venv")
}

fn resolve_dir(
    override_dir: Option<OsString>,
    platform_dir: Option<PathBuf>,
    fallback: &str,
) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    platform_dir
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(fallback))
}
