//! Centralized directory paths for the guardian monitor.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/guardian/` | `~/.local/share/guardian/` |
//! | Config | `~/Library/Application Support/guardian/` | `~/.config/guardian/` |
//!
//! Overrides:
//! - `GUARDIAN_DATA_DIR` overrides [`data_dir`]
//! - `GUARDIAN_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Persistent data root: the SQLite store, signal drop directory and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GUARDIAN_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("guardian"))
        .unwrap_or_else(|| PathBuf::from("/tmp/guardian-data"))
}

/// Directory holding `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GUARDIAN_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("guardian"))
        .unwrap_or_else(|| PathBuf::from("/tmp/guardian-config"))
}

/// Default location of the store database directory.
#[must_use]
pub fn store_dir() -> PathBuf {
    data_dir().join("store")
}

/// Directory the file signal source reads `<entity>.json` snapshots from.
#[must_use]
pub fn signals_dir() -> PathBuf {
    data_dir().join("signals")
}

/// Default log directory.
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default config file path.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
