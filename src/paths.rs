//! Centralized path resolution for MintScout
//!
//! All file and directory paths are resolved through this module so behavior
//! stays consistent across platforms:
//! - **macOS**: `~/Library/Application Support/MintScout/`
//! - **Windows**: `%LOCALAPPDATA%\MintScout\`
//! - **Linux**: `$XDG_DATA_HOME/MintScout/` (fallback `~/.local/share/MintScout/`)
//!
//! Layout:
//! ```text
//! MintScout/
//! ├── data/
//! │   ├── config.toml
//! │   └── mintscout.db
//! └── logs/
//!     └── mintscout_*.log
//! ```

use once_cell::sync::Lazy;
use std::path::PathBuf;

/// Lazy-initialized base directory (thread-safe)
static BASE_DIRECTORY: Lazy<PathBuf> = Lazy::new(resolve_base_directory);

fn resolve_base_directory() -> PathBuf {
    const APP_DIR: &str = "MintScout";

    if let Ok(custom) = std::env::var("MINTSCOUT_HOME") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(APP_DIR);
    }

    if let Some(dir) = dirs::data_dir() {
        return dir.join(APP_DIR);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(APP_DIR);
    }

    PathBuf::from(APP_DIR)
}

/// Returns the base directory for all MintScout data
pub fn get_base_directory() -> PathBuf {
    BASE_DIRECTORY.clone()
}

/// Returns the data directory path (database, config)
pub fn get_data_directory() -> PathBuf {
    BASE_DIRECTORY.join("data")
}

/// Returns the logs directory path
pub fn get_logs_directory() -> PathBuf {
    BASE_DIRECTORY.join("logs")
}

/// Returns the config file path
pub fn get_config_path() -> PathBuf {
    get_data_directory().join("config.toml")
}

/// Returns the SQLite database path
pub fn get_database_path() -> PathBuf {
    get_data_directory().join("mintscout.db")
}

/// Creates every directory the daemon needs at startup.
///
/// An unwritable data directory is one of the few fatal startup conditions.
pub fn ensure_all_directories() -> Result<(), String> {
    for dir in [get_data_directory(), get_logs_directory()] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Cannot create directory {}: {}", dir.display(), e))?;
    }
    Ok(())
}
