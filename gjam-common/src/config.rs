//! Configuration file discovery and storage root resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted for the storage root
pub const ROOT_FOLDER_ENV: &str = "GJAM_ROOT_FOLDER";

/// Directory name used under the platform config/data directories
const APP_DIR: &str = "gjam";

/// Storage root resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_file: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!("Root folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            debug!("Root folder from {}: {}", env_var_name, path);
            return PathBuf::from(path);
        }
    }

    let config_path = config_file
        .map(Path::to_path_buf)
        .or_else(|| find_config_file().ok());
    if let Some(config_path) = config_path {
        match read_toml_string_key(&config_path, "root_folder") {
            Ok(Some(root_folder)) => {
                debug!("Root folder from {}: {}", config_path.display(), root_folder);
                return PathBuf::from(root_folder);
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable config file {}: {}", config_path.display(), e),
        }
    }

    default_root_folder()
}

/// Locate the platform config file (`<config_dir>/gjam/config.toml`, then `/etc/gjam/config.toml` on Linux)
pub fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Parse a whole TOML file into `T`
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Read a single top-level string key from a TOML file
fn read_toml_string_key(path: &Path, key: &str) -> Result<Option<String>> {
    let value: toml::Value = load_toml_file(path)?;
    Ok(value.get(key).and_then(|v| v.as_str()).map(str::to_string))
}

/// OS-dependent default storage root
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/gjam (or /var/lib/gjam for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib/gjam"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/gjam"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\gjam"))
    } else {
        PathBuf::from("./gjam_data")
    }
}
