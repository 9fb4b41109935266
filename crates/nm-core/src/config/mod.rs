//! Configuration management for the node manager

mod manager;
pub mod serde_utils;

pub use manager::ManagerConfig;

use crate::error::ConfigError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Name of the manager's directory inside the ROS home
pub const CFG_DIR_NAME: &str = "node_manager";

/// Configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Master URI used when `ROS_MASTER_URI` is not set
pub const DEFAULT_MASTER_URI: &str = "http://localhost:11311/";

/// Resolve the ROS home directory.
///
/// `ROS_HOME` wins when set and non-empty, otherwise `<home>/.ros`.
pub fn ros_home() -> Result<PathBuf, ConfigError> {
    ros_home_from(std::env::var_os("ROS_HOME"), dirs::home_dir())
}

fn ros_home_from(ros_home: Option<OsString>, home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match ros_home {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => home.map(|h| h.join(".ros")).ok_or(ConfigError::NoHome),
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    Ok(ros_home()?.join(CFG_DIR_NAME))
}

/// Get the default configuration file path
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Create the directory (and parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Created config directory {:?}", path);
    Ok(())
}

/// Resolve and create the configuration directory.
///
/// Must succeed before any subsystem that persists state is constructed.
pub fn init_cfg_path() -> Result<PathBuf, ConfigError> {
    let dir = default_config_dir()?;
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Master URI from the environment, or the default local master
pub fn masteruri_from_env() -> String {
    masteruri_from(std::env::var("ROS_MASTER_URI").ok())
}

fn masteruri_from(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MASTER_URI.to_string())
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ros_home_prefers_env() {
        let home = ros_home_from(
            Some(OsString::from("/opt/ros_home")),
            Some(PathBuf::from("/home/user")),
        )
        .unwrap();
        assert_eq!(home, PathBuf::from("/opt/ros_home"));
    }

    #[test]
    fn test_ros_home_falls_back_to_home() {
        let home = ros_home_from(Some(OsString::new()), Some(PathBuf::from("/home/user"))).unwrap();
        assert_eq!(home, PathBuf::from("/home/user/.ros"));

        let home = ros_home_from(None, Some(PathBuf::from("/home/user"))).unwrap();
        assert_eq!(home, PathBuf::from("/home/user/.ros"));
    }

    #[test]
    fn test_ros_home_without_home() {
        assert!(matches!(ros_home_from(None, None), Err(ConfigError::NoHome)));
    }

    #[test]
    fn test_masteruri_default() {
        assert_eq!(masteruri_from(None), DEFAULT_MASTER_URI);
        assert_eq!(masteruri_from(Some("  ".into())), DEFAULT_MASTER_URI);
        assert_eq!(
            masteruri_from(Some("http://robot:11311/".into())),
            "http://robot:11311/"
        );
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("node_manager");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op
        ensure_dir(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_fails_on_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "x").unwrap();
        let err = ensure_dir(&file.join("sub")).unwrap_err();
        assert!(matches!(err, ConfigError::CreateDir { .. }));
    }

    #[test]
    fn test_load_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_max_entries = 3\nresolve_timeout = 0\n").unwrap();

        let loaded: ManagerConfig = load_config(&path).unwrap();
        assert_eq!(loaded.history_max_entries, 3);
        assert_eq!(loaded.resolve_timeout(), None);
    }

    #[test]
    fn test_load_malformed_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_max_entries = \"many\"\n").unwrap();
        let result: Result<ManagerConfig, _> = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_default_config_path_is_inside_config_dir() {
        if let (Ok(dir), Ok(path)) = (default_config_dir(), default_config_path()) {
            assert_eq!(path, dir.join(CONFIG_FILE_NAME));
        }
    }

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        let result: Result<ManagerConfig, _> = load_config(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
