//! Config file discovery and loading.
//!
//! Discovery order:
//! 1. `TOOLCAST_CONFIG` environment variable.
//! 2. `~/.toolcast/config.json`
//! 3. Built-in defaults.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ToolcastConfig;
use crate::error::ConfigError;

/// Environment variable that overrides the config path.
pub const CONFIG_ENV_VAR: &str = "TOOLCAST_CONFIG";

/// Pick the config file location.
///
/// `env_path` is the value of [`CONFIG_ENV_VAR`], if set. An explicit path is
/// returned even when it does not exist; the home candidate only when it does.
pub fn discover_config_path(env_path: Option<String>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let candidate = home_dir?.join(".toolcast").join("config.json");
    candidate.exists().then_some(candidate)
}

/// Load the config using the process environment and home directory.
pub fn load_config() -> Result<ToolcastConfig, ConfigError> {
    let path = discover_config_path(std::env::var(CONFIG_ENV_VAR).ok(), dirs::home_dir());
    match path {
        Some(path) => load_config_from(&path),
        None => {
            info!("no config file found, using defaults");
            Ok(ToolcastConfig::default())
        }
    }
}

/// Load a config file. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<ToolcastConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "config path does not exist, using defaults");
            return Ok(ToolcastConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    debug!(path = %path.display(), "loading config file");
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_wins_even_if_missing() {
        let home = tempfile::tempdir().unwrap();
        let path = discover_config_path(Some("/nope/config.json".into()), Some(home.path().into()));
        assert_eq!(path, Some(PathBuf::from("/nope/config.json")));
    }

    #[test]
    fn empty_env_path_is_ignored() {
        assert_eq!(discover_config_path(Some(String::new()), None), None);
    }

    #[test]
    fn home_candidate_only_when_present() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(discover_config_path(None, Some(home.path().into())), None);

        let dir = home.path().join(".toolcast");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), "{}").unwrap();
        assert_eq!(
            discover_config_path(None, Some(home.path().into())),
            Some(dir.join("config.json"))
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ToolcastConfig::default());
    }

    #[test]
    fn loads_values_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "session": { "sessionId": "abc" } }"#).unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.session.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn directory_path_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
