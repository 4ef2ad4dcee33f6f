use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::feed::error::ConfigError;
use crate::feed::protocol::ProtocolVersion;

// =============================================================================
// Request-related constants
// =============================================================================

/// Timeout for fetch operations in milliseconds (5 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 5_000;

/// Maximum number of installed packages sent in one GetUpdates request
pub const UPDATE_BATCH_SIZE: usize = 10;

/// Default page size for search queries
pub const DEFAULT_SEARCH_TAKE: usize = 15;

/// Feed configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedConfig {
    pub sources: Vec<SourceConfig>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            timeout_ms: FETCH_TIMEOUT_MS,
        }
    }
}

/// One configured package source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceConfig {
    pub name: String,
    /// Feed URL, or a local directory (optionally `file://`)
    pub path: String,
    pub protocol_version: ProtocolVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub enabled: bool,
    /// Search term sent instead of an empty one (v3 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_search_placeholder: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            protocol_version: ProtocolVersion::V2,
            user_name: None,
            password: None,
            enabled: true,
            empty_search_placeholder: None,
        }
    }
}

impl SourceConfig {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        protocol_version: ProtocolVersion,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            protocol_version,
            ..Default::default()
        }
    }
}

impl FeedConfig {
    /// Load a configuration file, returning the default when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Returns the path to the data directory for nuget-feed.
/// Uses $XDG_DATA_HOME/nuget-feed if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/nuget-feed,
/// or ./nuget-feed if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the configuration directory for nuget-feed.
pub fn config_dir() -> PathBuf {
    config_dir_with_env(std::env::var("XDG_CONFIG_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the configuration file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("nuget-feed.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    xdg_dir(xdg_data_home, home_dir, ".local/share")
}

fn config_dir_with_env(xdg_config_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    xdg_dir(xdg_config_home, home_dir, ".config")
}

fn xdg_dir(xdg_home: Option<String>, home_dir: Option<PathBuf>, home_relative: &str) -> PathBuf {
    let base = xdg_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(home_relative)))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("nuget-feed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn feed_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<FeedConfig>(json!({
            "sources": [
                { "name": "nuget.org", "path": "https://api.nuget.org/api/v2/" }
            ]
        }))
        .unwrap();

        assert_eq!(result.timeout_ms, 5000);
        assert_eq!(
            result.sources,
            vec![SourceConfig::new(
                "nuget.org",
                "https://api.nuget.org/api/v2/",
                ProtocolVersion::V2
            )]
        );
        assert!(result.sources[0].enabled);
    }

    #[test]
    fn source_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<SourceConfig>(json!({
            "name": "private",
            "path": "https://feed.example.com/v3/",
            "protocolVersion": 3,
            "userName": "user",
            "password": "secret",
            "enabled": false,
            "emptySearchPlaceholder": "gx42"
        }))
        .unwrap();

        assert_eq!(
            result,
            SourceConfig {
                name: "private".to_string(),
                path: "https://feed.example.com/v3/".to_string(),
                protocol_version: ProtocolVersion::V3,
                user_name: Some("user".to_string()),
                password: Some("secret".to_string()),
                enabled: false,
                empty_search_placeholder: Some("gx42".to_string()),
            }
        );
    }

    #[test]
    fn source_config_coerces_obsolete_protocol_version() {
        let result = serde_json::from_value::<SourceConfig>(json!({
            "name": "legacy",
            "path": "http://legacy.example.com/",
            "protocolVersion": 1
        }))
        .unwrap();

        assert_eq!(result.protocol_version, ProtocolVersion::V2);
    }

    #[test]
    fn source_config_rejects_unknown_protocol_version() {
        let result = serde_json::from_value::<SourceConfig>(json!({
            "name": "future",
            "path": "http://future.example.com/",
            "protocolVersion": 4
        }));

        assert!(result.is_err());
    }

    #[test]
    fn feed_config_save_then_load_preserves_sources() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.json");
        let config = FeedConfig {
            sources: vec![
                SourceConfig::new("local", "/srv/packages", ProtocolVersion::V2),
                SourceConfig::new("v3", "https://feed.example.com/v3/", ProtocolVersion::V3),
            ],
            timeout_ms: 1234,
        };

        config.save(&path).unwrap();
        let loaded = FeedConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn feed_config_load_returns_default_when_file_is_missing() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = FeedConfig::load(&temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(loaded, FeedConfig::default());
    }

    #[test]
    fn feed_config_load_reports_malformed_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(FeedConfig::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/nuget-feed"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/nuget-feed"));
    }

    #[test]
    fn config_dir_with_env_falls_back_to_home_config() {
        let path = config_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.config/nuget-feed"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./nuget-feed"));
    }
}
