//! Daemon configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use keypulse_proto::DEFAULT_PORT;

use crate::error::Result;

/// Server configuration, loadable from a JSON file.
///
/// Every field has a default, so a partial file (or none at all) is fine.
/// CLI flags override whatever the file says.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Interface to bind. Defaults to all interfaces.
    pub host: String,
    /// TCP port display clients connect to.
    pub port: u16,
    /// Start with verbose logging enabled.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.debug);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(!config.debug);
    }

    #[test]
    fn test_full_file() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"host": "127.0.0.1", "port": 2000, "debug": true}"#).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 2000);
        assert!(config.debug);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = ServerConfig::load(Path::new("/nonexistent/keypulse.json"));
        assert!(result.is_err());
    }
}
