//! Node configuration.
//!
//! Read from a JSON file named on the command line or in `SILO_NODE_CONFIG`.
//! `SILO_NODE_LISTEN` overrides the listen address.

use std::path::Path;

use serde::{Deserialize, Serialize};
use silo_protocol::constants::DEFAULT_NODE_PORT;

pub const CONFIG_ENV: &str = "SILO_NODE_CONFIG";
pub const LISTEN_ENV: &str = "SILO_NODE_LISTEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    pub listen_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("0.0.0.0:{DEFAULT_NODE_PORT}"),
        }
    }
}

impl NodeConfig {
    /// Resolves the configuration from `path` (or `SILO_NODE_CONFIG`) and
    /// the environment.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok());
        let config = match path {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        Ok(config.with_listen_override(std::env::var(LISTEN_ENV).ok()))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        if config.listen_address.trim().is_empty() {
            anyhow::bail!("listenAddress in {} is empty", path.display());
        }
        tracing::debug!(path = %path.display(), "loaded node config");
        Ok(config)
    }

    fn with_listen_override(mut self, listen: Option<String>) -> Self {
        if let Some(listen) = listen.filter(|l| !l.trim().is_empty()) {
            self.listen_address = listen;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_node_port() {
        assert_eq!(NodeConfig::default().listen_address, "0.0.0.0:5500");
    }

    #[test]
    fn reads_file_with_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");

        std::fs::write(&path, "{}").unwrap();
        assert_eq!(NodeConfig::from_file(&path).unwrap(), NodeConfig::default());

        std::fs::write(&path, r#"{"listenAddress":"127.0.0.1:7000"}"#).unwrap();
        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:7000");
    }

    #[test]
    fn rejects_empty_listen_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{"listenAddress":" "}"#).unwrap();
        assert!(NodeConfig::from_file(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NodeConfig::from_file(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn listen_override_wins_unless_blank() {
        let config = NodeConfig::default().with_listen_override(Some("127.0.0.1:9".into()));
        assert_eq!(config.listen_address, "127.0.0.1:9");

        let config = NodeConfig::default().with_listen_override(Some("".into()));
        assert_eq!(config, NodeConfig::default());
    }
}
