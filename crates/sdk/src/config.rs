//! SDK configuration.
//!
//! Loaded from a JSON file or built in code. Missing fields take their
//! defaults, so `{}` is a valid configuration file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use silo_node_rpc::ClientOptions;
use silo_protocol::constants::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_NODE_PORT, MAX_PAYLOAD_SIZE,
};
use silo_transfer::DEFAULT_CHUNK_SIZE;

use crate::SdkError;

/// Default number of segment transfers in flight per transfer.
pub const DEFAULT_MAX_CONCURRENCY: i64 = 10;

/// Transfer settings for an [`Sdk`](crate::Sdk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkConfig {
    /// `host:port` of the storage node.
    pub node_address: String,
    /// Segment transfers in flight per transfer; also the pool size per node.
    pub max_concurrency: i64,
    /// Segment size in bytes for uploads.
    pub chunk_size: i64,
    /// Reuse connections across segments and transfers.
    pub use_pool: bool,
    pub connect_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            node_address: format!("127.0.0.1:{DEFAULT_NODE_PORT}"),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE as i64,
            use_pool: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SdkConfig {
    /// Builds a configuration from the four construction parameters.
    pub fn new(node_address: &str, max_concurrency: i64, chunk_size: i64, use_pool: bool) -> Self {
        Self {
            node_address: node_address.to_string(),
            max_concurrency,
            chunk_size,
            use_pool,
            ..Self::default()
        }
    }

    /// Reads a JSON configuration file and validates it.
    pub fn load(path: &Path) -> Result<Self, SdkError> {
        let content = std::fs::read_to_string(path)?;
        let config: SdkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded sdk config");
        Ok(config)
    }

    /// Checks every field is usable.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.node_address.trim().is_empty() {
            return Err(SdkError::Configuration("node address is empty".into()));
        }
        if self.max_concurrency <= 0 {
            return Err(SdkError::Configuration(format!(
                "max concurrency must be positive, got {}",
                self.max_concurrency
            )));
        }
        if self.chunk_size <= 0 {
            return Err(SdkError::Configuration(format!(
                "chunk size must be positive, got {}",
                self.chunk_size
            )));
        }
        if self.chunk_size as u64 > MAX_PAYLOAD_SIZE {
            return Err(SdkError::Configuration(format!(
                "chunk size {} exceeds the {MAX_PAYLOAD_SIZE} byte frame limit",
                self.chunk_size
            )));
        }
        if self.connect_timeout_ms == 0 || self.call_timeout_ms == 0 {
            return Err(SdkError::Configuration("timeouts must be positive".into()));
        }
        Ok(())
    }

    /// Concurrency as a count. Only meaningful after [`validate`](Self::validate).
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1) as usize
    }

    /// Chunk size in bytes. Only meaningful after [`validate`](Self::validate).
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size.max(1) as u64
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SdkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size_bytes(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.concurrency(), 10);
        assert!(config.use_pool);
    }

    #[test]
    fn rejects_non_positive_values() {
        let config = SdkConfig::new("127.0.0.1:5500", 4, 0, false);
        assert!(matches!(config.validate(), Err(SdkError::Configuration(_))));

        let config = SdkConfig::new("127.0.0.1:5500", 4, -1, false);
        assert!(matches!(config.validate(), Err(SdkError::Configuration(_))));

        let config = SdkConfig::new("127.0.0.1:5500", 0, 1024, true);
        assert!(matches!(config.validate(), Err(SdkError::Configuration(_))));

        let config = SdkConfig::new("", 4, 1024, true);
        assert!(matches!(config.validate(), Err(SdkError::Configuration(_))));
    }

    #[test]
    fn rejects_chunks_larger_than_a_frame() {
        let config = SdkConfig::new("n:1", 1, MAX_PAYLOAD_SIZE as i64 + 1, true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodeAddress":"10.0.0.5:7000","maxConcurrency":25,"usePool":false}}"#
        )
        .unwrap();

        let config = SdkConfig::load(file.path()).unwrap();
        assert_eq!(config.node_address, "10.0.0.5:7000");
        assert_eq!(config.max_concurrency, 25);
        assert!(!config.use_pool);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE as i64);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"chunkSize":0}}"#).unwrap();
        assert!(matches!(
            SdkConfig::load(file.path()),
            Err(SdkError::Configuration(_))
        ));

        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        write!(garbage, "not json").unwrap();
        assert!(matches!(SdkConfig::load(garbage.path()), Err(SdkError::Json(_))));
    }

    #[test]
    fn timeouts_map_to_client_options() {
        let config = SdkConfig {
            connect_timeout_ms: 250,
            call_timeout_ms: 1500,
            ..SdkConfig::default()
        };
        let options = config.client_options();
        assert_eq!(options.connect_timeout, Duration::from_millis(250));
        assert_eq!(options.call_timeout, Duration::from_millis(1500));
    }
}
