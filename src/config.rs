//! Service configuration.

use crate::error::{Result, ServiceError};
use crate::types::PeerAddr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Thread service configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Addresses this peer is reachable at. The first one is advertised in
    /// thread addresses and recorded on logs this peer creates.
    pub listen_addrs: Vec<PeerAddr>,

    /// Records per page when a pull gives no limit.
    pub page_size: usize,

    /// Buffered records per subscription before deliveries are dropped.
    pub subscription_buffer: usize,

    /// Head compare-and-set attempts before giving up with `Conflict`.
    pub max_head_retries: usize,

    /// Push newly added records to the other peers of the thread.
    pub push_on_add: bool,

    /// Block cache size (number of blocks) for the file block store.
    pub block_cache_size: usize,

    /// Base directory for file-backed storage.
    pub data_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addrs: Vec::new(),
            page_size: 100,
            subscription_buffer: crate::subscriptions::DEFAULT_BUFFER_SIZE,
            max_head_retries: 3,
            push_on_add: true,
            block_cache_size: 1000,
            data_dir: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ServiceError::Config("page_size must be positive".into()));
        }
        if self.max_head_retries == 0 {
            return Err(ServiceError::Config(
                "max_head_retries must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Snapshot file of the file threadstore.
    pub fn threadstore_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("threads.bin"))
    }

    /// Directory of the file block store.
    pub fn blocks_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("blocks"))
    }

    /// Secret key file of the peer identity.
    pub fn identity_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("identity.key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.subscription_buffer, 1024);
        assert!(config.push_on_add);
        assert!(config.threadstore_path().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServiceConfig::from_json(
            r#"{"listen_addrs": ["/mem/a"], "page_size": 10, "data_dir": "/var/threads"}"#,
        )
        .unwrap();

        assert_eq!(config.listen_addrs, vec!["/mem/a".parse().unwrap()]);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.max_head_retries, 3);
        assert_eq!(
            config.threadstore_path(),
            Some(PathBuf::from("/var/threads/threads.bin"))
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ServiceConfig::from_json(r#"{"page_size": 0}"#),
            Err(ServiceError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json(r#"{"listen_addrs": ["no-slash"]}"#),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"push_on_add": false}"#).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert!(!config.push_on_add);
    }
}
