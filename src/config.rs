//! Subsystem configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the privacy subsystem of one virtual host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Whether stanza filtering and admin commands are enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// List storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Name of the list auto-created by the Blocking Command
    #[serde(default = "default_block_list_name")]
    pub block_list_name: String,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            block_list_name: default_block_list_name(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_block_list_name() -> String {
    "block".to_string()
}

/// List storage backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Volatile in-memory storage (development and testing)
    #[default]
    Memory,
    /// Durable fjall LSM-tree storage
    Fjall {
        /// Keyspace directory
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PrivacyConfig::default();
        assert!(config.enabled);
        assert_eq!(config.block_list_name, "block");
        assert!(matches!(config.storage, StorageConfig::Memory));
    }

    #[test]
    fn test_deserialize_fjall_backend() {
        let config: PrivacyConfig = serde_json::from_str(
            r#"{"storage": {"type": "fjall", "path": "/var/lib/xmppd/privacy"}}"#,
        )
        .unwrap();
        assert!(config.enabled);
        match config.storage {
            StorageConfig::Fjall { path } => {
                assert_eq!(path, PathBuf::from("/var/lib/xmppd/privacy"));
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }
}
