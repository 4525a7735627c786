//! Storage configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the index store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStoreConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode so readers never block the writer.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Use `synchronous = FULL`; batches survive power loss once submitted.
    #[serde(default = "default_true")]
    pub synchronous_full: bool,

    /// Rows fetched per page by index iterators.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: u32,
}

fn default_max_connections() -> u32 {
    8
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_scan_page_size() -> u32 {
    256
}

impl Default for IndexStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            synchronous_full: true,
            scan_page_size: default_scan_page_size(),
        }
    }
}

/// Configuration for the SQLite resource repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: IndexStoreConfig =
            serde_json::from_str(r#"{"scan_page_size": 16}"#).unwrap();
        assert_eq!(config.scan_page_size, 16);
        assert_eq!(config.max_connections, 8);
        assert!(config.enable_wal);
        assert!(config.synchronous_full);

        let config: RepositoryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.busy_timeout_ms, 5000);
    }
}
