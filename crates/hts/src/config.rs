//! Command line configuration for the terminology server tool.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HTS_DATA_DIR` | ./data | Directory holding `resources.db` and `index.db` |
//! | `HTS_LOG_LEVEL` | info | Log level |
//! | `HTS_MAX_CONNECTIONS` | 8 | Index store pool size |
//! | `HTS_BUSY_TIMEOUT_MS` | 5000 | SQLite busy timeout |
//! | `HTS_SCAN_PAGE_SIZE` | 256 | Rows fetched per iterator page |
//! | `HTS_SYNCHRONOUS_FULL` | true | `synchronous = FULL` on the index store |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use helios_terminology::{IndexStoreConfig, RepositoryConfig, ResourceType};

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Terminology index tool configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "hts")]
#[command(about = "Helios Terminology Server index tool")]
pub struct ServerConfig {
    /// Directory holding the resource repository and the index store.
    #[arg(long, global = true, env = "HTS_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, env = "HTS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum pooled connections per database.
    #[arg(long, global = true, env = "HTS_MAX_CONNECTIONS", default_value = "8")]
    pub max_connections: u32,

    /// SQLite busy timeout in milliseconds.
    #[arg(long, global = true, env = "HTS_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u32,

    /// Rows fetched per index iterator page.
    #[arg(long, global = true, env = "HTS_SCAN_PAGE_SIZE", default_value = "256")]
    pub scan_page_size: u32,

    /// Use `synchronous = FULL` on the index store.
    #[arg(
        long,
        global = true,
        env = "HTS_SYNCHRONOUS_FULL",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub synchronous_full: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Tool commands. Every command prints JSON on stdout.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Load a resource or every entry of a Bundle from a JSON file.
    Load {
        /// Path to the JSON file.
        file: PathBuf,
    },
    /// Read a resource by id.
    Read {
        /// CodeSystem or ValueSet.
        resource_type: ResourceType,
        /// Resource id.
        id: u32,
    },
    /// Delete a resource by id.
    Delete {
        /// CodeSystem or ValueSet.
        resource_type: ResourceType,
        /// Resource id.
        id: u32,
    },
    /// Equality search on one parameter.
    Search {
        /// CodeSystem or ValueSet.
        resource_type: ResourceType,
        /// Search parameter code.
        param: String,
        /// Value; `system|code` for token parameters.
        value: String,
    },
    /// CodeSystem/$lookup.
    Lookup {
        /// Code system url.
        #[arg(long)]
        system: String,
        /// Code.
        #[arg(long)]
        code: String,
        /// Code system version.
        #[arg(long)]
        version: Option<String>,
    },
    /// ValueSet/$validate-code.
    ValidateCode {
        /// Value set url.
        #[arg(long)]
        url: String,
        /// Code system url.
        #[arg(long)]
        system: String,
        /// Code.
        #[arg(long)]
        code: String,
        /// Code system version.
        #[arg(long)]
        system_version: Option<String>,
    },
    /// ValueSet/$expand.
    Expand {
        /// Value set url.
        #[arg(long)]
        url: String,
        /// Value set version.
        #[arg(long)]
        version: Option<String>,
    },
    /// Rebuild every index entry from the stored resources.
    Reindex,
    /// List compiled partitions with their layouts and entry counts.
    Partitions,
}

impl ServerConfig {
    /// Index store settings derived from the command line.
    pub fn store_config(&self) -> IndexStoreConfig {
        IndexStoreConfig {
            max_connections: self.max_connections,
            busy_timeout_ms: self.busy_timeout_ms,
            scan_page_size: self.scan_page_size,
            synchronous_full: self.synchronous_full,
            ..Default::default()
        }
    }

    /// Repository settings derived from the command line.
    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            max_connections: self.max_connections,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.data_dir.as_os_str().is_empty() {
            errors.push("Data directory cannot be empty".to_string());
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log level '{}', expected one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections cannot be 0".to_string());
        }

        if self.scan_page_size == 0 {
            errors.push("Scan page size cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
