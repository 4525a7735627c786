//! Helios Terminology Index
//!
//! This crate provides the search and operation index behind a FHIR
//! terminology server. Resources (CodeSystem, ValueSet) are stored as JSON
//! envelopes in a repository; every searchable element and every concept and
//! value set member is projected into fixed-length binary keys held in
//! isolated partitions of one embedded ordered key-value store.
//!
//! # Features
//!
//! - **Declarative partitions**: search parameters and operations are
//!   compiled once at startup into deterministic key layouts
//! - **Prefix scans**: equality search, `$lookup`, `$validate-code` and
//!   `$expand` are prefix scans over sorted keys
//! - **Atomic batches**: all index entries of one resource are written in one
//!   transaction
//! - **Consistency**: a failed index write compensates the envelope write;
//!   every hit is re-checked against the stored resource
//!
//! # Architecture
//!
//! - [`model`] - resource types, typed elements and the JSON path accessor
//! - [`codec`] - key codecs and operation value codecs
//! - [`partition`] - partition definitions, the compiler and the registry
//! - [`store`] - the SQLite-backed partitioned index store
//! - [`repository`] - envelope CRUD store keyed by integer id
//! - [`manager`] - per-type coordination of envelope and index writes
//! - [`service`] - CRUD, search and terminology operations
//! - [`config`] - store and repository tuning
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use helios_terminology::{IndexStoreConfig, RepositoryConfig, TerminologyService};
//! use helios_terminology::service::LookupRequest;
//! use serde_json::json;
//!
//! let service = TerminologyService::open(
//!     "./data",
//!     IndexStoreConfig::default(),
//!     RepositoryConfig::default(),
//! )?;
//!
//! service.create(json!({
//!     "resourceType": "CodeSystem",
//!     "url": "http://example.org/cs",
//!     "concept": [{"code": "A", "display": "Alpha"}]
//! }))?;
//!
//! let hit = service.lookup(&LookupRequest {
//!     system: "http://example.org/cs".to_string(),
//!     code: "A".to_string(),
//!     version: None,
//! })?;
//! assert_eq!(hit.unwrap().display.as_deref(), Some("Alpha"));
//!
//! service.shutdown()?;
//! # Ok::<(), helios_terminology::TerminologyError>(())
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod partition;
pub mod repository;
pub mod service;
pub mod store;

// Re-export commonly used types at crate root
pub use config::{IndexStoreConfig, RepositoryConfig};
pub use error::{IndexResult, TerminologyError, TerminologyResult};
pub use manager::ResourceManager;
pub use model::{ResourceId, ResourceType};
pub use partition::{PartitionCompiler, PartitionRegistry};
pub use repository::{ResourceEnvelope, ResourceRepository, SqliteResourceRepository};
pub use service::TerminologyService;
pub use store::{IndexStore, WriteBatch};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
