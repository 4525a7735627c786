//! Error types for the terminology index.
//!
//! Errors are grouped by the layer that raises them: partition compilation at
//! startup, key/value encoding, element extraction, the index store, the
//! envelope repository, cross-store consistency, and request translation.
//! [`TerminologyError`] is the umbrella type returned by the service layer.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::model::{ResourceId, ResourceType};

/// The primary error type for all terminology operations.
#[derive(Error, Debug)]
pub enum TerminologyError {
    /// Partition compilation errors (fatal at startup).
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Key or value encoding errors.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Element extraction errors (resource rejected).
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Index store errors.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Envelope repository errors.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Envelope and index disagree after a failed write.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    /// Invalid request parameters.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Result type for service-level operations.
pub type TerminologyResult<T> = Result<T, TerminologyError>;

/// Result type for index store operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised while compiling partition definitions.
///
/// Every variant is fatal: the server must not start partially indexed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unresolvable path '{path}' for {resource_type}")]
    UnresolvablePath {
        resource_type: ResourceType,
        path: String,
    },

    #[error("unknown parameter type '{param_type}' for {resource_type}.{param}")]
    UnknownParameterType {
        resource_type: ResourceType,
        param: String,
        param_type: String,
    },

    #[error(
        "cannot map {param_type} parameter {resource_type}.{param} with target {target} onto element type {element_type}"
    )]
    UnmappableTarget {
        resource_type: ResourceType,
        param: String,
        param_type: String,
        target: String,
        element_type: String,
    },

    #[error("path '{path}' is rooted at {found}, expected {expected}")]
    WrongResourceType {
        path: String,
        expected: ResourceType,
        found: String,
    },

    #[error("duplicate partition name: {name}")]
    DuplicatePartition { name: String },

    #[error("partitions '{first}' and '{second}' map to the same table '{table}'")]
    DuplicateTable {
        first: String,
        second: String,
        table: String,
    },
}

/// Errors raised by key and value codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("codec {codec} cannot encode a {element} element")]
    TypeMismatch {
        codec: &'static str,
        element: &'static str,
    },

    #[error("value {value} is out of range for codec {codec}")]
    OutOfRange { codec: &'static str, value: i64 },

    #[error("malformed {codec} value: {message}")]
    MalformedValue {
        codec: &'static str,
        message: String,
    },
}

/// Errors raised while extracting elements from a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("resource is not a JSON object")]
    NotAnObject,

    #[error("cannot convert value at '{path}' to {expected}: {actual}")]
    ConversionFailed {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("missing required field '{field}' at '{path}'")]
    MissingField { path: String, field: String },
}

/// Persistence errors raised by the index store.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Engine I/O failure; carries the SQLite cause.
    #[error("index engine failure during {operation}{}", partition_suffix(.partition))]
    Engine {
        operation: &'static str,
        partition: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("index connection pool failure: {message}")]
    Pool { message: String },

    #[error("unknown partition: {name}")]
    UnknownPartition { name: String },

    #[error("partition {partition} expects {expected}-byte keys, got {actual}")]
    KeyLength {
        partition: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "partition {partition} was written as {stored_codec} {stored_prefix}/{stored_key}, compiled as {codec} {prefix}/{key}"
    )]
    LayoutMismatch {
        partition: String,
        stored_codec: String,
        stored_prefix: usize,
        stored_key: usize,
        codec: String,
        prefix: usize,
        key: usize,
    },

    #[error("iterator over {partition} is exhausted")]
    IteratorExhausted { partition: String },

    #[error("iterator over {partition} is closed")]
    IteratorClosed { partition: String },

    #[error("index store is closed")]
    StoreClosed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn partition_suffix(partition: &Option<String>) -> String {
    match partition {
        Some(name) => format!(" on {}", name),
        None => String::new(),
    }
}

impl IndexError {
    pub(crate) fn engine(
        operation: &'static str,
        partition: Option<&str>,
        source: rusqlite::Error,
    ) -> Self {
        IndexError::Engine {
            operation,
            partition: partition.map(str::to_string),
            source,
        }
    }
}

/// Errors raised by the envelope repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("repository engine failure during {operation}")]
    Engine {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("repository connection pool failure: {message}")]
    Pool { message: String },

    #[error("failed to (de)serialize resource {id:?}: {message}")]
    Serialization {
        id: Option<ResourceId>,
        message: String,
    },

    #[error("repository id {id} does not fit a 4-byte disambiguator")]
    IdOverflow { id: i64 },

    #[error("stored resource {id} has unknown type '{resource_type}'")]
    UnknownResourceType { id: ResourceId, resource_type: String },
}

/// The envelope and the index disagree after a failed write.
#[derive(Error, Debug)]
pub enum ConsistencyError {
    /// The index batch failed and the envelope write was compensated.
    #[error("index write for {resource_type}/{id} failed; envelope change was reverted")]
    IndexWriteFailed {
        resource_type: ResourceType,
        id: ResourceId,
        #[source]
        source: IndexError,
    },

    /// The index batch failed and so did the compensating envelope write.
    #[error(
        "index write for {resource_type}/{id} failed ({index_error}) and compensation failed ({compensation_error})"
    )]
    CompensationFailed {
        resource_type: ResourceType,
        id: ResourceId,
        index_error: IndexError,
        compensation_error: RepositoryError,
    },

    /// The envelope was deleted but its index entries could not be removed.
    #[error("{resource_type}/{id} was deleted but its index entries remain")]
    StaleEntries {
        resource_type: ResourceType,
        id: ResourceId,
        #[source]
        source: IndexError,
    },
}

/// Errors in request parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("unknown search parameter {resource_type}.{param}")]
    UnknownParameter {
        resource_type: ResourceType,
        param: String,
    },

    #[error("invalid value '{value}' for {param}: {message}")]
    InvalidValue {
        param: String,
        value: String,
        message: String,
    },

    #[error("expected a {expected} resource, got {found}")]
    ResourceTypeMismatch {
        expected: ResourceType,
        found: String,
    },

    #[error("resource not found: {resource_type}/{id}")]
    NotFound {
        resource_type: ResourceType,
        id: ResourceId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display_names_partition() {
        let err = IndexError::engine(
            "put",
            Some("CodeSystem.url"),
            rusqlite::Error::InvalidQuery,
        );
        assert_eq!(
            err.to_string(),
            "index engine failure during put on CodeSystem.url"
        );

        let err = IndexError::engine("open", None, rusqlite::Error::InvalidQuery);
        assert_eq!(err.to_string(), "index engine failure during open");
    }

    #[test]
    fn test_compensation_failure_reports_both_causes() {
        let err = ConsistencyError::CompensationFailed {
            resource_type: ResourceType::CodeSystem,
            id: ResourceId::new(7),
            index_error: IndexError::StoreClosed,
            compensation_error: RepositoryError::Pool {
                message: "timed out".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("CodeSystem/7"));
        assert!(msg.contains("index store is closed"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_wraps_into_terminology_error() {
        let err: TerminologyError = IndexError::StoreClosed.into();
        assert!(matches!(err, TerminologyError::Index(IndexError::StoreClosed)));
    }
}
