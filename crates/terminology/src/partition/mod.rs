//! Partition definitions and their compiler.
//!
//! A partition is a named logical index backed by its own keyspace in the
//! index store. This module provides:
//!
//! - [`types`] - parameter, target and operation kinds
//! - [`definition`] - the compiled [`PartitionDefinition`]
//! - [`compiler`] - [`PartitionCompiler`], turning declarations into definitions
//! - [`registry`] - [`PartitionRegistry`], the lookup structure shared at runtime
//! - [`catalog`] - the built-in terminology declarations

pub mod catalog;
pub mod compiler;
pub mod definition;
pub mod registry;
pub mod types;

pub use compiler::{OperationDecl, PartitionCompiler, ResourceDescriptor, SearchParamDecl};
pub use definition::{ElementExtractor, PartitionDefinition, table_name};
pub use registry::PartitionRegistry;
pub use types::{OperationKind, PartitionKind, SearchParamType, TargetType};
