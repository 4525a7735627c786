//! Test infrastructure for the terminology index.
//!
//! Every harness works on file databases inside a `TempDir` so that reopen,
//! WAL and layout checks behave as in production.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
