//! Shared types and utilities for esrollup
//!
//! This crate contains the data structures exchanged with the search backend
//! (search responses, aggregation buckets, documents) and small utilities
//! used by the rollup library and the CLI.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{aggregation::*, document::*};
