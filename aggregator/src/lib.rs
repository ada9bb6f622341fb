//! Aggregation rollup library
//!
//! Reads a terms → date histogram aggregation from a source index and
//! writes one derived document per (key, time bucket) pair into a
//! destination index. Also exposes scripted partial updates of single
//! documents.

pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod pipeline;
pub mod provision;
pub mod query;
pub mod update;
pub mod walk;
pub mod writer;

pub use backend::{HttpBackend, InMemoryBackend, SearchBackend};
pub use config::RollupConfig;
pub use error::{BackendError, RollupError};
pub use pipeline::{RollupPipeline, RollupReport};
pub use update::{apply_update, ScriptedUpdate, UpdateOutcome};
