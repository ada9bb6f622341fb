//! Search backends
//!
//! The pipeline talks to the search engine only through [`SearchBackend`].
//! A backend handle is passed explicitly to every component; calls are
//! issued one at a time and awaited before the next one.

pub mod http;
pub mod memory;
pub(crate) mod script;

use crate::error::BackendError;
use async_trait::async_trait;
use esrollup_shared::types::aggregation::SearchResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

/// Result of a liveness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingInfo {
    /// Version number reported by the backend (e.g. "7.17.9")
    pub version: String,
    pub status_code: u16,
    pub cluster_name: Option<String>,
}

impl PingInfo {
    /// Major component of the reported version, if it parses.
    pub fn major_version(&self) -> Option<u32> {
        self.version.split('.').next()?.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexReceipt {
    pub acknowledged: bool,
}

/// How a document write treats an existing document with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with [`BackendError::Conflict`] if the id is taken
    Create,
    /// Replace any existing document
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutReceipt {
    pub id: String,
    pub index: String,
    pub doc_type: String,
    pub version: u64,
    /// "created" or "updated"
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReceipt {
    pub found: bool,
    pub id: String,
    pub version: Option<u64>,
    pub index: String,
    pub doc_type: String,
    pub source: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReceipt {
    pub id: String,
    pub version: u64,
    /// "created", "updated" or "noop"
    pub result: String,
}

/// Operations the rollup needs from a search engine.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Endpoint description used in error messages.
    fn endpoint(&self) -> String;

    /// Confirm liveness and fetch the backend version.
    async fn ping(&self) -> Result<PingInfo, BackendError>;

    async fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    /// Create an index, optionally with a settings/mappings body.
    async fn create_index(
        &self,
        index: &str,
        body: Option<&Value>,
    ) -> Result<CreateIndexReceipt, BackendError>;

    /// Execute a search request body against an index.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, BackendError>;

    /// Store a document under an explicit id.
    async fn put(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
        mode: PutMode,
    ) -> Result<PutReceipt, BackendError>;

    async fn get(&self, index: &str, doc_type: &str, id: &str)
        -> Result<GetReceipt, BackendError>;

    /// Make recently written documents durable and visible to searches.
    async fn flush(&self, index: &str) -> Result<(), BackendError>;

    /// Apply an update request body (script and/or upsert) to one document.
    async fn update(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<UpdateReceipt, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_version() {
        let info = PingInfo {
            version: "7.17.9".to_string(),
            status_code: 200,
            cluster_name: None,
        };
        assert_eq!(info.major_version(), Some(7));

        let info = PingInfo {
            version: "garbage".to_string(),
            ..info
        };
        assert_eq!(info.major_version(), None);
    }
}
