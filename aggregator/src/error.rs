//! Error types for backend calls and rollup runs

use thiserror::Error;

/// Failure of a single call against the search backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("document {id:?} already exists in index {index:?}")]
    Conflict { index: String, id: String },

    #[error("{what} not found in index {index:?}")]
    NotFound { index: String, what: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("script error: {0}")]
    Script(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

/// Fatal conditions of a rollup run or a partial update. Each variant names
/// the operation that failed and carries the backend detail.
#[derive(Debug, Error)]
pub enum RollupError {
    #[error("backend at {endpoint} is unreachable: {source}")]
    Connectivity {
        endpoint: String,
        #[source]
        source: BackendError,
    },

    #[error("provisioning index {index:?} failed: {source}")]
    Provisioning {
        index: String,
        #[source]
        source: BackendError,
    },

    #[error("aggregation query on index {index:?} failed: {source}")]
    Query {
        index: String,
        #[source]
        source: BackendError,
    },

    #[error("writing document {id:?} to index {index:?} failed: {source}")]
    Write {
        index: String,
        id: String,
        #[source]
        source: BackendError,
    },

    #[error("updating document {id:?} in index {index:?} failed: {source}")]
    Update {
        index: String,
        id: String,
        #[source]
        source: BackendError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
