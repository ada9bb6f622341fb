//! Scripted partial updates of single documents
//!
//! Independent of the rollup flow: used for one-off corrections. Conflicts
//! between concurrent writers are resolved by the backend (last write wins);
//! the returned version lets callers detect that they raced.

use crate::backend::SearchBackend;
use crate::error::RollupError;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// A parameterized script plus an optional upsert body.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedUpdate {
    pub source: String,
    pub lang: String,
    pub params: Map<String, Value>,
    /// Inserted unchanged when the document does not exist
    pub upsert: Option<Value>,
}

impl ScriptedUpdate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lang: "painless".to_string(),
            params: Map::new(),
            upsert: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn upsert(mut self, body: Value) -> Self {
        self.upsert = Some(body);
        self
    }

    /// Request body for the update endpoint.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "script": {
                "source": self.source,
                "lang": self.lang,
                "params": self.params,
            }
        });
        if let Some(upsert) = &self.upsert {
            body["upsert"] = upsert.clone();
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub id: String,
    /// Version counter after the update
    pub version: u64,
    /// "created" when the upsert body was inserted, otherwise "updated" or "noop"
    pub result: String,
}

/// Apply `update` to the document `(index, id)`.
pub async fn apply_update<B>(
    backend: &B,
    index: &str,
    doc_type: &str,
    id: &str,
    update: &ScriptedUpdate,
) -> Result<UpdateOutcome, RollupError>
where
    B: SearchBackend + ?Sized,
{
    let receipt = match backend.update(index, doc_type, id, &update.to_body()).await {
        Ok(receipt) => receipt,
        Err(source) => {
            crate::metrics::UPDATES_TOTAL.with_label_values(&["error"]).inc();
            return Err(RollupError::Update {
                index: index.to_string(),
                id: id.to_string(),
                source,
            });
        }
    };

    crate::metrics::UPDATES_TOTAL.with_label_values(&["ok"]).inc();
    crate::audit::document_updated(index, &receipt.id, receipt.version, &receipt.result);

    Ok(UpdateOutcome {
        id: receipt.id,
        version: receipt.version,
        result: receipt.result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, PutMode};
    use crate::error::BackendError;

    #[test]
    fn test_update_body() {
        let update = ScriptedUpdate::new("ctx._source.count += params.num")
            .param("num", 1)
            .upsert(json!({ "count": 0 }));
        assert_eq!(
            update.to_body(),
            json!({
                "script": {
                    "source": "ctx._source.count += params.num",
                    "lang": "painless",
                    "params": { "num": 1 }
                },
                "upsert": { "count": 0 }
            })
        );
    }

    #[tokio::test]
    async fn test_upsert_inserts_body_unchanged() {
        let backend = InMemoryBackend::new();
        let upsert = json!({ "user": "olivere", "retweets": 0 });
        let update = ScriptedUpdate::new("ctx._source.retweets += params.num")
            .param("num", 1)
            .upsert(upsert.clone());

        let outcome = apply_update(&backend, "twitter", "_doc", "1", &update).await.unwrap();
        assert_eq!(outcome.result, "created");
        assert_eq!(outcome.version, 1);
        assert_eq!(backend.source("twitter", "1"), Some(upsert));
    }

    #[tokio::test]
    async fn test_existing_document_version_increases() {
        let backend = InMemoryBackend::new();
        backend
            .put("twitter", "_doc", "1", &json!({ "retweets": 3 }), PutMode::Create)
            .await
            .unwrap();

        let update = ScriptedUpdate::new("ctx._source.retweets += params.num").param("num", 2);
        let first = apply_update(&backend, "twitter", "_doc", "1", &update).await.unwrap();
        let second = apply_update(&backend, "twitter", "_doc", "1", &update).await.unwrap();

        assert_eq!(first.result, "updated");
        assert!(second.version > first.version);
        assert!(first.version > 1);
        assert_eq!(backend.source("twitter", "1").unwrap()["retweets"], 7);
    }

    #[tokio::test]
    async fn test_missing_document_without_upsert() {
        let backend = InMemoryBackend::new();
        let update = ScriptedUpdate::new("ctx._source.retweets += params.num").param("num", 1);
        let err = apply_update(&backend, "twitter", "_doc", "404", &update)
            .await
            .unwrap_err();
        match err {
            RollupError::Update { id, source, .. } => {
                assert_eq!(id, "404");
                assert!(matches!(source, BackendError::NotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
