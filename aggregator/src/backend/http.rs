//! HTTP backend speaking the Elasticsearch REST API
//!
//! One `reqwest::Client` is created per backend and reused for every call;
//! it is released when the backend is dropped.

use super::{
    CreateIndexReceipt, GetReceipt, PingInfo, PutMode, PutReceipt, SearchBackend, UpdateReceipt,
};
use crate::error::BackendError;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use esrollup_shared::types::aggregation::SearchResponse;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_DOC_TYPE: &str = "_doc";

#[derive(Debug, Deserialize)]
struct RootInfo {
    cluster_name: Option<String>,
    version: VersionInfo,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    number: String,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(default)]
    acknowledged: bool,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", default)]
    doc_type: Option<String>,
    #[serde(rename = "_version", default)]
    version: u64,
    #[serde(default)]
    result: Option<String>,
    /// Pre-5.x servers report `created: true` instead of `result`
    #[serde(default)]
    created: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", default)]
    doc_type: Option<String>,
    #[serde(rename = "_version", default)]
    version: Option<u64>,
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

/// Search backend reached over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    /// Major version reported by the first successful ping
    major_version: OnceCell<u32>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Transport(format!(
                "endpoint {base_url} cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            username: None,
            password: None,
            major_version: OnceCell::new(),
        })
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    /// Path of a single document. The default type maps to the typeless
    /// endpoint used by 7.x and later.
    fn doc_url(&self, index: &str, doc_type: &str, id: &str) -> Url {
        let doc_type = if doc_type.is_empty() { DEFAULT_DOC_TYPE } else { doc_type };
        self.url(&[index, doc_type, id])
    }

    /// Backends before 7.x have no typeless `_update` endpoint.
    fn typed_endpoints(&self) -> bool {
        matches!(self.major_version.get(), Some(major) if *major < 7)
    }

    fn update_url(&self, index: &str, doc_type: &str, id: &str) -> Url {
        let typeless = doc_type.is_empty() || doc_type == DEFAULT_DOC_TYPE;
        if typeless && !self.typed_endpoints() {
            self.url(&[index, "_update", id])
        } else {
            let doc_type = if doc_type.is_empty() { DEFAULT_DOC_TYPE } else { doc_type };
            self.url(&[index, doc_type, id, "_update"])
        }
    }

    async fn error_for_status(resp: Response) -> Result<Response, BackendError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status { status, body })
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    fn endpoint(&self) -> String {
        self.base_url.to_string()
    }

    async fn ping(&self) -> Result<PingInfo, BackendError> {
        let resp = self.request(Method::GET, self.url(&[])).send().await?;
        let status_code = resp.status().as_u16();
        let resp = Self::error_for_status(resp).await?;
        let info: RootInfo = resp.json().await?;
        let ping = PingInfo {
            version: info.version.number,
            status_code,
            cluster_name: info.cluster_name,
        };
        if let Some(major) = ping.major_version() {
            let _ = self.major_version.set(major);
        }
        Ok(ping)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        let resp = self.request(Method::HEAD, self.url(&[index])).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(BackendError::Status {
                status: other.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn create_index(
        &self,
        index: &str,
        body: Option<&Value>,
    ) -> Result<CreateIndexReceipt, BackendError> {
        let mut req = self.request(Method::PUT, self.url(&[index]));
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = Self::error_for_status(req.send().await?).await?;
        let ack: AckResponse = resp.json().await?;
        Ok(CreateIndexReceipt {
            acknowledged: ack.acknowledged,
        })
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, BackendError> {
        let resp = self
            .request(Method::POST, self.url(&[index, "_search"]))
            .json(body)
            .send()
            .await?;
        let resp = Self::error_for_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn put(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
        mode: PutMode,
    ) -> Result<PutReceipt, BackendError> {
        let mut url = self.doc_url(index, doc_type, id);
        if mode == PutMode::Create {
            url.query_pairs_mut().append_pair("op_type", "create");
        }
        let resp = self.request(Method::PUT, url).json(body).send().await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(BackendError::Conflict {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        let resp = Self::error_for_status(resp).await?;
        let written: WriteResponse = resp.json().await?;
        let result = match (written.result, written.created) {
            (Some(result), _) => result,
            (None, Some(true)) => "created".to_string(),
            (None, _) => "updated".to_string(),
        };
        Ok(PutReceipt {
            id: written.id,
            index: written.index,
            doc_type: written.doc_type.unwrap_or_else(|| doc_type.to_string()),
            version: written.version,
            result,
        })
    }

    async fn get(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<GetReceipt, BackendError> {
        let resp = self
            .request(Method::GET, self.doc_url(index, doc_type, id))
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            // A missing document still carries `found: false`; a missing index does not.
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            if body.get("found").is_none() {
                return Err(BackendError::NotFound {
                    index: index.to_string(),
                    what: "index".to_string(),
                });
            }
            return Ok(GetReceipt {
                found: false,
                id: id.to_string(),
                version: None,
                index: index.to_string(),
                doc_type: doc_type.to_string(),
                source: None,
            });
        }
        let resp = Self::error_for_status(resp).await?;
        let doc: GetResponse = resp.json().await?;
        Ok(GetReceipt {
            found: doc.found,
            id: doc.id,
            version: doc.version,
            index: doc.index,
            doc_type: doc.doc_type.unwrap_or_else(|| doc_type.to_string()),
            source: doc.source,
        })
    }

    async fn flush(&self, index: &str) -> Result<(), BackendError> {
        let resp = self
            .request(Method::POST, self.url(&[index, "_flush"]))
            .send()
            .await?;
        Self::error_for_status(resp).await?;

        // flush commits to disk; refresh makes the documents searchable
        let resp = self
            .request(Method::POST, self.url(&[index, "_refresh"]))
            .send()
            .await?;
        Self::error_for_status(resp).await?;
        Ok(())
    }

    async fn update(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Value,
    ) -> Result<UpdateReceipt, BackendError> {
        let resp = self
            .request(Method::POST, self.update_url(index, doc_type, id))
            .json(body)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound {
                index: index.to_string(),
                what: format!("document {id:?}"),
            });
        }
        let resp = Self::error_for_status(resp).await?;
        let written: WriteResponse = resp.json().await?;
        Ok(UpdateReceipt {
            id: written.id,
            version: written.version,
            result: written.result.unwrap_or_else(|| "updated".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new("http://127.0.0.1:9200", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_doc_urls() {
        let b = backend();
        assert_eq!(
            b.doc_url("twitter-weekly", "tweet", "1").as_str(),
            "http://127.0.0.1:9200/twitter-weekly/tweet/1"
        );
        assert_eq!(
            b.doc_url("twitter-weekly", "", "1").as_str(),
            "http://127.0.0.1:9200/twitter-weekly/_doc/1"
        );
        assert_eq!(
            b.update_url("twitter", "_doc", "1").as_str(),
            "http://127.0.0.1:9200/twitter/_update/1"
        );
        assert_eq!(
            b.update_url("twitter", "tweet", "1").as_str(),
            "http://127.0.0.1:9200/twitter/tweet/1/_update"
        );
    }

    #[test]
    fn test_update_url_before_7x_is_typed() {
        let b = backend();
        b.major_version.set(6).unwrap();
        assert_eq!(
            b.update_url("twitter", "_doc", "1").as_str(),
            "http://127.0.0.1:9200/twitter/_doc/1/_update"
        );
        assert_eq!(
            b.update_url("twitter", "", "1").as_str(),
            "http://127.0.0.1:9200/twitter/_doc/1/_update"
        );
        assert_eq!(
            b.update_url("twitter", "tweet", "1").as_str(),
            "http://127.0.0.1:9200/twitter/tweet/1/_update"
        );
    }

    #[test]
    fn test_segments_are_escaped() {
        let b = backend();
        assert_eq!(
            b.doc_url("idx", "_doc", "a/b c").as_str(),
            "http://127.0.0.1:9200/idx/_doc/a%2Fb%20c"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let b = HttpBackend::new("http://proxy:8080/es/", Duration::from_secs(1)).unwrap();
        assert_eq!(b.url(&["idx", "_search"]).as_str(), "http://proxy:8080/es/idx/_search");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_legacy_write_response() {
        let written: WriteResponse = serde_json::from_str(
            r#"{"_index":"twitter-weekly","_type":"tweet","_id":"1","_version":1,"created":true}"#,
        )
        .unwrap();
        assert_eq!(written.created, Some(true));
        assert!(written.result.is_none());
    }
}
