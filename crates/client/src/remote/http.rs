//! HTTP/JSON document store client.
//!
//! ### Endpoints
//!
//! - `GET    {base}/v1/partitions/{p}/collections/{c}/documents/{id}`
//! - `PUT    {base}/v1/partitions/{p}/collections/{c}/documents/{id}`
//! - `DELETE {base}/v1/partitions/{p}/collections/{c}/documents/{id}`
//! - `POST   {base}/v1/partitions/{p}/collections/{c}/query` with
//!   `{"field": ..., "equals": ...}`, answering `{"documents": [...]}`
//!
//! ### Status mapping
//!
//! - 404 → absent on get, success on delete
//! - 429 → `ResourceExhausted`
//! - 503 → `Unavailable`
//! - 408, 504 and client timeouts → `DeadlineExceeded`

use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quotesync_core::AppConfig;

use super::{DocumentStore, RemoteError};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "quotesync/0.1";

/// HTTP document store configuration.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL, e.g. `https://docs.example.com`.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Transport-level timeout (default: 15s).
    pub timeout: Duration,
    /// User-agent string (default: quotesync/0.x).
    pub user_agent: String,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpStoreConfig {
    /// Build from application config; `None` when no remote URL is configured.
    pub fn from_app_config(config: &AppConfig) -> Option<Self> {
        let base_url = config.require_remote_url().ok()?.to_string();
        let timeout = config.get_timeout().max(config.query_timeout());
        Some(Self { base_url, api_key: config.remote_api_key.clone(), timeout, ..Default::default() })
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    field: &'a str,
    equals: &'a Value,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Value>,
}

/// Document store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpDocumentStore {
    /// Create a new client with the given configuration.
    pub fn new(config: HttpStoreConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::Other(format!("invalid base url {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Other(format!("invalid base url {}", config.base_url)));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RemoteError::Network(Arc::new(e)))?;

        Ok(Self { http, base_url, api_key: config.api_key })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("v1").extend(segments);
        }
        url
    }

    fn document_url(&self, partition: &str, collection: &str, id: &str) -> Url {
        self.url(&["partitions", partition, "collections", collection, "documents", id])
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header(header::ACCEPT, "application/json");
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = self.authorize(req).send().await?;
        tracing::trace!(status = %response.status(), url = %response.url(), "document store response");
        Ok(response)
    }
}

/// Map a non-success status to an error.
pub(crate) fn status_error(status: StatusCode) -> RemoteError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::ResourceExhausted(format!("status {}", status.as_u16())),
        StatusCode::SERVICE_UNAVAILABLE => RemoteError::Unavailable(format!("status {}", status.as_u16())),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteError::DeadlineExceeded,
        other => RemoteError::Http { status: other.as_u16() },
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(&self, partition: &str, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        let url = self.document_url(partition, collection, id);
        let response = self.send(self.http.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            status => Err(status_error(status)),
        }
    }

    async fn set_document(
        &self, partition: &str, collection: &str, id: &str, document: Value,
    ) -> Result<(), RemoteError> {
        let url = self.document_url(partition, collection, id);
        let response = self.send(self.http.put(url).json(&document)).await?;

        let status = response.status();
        if status.is_success() { Ok(()) } else { Err(status_error(status)) }
    }

    async fn delete_document(&self, partition: &str, collection: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.document_url(partition, collection, id);
        let response = self.send(self.http.delete(url)).await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND { Ok(()) } else { Err(status_error(status)) }
    }

    async fn query_documents(
        &self, partition: &str, collection: &str, field: &str, equals: &Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let url = self.url(&["partitions", partition, "collections", collection, "query"]);
        let body = QueryRequest { field, equals };
        let response = self.send(self.http.post(url).json(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let bytes = response.bytes().await?;
        let parsed: QueryResponse = serde_json::from_slice(&bytes)?;
        tracing::debug!(collection, field, count = parsed.documents.len(), "query completed");
        Ok(parsed.documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> HttpDocumentStore {
        HttpDocumentStore::new(HttpStoreConfig {
            base_url: server.uri(),
            api_key: Some("secret".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(StatusCode::TOO_MANY_REQUESTS), RemoteError::ResourceExhausted(_)));
        assert!(matches!(status_error(StatusCode::SERVICE_UNAVAILABLE), RemoteError::Unavailable(_)));
        assert!(matches!(status_error(StatusCode::GATEWAY_TIMEOUT), RemoteError::DeadlineExceeded));
        assert!(matches!(status_error(StatusCode::FORBIDDEN), RemoteError::Http { status: 403 }));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpDocumentStore::new(HttpStoreConfig { base_url: "not a url".into(), ..Default::default() });
        assert!(result.is_err());
    }

    #[test]
    fn test_from_app_config_requires_url() {
        assert!(HttpStoreConfig::from_app_config(&AppConfig::default()).is_none());

        let config = AppConfig { remote_url: Some("https://docs.example.com".into()), ..Default::default() };
        let http = HttpStoreConfig::from_app_config(&config).unwrap();
        assert_eq!(http.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_get_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/partitions/visitor_1_a/collections/general/documents/k"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "k"})))
            .mount(&server)
            .await;

        let doc = store(&server).get_document("visitor_1_a", "general", "k").await.unwrap();
        assert_eq!(doc, Some(json!({"key": "k"})));
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let doc = store(&server).get_document("p", "general", "missing").await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_set_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = store(&server).set_document("p", "general", "k", json!(1)).await;
        assert!(matches!(result, Err(ref e) if e.is_resource_exhausted()));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(store(&server).delete_document("p", "general", "k").await.is_ok());
    }

    #[tokio::test]
    async fn test_query_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/partitions/p/collections/drug_plan_quotes/query"))
            .and(body_json(json!({"field": "originatingKey", "equals": "drug_plan_quotes"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"documents": [{"chunkIndex": 0}, {"chunkIndex": 1}]})),
            )
            .mount(&server)
            .await;

        let docs = store(&server)
            .query_documents("p", "drug_plan_quotes", "originatingKey", &json!("drug_plan_quotes"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = store(&server).get_document("p", "general", "k").await;
        assert!(matches!(result, Err(ref e) if e.is_transient()));
    }
}
