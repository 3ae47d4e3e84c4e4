//! HTTP document-store client.
//!
//! Speaks a small JSON protocol against a managed document backend:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | point read | `GET {base}/documents/{collection}/{id}` (404 = missing) |
//! | atomic batch | `POST {base}/batch` with `{"writes": [...]}` |
//! | query | `POST {base}/query` with `{"collection", "where", "orderBy", "limit"}` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use placemark_core::{Document, DocumentQuery, DocumentStore, Error, Result, WriteBatch, WriteOp};

/// Configuration for the HTTP document store.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL of the document API.
    pub base_url: String,
    /// Bearer token (optional for local endpoints).
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl HttpStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_seconds: placemark_core::defaults::HTTP_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Read configuration from the environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PLACEMARK_DOCUMENT_URL` | (required) | Document API base URL |
    /// | `PLACEMARK_DOCUMENT_API_KEY` | (none) | Bearer token |
    /// | `PLACEMARK_HTTP_TIMEOUT` | `30` | Request timeout (seconds) |
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PLACEMARK_DOCUMENT_URL")
            .map_err(|_| Error::Config("PLACEMARK_DOCUMENT_URL is not set".to_string()))?;
        let mut config = Self::new(base_url);
        config.api_key = std::env::var("PLACEMARK_DOCUMENT_API_KEY").ok();
        config.timeout_seconds = std::env::var("PLACEMARK_HTTP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(placemark_core::defaults::HTTP_TIMEOUT_SECS);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "document store URL must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Config(
                "document store timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum WireWrite<'a> {
    Set {
        collection: &'a str,
        id: &'a str,
        data: &'a JsonValue,
    },
    Delete {
        collection: &'a str,
        id: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct WireBatch<'a> {
    writes: Vec<WireWrite<'a>>,
}

#[derive(Debug, Serialize)]
struct WireFilter<'a> {
    field: &'a str,
    value: &'a JsonValue,
}

#[derive(Debug, Serialize)]
struct WireOrder<'a> {
    field: &'a str,
    direction: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery<'a> {
    collection: &'a str,
    #[serde(rename = "where")]
    filters: Vec<WireFilter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_by: Option<WireOrder<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    id: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Debug, Deserialize)]
struct WireQueryResponse {
    #[serde(default)]
    documents: Vec<WireDocument>,
}

/// Document store reached over HTTP.
pub struct HttpDocumentStore {
    client: Client,
    config: HttpStoreConfig,
}

impl HttpDocumentStore {
    /// Create a new client with the given configuration.
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Database(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %config.base_url, "Initializing HTTP document store");
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) => req.header("Authorization", format!("Bearer {}", api_key)),
            None => req,
        }
    }

    fn document_path(collection: &str, id: &str) -> String {
        let segments: Vec<String> = collection
            .split('/')
            .chain(std::iter::once(id))
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("/documents/{}", segments.join("/"))
    }

    async fn error_from_response(op: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(240).collect();
        warn!(op, status = status.as_u16(), body = %snippet, "document store request failed");
        Error::Database(format!("{} failed with HTTP {}: {}", op, status.as_u16(), snippet))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.url(&Self::document_path(collection, id));
        debug!(collection, id, "document store: get");

        let response = self.authorize(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response("get", response).await);
        }

        let doc: WireDocument = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("document decode failed: {}", e)))?;
        Ok(Some(Document {
            id: doc.id,
            data: doc.data,
        }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let writes = batch
            .ops()
            .iter()
            .map(|op| match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => WireWrite::Set {
                    collection,
                    id,
                    data,
                },
                WriteOp::Delete { collection, id } => WireWrite::Delete { collection, id },
            })
            .collect();
        let body = WireBatch { writes };
        debug!(op_count = batch.ops().len(), "document store: commit");

        let response = self
            .authorize(self.client.post(self.url("/batch")))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response("commit", response).await);
        }
        Ok(())
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let body = WireQuery {
            collection: &query.collection,
            filters: query
                .filters
                .iter()
                .map(|(field, value)| WireFilter { field, value })
                .collect(),
            order_by: query.order_by_desc.as_deref().map(|field| WireOrder {
                field,
                direction: "desc",
            }),
            limit: query.limit,
        };
        debug!(collection = %query.collection, "document store: query");

        let response = self
            .authorize(self.client.post(self.url("/query")))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response("query", response).await);
        }

        let parsed: WireQueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("query decode failed: {}", e)))?;
        Ok(parsed
            .documents
            .into_iter()
            .map(|doc| Document {
                id: doc.id,
                data: doc.data,
            })
            .collect())
    }
}
