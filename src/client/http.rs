// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP client for an Elasticsearch-compatible engine.
//!
//! Requests go to the configured endpoints in round-robin order:
//!
//! ```text
//! search           POST   /{index}/{type}/_search
//! add_documents    POST   /{index}/{type}/_bulk          (NDJSON)
//! index_exists     HEAD   /{index}
//! create_index     DELETE /{index} (overwrite), PUT /{index}
//! type_exists      HEAD   /{index}/_mapping/{type}
//! put_mapping      PUT    /{index}/_mapping/{type}
//! delete_by_query  POST   /{index}/{type}/_delete_by_query
//! refresh          POST   /{index}/_refresh
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::traits::{BulkResponse, SearchClient, SearchResponse};
use crate::config::ClientConfig;
use crate::error::SearchError;
use crate::mapping::{IndexDocument, TypeMapping};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// reqwest-backed [`SearchClient`].
#[derive(Clone)]
pub struct HttpSearchClient {
    http: HttpClient,
    endpoints: Vec<String>,
    next: std::sync::Arc<AtomicUsize>,
    debug: bool,
}

impl std::fmt::Debug for HttpSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchClient")
            .field("endpoints", &self.endpoints)
            .field("debug", &self.debug)
            .finish()
    }
}

impl HttpSearchClient {
    /// Build a client from configuration.
    ///
    /// Fails with [`SearchError::Config`] when no endpoint is configured.
    pub fn new(config: &ClientConfig) -> Result<Self, SearchError> {
        let endpoints = config.endpoints()?;
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            next: std::sync::Arc::new(AtomicUsize::new(0)),
            debug: config.debug,
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn endpoint(&self) -> &str {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[i]
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint(), path.trim_start_matches('/'))
    }

    /// Send a request and return the status and JSON reply (null when empty).
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<(StatusCode, Value), SearchError> {
        let url = self.url(path);
        let mut request = self.http.request(method.clone(), &url);
        match &body {
            Some(RequestBody::Json(value)) => {
                if self.debug {
                    debug!(%method, %url, body = %value, "Search engine request");
                }
                request = request.json(value);
            }
            Some(RequestBody::NdJson(text)) => {
                if self.debug {
                    debug!(%method, %url, body = %text, "Search engine request");
                }
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .body(text.clone());
            }
            None => {
                if self.debug {
                    debug!(%method, %url, "Search engine request");
                }
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if self.debug {
            debug!(%status, body = %text, "Search engine response");
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }

    /// [`send`](Self::send), turning non-success replies into errors.
    async fn send_ok(&self, method: Method, path: &str, body: Option<RequestBody>) -> Result<Value, SearchError> {
        let (status, value) = self.send(method, path, body).await?;
        if !status.is_success() {
            return Err(engine_error(status, &value));
        }
        Ok(value)
    }

    async fn exists(&self, path: &str) -> Result<bool, SearchError> {
        let (status, value) = self.send(Method::HEAD, path, None).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(engine_error(s, &value)),
        }
    }
}

enum RequestBody {
    Json(Value),
    NdJson(String),
}

fn engine_error(status: StatusCode, body: &Value) -> SearchError {
    let message = match body {
        Value::Null => status.canonical_reason().unwrap_or("no reply body").to_string(),
        Value::String(s) => s.clone(),
        other => other.get("error").unwrap_or(other).to_string(),
    };
    SearchError::Engine { status: status.as_u16(), message }
}

/// `_bulk` request body: one action line and one source line per document.
pub fn bulk_body(documents: &[IndexDocument]) -> Result<String, SearchError> {
    let mut out = String::new();
    for doc in documents {
        out.push_str(&serde_json::to_string(&json!({ "index": { "_id": doc.id } }))?);
        out.push('\n');
        out.push_str(&serde_json::to_string(&doc.body)?);
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, index: &str, doc_type: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        let path = format!("{}/{}/_search", index, doc_type);
        let reply = self.send_ok(Method::POST, &path, Some(RequestBody::Json(body.clone()))).await?;
        SearchResponse::from_json(&reply)
    }

    async fn add_documents(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkResponse, SearchError> {
        if documents.is_empty() {
            return Ok(BulkResponse::default());
        }
        let path = format!("{}/{}/_bulk", index, doc_type);
        let body = bulk_body(documents)?;
        let reply = self.send_ok(Method::POST, &path, Some(RequestBody::NdJson(body))).await?;

        let response = BulkResponse::from_json(documents.len(), reply);
        if response.has_errors() {
            warn!(index, doc_type, failed = response.failed, total = response.total, "Bulk write reported failures");
            return Err(SearchError::Bulk {
                index: index.to_string(),
                doc_type: doc_type.to_string(),
                failed: response.failed,
                total: response.total,
                response: response.raw,
            });
        }
        Ok(response)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        self.exists(index).await
    }

    async fn create_index(&self, index: &str, settings: &Value, overwrite: bool) -> Result<(), SearchError> {
        if overwrite && self.exists(index).await? {
            debug!(index, "Dropping index before re-creation");
            self.send_ok(Method::DELETE, index, None).await?;
        }
        let body = json!({ "settings": settings });
        self.send_ok(Method::PUT, index, Some(RequestBody::Json(body))).await?;
        Ok(())
    }

    async fn type_exists(&self, index: &str, doc_type: &str) -> Result<bool, SearchError> {
        self.exists(&format!("{}/_mapping/{}", index, doc_type)).await
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &TypeMapping) -> Result<(), SearchError> {
        let path = format!("{}/_mapping/{}", index, doc_type);
        let body = json!({ doc_type: mapping.to_json() });
        self.send_ok(Method::PUT, &path, Some(RequestBody::Json(body))).await?;
        Ok(())
    }

    async fn delete_by_query(&self, index: &str, doc_type: &str, query: &Value) -> Result<(), SearchError> {
        let path = format!("{}/{}/_delete_by_query", index, doc_type);
        let body = json!({ "query": query });
        self.send_ok(Method::POST, &path, Some(RequestBody::Json(body))).await?;
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchError> {
        self.send_ok(Method::POST, &format!("{}/_refresh", index), None).await?;
        Ok(())
    }
}
