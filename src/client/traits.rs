//! Search engine client seam and its request/response types.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SearchError;
use crate::mapping::{IndexDocument, TypeMapping};

/// One search hit: document id, relevance score and stored source.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub source: Map<String, Value>,
}

/// Hits in engine order plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total_hits: u64,
}

impl SearchResponse {
    /// Parse an engine search reply.
    ///
    /// `hits.total` may be a number or `{"value": n}`; a null `_score`
    /// (sorted searches) reads as 0.
    pub fn from_json(body: &Value) -> Result<Self, SearchError> {
        let hits = body
            .get("hits")
            .ok_or_else(|| SearchError::Transport("search reply has no `hits`".into()))?;
        let total_hits = match hits.get("total") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::Object(o)) => o.get("value").and_then(Value::as_u64).unwrap_or(0),
            _ => 0,
        };
        let hits = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|hit| SearchHit {
                        id: hit.get("_id").and_then(crate::mapping::key_text).unwrap_or_default(),
                        score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
                        source: hit
                            .get("_source")
                            .and_then(Value::as_object)
                            .cloned()
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { hits, total_hits })
    }
}

/// Outcome of a bulk write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// Documents submitted
    pub total: usize,
    /// Documents the engine reported as failed
    pub failed: usize,
    /// Raw engine reply
    pub raw: Value,
}

impl BulkResponse {
    /// Read per-item status out of a `_bulk` reply.
    pub fn from_json(total: usize, raw: Value) -> Self {
        let failed = raw
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object()?.values().next())
                    .filter(|action| {
                        action.get("error").is_some_and(|e| !e.is_null())
                            || action.get("status").and_then(Value::as_u64).is_some_and(|s| s >= 300)
                    })
                    .count()
            })
            .unwrap_or(0);
        Self { total, failed, raw }
    }

    pub fn has_errors(&self) -> bool {
        self.failed > 0
    }
}

/// Search engine operations the synchronizer and provider depend on.
///
/// Implementations never retry; failures are reported to the caller as-is.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run a search request body against one index and type.
    async fn search(&self, index: &str, doc_type: &str, body: &Value) -> Result<SearchResponse, SearchError>;

    /// Bulk index (create or replace) documents by id.
    ///
    /// Item failures come back as [`SearchError::Bulk`] carrying the raw reply.
    async fn add_documents(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkResponse, SearchError>;

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    /// Create an index with the given settings, dropping an existing one
    /// first when `overwrite` is set.
    async fn create_index(&self, index: &str, settings: &Value, overwrite: bool) -> Result<(), SearchError>;

    async fn type_exists(&self, index: &str, doc_type: &str) -> Result<bool, SearchError>;

    /// Create or replace the mapping of a document type.
    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &TypeMapping) -> Result<(), SearchError>;

    /// Delete every document of the type matching `query`.
    async fn delete_by_query(&self, index: &str, doc_type: &str, query: &Value) -> Result<(), SearchError>;

    /// Make recent writes visible to search.
    async fn refresh(&self, index: &str) -> Result<(), SearchError>;
}
