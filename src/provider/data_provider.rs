// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::pagination::Pagination;
use super::sort::Sort;
use crate::client::{SearchClient, SearchResponse};
use crate::error::SearchError;
use crate::mapping::{key_text, ModelSchema, Row};
use crate::metrics::{self, SearchTimer};
use crate::query::{SearchCriteria, SortField};
use crate::store::{RelationalStore, RowFilter, RowOrder, RowQuery};

/// Max keys resolved back into rows per page
pub const DEFAULT_FETCH_LIMIT: usize = 5000;

/// Ordered hit keys and their relevance scores
#[derive(Debug, Clone, Default)]
struct HitKeys {
    keys: Vec<String>,
    scores: HashMap<String, f64>,
}

/// Runs one search and resolves the hits back into rows.
///
/// Single use: every derived value (sort list, count, hits, rows) is computed
/// on first request and kept for the life of the provider.
///
/// ```text
/// total_item_count ──→ count search (query only)
/// fetch_result_rows ─→ results search (query + sort + from/size)
///                      ─→ keys, scores
///                      ─→ rows WHERE pk IN (keys) ORDER BY key position
/// ```
pub struct SearchDataProvider {
    client: Arc<dyn SearchClient>,
    store: Arc<dyn RelationalStore>,
    schema: Arc<ModelSchema>,
    index: String,
    criteria: SearchCriteria,
    count_criteria: Option<SearchCriteria>,
    sort: Option<Sort>,
    pagination: Option<Pagination>,
    fetch_limit: usize,

    sort_spec: OnceLock<Vec<SortField>>,
    count_response: OnceCell<SearchResponse>,
    results_response: OnceCell<SearchResponse>,
    hit_keys: OnceCell<HitKeys>,
    rows: OnceCell<Vec<Row>>,
}

impl SearchDataProvider {
    pub fn new(
        client: Arc<dyn SearchClient>,
        store: Arc<dyn RelationalStore>,
        schema: Arc<ModelSchema>,
        index: impl Into<String>,
        criteria: SearchCriteria,
    ) -> Self {
        Self {
            client,
            store,
            schema,
            index: index.into(),
            criteria,
            count_criteria: None,
            sort: None,
            pagination: None,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            sort_spec: OnceLock::new(),
            count_response: OnceCell::new(),
            results_response: OnceCell::new(),
            hit_keys: OnceCell::new(),
            rows: OnceCell::new(),
        }
    }

    /// Criteria for the count search (defaults to the main criteria).
    pub fn with_count_criteria(mut self, criteria: SearchCriteria) -> Self {
        self.count_criteria = Some(criteria);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit;
        self
    }

    #[must_use]
    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    #[must_use]
    pub fn count_criteria(&self) -> &SearchCriteria {
        self.count_criteria.as_ref().unwrap_or(&self.criteria)
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Pagination with the item count applied, once the count is known.
    pub async fn pagination(&self) -> Result<Option<Pagination>, SearchError> {
        match self.pagination {
            Some(pagination) => Ok(Some(pagination.with_item_count(self.total_item_count().await?))),
            None => Ok(None),
        }
    }

    /// Resolved sort list, always ending with the relevance score.
    ///
    /// Fields from the criteria come first, then the resolved [`Sort`]
    /// fields they do not already name.
    pub fn get_sort_spec(&self) -> &[SortField] {
        self.sort_spec.get_or_init(|| {
            let mut spec: Vec<SortField> =
                self.criteria.sort.iter().filter(|f| !matches!(f, SortField::Score)).cloned().collect();
            let resolved = self.sort.as_ref().map(Sort::resolve).unwrap_or_default();
            for field in resolved {
                let named = match &field {
                    SortField::Field { field, .. } => {
                        spec.iter().any(|f| matches!(f, SortField::Field { field: taken, .. } if taken == field))
                    }
                    SortField::Score => true,
                };
                if !named {
                    spec.push(field);
                }
            }
            spec.push(SortField::Score);
            spec
        })
    }

    /// Search request body. The count body carries only the query.
    pub async fn get_query(&self, count: bool) -> Result<Value, SearchError> {
        if count {
            return Ok(self.count_body());
        }
        let pagination = self.pagination().await?;
        Ok(self.results_body(pagination))
    }

    fn count_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".into(), self.count_criteria().query_json());
        Value::Object(body)
    }

    fn results_body(&self, pagination: Option<Pagination>) -> Value {
        let criteria = &self.criteria;
        let sort = match &criteria.order {
            Some(order) if !order.is_empty() => order.as_slice(),
            _ => self.get_sort_spec(),
        };

        let mut body = Map::new();
        body.insert("query".into(), criteria.query_json());
        body.insert("sort".into(), Value::Array(sort.iter().map(SortField::to_json).collect()));

        let (from, size) = match pagination {
            Some(p) => (p.offset() as u64, p.limit() as u64),
            None => (criteria.from.unwrap_or(0), criteria.size.unwrap_or(0)),
        };
        if from > 0 {
            body.insert("from".into(), Value::from(from));
        }
        if size > 0 {
            body.insert("size".into(), Value::from(size));
        }
        for (key, value) in &criteria.extra {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }

    /// Run the count or the results search, once per flag.
    pub async fn execute(&self, count: bool) -> Result<&SearchResponse, SearchError> {
        if count {
            self.count_response().await
        } else {
            self.results_response().await
        }
    }

    async fn count_response(&self) -> Result<&SearchResponse, SearchError> {
        self.count_response
            .get_or_try_init(|| async { self.search("count", self.count_body()).await })
            .await
    }

    async fn results_response(&self) -> Result<&SearchResponse, SearchError> {
        self.results_response
            .get_or_try_init(|| async {
                let body = self.get_query(false).await?;
                let response = self.search("results", body).await?;
                metrics::record_search_hits(self.schema.type_name(), response.hits.len());
                Ok(response)
            })
            .await
    }

    async fn search(&self, kind: &str, body: Value) -> Result<SearchResponse, SearchError> {
        let doc_type = self.schema.type_name();
        debug!(index = %self.index, doc_type, kind, "Running search");
        let _timer = SearchTimer::new(doc_type);
        let result = self.client.search(&self.index, doc_type, &body).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_search(doc_type, kind, status);
        result
    }

    /// Total hits reported by the count search.
    pub async fn total_item_count(&self) -> Result<u64, SearchError> {
        Ok(self.count_response().await?.total_hits)
    }

    async fn hit_keys(&self) -> Result<&HitKeys, SearchError> {
        self.hit_keys
            .get_or_try_init(|| async {
                let response = self.results_response().await?;
                let mut hits = HitKeys::default();
                for hit in &response.hits {
                    let key = hit
                        .source
                        .get(&self.schema.primary_key)
                        .and_then(key_text)
                        .unwrap_or_else(|| hit.id.clone());
                    hits.scores.insert(key.clone(), hit.score);
                    hits.keys.push(key);
                }
                Ok(hits)
            })
            .await
    }

    /// Primary keys of the result page, in relevance order.
    pub async fn fetch_keys(&self) -> Result<&[String], SearchError> {
        Ok(&self.hit_keys().await?.keys)
    }

    /// Relevance score per primary key.
    pub async fn scores(&self) -> Result<&HashMap<String, f64>, SearchError> {
        Ok(&self.hit_keys().await?.scores)
    }

    /// Rows of the result page in hit order.
    ///
    /// At most `fetch_limit` keys are resolved. Hits whose row is gone from
    /// the store are dropped.
    pub async fn fetch_result_rows(&self) -> Result<&[Row], SearchError> {
        let rows = self
            .rows
            .get_or_try_init(|| async {
                let keys = self.fetch_keys().await?;
                if keys.is_empty() {
                    return Ok(Vec::new());
                }
                if keys.len() > self.fetch_limit {
                    warn!(
                        doc_type = self.schema.type_name(),
                        hits = keys.len(),
                        limit = self.fetch_limit,
                        "Result page exceeds fetch limit, truncating"
                    );
                }
                let keys: Vec<String> = keys.iter().take(self.fetch_limit).cloned().collect();
                let mut query = RowQuery::new()
                    .filter(RowFilter::KeyIn(keys.clone()))
                    .order(RowOrder::KeyList(keys.clone()))
                    .limit(self.fetch_limit);
                if let Some(filter) = &self.schema.find_filter {
                    query = query.filter(filter.clone());
                }

                let rows = self.store.find_rows(&self.schema, &query).await?;
                metrics::record_rows_fetched(self.schema.type_name(), keys.len(), rows.len());
                Ok::<_, SearchError>(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Rows on the current page
    pub async fn item_count(&self) -> Result<usize, SearchError> {
        Ok(self.fetch_result_rows().await?.len())
    }
}
