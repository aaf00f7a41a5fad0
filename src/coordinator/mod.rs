// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search sync coordinator.
//!
//! The [`SearchSync`] hub ties the components together:
//! - one search client and one relational store, shared by every model
//! - one [`IndexSynchronizer`] per registered model type
//! - a [`PendingRegistry`] of models with unflushed documents
//!
//! # Unit of Work
//!
//! ```text
//! on_saved / on_deleted / rebuild ... ──→ commit() ──→ flush + refresh every marked model
//! ```
//!
//! The host calls [`SearchSync::commit`] at the end of its own unit of work
//! (request, job, batch) and [`SearchSync::close`] on shutdown.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use search_sync::{SearchSync, SearchSyncConfig};
//! use search_sync::client::MemorySearchClient;
//! use search_sync::mapping::{ModelSchema, Row};
//! use search_sync::store::MemoryRowStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), search_sync::SearchError> {
//! let config = SearchSyncConfig { index_name: Some("shop".into()), ..Default::default() };
//! let sync = SearchSync::with_clients(
//!     config,
//!     Arc::new(MemorySearchClient::new()),
//!     Arc::new(MemoryRowStore::new()),
//! );
//! sync.register_model(ModelSchema::new("products", "id").integer("id").string("name"));
//!
//! sync.on_saved("products", &Row::new().with("id", 1).with("name", "Widget")).await?;
//! let total = sync.provider("products", Default::default())?.total_item_count().await?;
//! assert_eq!(total, 1);
//! sync.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::client::{HttpSearchClient, SearchClient};
use crate::config::SearchSyncConfig;
use crate::error::SearchError;
use crate::mapping::{ModelSchema, Row};
use crate::provider::SearchDataProvider;
use crate::query::{AttributeFilter, ConditionBuilder, QueryNode, SearchCriteria};
use crate::store::{RelationalStore, SqlRowStore};
use crate::sync::{IndexBootstrap, IndexSynchronizer, PendingRegistry, RebuildOptions, RebuildReport};

/// Entry point: model registry plus save/delete/search/rebuild operations.
pub struct SearchSync {
    config: SearchSyncConfig,
    client: Arc<dyn SearchClient>,
    store: Arc<dyn RelationalStore>,
    models: DashMap<String, Arc<IndexSynchronizer>>,
    registry: Arc<PendingRegistry>,
    conditions: ConditionBuilder,
}

impl SearchSync {
    /// Connect the HTTP search client and the SQL store named in `config`.
    ///
    /// Fails with [`SearchError::Config`] when no search endpoint or no
    /// `sql_url` is configured.
    pub async fn connect(config: SearchSyncConfig) -> Result<Self, SearchError> {
        config.client.validate()?;
        let sql_url = config
            .sql_url
            .clone()
            .ok_or_else(|| SearchError::Config("sql_url is required".into()))?;

        let client = HttpSearchClient::new(&config.client)?;
        let store = SqlRowStore::new(&sql_url).await?;
        info!(index = %config.resolved_index_name(), "Search sync connected");
        Ok(Self::with_clients(config, Arc::new(client), Arc::new(store)))
    }

    /// Build on an existing client and store.
    pub fn with_clients(
        config: SearchSyncConfig,
        client: Arc<dyn SearchClient>,
        store: Arc<dyn RelationalStore>,
    ) -> Self {
        let conditions = ConditionBuilder::new(config.raw_subfield.clone());
        Self {
            config,
            client,
            store,
            models: DashMap::new(),
            registry: Arc::new(PendingRegistry::new()),
            conditions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SearchSyncConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn conditions(&self) -> &ConditionBuilder {
        &self.conditions
    }

    #[must_use]
    pub fn index_name(&self) -> String {
        self.config.resolved_index_name()
    }

    /// Register a model type, replacing any earlier registration of the same type.
    ///
    /// Documents still queued by the replaced registration carry over to the
    /// new one and go out with its next flush.
    pub fn register_model(&self, schema: ModelSchema) -> Arc<IndexSynchronizer> {
        self.insert(self.new_synchronizer(schema))
    }

    /// Register a model type with its own index/mapping creation strategy.
    pub fn register_model_with(
        &self,
        schema: ModelSchema,
        bootstrap: Arc<dyn IndexBootstrap>,
    ) -> Arc<IndexSynchronizer> {
        self.insert(self.new_synchronizer(schema).with_bootstrap(bootstrap))
    }

    /// Register a table using the store's column metadata.
    pub async fn register_table(&self, table: &str, primary_key: &str) -> Result<Arc<IndexSynchronizer>, SearchError> {
        let columns = self.store.column_schema(table).await?;
        Ok(self.register_model(ModelSchema::from_columns(table, primary_key, columns)))
    }

    fn new_synchronizer(&self, schema: ModelSchema) -> IndexSynchronizer {
        IndexSynchronizer::new(self.client.clone(), self.store.clone(), Arc::new(schema), &self.config)
            .with_registry(self.registry.clone())
    }

    fn insert(&self, synchronizer: IndexSynchronizer) -> Arc<IndexSynchronizer> {
        let model = synchronizer.doc_type().to_string();
        match self.models.entry(model.clone()) {
            Entry::Occupied(mut entry) => {
                let synchronizer = Arc::new(synchronizer.with_queue_of(entry.get()));
                entry.insert(synchronizer.clone());
                info!(model = %model, index = %synchronizer.index_name(), "Model re-registered, pending queue kept");
                synchronizer
            }
            Entry::Vacant(entry) => {
                let synchronizer = Arc::new(synchronizer);
                entry.insert(synchronizer.clone());
                info!(model = %model, index = %synchronizer.index_name(), "Model registered");
                synchronizer
            }
        }
    }

    /// Synchronizer of a registered model type.
    pub fn synchronizer(&self, model: &str) -> Result<Arc<IndexSynchronizer>, SearchError> {
        self.models
            .get(model)
            .map(|s| s.value().clone())
            .ok_or_else(|| SearchError::UnknownModel(model.to_string()))
    }

    /// Registered model types, sorted.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        models.sort();
        models
    }

    /// Data provider for `criteria` against a model's index.
    pub fn provider(&self, model: &str, criteria: SearchCriteria) -> Result<SearchDataProvider, SearchError> {
        let synchronizer = self.synchronizer(model)?;
        Ok(SearchDataProvider::new(
            self.client.clone(),
            self.store.clone(),
            synchronizer.schema().clone(),
            synchronizer.index_name(),
            criteria,
        )
        .with_fetch_limit(self.config.fetch_limit))
    }

    /// Search by attribute values, optionally ANDed with a caller query.
    pub fn search(
        &self,
        model: &str,
        filter: &AttributeFilter,
        query: Option<QueryNode>,
    ) -> Result<SearchDataProvider, SearchError> {
        let synchronizer = self.synchronizer(model)?;
        let criteria = filter.to_criteria(synchronizer.schema(), &self.conditions, query);
        self.provider(model, criteria)
    }

    /// Index a saved row immediately.
    pub async fn on_saved(&self, model: &str, row: &Row) -> Result<(), SearchError> {
        self.synchronizer(model)?.index_one(row).await
    }

    /// Remove a deleted row's document.
    pub async fn on_deleted(&self, model: &str, row: &Row) -> Result<(), SearchError> {
        self.synchronizer(model)?.remove(row).await
    }

    /// Queue a row for the next bulk write of its model.
    pub async fn queue(&self, model: &str, row: &Row) -> Result<(), SearchError> {
        let synchronizer = self.synchronizer(model)?;
        synchronizer.queue_document(row).await?;
        synchronizer.flush(None).await?;
        Ok(())
    }

    pub async fn rebuild(&self, model: &str, options: RebuildOptions) -> Result<RebuildReport, SearchError> {
        self.synchronizer(model)?.rebuild(options).await
    }

    /// Flush and refresh every model that queued documents since the last
    /// commit. Returns the number of models swept.
    ///
    /// Every marked model is attempted and the first error is returned.
    /// A failed bulk write drops its documents; the model stays marked so
    /// the next commit refreshes it again.
    pub async fn commit(&self) -> Result<usize, SearchError> {
        let mut swept = 0;
        let mut first_error = None;

        for model in self.registry.take_all() {
            let Ok(synchronizer) = self.synchronizer(&model) else {
                warn!(model = %model, "Pending writes for unregistered model dropped");
                continue;
            };
            let result = async {
                let flushed = synchronizer.flush_pending().await?;
                synchronizer.refresh().await?;
                Ok::<_, SearchError>(flushed)
            }
            .await;

            match result {
                Ok(flushed) => {
                    swept += 1;
                    if flushed > 0 {
                        info!(model = %model, flushed, "Pending documents committed");
                    }
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Commit failed, model stays pending");
                    self.registry.mark(&model);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(swept),
        }
    }

    /// Final commit at the end of the host's lifetime.
    pub async fn close(self) -> Result<(), SearchError> {
        let swept = self.commit().await?;
        info!(models = swept, "Search sync closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientCall, MemorySearchClient};
    use crate::config::ClientConfig;
    use crate::mapping::{Column, ColumnType};
    use crate::store::MemoryRowStore;
    use serde_json::json;

    fn hub() -> (Arc<MemorySearchClient>, Arc<MemoryRowStore>, SearchSync) {
        let client = Arc::new(MemorySearchClient::new());
        let store = Arc::new(MemoryRowStore::new());
        let config = SearchSyncConfig { index_name: Some("shop".into()), bulk_size: 3, ..Default::default() };
        let sync = SearchSync::with_clients(config, client.clone(), store.clone());
        sync.register_model(
            ModelSchema::new("products", "id")
                .integer("id")
                .string("name")
                .double("price"),
        );
        (client, store, sync)
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let (_client, _store, sync) = hub();
        assert!(matches!(sync.synchronizer("orders"), Err(SearchError::UnknownModel(m)) if m == "orders"));
        assert!(sync.on_saved("orders", &Row::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_requires_endpoint() {
        let config = SearchSyncConfig { sql_url: Some("sqlite::memory:".into()), ..Default::default() };
        assert!(matches!(SearchSync::connect(config).await, Err(SearchError::Config(_))));

        let config = SearchSyncConfig {
            client: ClientConfig { host: Some("localhost".into()), port: Some(9200), ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(SearchSync::connect(config).await, Err(SearchError::Config(_))));
    }

    #[tokio::test]
    async fn test_commit_sweeps_pending_models() {
        let (client, _store, sync) = hub();
        sync.queue("products", &Row::new().with("id", 1).with("name", "a")).await.unwrap();
        sync.queue("products", &Row::new().with("id", 2).with("name", "b")).await.unwrap();
        assert_eq!(client.bulk_count(), 0);
        assert!(sync.registry().contains("products"));

        assert_eq!(sync.commit().await.unwrap(), 1);
        assert_eq!(client.bulk_count(), 1);
        assert_eq!(client.documents("shop", "products").len(), 2);
        assert!(matches!(client.calls().last(), Some(ClientCall::Refresh { .. })));
        assert!(sync.registry().is_empty());

        // Nothing pending: nothing to sweep
        assert_eq!(sync.commit().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_drops_batch() {
        let (client, _store, sync) = hub();
        sync.queue("products", &Row::new().with("id", 1)).await.unwrap();
        client.fail_next_bulk(json!({"errors": true}));

        assert!(matches!(sync.commit().await, Err(SearchError::Bulk { failed: 1, .. })));
        assert!(sync.registry().contains("products"));
        assert_eq!(sync.synchronizer("products").unwrap().pending().await, 0);

        assert_eq!(sync.commit().await.unwrap(), 1);
        assert_eq!(client.bulk_count(), 1);
        assert!(client.documents("shop", "products").is_empty());

        sync.on_saved("products", &Row::new().with("id", 2).with("name", "later")).await.unwrap();
        assert!(client.document("shop", "products", "2").is_some());
    }

    #[tokio::test]
    async fn test_reregistration_keeps_queued_documents() {
        let (client, _store, sync) = hub();
        sync.queue("products", &Row::new().with("id", 1).with("name", "a")).await.unwrap();
        sync.queue("products", &Row::new().with("id", 2).with("name", "b")).await.unwrap();

        let replaced = sync.register_model(
            ModelSchema::new("products", "id")
                .integer("id")
                .string("name")
                .double("price")
                .boolean("active"),
        );
        assert_eq!(replaced.pending().await, 2);
        assert_eq!(replaced.schema().columns.len(), 4);

        assert_eq!(sync.commit().await.unwrap(), 1);
        let stored: Vec<String> = client.documents("shop", "products").into_iter().map(|(id, _)| id).collect();
        assert_eq!(stored, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_attribute_search() {
        let (client, store, sync) = hub();
        for (id, name, price) in [(1, "Widget", 5.0), (2, "Widget Pro", 25.0), (3, "Gadget", 30.0)] {
            let row = Row::new().with("id", id).with("name", name).with("price", price);
            store.insert("products", row.clone());
            sync.on_saved("products", &row).await.unwrap();
        }

        let filter = AttributeFilter::new().set("name", "wid").set("price", ">=10").set("unknown", "x");
        let provider = sync.search("products", &filter, None).unwrap();
        assert_eq!(
            provider.criteria().query_json(),
            json!({"bool": {"must": [{"bool": {"must": [
                {"wildcard": {"name": "*wid*"}},
                {"range": {"price": {"gte": 10}}}
            ]}}]}})
        );
        assert_eq!(provider.total_item_count().await.unwrap(), 1);
        let rows = provider.fetch_result_rows().await.unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!(2)));
        assert!(client.calls().iter().any(|c| matches!(c, ClientCall::Search { .. })));
    }

    #[tokio::test]
    async fn test_on_deleted_removes_document() {
        let (client, _store, sync) = hub();
        let row = Row::new().with("id", 9).with("name", "gone");
        sync.on_saved("products", &row).await.unwrap();
        assert!(client.document("shop", "products", "9").is_some());
        sync.on_deleted("products", &row).await.unwrap();
        assert!(client.document("shop", "products", "9").is_none());
    }

    #[tokio::test]
    async fn test_register_table_from_columns() {
        let (_client, store, sync) = hub();
        store.define_columns(
            "makers",
            vec![
                Column { name: "id".into(), column_type: ColumnType::Integer },
                Column { name: "label".into(), column_type: ColumnType::String },
            ],
        );
        let synchronizer = sync.register_table("makers", "id").await.unwrap();
        assert_eq!(synchronizer.schema().columns.len(), 2);
        assert_eq!(sync.models(), vec!["makers".to_string(), "products".to_string()]);
    }
}
