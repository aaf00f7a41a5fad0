// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::bootstrap::{DefaultBootstrap, IndexBootstrap};
use super::registry::PendingRegistry;
use crate::batching::{FlushBatch, FlushReason, PendingQueue};
use crate::client::SearchClient;
use crate::config::SearchSyncConfig;
use crate::error::SearchError;
use crate::mapping::{ColumnType, DocumentMapper, IndexDocument, ModelSchema, Row};
use crate::metrics;
use crate::query::{QueryNode, QueryValue};
use crate::store::RelationalStore;

/// Keeps one model type's index documents in step with its rows.
///
/// Documents are queued and written in bulk once the queue reaches the bulk
/// size. The index and the type mapping are created on first use.
pub struct IndexSynchronizer {
    pub(super) client: Arc<dyn SearchClient>,
    pub(super) store: Arc<dyn RelationalStore>,
    pub(super) schema: Arc<ModelSchema>,
    pub(super) mapper: DocumentMapper,
    pub(super) index: String,
    pub(super) rebuild_page_size: usize,
    queue: Arc<Mutex<PendingQueue<IndexDocument>>>,
    bootstrap: Arc<dyn IndexBootstrap>,
    index_ready: AtomicBool,
    type_ready: AtomicBool,
    registry: Arc<PendingRegistry>,
}

impl IndexSynchronizer {
    pub fn new(
        client: Arc<dyn SearchClient>,
        store: Arc<dyn RelationalStore>,
        schema: Arc<ModelSchema>,
        config: &SearchSyncConfig,
    ) -> Self {
        Self {
            client,
            store,
            schema,
            mapper: DocumentMapper::new(config),
            index: config.resolved_index_name(),
            rebuild_page_size: config.rebuild_page_size,
            queue: Arc::new(Mutex::new(PendingQueue::new(config.bulk_size))),
            bootstrap: Arc::new(DefaultBootstrap::new(config.index.clone())),
            index_ready: AtomicBool::new(false),
            type_ready: AtomicBool::new(false),
            registry: Arc::new(PendingRegistry::new()),
        }
    }

    /// Use a custom index/mapping creation strategy.
    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn IndexBootstrap>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Share a pending-writes registry (one per unit of work).
    pub fn with_registry(mut self, registry: Arc<PendingRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Take over the pending queue of the synchronizer this one replaces,
    /// so documents queued before a re-registration are still written.
    pub(crate) fn with_queue_of(mut self, previous: &IndexSynchronizer) -> Self {
        self.queue = previous.queue.clone();
        self
    }

    pub fn with_mapper(mut self, mapper: DocumentMapper) -> Self {
        self.mapper = mapper;
        self
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index
    }

    #[must_use]
    pub fn doc_type(&self) -> &str {
        self.schema.type_name()
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    #[must_use]
    pub fn mapper(&self) -> &DocumentMapper {
        &self.mapper
    }

    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// Documents waiting for a bulk write.
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Create the index if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<(), SearchError> {
        if self.index_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.client.index_exists(&self.index).await? {
            let created = self.bootstrap.create_index(self.client.as_ref(), &self.index, false).await;
            metrics::record_index_operation("create_index", created.is_ok());
            if let Err(e) = created {
                // Lost a creation race
                if !self.client.index_exists(&self.index).await? {
                    return Err(e);
                }
            }
        }
        self.index_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Create the index and the type mapping if either does not exist yet.
    pub async fn ensure_type(&self) -> Result<(), SearchError> {
        if self.type_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.ensure_index().await?;
        if !self.client.type_exists(&self.index, self.doc_type()).await? {
            self.install_mapping().await?;
        }
        self.type_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop and recreate the index. The mapping is reinstalled on next use.
    pub async fn reset_index(&self) -> Result<(), SearchError> {
        self.type_ready.store(false, Ordering::Release);
        let created = self.bootstrap.create_index(self.client.as_ref(), &self.index, true).await;
        metrics::record_index_operation("reset_index", created.is_ok());
        created?;
        self.index_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Reinstall the type mapping from the current schema.
    pub async fn reset_mapping(&self) -> Result<(), SearchError> {
        self.ensure_index().await?;
        self.install_mapping().await?;
        self.type_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn install_mapping(&self) -> Result<(), SearchError> {
        let mapping = self.mapper.build_mapping(&self.schema);
        let installed = self
            .bootstrap
            .create_type(self.client.as_ref(), &self.index, self.doc_type(), &mapping)
            .await;
        metrics::record_index_operation("put_mapping", installed.is_ok());
        installed
    }

    /// Build the document for `row` and queue it. Returns true once the
    /// queue has reached the bulk size.
    pub async fn queue_document(&self, row: &Row) -> Result<bool, SearchError> {
        let document = self.mapper.build_document(&self.schema, row)?;
        let (ready, pending) = {
            let mut queue = self.queue.lock().await;
            let ready = queue.push(document);
            (ready, queue.len())
        };
        self.registry.mark(self.doc_type());
        metrics::set_pending_documents(self.doc_type(), pending);
        Ok(ready)
    }

    /// Submit the queue as one bulk write if it holds at least `required`
    /// documents (default: the bulk size). `Some(0)` or `Some(1)` flushes
    /// whatever is queued. Returns the number of documents written.
    ///
    /// A failed batch is dropped, not retried.
    pub async fn flush(&self, required: Option<usize>) -> Result<usize, SearchError> {
        let batch = self.queue.lock().await.take_if_ready(required);
        match batch {
            Some(batch) => self.submit(batch).await,
            None => Ok(0),
        }
    }

    /// Flush everything queued, tagged as an end-of-work sweep.
    pub async fn flush_pending(&self) -> Result<usize, SearchError> {
        let batch = self.queue.lock().await.take_with_reason(FlushReason::Commit);
        match batch {
            Some(batch) => self.submit(batch).await,
            None => Ok(0),
        }
    }

    async fn submit(&self, batch: FlushBatch<IndexDocument>) -> Result<usize, SearchError> {
        let count = batch.items.len();
        let reason = batch.reason.as_str();

        if let Err(e) = self.ensure_type().await {
            warn!(index = %self.index, doc_type = self.doc_type(), count, error = %e, "Index unavailable, batch dropped");
            return Err(e);
        }

        let start = Instant::now();
        let written = self.client.add_documents(&self.index, self.doc_type(), &batch.items).await;
        metrics::record_bulk_latency(self.doc_type(), start.elapsed());
        metrics::record_bulk_write(self.doc_type(), reason, count, written.is_ok());

        let pending = self.queue.lock().await.len();
        metrics::set_pending_documents(self.doc_type(), pending);

        match written {
            Ok(_) => {
                debug!(index = %self.index, doc_type = self.doc_type(), count, reason, "Bulk write complete");
                Ok(count)
            }
            Err(e) => {
                warn!(
                    index = %self.index,
                    doc_type = self.doc_type(),
                    count,
                    reason,
                    error = %e,
                    "Bulk write failed, batch dropped"
                );
                Err(e)
            }
        }
    }

    /// Index one row right away: queue, flush and refresh.
    pub async fn index_one(&self, row: &Row) -> Result<(), SearchError> {
        self.queue_document(row).await?;
        self.flush(Some(0)).await?;
        self.refresh().await
    }

    /// Remove the document of `row` from the index.
    pub async fn remove(&self, row: &Row) -> Result<(), SearchError> {
        let key = row
            .key(&self.schema.primary_key)
            .ok_or_else(|| SearchError::MissingKey(self.schema.table.clone()))?;
        self.remove_key(&key).await
    }

    /// Remove the document whose primary key is `key`.
    pub async fn remove_key(&self, key: &str) -> Result<(), SearchError> {
        self.ensure_type().await?;
        let numeric = self
            .schema
            .column(&self.schema.primary_key)
            .is_some_and(|c| c.column_type == ColumnType::Integer);
        let value = match key.parse::<i64>() {
            Ok(n) if numeric => QueryValue::Integer(n),
            _ => QueryValue::Text(key.to_string()),
        };
        let query = QueryNode::Term { field: self.schema.primary_key.clone(), value }.to_json();

        let deleted = self.client.delete_by_query(&self.index, self.doc_type(), &query).await;
        metrics::record_delete(self.doc_type(), deleted.is_ok());
        deleted?;
        info!(index = %self.index, doc_type = self.doc_type(), key, "Document removed");
        Ok(())
    }

    /// Make recent writes visible to search.
    pub async fn refresh(&self) -> Result<(), SearchError> {
        self.ensure_index().await?;
        self.client.refresh(&self.index).await
    }
}
