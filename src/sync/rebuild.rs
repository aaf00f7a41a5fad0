// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Full index rebuild.
//!
//! ```text
//! page 1:  ORDER BY pk DESC LIMIT n                 → 100 99 .. 91
//! page 2:  WHERE pk <= 91 ORDER BY pk DESC LIMIT n  → (91) 90 .. 82
//! ...      until a page comes back short
//! ```
//!
//! Each page is read in its own transaction and re-anchored on the last key
//! seen, so rows inserted during the rebuild do not shift the window. The
//! anchor row comes back at the head of the next page and is skipped.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::synchronizer::IndexSynchronizer;
use crate::error::SearchError;
use crate::metrics;
use crate::store::{RowFilter, RowOrder, RowQuery};

/// Options for [`IndexSynchronizer::rebuild`].
#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Rows per page (default: configured rebuild page size, minimum 2)
    pub page_size: Option<usize>,
    /// Stop after this many rows
    pub limit: Option<usize>,
    /// Extra row condition
    pub filter: Option<RowFilter>,
    /// Reinstall the type mapping first
    pub reset_mapping: bool,
    /// Drop and recreate the index first
    pub reset_index: bool,
}

impl RebuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn reset_mapping(mut self) -> Self {
        self.reset_mapping = true;
        self
    }

    pub fn reset_index(mut self) -> Self {
        self.reset_index = true;
        self
    }
}

/// Outcome of a rebuild
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
    pub rows: usize,
    pub pages: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

impl IndexSynchronizer {
    /// Re-index every row of the model, newest key first.
    ///
    /// Not atomic: rows written while the rebuild runs may be indexed twice.
    pub async fn rebuild(&self, options: RebuildOptions) -> Result<RebuildReport, SearchError> {
        let start = Instant::now();
        let mut report = RebuildReport::default();

        if options.reset_index {
            self.reset_index().await?;
        }
        if options.reset_index || options.reset_mapping {
            self.reset_mapping().await?;
        } else {
            self.ensure_type().await?;
        }

        let page_size = options.page_size.unwrap_or(self.rebuild_page_size).max(2);
        let limit = options.limit.unwrap_or(usize::MAX);
        let primary_key = self.schema.primary_key.clone();
        let mut anchor: Option<String> = None;

        'pages: while report.rows < limit {
            let mut query = RowQuery::new()
                .order(RowOrder::KeyDesc)
                .limit(page_size)
                .with_relations(self.schema.indexed_relations.clone());
            if let Some(filter) = &options.filter {
                query = query.filter(filter.clone());
            }
            if let Some(key) = &anchor {
                query = query.filter(RowFilter::KeyAtMost(key.clone()));
            }

            let rows = self.store.find_rows_consistent(&self.schema, &query).await?;
            report.pages += 1;
            let fetched = rows.len();
            let mut fresh = 0;

            for row in &rows {
                let key = row.key(&primary_key);
                if key.is_some() && key == anchor {
                    continue;
                }
                if report.rows >= limit {
                    break 'pages;
                }
                self.queue_document(row).await?;
                report.rows += 1;
                fresh += 1;
                if self.flush(None).await? > 0 {
                    report.batches += 1;
                }
                anchor = key;
            }

            debug!(doc_type = self.doc_type(), page = report.pages, fetched, fresh, "Rebuild page done");
            if fetched < page_size || fresh == 0 {
                break;
            }
        }

        if self.flush(Some(0)).await? > 0 {
            report.batches += 1;
        }
        self.refresh().await?;

        report.elapsed = start.elapsed();
        metrics::record_rebuild(self.doc_type(), report.rows, report.elapsed);
        info!(
            index = %self.index,
            doc_type = self.doc_type(),
            rows = report.rows,
            pages = report.pages,
            batches = report.batches,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Rebuild complete"
        );
        Ok(report)
    }
}
