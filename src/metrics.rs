// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for search-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `search_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `index`: search engine index
//! - `doc_type`: document type (model)
//! - `kind`: `count` or `results` for searches
//! - `status`: success, error
//! - `reason`: threshold, forced, commit for bulk flushes

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a search request
pub fn record_search(doc_type: &str, kind: &str, status: &str) {
    counter!(
        "search_sync_searches_total",
        "doc_type" => doc_type.to_string(),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record search round-trip latency
pub fn record_search_latency(doc_type: &str, duration: Duration) {
    histogram!(
        "search_sync_search_seconds",
        "doc_type" => doc_type.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record hits returned by a results search
pub fn record_search_hits(doc_type: &str, count: usize) {
    histogram!(
        "search_sync_search_hits",
        "doc_type" => doc_type.to_string()
    )
    .record(count as f64);
}

/// Record a bulk submission
pub fn record_bulk_write(doc_type: &str, reason: &str, count: usize, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "search_sync_bulk_writes_total",
        "doc_type" => doc_type.to_string(),
        "reason" => reason.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    if success {
        counter!(
            "search_sync_documents_indexed_total",
            "doc_type" => doc_type.to_string()
        )
        .increment(count as u64);
    } else {
        counter!(
            "search_sync_bulk_failed_documents_total",
            "doc_type" => doc_type.to_string()
        )
        .increment(count as u64);
    }
}

/// Record bulk submission latency
pub fn record_bulk_latency(doc_type: &str, duration: Duration) {
    histogram!(
        "search_sync_bulk_seconds",
        "doc_type" => doc_type.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set documents waiting in a pending queue
pub fn set_pending_documents(doc_type: &str, count: usize) {
    gauge!(
        "search_sync_pending_documents",
        "doc_type" => doc_type.to_string()
    )
    .set(count as f64);
}

/// Record a delete-by-query
pub fn record_delete(doc_type: &str, success: bool) {
    counter!(
        "search_sync_deletes_total",
        "doc_type" => doc_type.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record index or mapping creation
pub fn record_index_operation(operation: &str, success: bool) {
    counter!(
        "search_sync_index_operations_total",
        "operation" => operation.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record a finished rebuild
pub fn record_rebuild(doc_type: &str, rows: usize, duration: Duration) {
    counter!(
        "search_sync_rebuild_rows_total",
        "doc_type" => doc_type.to_string()
    )
    .increment(rows as u64);
    histogram!(
        "search_sync_rebuild_seconds",
        "doc_type" => doc_type.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record rows resolved back from search hits
pub fn record_rows_fetched(doc_type: &str, requested: usize, returned: usize) {
    histogram!(
        "search_sync_rows_fetched",
        "doc_type" => doc_type.to_string()
    )
    .record(returned as f64);
    if returned < requested {
        counter!(
            "search_sync_missing_rows_total",
            "doc_type" => doc_type.to_string()
        )
        .increment((requested - returned) as u64);
    }
}

/// Timer guard that records search latency on drop
pub struct SearchTimer {
    doc_type: String,
    start: Instant,
}

impl SearchTimer {
    #[must_use]
    pub fn new(doc_type: &str) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for SearchTimer {
    fn drop(&mut self) {
        record_search_latency(&self.doc_type, self.start.elapsed());
    }
}
