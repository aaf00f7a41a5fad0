// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search engine clients.
//!
//! - [`HttpSearchClient`]: reqwest transport to an Elasticsearch-compatible
//!   cluster, round-robin over the configured servers
//! - [`MemorySearchClient`]: in-process engine for tests and embedding

mod http;
mod memory;
mod traits;

pub use http::{bulk_body, HttpSearchClient};
pub use memory::{ClientCall, MemorySearchClient};
pub use traits::{BulkResponse, SearchClient, SearchHit, SearchResponse};
