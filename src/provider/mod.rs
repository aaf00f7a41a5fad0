// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search-backed data provider.
//!
//! Hits come back from the engine in relevance order; the matching rows are
//! then loaded from the relational store and returned in that same order,
//! with the score of each hit available by primary key.

mod data_provider;
mod pagination;
mod sort;

pub use data_provider::{SearchDataProvider, DEFAULT_FETCH_LIMIT};
pub use pagination::{Pagination, DEFAULT_PAGE_SIZE};
pub use sort::{parse_order_by, Sort, SortAttribute, SortDefinition};
