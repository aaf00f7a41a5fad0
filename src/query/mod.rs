// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query Translation
//!
//! Turns attribute comparisons into an Elasticsearch boolean query tree.
//!
//! # Architecture
//!
//! ```text
//! (field, value, type, partial, boost)
//!     ↓ ConditionBuilder::compare
//! QueryNode (AST)
//!     ↓ QueryNode::to_json
//! query DSL  {"bool": {"must": [...]}}
//! ```
//!
//! # Example
//!
//! ```rust
//! use search_sync::mapping::ColumnType;
//! use search_sync::query::{ConditionBuilder, QueryNode};
//!
//! let builder = ConditionBuilder::default();
//! let name = builder.compare("name", "wid", ColumnType::String, true, None).unwrap();
//! let price = builder.compare("price", ">=10", ColumnType::Double, false, None).unwrap();
//! let query = QueryNode::all_of(vec![name, price]);
//!
//! assert_eq!(
//!     query.to_json().to_string(),
//!     r#"{"bool":{"must":[{"wildcard":{"name":"*wid*"}},{"range":{"price":{"gte":10}}}]}}"#
//! );
//! ```

mod condition;
mod criteria;
mod node;

pub use condition::{
    ConditionBuilder, FilterValue, DEFAULT_FUZZINESS, FUZZY_MAX_EXPANSIONS, FUZZY_PREFIX_LENGTH,
};
pub use criteria::{AttributeFilter, SearchCriteria, SortDirection, SortField};
pub use node::{QueryNode, QueryValue, RangeOp};
