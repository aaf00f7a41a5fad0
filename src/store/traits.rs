//! Row store seam: the data-access operations the sync and provider layers need.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SearchError;
use crate::mapping::{Column, ModelSchema, RelationTree, Row};

/// Row selection condition. Keys are compared against the model's primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    /// Primary key in the set (an empty set selects nothing)
    KeyIn(Vec<String>),
    /// Primary key less than or equal to the value
    KeyAtMost(String),
    /// Column value in the set
    In { column: String, values: Vec<Value> },
    /// Column equals the value
    Eq { column: String, value: Value },
    /// SQL condition with positional `?` parameters
    Raw { clause: String, params: Vec<Value> },
    And(Vec<RowFilter>),
}

impl RowFilter {
    pub fn raw(clause: impl Into<String>) -> Self {
        RowFilter::Raw { clause: clause.into(), params: Vec::new() }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        RowFilter::Eq { column: column.into(), value: value.into() }
    }

    /// Combine with another filter, flattening nested `And`s.
    pub fn and(self, other: RowFilter) -> Self {
        let mut parts = match self {
            RowFilter::And(parts) => parts,
            single => vec![single],
        };
        match other {
            RowFilter::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        RowFilter::And(parts)
    }
}

/// Row ordering
#[derive(Debug, Clone, PartialEq)]
pub enum RowOrder {
    KeyAsc,
    KeyDesc,
    /// Exactly the order of the given keys
    KeyList(Vec<String>),
    /// SQL ORDER BY expression
    Raw(String),
}

/// A row fetch: filter, order, window and relations to load eagerly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    pub filter: Option<RowFilter>,
    pub order: Option<RowOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub relations: RelationTree,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition (ANDed with any existing one).
    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order(mut self, order: RowOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_relations(mut self, relations: RelationTree) -> Self {
        self.relations = relations;
        self
    }
}

/// The relational system of record, as seen by the indexer and provider.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Rows of `schema` matching the query, relations attached.
    async fn find_rows(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError>;

    /// [`find_rows`](Self::find_rows) against one consistent snapshot
    /// (a transaction where the store has them).
    async fn find_rows_consistent(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError> {
        self.find_rows(schema, query).await
    }

    /// Column names and abstract types of a table.
    async fn column_schema(&self, table: &str) -> Result<Vec<Column>, SearchError>;
}
