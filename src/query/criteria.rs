// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search criteria held by a data provider.

use serde_json::{json, Map, Value};

use super::condition::{ConditionBuilder, FilterValue};
use super::node::QueryNode;
use crate::mapping::ModelSchema;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Parse "asc"/"desc" (any case).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// One entry of a sort list.
#[derive(Debug, Clone, PartialEq)]
pub enum SortField {
    Field { field: String, direction: SortDirection },
    /// Relevance score tie-breaker
    Score,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        SortField::Field { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortField::Field { field: field.into(), direction: SortDirection::Desc }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SortField::Field { field, direction } => json!({ field.as_str(): direction.as_str() }),
            SortField::Score => json!("_score"),
        }
    }
}

/// Query plus sort and paging options for one search.
///
/// An absent query means "match all".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub query: Option<QueryNode>,
    /// Leading sort fields, merged ahead of the provider's resolved sort
    pub sort: Vec<SortField>,
    /// Explicit order, takes precedence over any computed sort
    pub order: Option<Vec<SortField>>,
    pub from: Option<u64>,
    pub size: Option<u64>,
    /// Any other top-level search options (aggs, highlight, ...)
    pub extra: Map<String, Value>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(query: QueryNode) -> Self {
        Self { query: Some(query), ..Default::default() }
    }

    pub fn order(mut self, order: Vec<SortField>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The query as DSL, `match_all` when absent.
    pub fn query_json(&self) -> Value {
        self.query.as_ref().unwrap_or(&QueryNode::MatchAll).to_json()
    }
}

/// Attribute values to turn into conditions, one `compare` per attribute.
///
/// Attributes unknown to the schema and null values are skipped. Each
/// condition uses partial matching (which only affects string columns).
#[derive(Debug, Clone, Default)]
pub struct AttributeFilter {
    values: Vec<(String, Option<FilterValue>)>,
}

impl AttributeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.values.push((attribute.into(), Some(value.into())));
        self
    }

    pub fn set_null(mut self, attribute: impl Into<String>) -> Self {
        self.values.push((attribute.into(), None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Conditions for the set attributes, combined with AND.
    pub fn to_query(&self, schema: &ModelSchema, builder: &ConditionBuilder) -> Option<QueryNode> {
        let conditions: Vec<QueryNode> = self
            .values
            .iter()
            .filter_map(|(attribute, value)| {
                let column = schema.column(attribute)?;
                let value = value.as_ref()?;
                builder.compare_value(&column.name, value, column.column_type, true, None)
            })
            .collect();
        (!conditions.is_empty()).then(|| QueryNode::all_of(conditions))
    }

    /// Criteria for an attribute search, merged with an optional caller query.
    ///
    /// The combined conditions are wrapped in an outer `bool.must`.
    pub fn to_criteria(
        &self,
        schema: &ModelSchema,
        builder: &ConditionBuilder,
        query: Option<QueryNode>,
    ) -> SearchCriteria {
        let parts: Vec<QueryNode> = self
            .to_query(schema, builder)
            .into_iter()
            .chain(query)
            .collect();
        SearchCriteria {
            query: (!parts.is_empty()).then(|| QueryNode::must(parts)),
            ..Default::default()
        }
    }
}
