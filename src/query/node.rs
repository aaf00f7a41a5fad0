// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query AST and its Elasticsearch query DSL form.
//!
//! # DSL Generated
//!
//! ```text
//! Term      {"term": {"status": "active"}}
//! Terms     {"terms": {"id": [1, 2, 3]}}
//! Range     {"range": {"price": {"gte": 10}}}
//! Match     {"match": {"name": "widget"}}  /  {"match": {"name": {"query": "widget", "boost": 2.0}}}
//! Wildcard  {"wildcard": {"name": "*wid*"}}
//! Fuzzy     {"fuzzy": {"name": {"value": "widgit", "fuzziness": 5, "prefix_length": 1, "max_expansions": 100}}}
//! Bool      {"bool": {"must": [...], "must_not": [...]}}
//! Nested    {"nested": {"path": "tags", "query": {...}}}
//! MatchAll  {"match_all": {}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Scalar operand of a query node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl QueryValue {
    pub fn to_json(&self) -> Value {
        match self {
            QueryValue::Integer(i) => json!(i),
            QueryValue::Float(f) => json!(f),
            QueryValue::Boolean(b) => json!(b),
            QueryValue::Text(s) => json!(s),
        }
    }

    /// Text form, as used for SQL parameters and document keys.
    pub fn as_text(&self) -> String {
        match self {
            QueryValue::Integer(i) => i.to_string(),
            QueryValue::Float(f) => f.to_string(),
            QueryValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            QueryValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::Text(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::Text(s)
    }
}

impl From<i64> for QueryValue {
    fn from(i: i64) -> Self {
        QueryValue::Integer(i)
    }
}

impl From<i32> for QueryValue {
    fn from(i: i32) -> Self {
        QueryValue::Integer(i as i64)
    }
}

impl From<f64> for QueryValue {
    fn from(f: f64) -> Self {
        QueryValue::Float(f)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        QueryValue::Boolean(b)
    }
}

/// Range comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
        }
    }
}

/// Query AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    /// Matches every document
    MatchAll,
    /// Exact term: {"term": {field: value}}
    Term { field: String, value: QueryValue },
    /// Membership: {"terms": {field: [values]}}
    Terms { field: String, values: Vec<QueryValue> },
    /// Bounded comparison: {"range": {field: {op: value}}}
    Range {
        field: String,
        op: RangeOp,
        value: QueryValue,
        boost: Option<f64>,
    },
    /// Analyzed match: {"match": {field: value}}
    Match {
        field: String,
        value: QueryValue,
        boost: Option<f64>,
    },
    /// Wildcard pattern: {"wildcard": {field: "*x*"}}
    Wildcard {
        field: String,
        pattern: String,
        boost: Option<f64>,
    },
    /// Edit-distance match
    Fuzzy {
        field: String,
        value: String,
        fuzziness: u32,
        prefix_length: u32,
        max_expansions: u32,
        boost: Option<f64>,
    },
    /// Boolean combination
    Bool {
        must: Vec<QueryNode>,
        must_not: Vec<QueryNode>,
    },
    /// Query scoped to a nested document path
    Nested { path: String, query: Box<QueryNode> },
}

impl QueryNode {
    /// `Bool{must}` over the given nodes.
    pub fn must(nodes: Vec<QueryNode>) -> Self {
        QueryNode::Bool { must: nodes, must_not: Vec::new() }
    }

    /// `Bool{must_not}` over the given nodes.
    pub fn must_not(nodes: Vec<QueryNode>) -> Self {
        QueryNode::Bool { must: Vec::new(), must_not: nodes }
    }

    /// AND the nodes together, splicing in children of pure-`must` bools so
    /// the result stays one level deep.
    pub fn all_of(nodes: Vec<QueryNode>) -> Self {
        let mut must = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                QueryNode::Bool { must: inner, must_not } if must_not.is_empty() => {
                    must.extend(inner)
                }
                other => must.push(other),
            }
        }
        QueryNode::must(must)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, QueryNode::Nested { .. })
    }

    /// Render as Elasticsearch query DSL.
    pub fn to_json(&self) -> Value {
        match self {
            QueryNode::MatchAll => json!({ "match_all": {} }),
            QueryNode::Term { field, value } => {
                json!({ "term": { field.as_str(): value.to_json() } })
            }
            QueryNode::Terms { field, values } => {
                let values: Vec<Value> = values.iter().map(QueryValue::to_json).collect();
                json!({ "terms": { field.as_str(): values } })
            }
            QueryNode::Range { field, op, value, boost } => {
                let mut bounds = Map::new();
                bounds.insert(op.as_str().to_string(), value.to_json());
                if let Some(b) = boost {
                    bounds.insert("boost".to_string(), json!(b));
                }
                json!({ "range": { field.as_str(): bounds } })
            }
            QueryNode::Match { field, value, boost } => {
                let body = match boost {
                    None => value.to_json(),
                    Some(b) => json!({ "query": value.to_json(), "boost": b }),
                };
                json!({ "match": { field.as_str(): body } })
            }
            QueryNode::Wildcard { field, pattern, boost } => {
                let body = match boost {
                    None => json!(pattern),
                    Some(b) => json!({ "value": pattern, "boost": b }),
                };
                json!({ "wildcard": { field.as_str(): body } })
            }
            QueryNode::Fuzzy {
                field,
                value,
                fuzziness,
                prefix_length,
                max_expansions,
                boost,
            } => {
                let mut body = Map::new();
                body.insert("value".into(), json!(value));
                body.insert("fuzziness".into(), json!(fuzziness));
                body.insert("prefix_length".into(), json!(prefix_length));
                body.insert("max_expansions".into(), json!(max_expansions));
                if let Some(b) = boost {
                    body.insert("boost".into(), json!(b));
                }
                json!({ "fuzzy": { field.as_str(): body } })
            }
            QueryNode::Bool { must, must_not } => {
                let mut body = Map::new();
                if !must.is_empty() {
                    body.insert(
                        "must".into(),
                        Value::Array(must.iter().map(QueryNode::to_json).collect()),
                    );
                }
                if !must_not.is_empty() {
                    body.insert(
                        "must_not".into(),
                        Value::Array(must_not.iter().map(QueryNode::to_json).collect()),
                    );
                }
                json!({ "bool": body })
            }
            QueryNode::Nested { path, query } => {
                json!({ "nested": { "path": path, "query": query.to_json() } })
            }
        }
    }
}
