// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attribute comparison → query node translation.
//!
//! Follows the operator grammar of a relational `compare` helper so filter
//! code written against the database can target the search engine instead:
//!
//! ```text
//! "widget"     → match
//! "!=widget"   → bool.must_not[match]
//! ">=10"       → range.gte
//! [1, 2, 3]    → terms
//! "red shoe"   → bool.must[wildcard *red*, wildcard *shoe*]   (partial match)
//! "tags.name"  → nested{path: tags, query: ...}
//! ```
//!
//! An unusable operand (empty text, empty list, bare operator) yields `None`:
//! the caller drops the clause.

use std::sync::LazyLock;

use regex::Regex;

use super::node::{QueryNode, QueryValue, RangeOp};
use crate::mapping::ColumnType;

static OPERATOR: LazyLock<Regex> = LazyLock::new(|| {
    // (?s) so a multi-line operand survives intact
    Regex::new(r"(?s)^\s*(!=|<>|<=|>=|<|>|=)?(.*)$").expect("operator pattern is valid")
});

pub const DEFAULT_FUZZINESS: u32 = 5;
pub const FUZZY_PREFIX_LENGTH: u32 = 1;
pub const FUZZY_MAX_EXPANSIONS: u32 = 100;

/// Comparison operand: a scalar (parsed for a leading operator) or a list.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<QueryValue>),
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Scalar(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Scalar(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Scalar(i.to_string())
    }
}

impl From<f64> for FilterValue {
    fn from(f: f64) -> Self {
        FilterValue::Scalar(f.to_string())
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Scalar(if b { "1" } else { "0" }.to_string())
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Comparison operator extracted from the head of a scalar operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    NotEq,
    Range(RangeOp),
}

impl Operator {
    fn parse(token: Option<&str>) -> Self {
        match token {
            Some("!=") | Some("<>") => Operator::NotEq,
            Some("<") => Operator::Range(RangeOp::Lt),
            Some("<=") => Operator::Range(RangeOp::Lte),
            Some(">") => Operator::Range(RangeOp::Gt),
            Some(">=") => Operator::Range(RangeOp::Gte),
            _ => Operator::Eq,
        }
    }
}

/// Builds query nodes from attribute comparisons.
///
/// Holds only the name of the unanalyzed sibling subfield; the "already
/// nested" state is passed down each call chain explicitly.
#[derive(Debug, Clone)]
pub struct ConditionBuilder {
    raw_subfield: String,
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self::new("raw")
    }
}

impl ConditionBuilder {
    pub fn new(raw_subfield: impl Into<String>) -> Self {
        Self { raw_subfield: raw_subfield.into() }
    }

    pub fn raw_subfield(&self) -> &str {
        &self.raw_subfield
    }

    /// Compare `field` against `value`.
    ///
    /// Dotted fields are routed through [`nested_compare`](Self::nested_compare)
    /// and come back wrapped in exactly one `Nested` node.
    pub fn compare(
        &self,
        field: &str,
        value: impl Into<FilterValue>,
        column_type: ColumnType,
        partial_match: bool,
        boost: Option<f64>,
    ) -> Option<QueryNode> {
        self.compare_at(field, &value.into(), column_type, partial_match, boost, false)
    }

    /// [`compare`](Self::compare) for an operand that is already built.
    pub fn compare_value(
        &self,
        field: &str,
        value: &FilterValue,
        column_type: ColumnType,
        partial_match: bool,
        boost: Option<f64>,
    ) -> Option<QueryNode> {
        self.compare_at(field, value, column_type, partial_match, boost, false)
    }

    /// Compare a field inside a nested document.
    ///
    /// The path is everything before the last separator, after folding a
    /// trailing raw subfield back into the field name. A field with no
    /// remaining path (`caption.raw`) is compared without nesting.
    pub fn nested_compare(
        &self,
        field: &str,
        value: impl Into<FilterValue>,
        column_type: ColumnType,
        partial_match: bool,
        boost: Option<f64>,
    ) -> Option<QueryNode> {
        self.nested_compare_at(field, &value.into(), column_type, partial_match, boost)
    }

    /// Fuzzy match with the given edit distance (default 5).
    pub fn fuzzy(
        &self,
        field: &str,
        value: &str,
        boost: Option<f64>,
        fuzziness: Option<u32>,
    ) -> Option<QueryNode> {
        if value.is_empty() {
            return None;
        }
        let node = QueryNode::Fuzzy {
            field: field.to_string(),
            value: value.to_string(),
            fuzziness: fuzziness.unwrap_or(DEFAULT_FUZZINESS),
            prefix_length: FUZZY_PREFIX_LENGTH,
            max_expansions: FUZZY_MAX_EXPANSIONS,
            boost,
        };
        Some(match self.nested_path(field) {
            Some(path) => QueryNode::Nested { path, query: Box::new(node) },
            None => node,
        })
    }

    fn compare_at(
        &self,
        field: &str,
        value: &FilterValue,
        column_type: ColumnType,
        partial_match: bool,
        boost: Option<f64>,
        nested: bool,
    ) -> Option<QueryNode> {
        if !nested && field.contains('.') {
            return self.nested_compare_at(field, value, column_type, partial_match, boost);
        }

        let partial_match = partial_match && column_type == ColumnType::String;

        let text = match value {
            FilterValue::List(values) if values.is_empty() => return None,
            FilterValue::List(values) => {
                return Some(QueryNode::Terms {
                    field: field.to_string(),
                    values: values.clone(),
                })
            }
            FilterValue::Scalar(text) => text,
        };

        let captures = OPERATOR.captures(text)?;
        let op = Operator::parse(captures.get(1).map(|m| m.as_str()));
        let operand = captures.get(2).map_or("", |m| m.as_str());
        if operand.is_empty() {
            return None;
        }

        if partial_match {
            return build_partial_match(field, operand, op == Operator::NotEq, boost);
        }

        let value = typed_operand(operand, column_type);
        Some(match op {
            Operator::Eq => QueryNode::Match { field: field.to_string(), value, boost },
            Operator::NotEq => QueryNode::must_not(vec![QueryNode::Match {
                field: field.to_string(),
                value,
                boost,
            }]),
            Operator::Range(op) => QueryNode::Range { field: field.to_string(), op, value, boost },
        })
    }

    fn nested_compare_at(
        &self,
        field: &str,
        value: &FilterValue,
        column_type: ColumnType,
        partial_match: bool,
        boost: Option<f64>,
    ) -> Option<QueryNode> {
        let inner = self.compare_at(field, value, column_type, partial_match, boost, true)?;
        Some(match self.nested_path(field) {
            Some(path) => QueryNode::Nested { path, query: Box::new(inner) },
            None => inner,
        })
    }

    /// Nested document path of a dotted field, if it has one.
    pub fn nested_path(&self, field: &str) -> Option<String> {
        let (mut head, mut leaf) = field.rsplit_once('.')?;
        if leaf == self.raw_subfield {
            (head, leaf) = head.rsplit_once('.')?;
        }
        (!head.is_empty() && !leaf.is_empty()).then(|| head.to_string())
    }
}

/// One wildcard per whitespace-separated token.
fn build_partial_match(
    field: &str,
    operand: &str,
    negate: bool,
    boost: Option<f64>,
) -> Option<QueryNode> {
    let clauses: Vec<QueryNode> = operand
        .split_whitespace()
        .map(|token| QueryNode::Wildcard {
            field: field.to_string(),
            pattern: format!("*{}*", token),
            boost,
        })
        .collect();
    if clauses.is_empty() {
        return None;
    }
    Some(if negate { QueryNode::must_not(clauses) } else { QueryNode::must(clauses) })
}

/// Parse an operand according to the column type. Text that does not parse
/// as the column type is kept verbatim and left for the engine to reject.
fn typed_operand(operand: &str, column_type: ColumnType) -> QueryValue {
    let trimmed = operand.trim();
    match column_type {
        ColumnType::Integer | ColumnType::Double => trimmed
            .parse::<i64>()
            .map(QueryValue::Integer)
            .or_else(|_| trimmed.parse::<f64>().map(QueryValue::Float))
            .unwrap_or_else(|_| QueryValue::Text(operand.to_string())),
        ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "1" | "true" => QueryValue::Boolean(true),
            "0" | "false" => QueryValue::Boolean(false),
            _ => QueryValue::Text(operand.to_string()),
        },
        ColumnType::String => QueryValue::Text(operand.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> ConditionBuilder {
        ConditionBuilder::default()
    }

    #[test]
    fn test_plain_value_is_match() {
        let node = builder().compare("name", "widget", ColumnType::String, false, None);
        assert_eq!(node.unwrap().to_json(), json!({"match": {"name": "widget"}}));
    }

    #[test]
    fn test_explicit_equals_is_match() {
        let node = builder().compare("name", "=widget", ColumnType::String, false, None);
        assert_eq!(node.unwrap().to_json(), json!({"match": {"name": "widget"}}));
    }

    #[test]
    fn test_not_equal_operators() {
        for input in ["!=widget", "<>widget", "  != widget"] {
            let node = builder().compare("name", input, ColumnType::String, false, None).unwrap();
            match node {
                QueryNode::Bool { must, must_not } => {
                    assert!(must.is_empty());
                    assert_eq!(must_not.len(), 1);
                }
                _ => panic!("Expected Bool node for {input}"),
            }
        }
    }

    #[test]
    fn test_numeric_range() {
        let node = builder().compare("price", ">=10", ColumnType::Double, false, None);
        assert_eq!(node.unwrap().to_json(), json!({"range": {"price": {"gte": 10}}}));

        let node = builder().compare("price", "<9.5", ColumnType::Double, false, None);
        assert_eq!(node.unwrap().to_json(), json!({"range": {"price": {"lt": 9.5}}}));

        let node = builder().compare("stock", "<=3", ColumnType::Integer, false, Some(2.0));
        assert_eq!(
            node.unwrap().to_json(),
            json!({"range": {"stock": {"lte": 3, "boost": 2.0}}})
        );
    }

    #[test]
    fn test_boolean_operand() {
        let node = builder().compare("active", true, ColumnType::Boolean, false, None);
        assert_eq!(node.unwrap().to_json(), json!({"match": {"active": true}}));
    }

    #[test]
    fn test_empty_operand_is_no_condition() {
        let b = builder();
        assert!(b.compare("name", "", ColumnType::String, false, None).is_none());
        assert!(b.compare("name", ">=", ColumnType::String, false, None).is_none());
        assert!(b.compare("name", "!=", ColumnType::String, true, None).is_none());
        assert!(b
            .compare("id", Vec::<i64>::new(), ColumnType::Integer, false, None)
            .is_none());
    }

    #[test]
    fn test_list_is_terms() {
        let node = builder().compare("id", vec![7i64, 3, 9], ColumnType::Integer, false, None);
        assert_eq!(node.unwrap().to_json(), json!({"terms": {"id": [7, 3, 9]}}));
    }

    #[test]
    fn test_partial_match_tokens() {
        let node = builder()
            .compare("name", "red  shoe", ColumnType::String, true, None)
            .unwrap();
        assert_eq!(
            node.to_json(),
            json!({"bool": {"must": [
                {"wildcard": {"name": "*red*"}},
                {"wildcard": {"name": "*shoe*"}}
            ]}})
        );
    }

    #[test]
    fn test_partial_match_negated_with_boost() {
        let node = builder()
            .compare("name", "<>red", ColumnType::String, true, Some(3.0))
            .unwrap();
        assert_eq!(
            node.to_json(),
            json!({"bool": {"must_not": [
                {"wildcard": {"name": {"value": "*red*", "boost": 3.0}}}
            ]}})
        );
    }

    #[test]
    fn test_partial_match_ignored_for_numbers() {
        let node = builder().compare("stock", "12", ColumnType::Integer, true, None);
        assert_eq!(node.unwrap().to_json(), json!({"match": {"stock": 12}}));
    }

    #[test]
    fn test_dotted_field_nests_once() {
        let node = builder()
            .compare("tags.caption", "red", ColumnType::String, false, None)
            .unwrap();
        assert_eq!(
            node.to_json(),
            json!({"nested": {"path": "tags", "query": {"match": {"tags.caption": "red"}}}})
        );
    }

    #[test]
    fn test_raw_suffix_folds_into_field() {
        let b = builder();
        let node = b.compare("tags.caption.raw", "Red", ColumnType::String, false, None).unwrap();
        assert_eq!(
            node.to_json(),
            json!({"nested": {"path": "tags", "query": {"match": {"tags.caption.raw": "Red"}}}})
        );

        // A raw subfield of a top-level column is not a nesting level
        let node = b.compare("caption.raw", "Red", ColumnType::String, false, None).unwrap();
        assert_eq!(node.to_json(), json!({"match": {"caption.raw": "Red"}}));
    }

    #[test]
    fn test_deep_path() {
        let node = builder()
            .compare("offers.seller.name", "acme", ColumnType::String, false, None)
            .unwrap();
        match node {
            QueryNode::Nested { path, query } => {
                assert_eq!(path, "offers.seller");
                assert!(!query.is_nested());
            }
            _ => panic!("Expected Nested node"),
        }
    }

    #[test]
    fn test_interleaved_calls_do_not_leak_nesting() {
        let b = builder();
        let nested = b.compare("tags.caption", "red", ColumnType::String, false, None).unwrap();
        let flat = b.compare("name", "red", ColumnType::String, false, None).unwrap();
        let nested_again = b.compare("tags.caption", "red", ColumnType::String, false, None).unwrap();
        assert!(nested.is_nested());
        assert!(!flat.is_nested());
        assert_eq!(nested, nested_again);
    }

    #[test]
    fn test_fuzzy() {
        let b = builder();
        assert!(b.fuzzy("name", "", None, None).is_none());

        let node = b.fuzzy("name", "widgit", Some(1.5), None).unwrap();
        assert_eq!(
            node.to_json(),
            json!({"fuzzy": {"name": {
                "value": "widgit", "fuzziness": 5, "prefix_length": 1,
                "max_expansions": 100, "boost": 1.5
            }}})
        );

        let node = b.fuzzy("tags.caption.raw", "red", None, Some(2)).unwrap();
        match node {
            QueryNode::Nested { path, query } => {
                assert_eq!(path, "tags");
                match *query {
                    QueryNode::Fuzzy { field, fuzziness, .. } => {
                        assert_eq!(field, "tags.caption.raw");
                        assert_eq!(fuzziness, 2);
                    }
                    _ => panic!("Expected Fuzzy node"),
                }
            }
            _ => panic!("Expected Nested node"),
        }
    }
}
