// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational rows and the documents built from them.
//!
//! # Coercion
//!
//! ```text
//! integer / boolean       → i64            (null → 0)
//! double                  → f64            (null → 0.0)
//! string ending in "_at"  → epoch seconds  (unparsable / null → 0)
//! string                  → transliterated text (null stays null)
//! to-one relation         → sub-document
//! to-many relation        → [sub-document, ...]
//! stat relation           → f64            (null → 0)
//! ```
//!
//! Empty or unloaded to-one/to-many relations are left out of the document.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Map, Value};
use tracing::trace;

use super::normalize::{Lowercase, Transliterate};
use super::schema::{Column, ColumnType, ModelSchema, RelationKind, RelationTree};
use crate::config::SearchSyncConfig;
use crate::error::SearchError;

/// Loaded relation data attached to a row.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Box<Row>),
    Many(Vec<Row>),
    Stat(Option<f64>),
    /// Relation was loaded and is empty
    Empty,
}

/// A relational row: column values plus any eagerly loaded relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub values: Map<String, Value>,
    pub relations: BTreeMap<String, RelationValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row from a JSON object; anything else yields an empty row.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values, relations: BTreeMap::new() },
            _ => Self::default(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, value: RelationValue) -> Self {
        self.relations.insert(name.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Text form of the value in `column`, used as a document id.
    pub fn key(&self, column: &str) -> Option<String> {
        self.get(column).and_then(key_text)
    }
}

/// Text form of a key value. Null, empty text and compound values have none.
pub fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

/// A document ready for the search engine. The id travels next to the body.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub body: Map<String, Value>,
}

/// Builds index documents and type mappings for a [`ModelSchema`].
#[derive(Debug, Clone)]
pub struct DocumentMapper {
    pub(crate) raw_columns: Vec<String>,
    pub(crate) raw_subfield: String,
    pub(crate) date_suffixes: Vec<String>,
    pub(crate) date_formats: String,
    pub(crate) analyzers: bool,
    transliterator: Arc<dyn Transliterate>,
}

impl Default for DocumentMapper {
    fn default() -> Self {
        Self::new(&SearchSyncConfig::default())
    }
}

impl DocumentMapper {
    pub fn new(config: &SearchSyncConfig) -> Self {
        Self {
            raw_columns: config.raw_columns.clone(),
            raw_subfield: config.raw_subfield.clone(),
            date_suffixes: config.date_suffixes.clone(),
            date_formats: config.date_formats.clone(),
            analyzers: config.index.analyzers,
            transliterator: Arc::new(Lowercase),
        }
    }

    /// Replace the default lowercasing hook.
    pub fn with_transliterator(mut self, transliterator: impl Transliterate + 'static) -> Self {
        self.transliterator = Arc::new(transliterator);
        self
    }

    /// String columns whose name ends in a time suffix hold timestamps.
    pub fn is_date_column(&self, column: &Column) -> bool {
        column.column_type == ColumnType::String
            && self.date_suffixes.iter().any(|s| column.name.ends_with(s.as_str()))
    }

    pub(crate) fn raw_columns_for<'a>(&'a self, schema: &'a ModelSchema) -> &'a [String] {
        schema.raw_columns.as_deref().unwrap_or(&self.raw_columns)
    }

    /// Document for `row`, embedding the schema's indexed relations.
    pub fn build_document(&self, schema: &ModelSchema, row: &Row) -> Result<IndexDocument, SearchError> {
        let id = row
            .key(&schema.primary_key)
            .ok_or_else(|| SearchError::MissingKey(schema.table.clone()))?;
        Ok(IndexDocument {
            id,
            body: self.build_body(schema, row, &schema.indexed_relations),
        })
    }

    /// Document body for `row`, following the relations in `tree`.
    pub fn build_body(&self, schema: &ModelSchema, row: &Row, tree: &RelationTree) -> Map<String, Value> {
        let mut body = Map::new();
        for column in &schema.columns {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            body.insert(column.name.clone(), self.coerce(column, value));
        }

        for (name, subtree) in tree.iter() {
            let Some(relation) = schema.relation(name) else {
                trace!(table = %schema.table, relation = name, "Skipping undeclared relation");
                continue;
            };
            let loaded = row.relations.get(name);
            match (&relation.kind, loaded) {
                (RelationKind::Stat { .. }, loaded) => {
                    let total = match loaded {
                        Some(RelationValue::Stat(Some(v))) => *v,
                        _ => 0.0,
                    };
                    body.insert(name.to_string(), json!(total));
                }
                (_, Some(RelationValue::One(related))) => {
                    let sub = self.build_body(&relation.target, related, subtree);
                    body.insert(name.to_string(), Value::Object(sub));
                }
                (_, Some(RelationValue::Many(related))) if !related.is_empty() => {
                    let subs = related
                        .iter()
                        .map(|r| Value::Object(self.build_body(&relation.target, r, subtree)))
                        .collect();
                    body.insert(name.to_string(), Value::Array(subs));
                }
                _ => {}
            }
        }
        body
    }

    fn coerce(&self, column: &Column, value: &Value) -> Value {
        match column.column_type {
            ColumnType::Integer | ColumnType::Boolean => json!(to_integer(value)),
            ColumnType::Double => json!(to_double(value)),
            ColumnType::String if self.is_date_column(column) => json!(epoch_seconds(value)),
            ColumnType::String => match value {
                Value::String(s) => Value::String(self.transliterator.transliterate(s)),
                Value::Number(n) => Value::String(self.transliterator.transliterate(&n.to_string())),
                Value::Bool(b) => Value::String(if *b { "1" } else { "0" }.to_string()),
                _ => Value::Null,
            },
        }
    }
}

fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn to_double(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Epoch seconds (UTC) of a timestamp value; 0 when unparsable or not positive.
pub fn epoch_seconds(value: &Value) -> i64 {
    let seconds = match value {
        Value::String(s) => parse_timestamp(s.trim()).unwrap_or(0),
        Value::Number(n) => n.as_i64().unwrap_or(0),
        _ => 0,
    };
    seconds.max(0)
}

fn parse_timestamp(text: &str) -> Option<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc().timestamp());
    }
    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::AsciiFold;

    fn tags() -> ModelSchema {
        ModelSchema::new("tags", "id").integer("id").integer("product_id").string("caption")
    }

    fn products() -> ModelSchema {
        ModelSchema::new("products", "id")
            .integer("id")
            .string("name")
            .double("price")
            .string("created_at")
    }

    fn widget() -> Row {
        Row::new()
            .with("id", 5)
            .with("name", "Widget")
            .with("price", 19.99)
            .with("created_at", "2024-01-01 00:00:00")
    }

    #[test]
    fn test_widget_document() {
        let doc = DocumentMapper::default().build_document(&products(), &widget()).unwrap();
        assert_eq!(doc.id, "5");
        assert_eq!(
            Value::Object(doc.body),
            json!({"id": 5, "name": "widget", "price": 19.99, "created_at": 1704067200})
        );
    }

    #[test]
    fn test_document_is_deterministic() {
        let mapper = DocumentMapper::default();
        let a = serde_json::to_string(&mapper.build_document(&products(), &widget()).unwrap().body).unwrap();
        let b = serde_json::to_string(&mapper.build_document(&products(), &widget()).unwrap().body).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_key_is_error() {
        let row = Row::new().with("name", "x");
        let err = DocumentMapper::default().build_document(&products(), &row).unwrap_err();
        assert!(matches!(err, SearchError::MissingKey(t) if t == "products"));
    }

    #[test]
    fn test_coercions() {
        let schema = ModelSchema::new("items", "id")
            .integer("id")
            .boolean("active")
            .double("weight")
            .string("updated_at")
            .string("note");
        let row = Row::new()
            .with("id", "12")
            .with("active", true)
            .with("weight", "2.5")
            .with("updated_at", "garbage")
            .with("note", Value::Null);
        let body = DocumentMapper::default().build_body(&schema, &row, &RelationTree::new());
        assert_eq!(body["id"], json!(12));
        assert_eq!(body["active"], json!(1));
        assert_eq!(body["weight"], json!(2.5));
        assert_eq!(body["updated_at"], json!(0));
        assert_eq!(body["note"], Value::Null);
    }

    #[test]
    fn test_epoch_seconds_formats() {
        assert_eq!(epoch_seconds(&json!("2024-01-01")), 1704067200);
        assert_eq!(epoch_seconds(&json!("2024-01-01T01:00:00+01:00")), 1704067200);
        assert_eq!(epoch_seconds(&json!("1960-01-01 00:00:00")), 0);
        assert_eq!(epoch_seconds(&Value::Null), 0);
    }

    #[test]
    fn test_relations_fan_out() {
        let schema = products()
            .has_many("tags", "product_id", tags())
            .belongs_to("maker", "maker_id", ModelSchema::new("makers", "id").integer("id").string("label"))
            .stat("offer_count", "product_id", "COUNT(*)", ModelSchema::new("offers", "id"))
            .index_relations(["tags", "maker", "offer_count", "ghost"]);

        let row = widget()
            .with_relation(
                "tags",
                RelationValue::Many(vec![Row::new().with("id", 1).with("product_id", 5).with("caption", "Red")]),
            )
            .with_relation(
                "maker",
                RelationValue::One(Box::new(Row::new().with("id", 3).with("label", "ACME"))),
            );

        let doc = DocumentMapper::default().build_document(&schema, &row).unwrap();
        assert_eq!(doc.body["tags"], json!([{"id": 1, "product_id": 5, "caption": "red"}]));
        assert_eq!(doc.body["maker"], json!({"id": 3, "label": "acme"}));
        assert_eq!(doc.body["offer_count"], json!(0.0));
        assert!(!doc.body.contains_key("ghost"));
    }

    #[test]
    fn test_empty_relations_are_omitted() {
        let schema = products()
            .has_many("tags", "product_id", tags())
            .has_one("cover", "product_id", ModelSchema::new("covers", "id").integer("id"))
            .index_relations(["tags", "cover"]);
        let row = widget()
            .with_relation("tags", RelationValue::Many(vec![]))
            .with_relation("cover", RelationValue::Empty);

        let doc = DocumentMapper::default().build_document(&schema, &row).unwrap();
        assert!(!doc.body.contains_key("tags"));
        assert!(!doc.body.contains_key("cover"));
    }

    #[test]
    fn test_custom_transliterator() {
        let schema = ModelSchema::new("t", "id").integer("id").string("name");
        let row = Row::new().with("id", 1).with("name", "Crème");
        let mapper = DocumentMapper::default().with_transliterator(AsciiFold);
        let doc = mapper.build_document(&schema, &row).unwrap();
        assert_eq!(doc.body["name"], json!("creme"));
    }

    #[test]
    fn test_key_text() {
        assert_eq!(key_text(&json!(7)), Some("7".to_string()));
        assert_eq!(key_text(&json!("abc")), Some("abc".to_string()));
        assert_eq!(key_text(&json!("")), None);
        assert_eq!(key_text(&Value::Null), None);
    }
}
