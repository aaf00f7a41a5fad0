// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine field mappings and index settings.
//!
//! ```text
//! integer/boolean/double  {"type": <type>, "null_value": 0, "include_in_all": true}
//! date-suffixed string    {"type": "date", "null_value": 0, "include_in_all": true, "format": ...}
//! string                  {"type": "string", "null_value": "", "include_in_all": true}
//!   + raw column          "fields": {"raw": {"type": "string", "index": "not_analyzed"}}
//! _boost                  {"type": "float", "null_value": 1.0, "include_in_all": false}
//! relation                {"type": "nested", "include_in_parent": false, "properties": {...}}
//! stat relation           {"type": "double", "null_value": 0, "include_in_all": true}
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::document::DocumentMapper;
use super::schema::{ColumnType, ModelSchema, RelationKind, RelationTree};
use crate::config::IndexSettings;

pub const INDEX_ANALYZER: &str = "indexAnalyzer";
pub const SEARCH_ANALYZER: &str = "searchAnalyzer";
pub const BOOST_FIELD: &str = "_boost";

/// Mapping of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_in_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_in_parent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Sibling subfields (the raw copy)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldMapping>,
    /// Sub-properties of a nested field
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldMapping>,
}

impl FieldMapping {
    fn typed(field_type: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
            null_value: None,
            include_in_all: None,
            include_in_parent: None,
            format: None,
            index: None,
            fields: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    fn numeric(field_type: &str) -> Self {
        Self {
            null_value: Some(json!(0)),
            include_in_all: Some(true),
            ..Self::typed(field_type)
        }
    }

    fn raw_string() -> Self {
        Self { index: Some("not_analyzed".into()), ..Self::typed("string") }
    }
}

/// Mapping of a document type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeMapping {
    /// Always "strict": unmapped fields are rejected
    pub dynamic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_analyzer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    pub properties: BTreeMap<String, FieldMapping>,
}

impl TypeMapping {
    pub fn to_json(&self) -> Value {
        // Plain data with string keys; serialization cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl DocumentMapper {
    /// Type mapping for `schema`, following its indexed relations.
    pub fn build_mapping(&self, schema: &ModelSchema) -> TypeMapping {
        TypeMapping {
            dynamic: "strict".to_string(),
            index_analyzer: self.analyzers.then(|| INDEX_ANALYZER.to_string()),
            search_analyzer: self.analyzers.then(|| SEARCH_ANALYZER.to_string()),
            properties: self.build_properties(schema, &schema.indexed_relations),
        }
    }

    /// Field mappings for `schema` and the relations in `tree`.
    pub fn build_properties(&self, schema: &ModelSchema, tree: &RelationTree) -> BTreeMap<String, FieldMapping> {
        let raw_columns = self.raw_columns_for(schema);
        let mut properties = BTreeMap::new();

        for column in &schema.columns {
            let mapping = match column.column_type {
                ColumnType::Integer | ColumnType::Boolean | ColumnType::Double => {
                    FieldMapping::numeric(column.column_type.as_str())
                }
                ColumnType::String => {
                    let mut mapping = if self.is_date_column(column) {
                        FieldMapping {
                            format: Some(self.date_formats.clone()),
                            ..FieldMapping::numeric("date")
                        }
                    } else {
                        FieldMapping {
                            null_value: Some(json!("")),
                            include_in_all: Some(true),
                            ..FieldMapping::typed("string")
                        }
                    };
                    if raw_columns.iter().any(|c| c == &column.name) {
                        mapping.fields.insert(self.raw_subfield.clone(), FieldMapping::raw_string());
                    }
                    mapping
                }
            };
            properties.insert(column.name.clone(), mapping);
        }

        properties.insert(
            BOOST_FIELD.to_string(),
            FieldMapping {
                null_value: Some(json!(1.0)),
                include_in_all: Some(false),
                ..FieldMapping::typed("float")
            },
        );

        for (name, subtree) in tree.iter() {
            let Some(relation) = schema.relation(name) else { continue };
            let mapping = match relation.kind {
                RelationKind::Stat { .. } => FieldMapping::numeric("double"),
                _ => FieldMapping {
                    include_in_parent: Some(false),
                    properties: self.build_properties(&relation.target, subtree),
                    ..FieldMapping::typed("nested")
                },
            };
            properties.insert(name.to_string(), mapping);
        }
        properties
    }
}

/// Body of an index-creation request.
pub fn index_settings_body(settings: &IndexSettings) -> Value {
    let mut body = json!({
        "number_of_shards": settings.shards,
        "number_of_replicas": settings.replicas,
    });
    if settings.analyzers {
        body["analysis"] = json!({
            "analyzer": {
                INDEX_ANALYZER: {
                    "type": "custom",
                    "tokenizer": "standard",
                    "filter": ["lowercase"],
                },
                SEARCH_ANALYZER: {
                    "type": "custom",
                    "tokenizer": "standard",
                    "filter": ["standard", "lowercase"],
                },
            }
        });
    }
    body
}
