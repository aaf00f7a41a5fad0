// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational model description: columns, relations, indexing declarations.
//!
//! ```rust
//! use search_sync::mapping::ModelSchema;
//!
//! let tags = ModelSchema::new("tags", "id").integer("id").integer("product_id").string("caption");
//! let products = ModelSchema::new("products", "id")
//!     .integer("id")
//!     .string("name")
//!     .double("price")
//!     .string("created_at")
//!     .has_many("tags", "product_id", tags)
//!     .index_relations(["tags"]);
//!
//! assert_eq!(products.type_name(), "products");
//! assert!(products.relation("tags").is_some());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::RowFilter;

/// Column types understood by the mapper. Anything else is a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Boolean,
    Double,
    String,
}

impl ColumnType {
    /// Parse an abstract type name; unknown names are strings.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "integer" => ColumnType::Integer,
            "boolean" => ColumnType::Boolean,
            "double" => ColumnType::Double,
            _ => ColumnType::String,
        }
    }

    /// Classify a declared SQL column type (`BIGINT`, `TINYINT(1)`, `DECIMAL(10,2)`, ...).
    pub fn from_sql(declared: &str) -> Self {
        let decl = declared.to_ascii_lowercase();
        if decl.starts_with("bool") || decl.starts_with("tinyint(1)") || decl == "bit(1)" {
            ColumnType::Boolean
        } else if decl.contains("int") {
            ColumnType::Integer
        } else if ["real", "floa", "doub", "dec", "numeric"].iter().any(|t| decl.contains(t)) {
            ColumnType::Double
        } else {
            ColumnType::String
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Double => "double",
            ColumnType::String => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// How a relation joins to its target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Parent holds `foreign_key` pointing at the target's primary key
    BelongsTo { foreign_key: String },
    /// Target holds `foreign_key` pointing at the parent; at most one row
    HasOne { foreign_key: String },
    /// Target holds `foreign_key` pointing at the parent
    HasMany { foreign_key: String },
    /// Aggregate over target rows (e.g. `COUNT(*)`, `SUM(amount)`)
    Stat { foreign_key: String, aggregate: String },
}

impl RelationKind {
    pub fn foreign_key(&self) -> &str {
        match self {
            RelationKind::BelongsTo { foreign_key }
            | RelationKind::HasOne { foreign_key }
            | RelationKind::HasMany { foreign_key }
            | RelationKind::Stat { foreign_key, .. } => foreign_key,
        }
    }

    pub fn is_stat(&self) -> bool {
        matches!(self, RelationKind::Stat { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub target: Arc<ModelSchema>,
}

/// Relations to follow, as a tree: `["offers.seller", "tags"]` becomes
/// `{offers: {seller: {}}, tags: {}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationTree {
    children: BTreeMap<String, RelationTree>,
}

impl RelationTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from dotted declarations.
    pub fn parse<I, S>(declarations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = RelationTree::new();
        for declaration in declarations {
            let mut node = &mut tree;
            for part in declaration.as_ref().split('.').filter(|p| !p.is_empty()) {
                node = node.children.entry(part.to_string()).or_default();
            }
        }
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelationTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn child(&self, name: &str) -> Option<&RelationTree> {
        self.children.get(name)
    }
}

/// A relational model as seen by the indexer.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    /// Table name
    pub table: String,
    /// Primary key column
    pub primary_key: String,
    /// Table alias used in generated SQL
    pub alias: String,
    /// Search-engine document type (defaults to the table name)
    pub doc_type: Option<String>,
    pub columns: Vec<Column>,
    pub relations: BTreeMap<String, RelationDef>,
    /// Relations embedded in index documents
    pub indexed_relations: RelationTree,
    /// Columns with an unanalyzed subfield (None = configured default)
    pub raw_columns: Option<Vec<String>>,
    /// Extra condition applied when resolving search hits back into rows
    pub find_filter: Option<RowFilter>,
}

impl ModelSchema {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            alias: "t".to_string(),
            doc_type: None,
            columns: Vec::new(),
            relations: BTreeMap::new(),
            indexed_relations: RelationTree::new(),
            raw_columns: None,
            find_filter: None,
        }
    }

    /// Create from introspected columns.
    pub fn from_columns(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        columns: Vec<Column>,
    ) -> Self {
        Self { columns, ..Self::new(table, primary_key) }
    }

    /// Add a column of the given type
    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(Column { name: name.into(), column_type });
        self
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.with_column(name, ColumnType::Integer)
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.with_column(name, ColumnType::Boolean)
    }

    pub fn double(self, name: impl Into<String>) -> Self {
        self.with_column(name, ColumnType::Double)
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.with_column(name, ColumnType::String)
    }

    pub fn belongs_to(self, name: impl Into<String>, foreign_key: impl Into<String>, target: ModelSchema) -> Self {
        self.relation_def(name, RelationKind::BelongsTo { foreign_key: foreign_key.into() }, target)
    }

    pub fn has_one(self, name: impl Into<String>, foreign_key: impl Into<String>, target: ModelSchema) -> Self {
        self.relation_def(name, RelationKind::HasOne { foreign_key: foreign_key.into() }, target)
    }

    pub fn has_many(self, name: impl Into<String>, foreign_key: impl Into<String>, target: ModelSchema) -> Self {
        self.relation_def(name, RelationKind::HasMany { foreign_key: foreign_key.into() }, target)
    }

    pub fn stat(
        self,
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        aggregate: impl Into<String>,
        target: ModelSchema,
    ) -> Self {
        self.relation_def(
            name,
            RelationKind::Stat { foreign_key: foreign_key.into(), aggregate: aggregate.into() },
            target,
        )
    }

    fn relation_def(mut self, name: impl Into<String>, kind: RelationKind, target: ModelSchema) -> Self {
        let name = name.into();
        self.relations.insert(
            name.clone(),
            RelationDef { name, kind, target: Arc::new(target) },
        );
        self
    }

    /// Declare which relations are embedded in documents (dotted paths allowed).
    pub fn index_relations<I, S>(mut self, declarations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.indexed_relations = RelationTree::parse(declarations);
        self
    }

    pub fn raw_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn find_filter(mut self, filter: RowFilter) -> Self {
        self.find_filter = Some(filter);
        self
    }

    /// Document type name in the search engine.
    pub fn type_name(&self) -> &str {
        self.doc_type.as_deref().filter(|t| !t.is_empty()).unwrap_or(&self.table)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// Primary key qualified with the table alias (`t.id`).
    pub fn qualified_key(&self) -> String {
        format!("{}.{}", self.alias, self.primary_key)
    }
}
