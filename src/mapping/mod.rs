// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document Mapping
//!
//! Describes relational models and turns their rows into index documents
//! and engine type mappings.
//!
//! ```text
//! ModelSchema + Row ──build_document──► IndexDocument {id, body}
//! ModelSchema       ──build_mapping───► TypeMapping {dynamic: strict, properties}
//! ```
//!
//! Both walk the same relation tree (declared as dotted names such as
//! `"offers.seller"`); relations not defined on a schema are skipped.

mod document;
mod normalize;
mod properties;
mod schema;

pub use document::{epoch_seconds, key_text, DocumentMapper, IndexDocument, RelationValue, Row};
pub use normalize::{AsciiFold, Lowercase, Transliterate};
pub use properties::{
    index_settings_body, FieldMapping, TypeMapping, BOOST_FIELD, INDEX_ANALYZER, SEARCH_ANALYZER,
};
pub use schema::{Column, ColumnType, ModelSchema, RelationDef, RelationKind, RelationTree};
