//! Property-based tests for the condition builder and document mapper.
//!
//! Uses proptest to generate random operands and rows and verify the
//! builders never panic and keep their structural guarantees.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Value};

use search_sync::mapping::{ColumnType, DocumentMapper, ModelSchema, Row};
use search_sync::query::{ConditionBuilder, QueryNode};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn column_type_strategy() -> impl Strategy<Value = ColumnType> {
    prop_oneof![
        Just(ColumnType::Integer),
        Just(ColumnType::Double),
        Just(ColumnType::Boolean),
        Just(ColumnType::String),
    ]
}

/// Dotted field names such as "offers.seller.caption", never ending in the raw subfield
fn dotted_field_strategy() -> impl Strategy<Value = String> {
    "[a-m]{1,8}(\\.[a-m]{1,8}){1,3}"
}

/// Row values of mixed JSON types
fn cell_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
        ".{0,40}".prop_map(Value::String),
        "20[0-9]{2}-0[1-9]-1[0-9] 0[0-9]:[0-5][0-9]:[0-5][0-9]".prop_map(Value::String),
    ]
}

fn products() -> ModelSchema {
    ModelSchema::new("products", "id")
        .integer("id")
        .string("name")
        .double("price")
        .boolean("active")
        .string("created_at")
}

fn count_nested(node: &QueryNode) -> usize {
    match node {
        QueryNode::Nested { query, .. } => 1 + count_nested(query),
        QueryNode::Bool { must, must_not } => must.iter().chain(must_not).map(count_nested).sum(),
        _ => 0,
    }
}

// =============================================================================
// Condition builder
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_compare_never_panics(
        field in "[a-z._]{0,20}",
        value in ".{0,40}",
        column_type in column_type_strategy(),
        partial in any::<bool>(),
    ) {
        let _ = ConditionBuilder::default().compare(&field, value.as_str(), column_type, partial, None);
    }

    #[test]
    fn prop_blank_operand_yields_nothing(
        op in prop_oneof![Just(""), Just("="), Just("!="), Just("<>"), Just(">="), Just("<")],
        padding in " {0,4}",
        column_type in column_type_strategy(),
    ) {
        let value = format!("{padding}{op}");
        let node = ConditionBuilder::default().compare("name", value.as_str(), column_type, false, None);
        prop_assert!(node.is_none());
    }

    #[test]
    fn prop_dotted_field_nests_once(
        field in dotted_field_strategy(),
        value in "[a-z0-9]{1,12}",
        column_type in column_type_strategy(),
        partial in any::<bool>(),
    ) {
        let node = ConditionBuilder::default()
            .compare(&field, value.as_str(), column_type, partial, None)
            .unwrap();
        prop_assert_eq!(count_nested(&node), 1);
        prop_assert!(matches!(node, QueryNode::Nested { .. }), "expected QueryNode::Nested");
    }

    #[test]
    fn prop_plain_value_is_match(value in "[a-z][a-z0-9]{0,12}") {
        let node = ConditionBuilder::default()
            .compare("name", value.as_str(), ColumnType::String, false, None)
            .unwrap();
        prop_assert_eq!(node.to_json(), json!({"match": {"name": value}}));
    }

    #[test]
    fn prop_integer_operand_is_number(n in any::<i64>()) {
        let node = ConditionBuilder::default()
            .compare("id", format!(">={n}"), ColumnType::Integer, false, None)
            .unwrap();
        prop_assert_eq!(node.to_json(), json!({"range": {"id": {"gte": n}}}));
    }
}

// =============================================================================
// Document mapper
// =============================================================================

proptest! {
    #[test]
    fn prop_build_document_deterministic(
        id in any::<i64>(),
        name in cell_strategy(),
        price in cell_strategy(),
        active in cell_strategy(),
        created_at in cell_strategy(),
    ) {
        let schema = products();
        let row = Row::new()
            .with("id", id)
            .with("name", name)
            .with("price", price)
            .with("active", active)
            .with("created_at", created_at);
        let mapper = DocumentMapper::default();

        let first = mapper.build_document(&schema, &row).unwrap();
        let second = mapper.build_document(&schema, &row).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.id, id.to_string());

        // Date columns always come out as epoch seconds
        let created = first.body.get("created_at").and_then(Value::as_i64);
        prop_assert!(created.is_some_and(|s| s >= 0));
    }

    #[test]
    fn prop_mapping_covers_every_column(extra in prop::collection::btree_set("[a-z]{3,10}", 0..8)) {
        let mut schema = products();
        for name in &extra {
            schema = schema.string(name.clone());
        }
        let mapping = DocumentMapper::default().build_mapping(&schema);
        for column in &schema.columns {
            prop_assert!(mapping.properties.contains_key(&column.name));
        }
    }
}
