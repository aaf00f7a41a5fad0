//! Eager relation loading shared by the row stores.
//!
//! ```text
//! belongs_to  parent.fk  = target.pk   → One
//! has_one     parent.pk  = target.fk   → One (first by target pk)
//! has_many    parent.pk  = target.fk   → Many (ordered by target pk)
//! stat        parent.pk  = target.fk   → Stat(aggregate)
//! ```
//!
//! One child query per relation per page of parents.

use std::collections::HashMap;

use serde_json::Value;

use super::traits::{RowFilter, RowOrder, RowQuery};
use crate::mapping::{ColumnType, ModelSchema, RelationDef, RelationKind, RelationTree, RelationValue, Row};

/// Distinct key texts of `column`, in first-seen order.
pub(crate) fn distinct_keys(rows: &[Row], column: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|row| row.key(column))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Keys as bind values, numeric when the column is an integer column.
pub(crate) fn key_values(schema: &ModelSchema, column: &str, keys: &[String]) -> Vec<Value> {
    let numeric = schema
        .column(column)
        .is_some_and(|c| c.column_type == ColumnType::Integer);
    keys.iter()
        .map(|key| match key.parse::<i64>() {
            Ok(n) if numeric => Value::from(n),
            _ => Value::from(key.as_str()),
        })
        .collect()
}

/// Join columns of a relation: (column on the parent, column on the target).
pub(crate) fn join_columns(parent: &ModelSchema, relation: &RelationDef) -> (String, String) {
    match &relation.kind {
        RelationKind::BelongsTo { foreign_key } => {
            (foreign_key.clone(), relation.target.primary_key.clone())
        }
        RelationKind::HasOne { foreign_key }
        | RelationKind::HasMany { foreign_key }
        | RelationKind::Stat { foreign_key, .. } => (parent.primary_key.clone(), foreign_key.clone()),
    }
}

/// Query fetching the targets of a to-one/to-many relation for `parents`,
/// or `None` when no parent has a join value.
pub(crate) fn child_query(
    parent: &ModelSchema,
    relation: &RelationDef,
    parents: &[Row],
    subtree: &RelationTree,
) -> Option<RowQuery> {
    let (parent_column, child_column) = join_columns(parent, relation);
    let keys = distinct_keys(parents, &parent_column);
    if keys.is_empty() {
        return None;
    }
    let values = key_values(&relation.target, &child_column, &keys);
    Some(
        RowQuery::new()
            .filter(RowFilter::In { column: child_column, values })
            .order(RowOrder::KeyAsc)
            .with_relations(subtree.clone()),
    )
}

/// Attach fetched targets to their parents. Parents without targets get
/// [`RelationValue::Empty`].
pub(crate) fn attach_children(parent: &ModelSchema, relation: &RelationDef, parents: &mut [Row], children: Vec<Row>) {
    let (parent_column, child_column) = join_columns(parent, relation);
    let mut grouped: HashMap<String, Vec<Row>> = HashMap::new();
    for child in children {
        if let Some(key) = child.key(&child_column) {
            grouped.entry(key).or_default().push(child);
        }
    }

    let to_many = matches!(relation.kind, RelationKind::HasMany { .. });
    for row in parents.iter_mut() {
        let related = row.key(&parent_column).and_then(|key| grouped.get(&key));
        let value = match related {
            Some(rows) if to_many => RelationValue::Many(rows.clone()),
            Some(rows) => rows
                .first()
                .map_or(RelationValue::Empty, |first| RelationValue::One(Box::new(first.clone()))),
            None => RelationValue::Empty,
        };
        row.relations.insert(relation.name.clone(), value);
    }
}

/// Attach aggregate values keyed by parent primary key.
pub(crate) fn attach_stats(parent: &ModelSchema, name: &str, parents: &mut [Row], totals: &HashMap<String, f64>) {
    for row in parents.iter_mut() {
        let total = row.key(&parent.primary_key).and_then(|key| totals.get(&key).copied());
        row.relations.insert(name.to_string(), RelationValue::Stat(total));
    }
}

/// Aggregate of a column over rows, for `COUNT(*)`, `COUNT(col)`, `SUM(col)`,
/// `MIN(col)`, `MAX(col)` and `AVG(col)`. Other expressions yield `None`.
pub(crate) fn evaluate_aggregate(aggregate: &str, rows: &[&Row]) -> Option<f64> {
    let (function, argument) = aggregate.trim().split_once('(')?;
    let argument = argument.strip_suffix(')')?.trim();
    let function = function.trim().to_ascii_uppercase();
    if function == "COUNT" && argument == "*" {
        return Some(rows.len() as f64);
    }
    let column = argument.rsplit('.').next().unwrap_or(argument);
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| match row.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        })
        .collect();
    match function.as_str() {
        "COUNT" => Some(values.len() as f64),
        "SUM" => Some(values.iter().sum()),
        "MIN" => values.iter().copied().reduce(f64::min),
        "MAX" => values.iter().copied().reduce(f64::max),
        "AVG" if !values.is_empty() => Some(values.iter().sum::<f64>() / values.len() as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn products() -> ModelSchema {
        let tags = ModelSchema::new("tags", "id").integer("id").integer("product_id");
        let makers = ModelSchema::new("makers", "id").integer("id");
        ModelSchema::new("products", "id")
            .integer("id")
            .integer("maker_id")
            .has_many("tags", "product_id", tags)
            .belongs_to("maker", "maker_id", makers)
    }

    #[test]
    fn test_child_query_for_has_many() {
        let schema = products();
        let parents = vec![Row::new().with("id", 2), Row::new().with("id", 1), Row::new().with("id", 2)];
        let query = child_query(&schema, schema.relation("tags").unwrap(), &parents, &RelationTree::new()).unwrap();
        assert_eq!(
            query.filter,
            Some(RowFilter::In { column: "product_id".into(), values: vec![json!(2), json!(1)] })
        );
        assert_eq!(query.order, Some(RowOrder::KeyAsc));
    }

    #[test]
    fn test_child_query_none_without_keys() {
        let schema = products();
        let parents = vec![Row::new().with("id", 1)];
        assert!(child_query(&schema, schema.relation("maker").unwrap(), &parents, &RelationTree::new()).is_none());
    }

    #[test]
    fn test_attach_children() {
        let schema = products();
        let mut parents = vec![
            Row::new().with("id", 1).with("maker_id", 7),
            Row::new().with("id", 2).with("maker_id", 8),
        ];
        let tags = vec![
            Row::new().with("id", 10).with("product_id", 1),
            Row::new().with("id", 11).with("product_id", 1),
        ];
        attach_children(&schema, schema.relation("tags").unwrap(), &mut parents, tags);
        attach_children(
            &schema,
            schema.relation("maker").unwrap(),
            &mut parents,
            vec![Row::new().with("id", 7)],
        );

        assert!(matches!(&parents[0].relations["tags"], RelationValue::Many(rows) if rows.len() == 2));
        assert_eq!(parents[1].relations["tags"], RelationValue::Empty);
        assert!(matches!(&parents[0].relations["maker"], RelationValue::One(_)));
        assert_eq!(parents[1].relations["maker"], RelationValue::Empty);
    }

    #[test]
    fn test_evaluate_aggregate() {
        let a = Row::new().with("amount", 2);
        let b = Row::new().with("amount", "3.5");
        let rows = vec![&a, &b];
        assert_eq!(evaluate_aggregate("COUNT(*)", &rows), Some(2.0));
        assert_eq!(evaluate_aggregate("sum(t.amount)", &rows), Some(5.5));
        assert_eq!(evaluate_aggregate("MAX(amount)", &rows), Some(3.5));
        assert_eq!(evaluate_aggregate("AVG(amount)", &[]), None);
        assert_eq!(evaluate_aggregate("GROUP_CONCAT(amount)", &rows), None);
    }
}
