use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::relations::{attach_children, attach_stats, child_query, evaluate_aggregate, join_columns};
use super::traits::{RelationalStore, RowFilter, RowOrder, RowQuery};
use crate::error::SearchError;
use crate::mapping::{key_text, Column, ModelSchema, RelationDef, RelationKind, Row};

/// In-process row store. Tables are plain row lists; `Raw` filters and
/// orders are rejected since there is no SQL to evaluate them.
pub struct MemoryRowStore {
    tables: DashMap<String, Vec<Row>>,
    columns: DashMap<String, Vec<Column>>,
    queries: Mutex<Vec<(String, RowQuery)>>,
    consistent_reads: AtomicUsize,
}

impl MemoryRowStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            columns: DashMap::new(),
            queries: Mutex::new(Vec::new()),
            consistent_reads: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn insert_many(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Remove rows whose `column` matches `key`.
    pub fn delete(&self, table: &str, column: &str, key: &str) {
        if let Some(mut rows) = self.tables.get_mut(table) {
            rows.retain(|row| row.key(column).as_deref() != Some(key));
        }
    }

    /// Declare the columns reported by [`RelationalStore::column_schema`].
    pub fn define_columns(&self, table: &str, columns: Vec<Column>) {
        self.columns.insert(table.to_string(), columns);
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }

    /// Every query run so far, with its table.
    #[must_use]
    pub fn queries(&self) -> Vec<(String, RowQuery)> {
        self.queries.lock().clone()
    }

    pub fn clear_queries(&self) {
        self.queries.lock().clear();
    }

    /// Number of [`RelationalStore::find_rows_consistent`] calls.
    #[must_use]
    pub fn consistent_reads(&self) -> usize {
        self.consistent_reads.load(AtomicOrdering::Relaxed)
    }

    fn select(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError> {
        self.queries.lock().push((schema.table.clone(), query.clone()));

        let mut rows = Vec::new();
        if let Some(table) = self.tables.get(&schema.table) {
            for row in table.iter() {
                let keep = match &query.filter {
                    Some(filter) => matches(schema, filter, row)?,
                    None => true,
                };
                if keep {
                    rows.push(Row { values: row.values.clone(), relations: Default::default() });
                }
            }
        }

        if let Some(order) = &query.order {
            sort_rows(schema, order, &mut rows)?;
        }
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut rows: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();

        for (name, subtree) in query.relations.iter() {
            let Some(relation) = schema.relation(name) else { continue };
            if let RelationKind::Stat { aggregate, .. } = &relation.kind {
                let totals = self.stats(schema, relation, aggregate, &rows);
                attach_stats(schema, name, &mut rows, &totals);
            } else {
                let children = match child_query(schema, relation, &rows, subtree) {
                    Some(child) => self.select(&relation.target, &child)?,
                    None => Vec::new(),
                };
                attach_children(schema, relation, &mut rows, children);
            }
        }
        Ok(rows)
    }

    fn stats(
        &self,
        schema: &ModelSchema,
        relation: &RelationDef,
        aggregate: &str,
        parents: &[Row],
    ) -> HashMap<String, f64> {
        let (parent_column, child_column) = join_columns(schema, relation);
        let Some(table) = self.tables.get(&relation.target.table) else {
            return HashMap::new();
        };
        let mut totals = HashMap::new();
        for parent in parents {
            let Some(key) = parent.key(&parent_column) else { continue };
            let group: Vec<&Row> = table.iter().filter(|r| r.key(&child_column).as_deref() == Some(key.as_str())).collect();
            if group.is_empty() {
                continue;
            }
            if let Some(total) = evaluate_aggregate(aggregate, &group) {
                totals.insert(key, total);
            }
        }
        totals
    }
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare key texts numerically when both are numbers.
fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn same_value(row_value: Option<&Value>, value: &Value) -> bool {
    match (row_value.and_then(key_text), key_text(value)) {
        (Some(a), Some(b)) => compare_keys(&a, &b) == Ordering::Equal,
        (None, None) => true,
        _ => false,
    }
}

fn matches(schema: &ModelSchema, filter: &RowFilter, row: &Row) -> Result<bool, SearchError> {
    let key = row.key(&schema.primary_key);
    Ok(match filter {
        RowFilter::KeyIn(keys) => key.is_some_and(|k| {
            keys.contains(&k) || keys.iter().any(|x| compare_keys(x, &k) == Ordering::Equal)
        }),
        RowFilter::KeyAtMost(bound) => key.is_some_and(|k| compare_keys(&k, bound) != Ordering::Greater),
        RowFilter::In { column, values } => values.iter().any(|v| same_value(row.get(column), v)),
        RowFilter::Eq { column, value } => same_value(row.get(column), value),
        RowFilter::Raw { clause, .. } => {
            return Err(SearchError::Store(format!("memory store cannot evaluate SQL condition '{}'", clause)))
        }
        RowFilter::And(parts) => {
            for part in parts {
                if !matches(schema, part, row)? {
                    return Ok(false);
                }
            }
            true
        }
    })
}

fn sort_rows(schema: &ModelSchema, order: &RowOrder, rows: &mut [Row]) -> Result<(), SearchError> {
    let pk = &schema.primary_key;
    let key_of = |row: &Row| row.key(pk).unwrap_or_default();
    match order {
        RowOrder::KeyAsc => rows.sort_by(|a, b| compare_keys(&key_of(a), &key_of(b))),
        RowOrder::KeyDesc => rows.sort_by(|a, b| compare_keys(&key_of(b), &key_of(a))),
        RowOrder::KeyList(keys) => {
            let exact: HashMap<&str, usize> = keys.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
            let position = |row: &Row| {
                let key = key_of(row);
                exact.get(key.as_str()).copied().unwrap_or_else(|| {
                    keys.iter()
                        .position(|k| compare_keys(k, &key) == Ordering::Equal)
                        .unwrap_or(keys.len())
                })
            };
            rows.sort_by_cached_key(position);
        }
        RowOrder::Raw(expression) => {
            return Err(SearchError::Store(format!("memory store cannot evaluate SQL order '{}'", expression)))
        }
    }
    Ok(())
}

#[async_trait]
impl RelationalStore for MemoryRowStore {
    async fn find_rows(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError> {
        self.select(schema, query)
    }

    async fn find_rows_consistent(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError> {
        self.consistent_reads.fetch_add(1, AtomicOrdering::Relaxed);
        self.select(schema, query)
    }

    async fn column_schema(&self, table: &str) -> Result<Vec<Column>, SearchError> {
        self.columns
            .get(table)
            .map(|c| c.value().clone())
            .ok_or_else(|| SearchError::Store(format!("table '{}' has no declared columns", table)))
    }
}
