// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL row store (MySQL and SQLite through the sqlx `Any` driver).
//!
//! Generated statements, for `products` aliased `t`:
//!
//! ```sql
//! -- result page, hits [7, 3, 9]
//! SELECT t.* FROM "products" t
//! WHERE t."id" IN (?, ?, ?)
//! ORDER BY CASE t."id" WHEN ? THEN 0 WHEN ? THEN 1 WHEN ? THEN 2 ELSE 3 END   -- SQLite
//! ORDER BY FIELD(t.`id`, ?, ?, ?)                                             -- MySQL
//! LIMIT 5000
//!
//! -- rebuild page
//! SELECT t.* FROM "products" t WHERE t."id" <= ? ORDER BY t."id" DESC LIMIT 10000
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver cannot decode MySQL temporal or DECIMAL columns. On MySQL,
//! declared string columns are selected through `CAST(... AS CHAR)` and double
//! columns through `CAST(... AS DOUBLE)`; TEXT-family columns may come back as
//! bytes and are read as UTF-8.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::AnyConnection;
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column as _, Row as _};
use tracing::{debug, info};

use super::relations::{attach_children, attach_stats, child_query, distinct_keys, join_columns, key_values};
use super::traits::{RelationalStore, RowFilter, RowOrder, RowQuery};
use crate::error::SearchError;
use crate::mapping::{key_text, Column, ColumnType, ModelSchema, RelationDef, RelationKind, Row};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

type RowsFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Row>, SearchError>> + Send + 'a>>;
type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

pub struct SqlRowStore {
    pool: AnyPool,
    is_mysql: bool,
}

impl SqlRowStore {
    /// Connect to `mysql://...` or `sqlite://...`.
    pub async fn new(connection_string: &str) -> Result<Self, SearchError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");
        let pool = AnyPoolOptions::new()
            .max_connections(if is_sqlite { 4 } else { 20 })
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .connect(connection_string)
            .await?;

        if is_sqlite {
            sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        }
        info!(mysql = !is_sqlite, "Connected relational store");
        Ok(Self { pool, is_mysql: !is_sqlite })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: AnyPool, is_mysql: bool) -> Self {
        Self { pool, is_mysql }
    }

    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// Run a statement, returning the affected row count.
    pub async fn execute(&self, sql: &str) -> Result<u64, SearchError> {
        Ok(sqlx::query(sql).execute(&self.pool).await?.rows_affected())
    }

    /// Schema for `table` from the database's own column metadata.
    pub async fn introspect(&self, table: &str, primary_key: &str) -> Result<ModelSchema, SearchError> {
        let columns = self.column_schema(table).await?;
        Ok(ModelSchema::from_columns(table, primary_key, columns))
    }

    fn quote(&self, ident: &str) -> String {
        if self.is_mysql {
            format!("`{}`", ident.replace('`', "``"))
        } else {
            format!("\"{}\"", ident.replace('"', "\"\""))
        }
    }

    fn column_ref(&self, schema: &ModelSchema, column: &str) -> String {
        format!("{}.{}", schema.alias, self.quote(column))
    }

    fn select_list(&self, schema: &ModelSchema, query: &RowQuery) -> String {
        if !self.is_mysql || schema.columns.is_empty() {
            return format!("{}.*", schema.alias);
        }
        let mut parts: Vec<String> = schema
            .columns
            .iter()
            .map(|c| {
                let column = self.column_ref(schema, &c.name);
                match c.column_type {
                    ColumnType::String => format!("CAST({} AS CHAR) AS {}", column, self.quote(&c.name)),
                    ColumnType::Double => format!("CAST({} AS DOUBLE) AS {}", column, self.quote(&c.name)),
                    _ => column,
                }
            })
            .collect();
        // Join columns the schema does not declare
        for extra in join_columns_needed(schema, query) {
            if schema.column(&extra).is_none() {
                parts.push(self.column_ref(schema, &extra));
            }
        }
        parts.join(", ")
    }

    fn select_sql(&self, schema: &ModelSchema, query: &RowQuery) -> (String, Vec<Value>) {
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            self.select_list(schema, query),
            self.quote(&schema.table),
            schema.alias
        );
        let mut params = Vec::new();
        if let Some(filter) = &query.filter {
            sql.push_str(" WHERE ");
            self.push_filter(schema, filter, &mut sql, &mut params);
        }
        if let Some(order) = &query.order {
            sql.push_str(" ORDER BY ");
            self.push_order(schema, order, &mut sql, &mut params);
        }
        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) if self.is_mysql => {
                sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {}", offset))
            }
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        (sql, params)
    }

    fn push_filter(&self, schema: &ModelSchema, filter: &RowFilter, sql: &mut String, params: &mut Vec<Value>) {
        match filter {
            RowFilter::KeyIn(keys) => {
                let values = key_values(schema, &schema.primary_key, keys);
                self.push_in(&self.column_ref(schema, &schema.primary_key), values, sql, params);
            }
            RowFilter::KeyAtMost(key) => {
                sql.push_str(&format!("{} <= ?", self.column_ref(schema, &schema.primary_key)));
                params.extend(key_values(schema, &schema.primary_key, std::slice::from_ref(key)));
            }
            RowFilter::In { column, values } => {
                self.push_in(&self.column_ref(schema, column), values.clone(), sql, params);
            }
            RowFilter::Eq { column, value } => {
                sql.push_str(&format!("{} = ?", self.column_ref(schema, column)));
                params.push(value.clone());
            }
            RowFilter::Raw { clause, params: raw } => {
                sql.push_str(&format!("({})", clause));
                params.extend(raw.iter().cloned());
            }
            RowFilter::And(parts) if parts.is_empty() => sql.push_str("1 = 1"),
            RowFilter::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    sql.push('(');
                    self.push_filter(schema, part, sql, params);
                    sql.push(')');
                }
            }
        }
    }

    fn push_in(&self, column: &str, values: Vec<Value>, sql: &mut String, params: &mut Vec<Value>) {
        if values.is_empty() {
            sql.push_str("1 = 0");
            return;
        }
        let marks = vec!["?"; values.len()].join(", ");
        sql.push_str(&format!("{} IN ({})", column, marks));
        params.extend(values);
    }

    fn push_order(&self, schema: &ModelSchema, order: &RowOrder, sql: &mut String, params: &mut Vec<Value>) {
        let key = self.column_ref(schema, &schema.primary_key);
        match order {
            RowOrder::KeyAsc => sql.push_str(&format!("{} ASC", key)),
            RowOrder::KeyDesc => sql.push_str(&format!("{} DESC", key)),
            RowOrder::KeyList(keys) if keys.is_empty() => sql.push_str(&format!("{} ASC", key)),
            RowOrder::KeyList(keys) => {
                let values = key_values(schema, &schema.primary_key, keys);
                let marks = vec!["?"; values.len()].join(", ");
                if self.is_mysql {
                    sql.push_str(&format!("FIELD({}, {})", key, marks));
                } else {
                    let arms: String = (0..values.len()).map(|i| format!(" WHEN ? THEN {}", i)).collect();
                    sql.push_str(&format!("CASE {}{} ELSE {} END", key, arms, values.len()));
                }
                params.extend(values);
            }
            RowOrder::Raw(expression) => sql.push_str(expression),
        }
    }

    fn fetch<'a>(
        &'a self,
        conn: &'a mut AnyConnection,
        schema: &'a ModelSchema,
        query: &'a RowQuery,
    ) -> RowsFuture<'a> {
        Box::pin(async move {
            let (sql, params) = self.select_sql(schema, query);
            debug!(table = %schema.table, %sql, params = params.len(), "Fetching rows");

            let mut rows: Vec<Row> = {
                let fetched = bind_all(sqlx::query(&sql), &params).fetch_all(&mut *conn).await?;
                fetched.iter().map(decode_row).collect()
            };

            for (name, subtree) in query.relations.iter() {
                let Some(relation) = schema.relation(name) else { continue };
                if let RelationKind::Stat { aggregate, .. } = &relation.kind {
                    let totals = self.fetch_stats(&mut *conn, schema, relation, aggregate, &rows).await?;
                    attach_stats(schema, name, &mut rows, &totals);
                } else {
                    let children = match child_query(schema, relation, &rows, subtree) {
                        Some(child) => self.fetch(&mut *conn, &relation.target, &child).await?,
                        None => Vec::new(),
                    };
                    attach_children(schema, relation, &mut rows, children);
                }
            }
            Ok(rows)
        })
    }

    async fn fetch_stats(
        &self,
        conn: &mut AnyConnection,
        schema: &ModelSchema,
        relation: &RelationDef,
        aggregate: &str,
        parents: &[Row],
    ) -> Result<HashMap<String, f64>, SearchError> {
        let (parent_column, child_column) = join_columns(schema, relation);
        let keys = distinct_keys(parents, &parent_column);
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let target = &relation.target;
        let values = key_values(target, &child_column, &keys);
        let column = self.quote(&child_column);
        let marks = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "SELECT {col} AS k, {agg} AS v FROM {table} WHERE {col} IN ({marks}) GROUP BY {col}",
            col = column,
            agg = aggregate,
            table = self.quote(&target.table),
            marks = marks,
        );

        let fetched = bind_all(sqlx::query(&sql), &values).fetch_all(&mut *conn).await?;
        Ok(fetched
            .iter()
            .filter_map(|row| {
                let key = key_text(&decode_value(row, 0))?;
                let total = match decode_value(row, 1) {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                }?;
                Some((key, total))
            })
            .collect())
    }
}

/// Columns the store must select for relation joins and `In` filters.
fn join_columns_needed(schema: &ModelSchema, query: &RowQuery) -> Vec<String> {
    let mut columns: Vec<String> = query
        .relations
        .iter()
        .filter_map(|(name, _)| schema.relation(name))
        .filter(|r| matches!(r.kind, RelationKind::BelongsTo { .. }))
        .map(|r| r.kind.foreign_key().to_string())
        .collect();
    fn collect_in(filter: &RowFilter, out: &mut Vec<String>) {
        match filter {
            RowFilter::In { column, .. } => out.push(column.clone()),
            RowFilter::And(parts) => parts.iter().for_each(|p| collect_in(p, out)),
            _ => {}
        }
    }
    if let Some(filter) = &query.filter {
        collect_in(filter, &mut columns);
    }
    columns.sort();
    columns.dedup();
    columns
}

fn bind_all<'q>(mut query: AnyQuery<'q>, params: &[Value]) -> AnyQuery<'q> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Decode one column of any supported type. Unsupported or NULL → null.
fn decode_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    // MySQL TEXT-family columns arrive as bytes through the Any driver
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(Value::Null, |bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned()));
    }
    Value::Null
}

fn decode_row(row: &AnyRow) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.values.insert(column.name().to_string(), decode_value(row, index));
    }
    out
}

#[async_trait]
impl RelationalStore for SqlRowStore {
    async fn find_rows(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError> {
        let mut conn = self.pool.acquire().await?;
        self.fetch(&mut conn, schema, query).await
    }

    async fn find_rows_consistent(&self, schema: &ModelSchema, query: &RowQuery) -> Result<Vec<Row>, SearchError> {
        let mut tx = self.pool.begin().await?;
        let rows = self.fetch(&mut tx, schema, query).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn column_schema(&self, table: &str) -> Result<Vec<Column>, SearchError> {
        let sql = if self.is_mysql {
            "SELECT COLUMN_NAME, CAST(COLUMN_TYPE AS CHAR) FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
        } else {
            "SELECT name, type FROM pragma_table_info(?) ORDER BY cid"
        };
        let rows = sqlx::query(sql).bind(table.to_string()).fetch_all(&self.pool).await?;
        let columns: Vec<Column> = rows
            .iter()
            .filter_map(|row| {
                let name = decode_value(row, 0).as_str()?.to_string();
                let declared = decode_value(row, 1);
                Some(Column {
                    name,
                    column_type: ColumnType::from_sql(declared.as_str().unwrap_or("")),
                })
            })
            .collect();
        if columns.is_empty() {
            return Err(SearchError::Store(format!("table '{}' has no columns or does not exist", table)));
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{RelationTree, RelationValue};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SqlRowStore {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("shop.db").display());
        let store = SqlRowStore::new(&url).await.unwrap();
        store
            .execute("CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL, maker_id INTEGER)")
            .await
            .unwrap();
        store
            .execute("CREATE TABLE tags (id INTEGER PRIMARY KEY, product_id INTEGER, caption TEXT)")
            .await
            .unwrap();
        store.execute("CREATE TABLE makers (id INTEGER PRIMARY KEY, label TEXT)").await.unwrap();
        for i in 1..=12 {
            store
                .execute(&format!(
                    "INSERT INTO products (id, name, price, maker_id) VALUES ({i}, 'Item {i}', {i}.5, {})",
                    if i % 2 == 0 { "1" } else { "NULL" }
                ))
                .await
                .unwrap();
        }
        store.execute("INSERT INTO tags VALUES (1, 3, 'Red'), (2, 3, 'Blue'), (3, 9, 'Green')").await.unwrap();
        store.execute("INSERT INTO makers VALUES (1, 'ACME')").await.unwrap();
        store
    }

    fn products() -> ModelSchema {
        let tags = ModelSchema::new("tags", "id").integer("id").integer("product_id").string("caption");
        let makers = ModelSchema::new("makers", "id").integer("id").string("label");
        let counts = ModelSchema::new("tags", "id").integer("product_id");
        ModelSchema::new("products", "id")
            .integer("id")
            .string("name")
            .double("price")
            .integer("maker_id")
            .has_many("tags", "product_id", tags)
            .belongs_to("maker", "maker_id", makers)
            .stat("tag_count", "product_id", "COUNT(*)", counts)
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r.get("id").and_then(Value::as_i64).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_key_list_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let keys: Vec<String> = ["7", "3", "9"].iter().map(|s| s.to_string()).collect();
        let query = RowQuery::new()
            .filter(RowFilter::KeyIn(keys.clone()))
            .order(RowOrder::KeyList(keys))
            .limit(5000);
        let rows = store.find_rows(&products(), &query).await.unwrap();
        assert_eq!(ids(&rows), vec![7, 3, 9]);
        assert_eq!(rows[0].get("name"), Some(&json!("Item 7")));
        assert_eq!(rows[0].get("price"), Some(&json!(7.5)));
    }

    #[tokio::test]
    async fn test_descending_pages() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let query = RowQuery::new()
            .filter(RowFilter::KeyAtMost("8".into()))
            .order(RowOrder::KeyDesc)
            .limit(3);
        let rows = store.find_rows_consistent(&products(), &query).await.unwrap();
        assert_eq!(ids(&rows), vec![8, 7, 6]);
    }

    #[tokio::test]
    async fn test_raw_filter_with_params() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let query = RowQuery::new()
            .filter(RowFilter::Raw { clause: "t.price > ?".into(), params: vec![json!(10)] })
            .order(RowOrder::KeyAsc);
        let rows = store.find_rows(&products(), &query).await.unwrap();
        assert_eq!(ids(&rows), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_relations_loaded_eagerly() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let query = RowQuery::new()
            .filter(RowFilter::KeyIn(vec!["3".into(), "4".into()]))
            .order(RowOrder::KeyAsc)
            .with_relations(RelationTree::parse(["tags", "maker", "tag_count"]));
        let rows = store.find_rows(&products(), &query).await.unwrap();

        match &rows[0].relations["tags"] {
            RelationValue::Many(tags) => {
                let captions: Vec<&Value> = tags.iter().filter_map(|t| t.get("caption")).collect();
                assert_eq!(captions, vec![&json!("Red"), &json!("Blue")]);
            }
            other => panic!("Expected Many, got {other:?}"),
        }
        assert_eq!(rows[0].relations["maker"], RelationValue::Empty);
        assert_eq!(rows[0].relations["tag_count"], RelationValue::Stat(Some(2.0)));

        assert_eq!(rows[1].relations["tags"], RelationValue::Empty);
        assert!(matches!(&rows[1].relations["maker"], RelationValue::One(m) if m.get("label") == Some(&json!("ACME"))));
        assert_eq!(rows[1].relations["tag_count"], RelationValue::Stat(None));
    }

    #[tokio::test]
    async fn test_empty_key_set_selects_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let query = RowQuery::new().filter(RowFilter::KeyIn(vec![]));
        assert!(store.find_rows(&products(), &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_column_schema() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let schema = store.introspect("products", "id").await.unwrap();
        assert_eq!(schema.column("id").unwrap().column_type, ColumnType::Integer);
        assert_eq!(schema.column("price").unwrap().column_type, ColumnType::Double);
        assert_eq!(schema.column("name").unwrap().column_type, ColumnType::String);
        assert!(store.column_schema("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_select_sql_shapes() {
        let store_sqlite = SqlRowStore { pool: lazy_pool(), is_mysql: false };
        let keys: Vec<String> = vec!["7".into(), "3".into()];
        let query = RowQuery::new()
            .filter(RowFilter::KeyIn(keys.clone()))
            .order(RowOrder::KeyList(keys))
            .limit(5000);
        let (sql, params) = store_sqlite.select_sql(&products(), &query);
        assert_eq!(
            sql,
            "SELECT t.* FROM \"products\" t WHERE t.\"id\" IN (?, ?) \
             ORDER BY CASE t.\"id\" WHEN ? THEN 0 WHEN ? THEN 1 ELSE 2 END LIMIT 5000"
        );
        assert_eq!(params, vec![json!(7), json!(3), json!(7), json!(3)]);

        let store_mysql = SqlRowStore { pool: lazy_pool(), is_mysql: true };
        let (sql, _) = store_mysql.select_sql(&products(), &query);
        assert!(sql.contains("ORDER BY FIELD(t.`id`, ?, ?)"));
        assert!(sql.contains("CAST(t.`name` AS CHAR) AS `name`"));
    }

    fn lazy_pool() -> AnyPool {
        install_drivers();
        AnyPoolOptions::new().connect_lazy("sqlite::memory:").unwrap()
    }
}
