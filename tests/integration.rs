//! Integration Tests for Search Sync
//!
//! Runs the full stack against a real Elasticsearch node and a SQLite
//! database. Elasticsearch comes from testcontainers; no docker-compose
//! required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: rebuild, save/delete hooks, relevance order
//! - `failure_*` - Failure scenarios: unreachable engine

use serde_json::json;
use tempfile::TempDir;

use search_sync::mapping::{ModelSchema, Row};
use search_sync::query::{AttributeFilter, SearchCriteria};
use search_sync::store::SqlRowStore;
use search_sync::sync::RebuildOptions;
use search_sync::{ClientConfig, SearchError, SearchSync, SearchSyncConfig};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Single-node Elasticsearch 6 (typed mappings)
fn elasticsearch_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("docker.elastic.co/elasticsearch/elasticsearch", "6.8.23")
        .with_env_var("discovery.type", "single-node")
        .with_env_var("ES_JAVA_OPTS", "-Xms512m -Xmx512m")
        .with_exposed_port(9200)
        .with_wait_for(WaitFor::message_on_stdout("started"));
    docker.run(image)
}

fn products() -> ModelSchema {
    ModelSchema::new("products", "id")
        .integer("id")
        .string("name")
        .double("price")
        .string("created_at")
}

/// SQLite database with a seeded products table
async fn seeded_database(dir: &TempDir, rows: usize) -> String {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("shop.db").display());
    let store = SqlRowStore::new(&url).await.expect("Failed to open SQLite");
    store
        .execute("CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL, created_at TEXT)")
        .await
        .expect("Failed to create table");
    for id in 1..=rows {
        store
            .execute(&format!(
                "INSERT INTO products VALUES ({id}, 'Widget {id}', {}.5, '2024-01-01 00:00:00')",
                id % 50
            ))
            .await
            .expect("Failed to insert row");
    }
    url
}

async fn connect(port: u16, sql_url: String) -> SearchSync {
    let config = SearchSyncConfig {
        client: ClientConfig {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            ..Default::default()
        },
        index_name: Some("shop_test".into()),
        sql_url: Some(sql_url),
        bulk_size: 100,
        ..Default::default()
    };
    SearchSync::connect(config).await.expect("Failed to connect")
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_rebuild_and_count() {
    let docker = Cli::default();
    let es = elasticsearch_container(&docker);
    let dir = TempDir::new().unwrap();
    let sql_url = seeded_database(&dir, 250).await;

    let sync = connect(es.get_host_port_ipv4(9200), sql_url).await;
    sync.register_model(products());

    let report = sync
        .rebuild("products", RebuildOptions::new().page_size(40).reset_index())
        .await
        .unwrap();
    assert_eq!(report.rows, 250);
    assert_eq!(report.batches, 3);

    let provider = sync.provider("products", SearchCriteria::new()).unwrap();
    assert_eq!(provider.total_item_count().await.unwrap(), 250);
    sync.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_rows_in_relevance_order() {
    let docker = Cli::default();
    let es = elasticsearch_container(&docker);
    let dir = TempDir::new().unwrap();
    let sql_url = seeded_database(&dir, 30).await;

    let sync = connect(es.get_host_port_ipv4(9200), sql_url).await;
    sync.register_table("products", "id").await.unwrap();
    sync.rebuild("products", RebuildOptions::new().reset_index()).await.unwrap();

    let filter = AttributeFilter::new().set("price", ">=20");
    let provider = sync.search("products", &filter, None).unwrap();
    let keys = provider.fetch_keys().await.unwrap().to_vec();
    let rows = provider.fetch_result_rows().await.unwrap();

    assert!(!rows.is_empty());
    let row_keys: Vec<String> = rows.iter().filter_map(|r| r.key("id")).collect();
    assert_eq!(row_keys, keys);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_save_and_delete_hooks() {
    let docker = Cli::default();
    let es = elasticsearch_container(&docker);
    let dir = TempDir::new().unwrap();
    let sql_url = seeded_database(&dir, 0).await;

    let sync = connect(es.get_host_port_ipv4(9200), sql_url).await;
    sync.register_model(products());

    let row = Row::new()
        .with("id", 5)
        .with("name", "widget")
        .with("price", 19.99)
        .with("created_at", "2024-01-01 00:00:00");
    sync.on_saved("products", &row).await.unwrap();

    let provider = sync.provider("products", SearchCriteria::new()).unwrap();
    let response = provider.execute(false).await.unwrap();
    assert_eq!(response.total_hits, 1);
    assert_eq!(
        serde_json::Value::Object(response.hits[0].source.clone()),
        json!({"id": 5, "name": "widget", "price": 19.99, "created_at": 1704067200})
    );

    sync.on_deleted("products", &row).await.unwrap();
    sync.synchronizer("products").unwrap().refresh().await.unwrap();
    let provider = sync.provider("products", SearchCriteria::new()).unwrap();
    assert_eq!(provider.total_item_count().await.unwrap(), 0);
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
#[ignore] // Needs local networking
async fn failure_engine_unreachable() {
    let dir = TempDir::new().unwrap();
    let sql_url = seeded_database(&dir, 1).await;

    // Nothing listens on port 1
    let sync = connect(1, sql_url).await;
    sync.register_model(products());

    let row = Row::new().with("id", 1).with("name", "orphan");
    let result = sync.on_saved("products", &row).await;
    assert!(matches!(result, Err(SearchError::Transport(_))));
}
