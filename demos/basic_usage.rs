// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic search-sync usage example.
//!
//! Demonstrates:
//! 1. Registering a model with related rows
//! 2. Rebuilding the index from the store
//! 3. Keeping it current with save/delete hooks
//! 4. Attribute search with rows loaded in relevance order
//! 5. Displaying metrics
//!
//! Runs entirely in-process on the memory client and store.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use search_sync::client::MemorySearchClient;
use search_sync::mapping::{ModelSchema, Row};
use search_sync::provider::{Pagination, Sort};
use search_sync::query::AttributeFilter;
use search_sync::store::MemoryRowStore;
use search_sync::sync::RebuildOptions;
use search_sync::{SearchSync, SearchSyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_sync=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           search-sync: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Seed the store and register the model
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Seeding store...");
    let store = Arc::new(MemoryRowStore::new());
    store.insert("makers", Row::new().with("id", 1).with("label", "ACME"));
    store.insert("makers", Row::new().with("id", 2).with("label", "Globex"));
    let catalogue = [
        (1, "Widget", 4.5, 1),
        (2, "Widget Pro", 24.0, 1),
        (3, "Gadget", 31.0, 2),
        (4, "Mega widget", 12.0, 2),
        (5, "Sprocket", 2.25, 1),
    ];
    for (id, name, price, maker) in catalogue {
        store.insert(
            "products",
            Row::new()
                .with("id", id)
                .with("name", name)
                .with("price", price)
                .with("maker_id", maker)
                .with("created_at", "2024-01-01 12:00:00"),
        );
    }

    let config = SearchSyncConfig {
        index_name: Some("shop".into()),
        bulk_size: 2,
        ..Default::default()
    };
    let sync = SearchSync::with_clients(config, Arc::new(MemorySearchClient::new()), store.clone());

    let makers = ModelSchema::new("makers", "id").integer("id").string("label");
    sync.register_model(
        ModelSchema::new("products", "id")
            .integer("id")
            .string("name")
            .double("price")
            .integer("maker_id")
            .string("created_at")
            .belongs_to("maker", "maker_id", makers)
            .index_relations(["maker"]),
    );
    println!("   └─ Models: {:?}", sync.models());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Rebuild
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 Rebuilding index...");
    let report = sync.rebuild("products", RebuildOptions::new().page_size(2)).await?;
    println!(
        "   └─ {} rows in {} pages, {} bulk writes ({:?})",
        report.rows, report.pages, report.batches, report.elapsed
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Save / delete hooks
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Applying changes...");
    let gizmo = Row::new()
        .with("id", 6)
        .with("name", "Widget Gizmo")
        .with("price", 18.0)
        .with("maker_id", 2)
        .with("created_at", "2024-02-01 08:30:00");
    store.insert("products", gizmo.clone());
    sync.on_saved("products", &gizmo).await?;
    println!("   ├─ Saved: Widget Gizmo");

    let sprocket = Row::new().with("id", 5);
    store.delete("products", "id", "5");
    sync.on_deleted("products", &sprocket).await?;
    println!("   └─ Deleted: Sprocket");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Search
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Searching name~\"wid\", price >= 10, cheapest first...");
    let filter = AttributeFilter::new().set("name", "wid").set("price", ">=10");
    let provider = sync
        .search("products", &filter, None)?
        .with_sort(Sort::from_param("price"))
        .with_pagination(Pagination::new(10));

    println!("   ├─ Matches: {}", provider.total_item_count().await?);
    let scores = provider.scores().await?.clone();
    for row in provider.fetch_result_rows().await? {
        let key = row.key("id").unwrap_or_default();
        println!(
            "   │  └─ #{} {} ({}) score={:.2}",
            key,
            row.get("name").and_then(|v| v.as_str()).unwrap_or("?"),
            row.get("price").and_then(|v| v.as_f64()).unwrap_or_default(),
            scores.get(&key).copied().unwrap_or_default(),
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    sync.close().await?;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, samples.len(), sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, value) in &counters {
        println!("   ├─ {} = {}", name, value);
    }
    for (name, value) in &gauges {
        println!("   ├─ {} = {:.2}", name, value);
    }
    for (name, count, sum) in &histograms {
        println!("   ├─ {} count={} sum={:.4}", name, count, sum);
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
