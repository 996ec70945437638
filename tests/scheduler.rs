// tests/scheduler.rs
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use order_sync::ingest::scheduler::{run_tick, TickReport};
use order_sync::ingest::scripted::ScriptedSource;
use order_sync::warehouse::{SqliteWarehouse, TableRef, Warehouse};
use order_sync::{JobOptions, SyncService};
use serde_json::json;

#[tokio::test]
async fn tick_syncs_every_entity_incrementally() {
    let source = ScriptedSource::new(vec![vec![
        json!({"id": 1, "updated_at": "2021-09-01T10:00:00Z", "line_items": []}),
    ]]);
    let warehouse = Arc::new(SqliteWarehouse::open_in_memory().unwrap());
    let opts = JobOptions {
        bootstrap_start: Some(Utc.with_ymd_and_hms(2021, 9, 1, 0, 0, 0).unwrap()),
        ..JobOptions::default()
    };
    let service = SyncService::new(Arc::new(source), warehouse.clone(), opts);

    let report = run_tick(&service).await;
    assert_eq!(report, TickReport { ok: 2, failed: 0 });

    for table in ["Orders", "OrderLines"] {
        let n = warehouse
            .row_count(&TableRef::new("Shopify", table))
            .await
            .unwrap();
        assert_eq!(n, 1, "{table}");
    }
}

#[tokio::test]
async fn failures_are_counted_not_fatal() {
    // No bootstrap and empty tables: every entity fails with EmptyTable.
    let service = SyncService::new(
        Arc::new(ScriptedSource::empty()),
        Arc::new(SqliteWarehouse::open_in_memory().unwrap()),
        JobOptions::default(),
    );

    let report = run_tick(&service).await;
    assert_eq!(report, TickReport { ok: 0, failed: 2 });
}
