// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod scripted;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::entity::{EntitySpec, Record};
use crate::error::SyncError;
use crate::ingest::types::{PageRequest, PageSource};
use crate::window::TimeWindow;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync runs by entity and outcome.");
        describe_counter!("sync_pages_total", "Pages fetched from the source API.");
        describe_counter!(
            "sync_records_fetched_total",
            "Raw records returned by the source API."
        );
        describe_counter!(
            "sync_rows_loaded_total",
            "Rows accepted by the warehouse append."
        );
        describe_counter!(
            "sync_fetch_retries_total",
            "Page requests retried after a transient failure."
        );
        describe_histogram!("sync_duration_ms", "Wall time of a sync run in milliseconds.");
        describe_gauge!(
            "sync_last_success_ts",
            "Unix ts of the last successful sync per entity."
        );
        describe_counter!("sync_scheduler_ticks_total", "Scheduler ticks completed.");
        describe_gauge!("sync_scheduler_last_tick_ts", "Unix ts of the last scheduler tick.");
    });
}

/// Walk the cursor chain from the first page until the source stops returning
/// a next cursor. Records come back in API order; any page failure aborts.
pub async fn fetch_all(
    source: &dyn PageSource,
    entity: &EntitySpec,
    window: &TimeWindow,
) -> Result<Vec<Record>, SyncError> {
    ensure_metrics_described();

    let mut request = PageRequest::first(entity, window);
    let mut records = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(&request).await.map_err(|e| {
            tracing::warn!(
                target: "sync",
                error = %e,
                source = source.name(),
                entity = entity.slug,
                page = pages + 1,
                "page fetch failed"
            );
            e
        })?;
        pages += 1;
        counter!("sync_pages_total", "entity" => entity.slug).increment(1);
        tracing::debug!(
            target: "sync",
            entity = entity.slug,
            page = pages,
            records = page.records.len(),
            has_next = page.next.is_some(),
            "page fetched"
        );

        records.extend(page.records);
        match page.next {
            Some(cursor) => {
                request = PageRequest::Next {
                    resource: entity.resource.to_string(),
                    cursor,
                }
            }
            None => break,
        }
    }

    counter!("sync_records_fetched_total", "entity" => entity.slug).increment(records.len() as u64);
    Ok(records)
}
