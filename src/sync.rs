//! One run of the order sync: window → pages → projection → table.
//!
//! `SyncJob` is the whole pipeline for one entity and borrows its collaborators.
//! `SyncService` owns the process-wide handles and serializes runs per entity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::entity::{Entity, EntitySpec};
use crate::error::SyncError;
use crate::ingest::{ensure_metrics_described, fetch_all, types::PageSource};
use crate::warehouse::{TableRef, Warehouse};
use crate::window::{format_ts, resolve_window, SyncRequest};

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub dataset: String,
    /// Start used for incremental runs against an empty table.
    pub bootstrap_start: Option<DateTime<Utc>>,
    /// Budget for window resolution plus fetching; the sink is not started after it.
    pub deadline: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            dataset: crate::config::DEFAULT_DATASET.to_string(),
            bootstrap_start: None,
            deadline: Duration::from_secs(540),
        }
    }
}

/// Result of a run. `output_rows` is absent when nothing was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub table_name: String,
    pub start: String,
    pub end: String,
    pub num_input_records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<u64>,
}

pub struct SyncJob<'a> {
    entity: &'static EntitySpec,
    source: &'a dyn PageSource,
    warehouse: &'a dyn Warehouse,
    options: &'a JobOptions,
}

impl<'a> SyncJob<'a> {
    pub fn new(
        entity: &'static EntitySpec,
        source: &'a dyn PageSource,
        warehouse: &'a dyn Warehouse,
        options: &'a JobOptions,
    ) -> Self {
        Self {
            entity,
            source,
            warehouse,
            options,
        }
    }

    pub fn table(&self) -> TableRef {
        TableRef::new(self.options.dataset.clone(), self.entity.table_name)
    }

    pub async fn run(&self, req: &SyncRequest) -> Result<SyncSummary, SyncError> {
        self.run_at(req, Utc::now()).await
    }

    /// Same as `run` with an explicit "now" for the incremental window end.
    pub async fn run_at(
        &self,
        req: &SyncRequest,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary, SyncError> {
        ensure_metrics_described();
        let slug = self.entity.slug;
        let t0 = Instant::now();

        let result = self.run_inner(req, now).await;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("sync_duration_ms", "entity" => slug).record(ms);
        match &result {
            Ok(summary) => {
                counter!("sync_runs_total", "entity" => slug, "outcome" => "ok").increment(1);
                gauge!("sync_last_success_ts", "entity" => slug).set(Utc::now().timestamp() as f64);
                tracing::info!(
                    target: "sync",
                    entity = slug,
                    table = %summary.table_name,
                    start = %summary.start,
                    end = %summary.end,
                    input = summary.num_input_records,
                    output = ?summary.output_rows,
                    ms,
                    "sync finished"
                );
            }
            Err(e) => {
                counter!("sync_runs_total", "entity" => slug, "outcome" => e.kind()).increment(1);
                tracing::warn!(target: "sync", entity = slug, kind = e.kind(), error = %e, ms, "sync failed");
            }
        }
        result
    }

    async fn run_inner(
        &self,
        req: &SyncRequest,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary, SyncError> {
        let entity = self.entity;
        let table = self.table();
        let deadline = tokio::time::Instant::now().checked_add(self.options.deadline);
        if deadline.is_none() {
            tracing::warn!(
                target: "sync",
                entity = entity.slug,
                deadline = ?self.options.deadline,
                "deadline out of range, running without one"
            );
        }

        let work = async {
            let window = resolve_window(
                req,
                &table,
                entity.watermark_field,
                self.warehouse,
                self.options.bootstrap_start,
                now,
            )
            .await?;
            tracing::info!(
                target: "sync",
                entity = entity.slug,
                start = %format_ts(window.start()),
                end = %format_ts(window.end()),
                "window resolved"
            );
            let raw = fetch_all(self.source, entity, &window).await?;
            Ok::<_, SyncError>((window, raw))
        };
        let (window, raw) = match deadline {
            Some(at) => tokio::time::timeout_at(at, work)
                .await
                .map_err(|_| SyncError::Timeout(self.options.deadline))??,
            None => work.await?,
        };

        let mut summary = SyncSummary {
            table_name: table.table.clone(),
            start: format_ts(window.start()),
            end: format_ts(window.end()),
            num_input_records: raw.len(),
            output_rows: None,
        };
        if raw.is_empty() {
            tracing::info!(target: "sync", entity = entity.slug, "no records in window, table untouched");
            return Ok(summary);
        }
        if deadline.is_some_and(|at| tokio::time::Instant::now() >= at) {
            return Err(SyncError::Timeout(self.options.deadline));
        }

        let rows = entity.project_all(&raw);
        let output_rows = self.warehouse.append(&table, entity.schema, &rows).await?;
        counter!("sync_rows_loaded_total", "entity" => entity.slug).increment(output_rows);
        if output_rows != rows.len() as u64 {
            tracing::warn!(
                target: "sync",
                entity = entity.slug,
                projected = rows.len(),
                accepted = output_rows,
                "warehouse accepted a different number of rows than were sent"
            );
        }

        let removed = self
            .warehouse
            .compact(&table, entity.primary_keys, entity.watermark_field)
            .await?;
        tracing::info!(
            target: "sync",
            entity = entity.slug,
            table = %table,
            appended = output_rows,
            superseded = removed,
            "table compacted"
        );

        summary.output_rows = Some(output_rows);
        Ok(summary)
    }
}

/// Row count and current watermark of an entity's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub table_name: String,
    pub rows: u64,
    pub watermark: Option<String>,
}

/// Process-wide sync handles plus one run lock per entity.
#[derive(Clone)]
pub struct SyncService {
    source: Arc<dyn PageSource>,
    warehouse: Arc<dyn Warehouse>,
    options: Arc<JobOptions>,
    locks: Arc<[Mutex<()>; Entity::COUNT]>,
}

impl SyncService {
    pub fn new(
        source: Arc<dyn PageSource>,
        warehouse: Arc<dyn Warehouse>,
        options: JobOptions,
    ) -> Self {
        Self {
            source,
            warehouse,
            options: Arc::new(options),
            locks: Arc::new(std::array::from_fn(|_| Mutex::new(()))),
        }
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Run one sync. A second run of the same entity while one is in flight
    /// fails with `AlreadyRunning` instead of racing on the table.
    pub async fn run(
        &self,
        entity: Entity,
        req: &SyncRequest,
    ) -> Result<SyncSummary, SyncError> {
        let _guard = self.locks[entity as usize]
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning(entity.slug().to_string()))?;

        SyncJob::new(
            entity.spec(),
            self.source.as_ref(),
            self.warehouse.as_ref(),
            &self.options,
        )
        .run(req)
        .await
    }

    pub async fn status(&self, entity: Entity) -> Result<TableStatus, SyncError> {
        let spec = entity.spec();
        let table = TableRef::new(self.options.dataset.clone(), spec.table_name);
        let rows = self.warehouse.row_count(&table).await?;
        let watermark = self
            .warehouse
            .max_watermark(&table, spec.watermark_field)
            .await?
            .map(format_ts);
        Ok(TableStatus {
            table_name: spec.table_name.to_string(),
            rows,
            watermark,
        })
    }
}
