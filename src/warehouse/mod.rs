// src/warehouse/mod.rs
pub mod coerce;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::schema::FieldSchema;
use crate::entity::Record;
use crate::error::SyncError;

pub use sqlite::SqliteWarehouse;

/// `dataset.table`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// The table store a sync writes into.
///
/// `append` followed by `compact` is the upsert: after both succeed the table
/// holds one row per primary key, the one with the greatest watermark.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// `MAX(field)`; `None` when the table is missing or has no rows.
    async fn max_watermark(
        &self,
        table: &TableRef,
        field: &str,
    ) -> Result<Option<DateTime<Utc>>, SyncError>;

    /// Insert `rows`, creating the table from `schema` if needed. Existing rows
    /// are untouched. Returns the number of rows accepted.
    async fn append(
        &self,
        table: &TableRef,
        schema: &[FieldSchema],
        rows: &[Record],
    ) -> Result<u64, SyncError>;

    /// Keep only the latest row per primary key. Returns the number of rows removed.
    async fn compact(
        &self,
        table: &TableRef,
        primary_keys: &[&str],
        watermark_field: &str,
    ) -> Result<u64, SyncError>;

    /// Row count; 0 for a missing table.
    async fn row_count(&self, table: &TableRef) -> Result<u64, SyncError>;
}
