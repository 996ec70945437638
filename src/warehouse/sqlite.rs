// src/warehouse/sqlite.rs
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::coerce;
use super::{TableRef, Warehouse};
use crate::entity::schema::FieldSchema;
use crate::entity::Record;
use crate::error::SyncError;

/// SQLite-backed table store. Tables are named `"dataset.table"`.
#[derive(Clone)]
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWarehouse {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open warehouse db {path}"))?;
        for (pragma, value) in [("journal_mode", "WAL"), ("synchronous", "NORMAL")] {
            if let Err(e) = conn.pragma_update(None, pragma, value) {
                tracing::warn!(target: "warehouse", path, pragma, value, error = %e, "pragma not applied");
            }
        }
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory warehouse")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// All rows in load order, decoded back to JSON.
    pub async fn read_rows(
        &self,
        table: &TableRef,
        schema: &[FieldSchema],
    ) -> Result<Vec<Record>, SyncError> {
        let conn = self.conn.lock().await;
        let name = table.to_string();
        if !table_exists(&conn, &name)? {
            return Ok(Vec::new());
        }

        let cols = schema
            .iter()
            .map(|f| quote_ident(f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM {} ORDER BY rowid ASC",
            quote_ident(&name)
        ))?;
        let raw_rows = stmt
            .query_map([], |row| {
                (0..schema.len())
                    .map(|i| row.get::<_, rusqlite::types::Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(raw_rows.len());
        for values in raw_rows {
            let mut rec = Record::new();
            for (field, v) in schema.iter().zip(values) {
                let decoded = coerce::decode_column(field, v).map_err(SyncError::Warehouse)?;
                rec.insert(field.name.to_string(), decoded);
            }
            out.push(rec);
        }
        Ok(out)
    }
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .map(|hit| hit.is_some())
}

fn create_table_sql(name: &str, schema: &[FieldSchema]) -> String {
    let cols = schema
        .iter()
        .map(|f| format!("{} {}", quote_ident(f.name), f.column_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({cols})", quote_ident(name))
}

fn insert_sql(name: &str, schema: &[FieldSchema]) -> String {
    let cols = schema
        .iter()
        .map(|f| quote_ident(f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let params = (1..=schema.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({cols}) VALUES ({params})", quote_ident(name))
}

fn compact_sql(name: &str, primary_keys: &[&str], watermark_field: &str) -> String {
    let t = quote_ident(name);
    let partition = primary_keys
        .iter()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ");
    let wm = quote_ident(watermark_field);
    format!(
        "DELETE FROM {t} WHERE rowid NOT IN (
            SELECT rid FROM (
                SELECT rowid AS rid,
                       ROW_NUMBER() OVER (
                           PARTITION BY {partition}
                           ORDER BY {wm} DESC, rowid DESC
                       ) AS row_num
                FROM {t}
            )
            WHERE row_num = 1
        )"
    )
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn max_watermark(
        &self,
        table: &TableRef,
        field: &str,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        let conn = self.conn.lock().await;
        let name = table.to_string();
        if !table_exists(&conn, &name)? {
            return Ok(None);
        }

        let max: Option<String> = conn.query_row(
            &format!(
                "SELECT MAX({}) AS incre FROM {}",
                quote_ident(field),
                quote_ident(&name)
            ),
            [],
            |row| row.get(0),
        )?;

        max.map(|s| coerce::parse_timestamp(&s))
            .transpose()
            .map_err(SyncError::Warehouse)
    }

    async fn append(
        &self,
        table: &TableRef,
        schema: &[FieldSchema],
        rows: &[Record],
    ) -> Result<u64, SyncError> {
        let name = table.to_string();
        let load_err = |reason: String| SyncError::Load {
            table: name.clone(),
            reason,
        };

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(|e| load_err(e.to_string()))?;
        tx.execute(&create_table_sql(&name, schema), [])
            .map_err(|e| load_err(e.to_string()))?;

        let mut accepted = 0u64;
        {
            let mut stmt = tx
                .prepare(&insert_sql(&name, schema))
                .map_err(|e| load_err(e.to_string()))?;
            for (i, row) in rows.iter().enumerate() {
                let values = coerce::encode_row(schema, row)
                    .map_err(|e| load_err(format!("row {i}: {e}")))?;
                stmt.execute(params_from_iter(values.iter()))
                    .map_err(|e| load_err(format!("row {i}: {e}")))?;
                accepted += 1;
            }
        }
        tx.commit().map_err(|e| load_err(e.to_string()))?;
        Ok(accepted)
    }

    async fn compact(
        &self,
        table: &TableRef,
        primary_keys: &[&str],
        watermark_field: &str,
    ) -> Result<u64, SyncError> {
        let name = table.to_string();
        let compaction_err = |e: rusqlite::Error| SyncError::Compaction {
            table: name.clone(),
            reason: e.to_string(),
        };

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(compaction_err)?;
        let removed = tx
            .execute(&compact_sql(&name, primary_keys, watermark_field), [])
            .map_err(compaction_err)?;
        tx.commit().map_err(compaction_err)?;
        Ok(removed as u64)
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, SyncError> {
        let conn = self.conn.lock().await;
        let name = table.to_string();
        if !table_exists(&conn, &name)? {
            return Ok(0);
        }
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&name)),
            [],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }
}
