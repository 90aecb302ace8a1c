// src/sink/warehouse.rs
//! Dual-sink writer: raw JSON Lines file plus batched warehouse inserts.
//!
//! The raw file is the source of truth. Each record is written to the file
//! before it joins a batch, so when a warehouse call fails the file may hold
//! more rows than the (rolled back) warehouse transaction ever saw. Only a
//! successful return guarantees that both sides hold the same records.

use chrono::NaiveDate;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::IngestError;
use crate::ingest::types::RecordSource;
use crate::sink::raw::JsonlWriter;

/// One warehouse row: run identity, correlation id and full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseRow {
    pub indicator: String,
    pub ingest_date: NaiveDate,
    pub id: Option<String>,
    /// Serialized record, identical to its raw file line.
    pub data: String,
}

/// A single connection owned by the sink for one run. Dropping a session
/// without [`WarehouseSession::commit`] must discard the transaction and
/// release the connection.
#[async_trait::async_trait]
pub trait WarehouseSession: Send {
    /// Create-if-absent. Safe to call repeatedly; never touches existing rows.
    async fn ensure_table(&mut self, table: &str) -> Result<(), IngestError>;
    async fn begin(&mut self) -> Result<(), IngestError>;
    /// One multi-row insert for the whole batch.
    async fn insert_batch(&mut self, table: &str, rows: &[WarehouseRow])
        -> Result<(), IngestError>;
    async fn commit(self: Box<Self>) -> Result<(), IngestError>;

    /// Largest batch a single `insert_batch` call accepts, if the backend
    /// has one.
    fn max_batch_rows(&self) -> Option<usize> {
        None
    }
}

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// Table names end up inside DDL/DML text, so only `[schema.]ident` passes.
pub fn validate_table_name(table: &str) -> Result<(), IngestError> {
    if TABLE_NAME.is_match(table) {
        Ok(())
    } else {
        Err(IngestError::Config(format!(
            "invalid warehouse table name {table:?} (expected [schema.]identifier)"
        )))
    }
}

/// Default table for an indicator: `who_<indicator lowercased>`.
pub fn default_table_name(indicator: &str) -> String {
    format!("who_{}", indicator.to_ascii_lowercase())
}

/// Where and how to mirror records in the warehouse.
pub struct WarehouseTarget {
    pub session: Box<dyn WarehouseSession>,
    pub table: String,
    pub batch_size: usize,
}

impl WarehouseTarget {
    pub fn new(
        session: Box<dyn WarehouseSession>,
        table: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, IngestError> {
        let table = table.into();
        validate_table_name(&table)?;
        if batch_size == 0 {
            return Err(IngestError::Config("warehouse batch size must be > 0".into()));
        }
        if let Some(limit) = session.max_batch_rows() {
            if batch_size > limit {
                return Err(IngestError::Config(format!(
                    "warehouse batch size {batch_size} exceeds backend limit of {limit} rows"
                )));
            }
        }
        Ok(Self {
            session,
            table,
            batch_size,
        })
    }
}

/// Writes every record to `path` and inserts it into the warehouse in
/// `batch_size` batches inside one transaction, committed only after the
/// source is exhausted. The session is dropped (released) on every path.
pub async fn write_jsonl_and_warehouse<S: RecordSource + ?Sized>(
    path: &Path,
    records: &mut S,
    indicator: &str,
    ingest_date: NaiveDate,
    target: WarehouseTarget,
) -> Result<usize, IngestError> {
    let WarehouseTarget {
        mut session,
        table,
        batch_size,
    } = target;

    session.ensure_table(&table).await?;
    session.begin().await?;

    let mut writer = JsonlWriter::create(path)?;
    let mut batch: Vec<WarehouseRow> = Vec::with_capacity(batch_size);
    let mut batches = 0usize;

    let res = async {
        while let Some(record) = records.next_record().await? {
            let data = writer.write_record(&record)?;
            batch.push(WarehouseRow {
                indicator: indicator.to_string(),
                ingest_date,
                id: record.correlation_id(),
                data,
            });
            if batch.len() >= batch_size {
                flush_batch(&mut *session, &table, &mut batch, &mut batches).await?;
            }
        }
        if !batch.is_empty() {
            flush_batch(&mut *session, &table, &mut batch, &mut batches).await?;
        }
        Ok::<_, IngestError>(())
    }
    .await;

    if let Err(e) = res {
        writer.abandon();
        tracing::warn!(table = %table, batches, "warehouse transaction discarded");
        return Err(e);
    }

    let written = writer.finish()?;
    session.commit().await?;
    tracing::info!(table = %table, rows = written, batches, "warehouse load committed");
    Ok(written)
}

async fn flush_batch(
    session: &mut dyn WarehouseSession,
    table: &str,
    batch: &mut Vec<WarehouseRow>,
    batches: &mut usize,
) -> Result<(), IngestError> {
    session.insert_batch(table, batch).await?;
    *batches += 1;
    counter!("warehouse_batches_total").increment(1);
    counter!("warehouse_rows_total").increment(batch.len() as u64);
    tracing::debug!(table, batch = *batches, rows = batch.len(), "inserted batch");
    batch.clear();
    Ok(())
}
