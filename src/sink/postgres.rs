// src/sink/postgres.rs
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use crate::error::IngestError;
use crate::ingest::config::WarehouseConfig;
use crate::sink::warehouse::{validate_table_name, WarehouseRow, WarehouseSession};

/// Bind parameters per row.
const COLS_PER_ROW: usize = 4;

/// Postgres caps a statement at 65535 bind parameters.
pub const MAX_BATCH_ROWS: usize = u16::MAX as usize / COLS_PER_ROW;

pub fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         indicator TEXT, \
         ingest_date DATE, \
         id TEXT, \
         data JSONB)"
    )
}

/// `INSERT ... VALUES ($1, $2, $3, $4::text::jsonb), (...)` for `rows` rows.
/// The payload is bound as text and parsed server-side so the stored JSON
/// comes from the exact bytes written to the raw file.
pub fn insert_statement(table: &str, rows: usize) -> String {
    let mut sql = format!("INSERT INTO {table} (indicator, ingest_date, id, data) VALUES ");
    for i in 0..rows {
        let p = i * COLS_PER_ROW;
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&format!(
            "(${}, ${}, ${}, ${}::text::jsonb)",
            p + 1,
            p + 2,
            p + 3,
            p + 4
        ));
    }
    sql
}

/// A warehouse session on one PostgreSQL connection.
///
/// The connection driver runs on its own task; dropping the session aborts
/// it, which closes the socket and makes the server roll back any open
/// transaction.
pub struct PostgresWarehouse {
    client: Client,
    connection: JoinHandle<()>,
    in_transaction: bool,
}

impl PostgresWarehouse {
    pub async fn connect(cfg: &WarehouseConfig) -> Result<Self, IngestError> {
        let (client, connection) = cfg
            .pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| IngestError::warehouse("connect", e))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "warehouse connection error");
            }
        });

        tracing::info!(
            host = %cfg.host,
            database = %cfg.database,
            "connected to warehouse"
        );

        let session = Self {
            client,
            connection,
            in_transaction: false,
        };

        if let Some(schema) = cfg.schema.as_deref() {
            session
                .client
                .batch_execute(&format!("SET search_path TO {schema}"))
                .await
                .map_err(|e| IngestError::warehouse("set search_path", e))?;
        }

        Ok(session)
    }
}

#[async_trait]
impl WarehouseSession for PostgresWarehouse {
    async fn ensure_table(&mut self, table: &str) -> Result<(), IngestError> {
        validate_table_name(table)?;
        self.client
            .batch_execute(&create_table_statement(table))
            .await
            .map_err(|e| IngestError::warehouse("create table", e))?;
        tracing::debug!(table, "warehouse table ensured");
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), IngestError> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| IngestError::warehouse("begin", e))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        rows: &[WarehouseRow],
    ) -> Result<(), IngestError> {
        if rows.is_empty() {
            return Ok(());
        }
        if rows.len() > MAX_BATCH_ROWS {
            return Err(IngestError::warehouse(
                "insert",
                format!("batch of {} rows exceeds limit of {MAX_BATCH_ROWS}", rows.len()),
            ));
        }

        let sql = insert_statement(table, rows.len());
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * COLS_PER_ROW);
        for r in rows {
            params.push(&r.indicator);
            params.push(&r.ingest_date);
            params.push(&r.id);
            params.push(&r.data);
        }

        let n = self
            .client
            .execute(sql.as_str(), &params)
            .await
            .map_err(|e| IngestError::warehouse("insert", e))?;
        if n as usize != rows.len() {
            return Err(IngestError::warehouse(
                "insert",
                format!("inserted {n} rows, expected {}", rows.len()),
            ));
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), IngestError> {
        if self.in_transaction {
            self.client
                .batch_execute("COMMIT")
                .await
                .map_err(|e| IngestError::warehouse("commit", e))?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn max_batch_rows(&self) -> Option<usize> {
        Some(MAX_BATCH_ROWS)
    }
}

impl Drop for PostgresWarehouse {
    fn drop(&mut self) {
        if self.in_transaction {
            tracing::warn!("warehouse session dropped mid-transaction, rolling back");
        }
        self.connection.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_numbers_placeholders_per_row() {
        assert_eq!(
            insert_statement("t", 2),
            "INSERT INTO t (indicator, ingest_date, id, data) VALUES \
             ($1, $2, $3, $4::text::jsonb), ($5, $6, $7, $8::text::jsonb)"
        );
    }

    #[test]
    fn create_is_idempotent_ddl() {
        let sql = create_table_statement("raw.who_x");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS raw.who_x ("));
        assert!(sql.contains("data JSONB"));
    }

    #[test]
    fn batch_limit_fits_bind_parameter_cap() {
        assert_eq!(MAX_BATCH_ROWS, 16383);
        assert!(MAX_BATCH_ROWS * COLS_PER_ROW <= u16::MAX as usize);
    }
}
