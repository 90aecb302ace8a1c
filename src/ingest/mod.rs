// src/ingest/mod.rs
pub mod config;
pub mod paginate;
pub mod providers;
pub mod types;

use chrono::NaiveDate;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ingest::paginate::{PaginationConfig, Paginator};
use crate::ingest::types::PageFetcher;
use crate::sink::{write_jsonl, write_jsonl_and_warehouse, WarehouseTarget};

/// One-time metrics registration (so series show up once a recorder exists).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_pages_total", "Page fetch calls that returned a page.");
        describe_counter!("ingest_records_total", "Records received from the indicator API.");
        describe_counter!(
            "ingest_fetch_errors_total",
            "Page fetches that failed (transport or non-200)."
        );
        describe_histogram!("ingest_fetch_ms", "Page fetch time in milliseconds.");
        describe_counter!("warehouse_batches_total", "Warehouse insert calls.");
        describe_counter!("warehouse_rows_total", "Rows inserted into the warehouse.");
        describe_counter!("ingest_runs_total", "Ingestion runs, labelled by outcome.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Which sinks a run writes to.
pub enum SinkMode {
    RawOnly,
    /// Raw file plus batched warehouse inserts.
    Warehouse(WarehouseTarget),
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub records: usize,
    pub output: PathBuf,
    pub table: Option<String>,
}

/// Runs one ingestion: paginates `fetcher` for `cfg.indicator` and lands
/// every record in `output` (and the warehouse, in [`SinkMode::Warehouse`]).
/// No retries; the first error aborts the run and is returned unchanged.
pub async fn run_ingest<F: PageFetcher + ?Sized>(
    fetcher: &F,
    cfg: &PaginationConfig,
    ingest_date: NaiveDate,
    output: &Path,
    mode: SinkMode,
) -> Result<RunOutcome, IngestError> {
    ensure_metrics_described();

    let mut records = Paginator::new(fetcher, cfg)?;
    tracing::info!(
        indicator = %cfg.indicator,
        %ingest_date,
        provider = fetcher.name(),
        page_size = cfg.page_size,
        max_rows = ?cfg.max_rows,
        output = %output.display(),
        "starting ingestion run"
    );

    let res = match mode {
        SinkMode::RawOnly => write_jsonl(output, &mut records)
            .await
            .map(|n| (n, None)),
        SinkMode::Warehouse(target) => {
            let table = target.table.clone();
            write_jsonl_and_warehouse(output, &mut records, &cfg.indicator, ingest_date, target)
                .await
                .map(|n| (n, Some(table)))
        }
    };

    gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    match res {
        Ok((n, table)) => {
            counter!("ingest_runs_total", "outcome" => "ok").increment(1);
            tracing::info!(
                indicator = %cfg.indicator,
                rows = n,
                pages = records.pages(),
                "ingestion run complete"
            );
            Ok(RunOutcome {
                records: n,
                output: output.to_path_buf(),
                table,
            })
        }
        Err(e) => {
            counter!("ingest_runs_total", "outcome" => "error").increment(1);
            tracing::error!(
                indicator = %cfg.indicator,
                cursor = records.cursor(),
                error = %e,
                "ingestion run failed"
            );
            Err(e)
        }
    }
}
