// tests/metrics_ingest.rs
#![cfg(feature = "strict-metrics")]
mod common;

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::Mutex;
use std::sync::Arc;

use common::{FakeWarehouse, ScriptedFetcher, WarehouseLog};
use who_gho_ingest::sink::WarehouseTarget;
use who_gho_ingest::{run_ingest, PaginationConfig, SinkMode};

#[tokio::test]
async fn ingest_and_warehouse_series_exposed_after_run() {
    // Install a local recorder before anything is emitted
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("recorder");

    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("part-00000.jsonl");
    let fetcher = ScriptedFetcher::with_sizes(&[2, 2, 1]);
    let cfg = PaginationConfig::new("X").with_page_size(2);
    let log = Arc::new(Mutex::new(WarehouseLog::default()));
    let target =
        WarehouseTarget::new(Box::new(FakeWarehouse::new(log.clone())), "who_x", 2).unwrap();

    let outcome = run_ingest(
        &fetcher,
        &cfg,
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        &out,
        SinkMode::Warehouse(target),
    )
    .await
    .unwrap();
    assert_eq!(outcome.records, 5);
    assert_eq!(log.lock().inserts, vec![2, 2, 1]);

    // Scrape metrics text and check series presence by substring
    let text = handle.render();
    for series in [
        "ingest_pages_total",
        "ingest_records_total",
        "warehouse_batches_total",
        "warehouse_rows_total",
        "ingest_runs_total{outcome=\"ok\"}",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(!text.contains("ingest_runs_total{outcome=\"error\"}"));
}
