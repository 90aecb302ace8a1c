// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use who_gho_ingest::sink::{WarehouseRow, WarehouseSession};
use who_gho_ingest::{IngestError, Page, PageFetcher, PageRequest, Record};

pub fn record(id: usize) -> Record {
    serde_json::from_value(json!({
        "Id": id,
        "IndicatorCode": "X",
        "SpatialDim": "FRA",
        "NumericValue": 12.5,
    }))
    .unwrap()
}

/// Replays a fixed list of page results, one per call, regardless of the
/// requested offset. Records every request it sees.
pub struct ScriptedFetcher {
    script: Mutex<Vec<Result<Vec<Record>, IngestError>>>,
    pub calls: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedFetcher {
    /// Pages of the given sizes with consecutive ids, then empty pages forever.
    pub fn with_sizes(sizes: &[usize]) -> Self {
        let mut next = 0;
        let pages = sizes
            .iter()
            .map(|&n| {
                let page: Vec<Record> = (next..next + n).map(record).collect();
                next += n;
                Ok(page)
            })
            .collect();
        Self::new(pages)
    }

    pub fn new(pages: Vec<Result<Vec<Record>, IngestError>>) -> Self {
        let mut script = pages;
        script.reverse();
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn offsets(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|c| c.0).collect()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|c| c.1).collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, req: &PageRequest<'_>) -> Result<Page, IngestError> {
        self.calls.lock().push((req.offset, req.size));
        let next = self.script.lock().pop().unwrap_or_else(|| Ok(vec![]));
        next.map(|records| Page {
            offset: req.offset,
            records,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Observable state of [`FakeWarehouse`], shared with the test after the
/// session itself has been consumed.
#[derive(Debug, Default)]
pub struct WarehouseLog {
    pub tables: HashMap<String, Vec<WarehouseRow>>,
    pub ensure_calls: usize,
    pub begun: bool,
    /// Row count of each insert call, in order.
    pub inserts: Vec<usize>,
    /// Rows inserted in the open transaction.
    pub pending: Vec<WarehouseRow>,
    pub commits: usize,
    pub released: bool,
}

impl WarehouseLog {
    pub fn committed_rows(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }
}

/// In-memory warehouse session. `fail_on_insert = Some(n)` makes the n-th
/// insert call (1-based) fail.
pub struct FakeWarehouse {
    pub log: Arc<Mutex<WarehouseLog>>,
    pub fail_on_insert: Option<usize>,
    pub batch_limit: Option<usize>,
    table: Option<String>,
}

impl FakeWarehouse {
    pub fn new(log: Arc<Mutex<WarehouseLog>>) -> Self {
        log.lock().released = false;
        Self {
            log,
            fail_on_insert: None,
            batch_limit: None,
            table: None,
        }
    }

    pub fn failing_on_insert(mut self, n: usize) -> Self {
        self.fail_on_insert = Some(n);
        self
    }

    pub fn with_batch_limit(mut self, rows: usize) -> Self {
        self.batch_limit = Some(rows);
        self
    }
}

#[async_trait]
impl WarehouseSession for FakeWarehouse {
    async fn ensure_table(&mut self, table: &str) -> Result<(), IngestError> {
        let mut log = self.log.lock();
        log.ensure_calls += 1;
        log.tables.entry(table.to_string()).or_default();
        self.table = Some(table.to_string());
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), IngestError> {
        self.log.lock().begun = true;
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        rows: &[WarehouseRow],
    ) -> Result<(), IngestError> {
        let mut log = self.log.lock();
        if !log.tables.contains_key(table) {
            return Err(IngestError::warehouse("insert", "no such table"));
        }
        log.inserts.push(rows.len());
        if self.fail_on_insert == Some(log.inserts.len()) {
            return Err(IngestError::warehouse("insert", "simulated failure"));
        }
        log.pending.extend_from_slice(rows);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IngestError> {
        let mut log = self.log.lock();
        let table = self.table.clone().unwrap_or_default();
        let pending = std::mem::take(&mut log.pending);
        log.tables.entry(table).or_default().extend(pending);
        log.commits += 1;
        drop(log);
        Ok(())
    }

    fn max_batch_rows(&self) -> Option<usize> {
        self.batch_limit
    }
}

impl Drop for FakeWarehouse {
    fn drop(&mut self) {
        let mut log = self.log.lock();
        // uncommitted rows are discarded with the connection
        log.pending.clear();
        log.released = true;
    }
}

pub fn read_lines(path: &std::path::Path) -> Vec<Record> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
