// src/layout.rs
// Partitioned output layout of the raw layer and the per-run metadata sidecar.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ingest::paginate::PaginationConfig;

pub const PART_FILE: &str = "part-00000.jsonl";
pub const META_FILE: &str = "_meta.json";

/// UTC calendar date the run executes on.
pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `<data_dir>/raw/who/<indicator>/ingest_date=YYYY-MM-DD/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    dir: PathBuf,
}

impl RunLayout {
    pub fn new(data_dir: &Path, indicator: &str, ingest_date: NaiveDate) -> Self {
        let dir = data_dir
            .join("raw")
            .join("who")
            .join(indicator)
            .join(format!("ingest_date={}", ingest_date.format("%Y-%m-%d")));
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn part_file(&self) -> PathBuf {
        self.dir.join(PART_FILE)
    }

    pub fn meta_file(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn ensure_dir(&self) -> Result<(), IngestError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| IngestError::io(&self.dir, e))
    }

    /// Writes the sidecar (pretty JSON) and returns its path.
    pub fn write_metadata(&self, meta: &RunMetadata) -> Result<PathBuf, IngestError> {
        let path = self.meta_file();
        let body = serde_json::to_string_pretty(meta).map_err(|e| {
            IngestError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        std::fs::write(&path, body).map_err(|e| IngestError::io(&path, e))?;
        Ok(path)
    }
}

/// What a run was asked to do. Written before the first fetch, whether or
/// not the run later succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct RunMetadata {
    pub indicator: String,
    pub ingest_date: NaiveDate,
    pub page_size: usize,
    pub max_rows: Option<usize>,
    pub select: Option<String>,
    pub filter: Option<String>,
    pub timestamp_utc: String,
}

impl RunMetadata {
    pub fn new(cfg: &PaginationConfig, ingest_date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            indicator: cfg.indicator.clone(),
            ingest_date,
            page_size: cfg.page_size,
            max_rows: cfg.max_rows,
            select: cfg.select.clone(),
            filter: cfg.filter.clone(),
            timestamp_utc: at.to_rfc3339_opts(SecondsFormat::Micros, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn paths_are_partitioned_by_indicator_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let l = RunLayout::new(Path::new("data"), "MDG_0000000007", date);
        assert_eq!(
            l.part_file(),
            Path::new("data/raw/who/MDG_0000000007/ingest_date=2026-10-17/part-00000.jsonl")
        );
        assert_eq!(
            l.meta_file(),
            Path::new("data/raw/who/MDG_0000000007/ingest_date=2026-10-17/_meta.json")
        );
    }

    #[test]
    fn metadata_sidecar_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let cfg = PaginationConfig::new("X")
            .with_page_size(50)
            .with_max_rows(Some(10))
            .with_filter(Some("SpatialDimType eq 'COUNTRY'".into()));

        let l = RunLayout::new(tmp.path(), "X", date);
        l.ensure_dir().unwrap();
        let path = l.write_metadata(&RunMetadata::new(&cfg, date, at)).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(v["indicator"], "X");
        assert_eq!(v["ingest_date"], "2026-01-02");
        assert_eq!(v["page_size"], 50);
        assert_eq!(v["max_rows"], 10);
        assert_eq!(v["select"], serde_json::Value::Null);
        assert_eq!(v["filter"], "SpatialDimType eq 'COUNTRY'");
        assert_eq!(v["timestamp_utc"], "2026-01-02T03:04:05.000000+00:00");
    }
}
