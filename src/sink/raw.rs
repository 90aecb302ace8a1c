// src/sink/raw.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ingest::types::{Record, RecordSource};

/// JSON Lines writer for the raw layer. The target is truncated on open:
/// rerunning the same partition replaces it.
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self, IngestError> {
        let file = File::create(path).map_err(|e| IngestError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Serializes the record first and only then writes the whole line, so a
    /// serialization failure never leaves half a record behind. Returns the
    /// serialized payload (without the newline).
    pub fn write_record(&mut self, record: &Record) -> Result<String, IngestError> {
        let payload = record.to_json().map_err(|e| {
            IngestError::io(&self.path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(&payload);
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .map_err(|e| IngestError::io(&self.path, e))?;
        self.written += 1;
        Ok(payload)
    }

    /// Flushes and returns the number of lines written.
    pub fn finish(mut self) -> Result<usize, IngestError> {
        self.out.flush().map_err(|e| IngestError::io(&self.path, e))?;
        self.out
            .get_ref()
            .sync_all()
            .map_err(|e| IngestError::io(&self.path, e))?;
        Ok(self.written)
    }

    /// Keeps what was written so far on disk after a failed run.
    pub fn abandon(mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "flushing partial output failed");
        }
        tracing::warn!(
            path = %self.path.display(),
            written = self.written,
            "run aborted, partial raw output left in place"
        );
    }
}

/// Drains `records` into a fresh JSON Lines file at `path`.
pub async fn write_jsonl<S: RecordSource + ?Sized>(
    path: &Path,
    records: &mut S,
) -> Result<usize, IngestError> {
    let mut writer = JsonlWriter::create(path)?;
    let res = async {
        while let Some(r) = records.next_record().await? {
            writer.write_record(&r)?;
        }
        Ok::<_, IngestError>(())
    }
    .await;

    match res {
        Ok(()) => writer.finish(),
        Err(e) => {
            writer.abandon();
            Err(e)
        }
    }
}
