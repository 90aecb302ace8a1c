// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod error;
pub mod ingest;
pub mod layout;
pub mod sink;

// ---- Re-exports for stable public API ----
pub use crate::error::IngestError;
pub use crate::ingest::paginate::{PaginationConfig, Paginator};
pub use crate::ingest::providers::GhoApiFetcher;
pub use crate::ingest::types::{Page, PageFetcher, PageRequest, Record, RecordSource};
pub use crate::ingest::{run_ingest, RunOutcome, SinkMode};
