// src/ingest/providers/mod.rs
pub mod gho;

pub use gho::GhoApiFetcher;
