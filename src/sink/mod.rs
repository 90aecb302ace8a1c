// src/sink/mod.rs
pub mod postgres;
pub mod raw;
pub mod warehouse;

pub use raw::{write_jsonl, JsonlWriter};
pub use warehouse::{write_jsonl_and_warehouse, WarehouseRow, WarehouseSession, WarehouseTarget};
