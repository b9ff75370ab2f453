//! NDJSON event feed adapter for vesta.
//!
//! This crate implements the [`EventSource`](vesta_core::ports::EventSource)
//! port over a newline-delimited JSON file, read once or followed like
//! `tail -f`.
//!
//! # Record format
//!
//! One JSON object per line, tagged by `type`:
//!
//! ```text
//! {"type":"event","block_number":12,"log_index":0,"tx_hash":"0x..","block_timestamp":1700000000,"name":"Deposited","data":{...}}
//! {"type":"rollback","block_number":11,"log_index":3}
//! ```
//!
//! Consecutive events of the same block are delivered as one batch.

mod jsonl;

pub use jsonl::{JsonLinesConfig, JsonLinesSource};
