//! mo11y: an OTLP/HTTP ingestion and query service backed by DuckDB.
//!
//! Agents push telemetry (traces, metrics, logs) as protobuf payloads;
//! operators query the accumulated data through a read-only SQL port.
//! API keys live in a SQLite sidecar database; a retention worker prunes
//! old rows on a timer.

pub mod api;
pub mod core;
pub mod data;
pub mod utils;
