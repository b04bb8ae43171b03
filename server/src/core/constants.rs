//! Service-wide constants

/// Standard OTLP/HTTP port
pub const DEFAULT_PORT: u16 = 4318;

/// Maximum accepted request body size (applies to the wire bytes)
pub const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Whole-request timeout (stands in for a server write timeout)
pub const SERVER_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Grace period for in-flight requests during shutdown
pub const SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 5;

/// SQL query endpoint timeout
pub const QUERY_TIMEOUT_SECS: u64 = 5;

/// Row limit appended to queries that carry none
pub const QUERY_ROW_LIMIT: usize = 1000;

pub const DEFAULT_DB_PATH: &str = "mo11y.duckdb";
pub const DEFAULT_AUTH_DB_PATH: &str = "mo11y.auth.db";

pub const DEFAULT_RETENTION_HOURS: u64 = 168;
pub const DEFAULT_CLEANUP_INTERVAL_MINS: u64 = 60;

pub const DEFAULT_MAX_CONCURRENT_INGEST: usize = 10;
pub const DEFAULT_MAX_CONCURRENT_QUERY: usize = 5;

pub const API_KEY_PREFIX: &str = "mo11y_";
pub const API_KEY_RANDOM_BYTES: usize = 16;
/// `mo11y_` plus six hex chars
pub const API_KEY_PREFIX_DISPLAY_LEN: usize = 12;

/// Minimum length for the key-hashing pepper
pub const MIN_PEPPER_LEN: usize = 32;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
