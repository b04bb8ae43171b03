pub mod duckdb;
pub mod sqlite;
