//! Storage error taxonomy and per-request result accounting
//!
//! Infrastructure failures (connection, appender open, flush) surface as
//! HTTP 503; per-row rejections never become HTTP errors and travel back
//! inside the OTLP partial-success response instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Engine/system failure; the client should retry
    #[error("{context}: {source}")]
    Infrastructure {
        context: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn infrastructure(context: &'static str, source: duckdb::Error) -> Self {
        Self::Infrastructure { context, source }
    }
}

/// Outcome of one bulk-store operation, reported as OTLP partial success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreResult {
    /// Items successfully appended
    pub accepted: u64,
    /// Items that failed validation at append time
    pub rejected: u64,
    /// Human-readable diagnostics for rejected items
    pub errors: Vec<String>,
}

impl StoreResult {
    /// Record a rejected item with its diagnostic
    pub fn add_error(&mut self, msg: String) {
        self.rejected += 1;
        self.errors.push(msg);
    }

    pub fn has_rejections(&self) -> bool {
        self.rejected > 0
    }

    /// Combined message for the partial-success response: the first
    /// diagnostic, prefixed with the error count when there are several.
    pub fn error_message(&self) -> String {
        match self.errors.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [first, ..] => format!("{} errors: {}", self.errors.len(), first),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_error_increments_rejected() {
        let mut result = StoreResult::default();
        assert!(!result.has_rejections());

        result.add_error("span abc: bad row".to_string());
        assert_eq!(result.rejected, 1);
        assert!(result.has_rejections());
    }

    #[test]
    fn test_error_message_empty() {
        assert_eq!(StoreResult::default().error_message(), "");
    }

    #[test]
    fn test_error_message_single() {
        let mut result = StoreResult::default();
        result.add_error("span abc: bad row".to_string());
        assert_eq!(result.error_message(), "span abc: bad row");
    }

    #[test]
    fn test_error_message_multiple_prefixes_count() {
        let mut result = StoreResult::default();
        result.add_error("first".to_string());
        result.add_error("second".to_string());
        result.add_error("third".to_string());
        assert_eq!(result.error_message(), "3 errors: first");
    }

    #[test]
    fn test_infrastructure_error_display() {
        let err = StoreError::infrastructure(
            "failed to flush spans",
            duckdb::Error::InvalidQuery,
        );
        assert!(err.to_string().starts_with("failed to flush spans: "));
    }
}
