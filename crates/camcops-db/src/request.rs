//! Units of work sent to the database worker.

use std::fmt;

use crate::query_result::FetchMode;
use crate::sqlargs::SqlArgs;

/// One query for the worker, or the sentinel that tells it to stop.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadedQueryRequest {
    pub sqlargs: SqlArgs,
    pub fetch_mode: FetchMode,
    pub store_column_names: bool,
    pub suppress_errors: bool,
    pub is_abort_request: bool,
}

impl ThreadedQueryRequest {
    pub fn new(
        sqlargs: SqlArgs,
        fetch_mode: FetchMode,
        store_column_names: bool,
        suppress_errors: bool,
    ) -> Self {
        Self {
            sqlargs,
            fetch_mode,
            store_column_names,
            suppress_errors,
            is_abort_request: false,
        }
    }

    /// Poison pill: the worker exits its loop on receipt.
    pub fn abort() -> Self {
        Self {
            sqlargs: SqlArgs::default(),
            fetch_mode: FetchMode::NoAnswer,
            store_column_names: false,
            suppress_errors: false,
            is_abort_request: true,
        }
    }

    /// Whether the caller waits for a result.
    pub fn wants_answer(&self) -> bool {
        !self.is_abort_request && self.fetch_mode != FetchMode::NoAnswer
    }
}

impl fmt::Display for ThreadedQueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_abort_request {
            return f.write_str("ThreadedQueryRequest(abort)");
        }
        write!(
            f,
            "ThreadedQueryRequest(sql={}, fetch_mode={:?}, store_column_names={}, suppress_errors={})",
            self.sqlargs, self.fetch_mode, self.store_column_names, self.suppress_errors
        )
    }
}
