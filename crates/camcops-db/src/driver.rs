//! Connection factories and the single statement-execution path.
//!
//! A [`DatabaseManager`](crate::DatabaseManager) is handed a
//! [`ConnectionFactory`] when it is constructed, and reuses it whenever the
//! connection has to be reopened. Both threaded and direct managers run
//! every statement through [`exec_query`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use tracing::{debug, error};

use crate::error::{DatabaseError, DatabaseResult};
use crate::query_result::{FetchMode, QueryResult};
use crate::request::ThreadedQueryRequest;
use crate::value::Value;

/// Opens connections for a database manager.
pub trait ConnectionFactory: Send + Sync + fmt::Debug {
    fn open(&self, filename: &Path) -> DatabaseResult<Connection>;

    /// Name used in diagnostics.
    fn driver_name(&self) -> &str;
}

/// File-backed SQLCipher connections.
///
/// Nothing is read from the file at open time, so an encrypted database
/// can still be keyed with `PRAGMA key` afterwards.
#[derive(Debug, Clone)]
pub struct SqlCipherDriver {
    busy_timeout: Duration,
}

impl SqlCipherDriver {
    pub const NAME: &'static str = "QSQLCIPHER";

    pub fn new() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for SqlCipherDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for SqlCipherDriver {
    fn open(&self, filename: &Path) -> DatabaseResult<Connection> {
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(filename)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn driver_name(&self) -> &str {
        Self::NAME
    }
}

/// Private in-memory databases; the filename is ignored. Reopening gives
/// a fresh, empty database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver;

impl ConnectionFactory for MemoryDriver {
    fn open(&self, _filename: &Path) -> DatabaseResult<Connection> {
        Ok(Connection::open_in_memory()?)
    }

    fn driver_name(&self) -> &str {
        "QSQLITE_MEMORY"
    }
}

/// Execute one request on `conn`.
///
/// Errors never escape: they are logged (with the SQL and arguments,
/// unless suppressed) and reported as an unsuccessful result.
pub fn exec_query(conn: &Connection, request: &ThreadedQueryRequest) -> QueryResult {
    match try_exec_query(conn, request) {
        Ok(result) => result,
        Err(e) => {
            if !request.suppress_errors {
                error!(
                    error = %e,
                    sql = %request.sqlargs.sql,
                    args = ?request.sqlargs.args,
                    "Query failed"
                );
            }
            QueryResult::failure()
        }
    }
}

fn try_exec_query(conn: &Connection, request: &ThreadedQueryRequest) -> DatabaseResult<QueryResult> {
    let sqlargs = &request.sqlargs;
    debug!(sql = %sqlargs.sql, n_args = sqlargs.args.len(), "Executing");

    let mut stmt = conn.prepare(&sqlargs.sql)?;
    let expected = stmt.parameter_count();
    if expected != sqlargs.args.len() {
        return Err(DatabaseError::InvalidQuery(format!(
            "statement takes {} argument(s) but {} were supplied",
            expected,
            sqlargs.args.len()
        )));
    }
    for (i, arg) in sqlargs.args.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, arg)?;
    }

    let column_names: Vec<String> = if request.store_column_names {
        stmt.column_names().into_iter().map(String::from).collect()
    } else {
        Vec::new()
    };
    let n_cols = stmt.column_count();

    let mut data = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        match request.fetch_mode {
            FetchMode::FetchAll | FetchMode::FetchFirst => {
                let mut values = Vec::with_capacity(n_cols);
                for col in 0..n_cols {
                    values.push(Value::from_sql(SqlValue::from(row.get_ref(col)?)));
                }
                data.push(values);
                if request.fetch_mode == FetchMode::FetchFirst {
                    break;
                }
            }
            // Still step to completion so the statement takes effect.
            FetchMode::NoFetch | FetchMode::NoAnswer => {}
        }
    }
    drop(rows);

    let last_insert_id = if is_insert(&sqlargs.sql) && conn.changes() > 0 {
        Value::Int64(conn.last_insert_rowid())
    } else {
        Value::Null
    };
    Ok(QueryResult::new(true, column_names, data, last_insert_id))
}

fn is_insert(sql: &str) -> bool {
    let head: String = sql
        .trim_start()
        .chars()
        .take(7)
        .collect::<String>()
        .to_ascii_uppercase();
    head.starts_with("INSERT") || head.starts_with("REPLACE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlargs::SqlArgs;

    fn request(sqlargs: impl Into<SqlArgs>, fetch_mode: FetchMode) -> ThreadedQueryRequest {
        ThreadedQueryRequest::new(sqlargs.into(), fetch_mode, true, false)
    }

    fn memory() -> Connection {
        MemoryDriver.open(Path::new("")).unwrap()
    }

    #[test]
    fn test_exec_query_fetch_modes() {
        let conn = memory();
        exec_query(&conn, &request("CREATE TABLE t (a INTEGER, b TEXT)", FetchMode::NoFetch));
        for i in 0..3 {
            let insert = SqlArgs::new(
                "INSERT INTO t (a, b) VALUES (?, ?)",
                vec![Value::Int(i), Value::from(format!("row{i}"))],
            );
            let result = exec_query(&conn, &request(insert, FetchMode::NoFetch));
            assert!(result.succeeded());
            assert_eq!(result.last_insert_id(), &Value::Int64(i64::from(i) + 1));
        }

        let all = exec_query(&conn, &request("SELECT a, b FROM t ORDER BY a", FetchMode::FetchAll));
        assert_eq!(all.n_rows(), 3);
        assert_eq!(all.column_names(), ["a", "b"]);
        assert_eq!(all.at(2, 1), &Value::from("row2"));

        let first = exec_query(&conn, &request("SELECT a FROM t ORDER BY a DESC", FetchMode::FetchFirst));
        assert_eq!(first.n_rows(), 1);
        assert_eq!(first.first_value(), &Value::Int64(2));

        let none = exec_query(&conn, &request("SELECT a FROM t", FetchMode::NoFetch));
        assert!(none.succeeded());
        assert!(none.is_empty());
        assert_eq!(none.last_insert_id(), &Value::Null);
    }

    #[test]
    fn test_exec_query_reports_failure() {
        let conn = memory();
        let bad = ThreadedQueryRequest::new("SELECT * FROM nowhere".into(), FetchMode::FetchAll, false, true);
        assert!(!exec_query(&conn, &bad).succeeded());
    }

    #[test]
    fn test_argument_count_mismatch_fails() {
        let conn = memory();
        let mismatch = ThreadedQueryRequest::new(
            SqlArgs::new("SELECT ?", vec![Value::Int(1), Value::Int(2)]),
            FetchMode::FetchAll,
            false,
            true,
        );
        assert!(!exec_query(&conn, &mismatch).succeeded());
    }

    #[test]
    fn test_sqlcipher_driver_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        let conn = SqlCipherDriver::new().open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_is_insert() {
        assert!(is_insert("  insert into t values (1)"));
        assert!(is_insert("INSERT OR REPLACE INTO t"));
        assert!(is_insert("REPLACE INTO t"));
        assert!(!is_insert("UPDATE t SET a=1"));
    }
}
