//! Dedicated thread owning one database connection.
//!
//! Requests travel over one channel and results come back over another.
//! The thread executes requests strictly in arrival order. Requests sent
//! with [`FetchMode::NoAnswer`](crate::FetchMode::NoAnswer) produce no
//! result, so the next result on the channel always belongs to the caller
//! currently blocked in [`DatabaseWorkerThread::call`].

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::driver::{exec_query, ConnectionFactory};
use crate::error::{DatabaseError, DatabaseResult};
use crate::query_result::QueryResult;
use crate::request::ThreadedQueryRequest;
use crate::value::Value;

enum WorkerCommand {
    Execute(ThreadedQueryRequest),
    /// Close and reopen the connection.
    Reconnect,
}

struct Channels {
    requests: Sender<WorkerCommand>,
    results: Receiver<DatabaseResult<QueryResult>>,
}

/// Handle to the worker thread of a threaded database manager.
pub struct DatabaseWorkerThread {
    channels: Mutex<Channels>,
    handle: Option<JoinHandle<()>>,
    connection_name: String,
}

impl DatabaseWorkerThread {
    /// Start the thread and block until it has opened the database.
    pub fn spawn(
        filename: PathBuf,
        connection_name: &str,
        factory: Arc<dyn ConnectionFactory>,
    ) -> DatabaseResult<Self> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerCommand>();
        let (result_tx, result_rx) = mpsc::channel::<DatabaseResult<QueryResult>>();
        let (opened_tx, opened_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        let name = connection_name.to_string();
        let handle = thread::Builder::new()
            .name(format!("db-{connection_name}"))
            .spawn(move || {
                let conn = match factory.open(&filename) {
                    Ok(conn) => {
                        let _ = opened_tx.send(Ok(()));
                        conn
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                run(conn, &filename, &name, factory.as_ref(), request_rx, result_tx);
            })?;

        match opened_rx.recv() {
            Ok(Ok(())) => {
                info!(connection = %connection_name, "Database worker started");
                Ok(Self {
                    channels: Mutex::new(Channels {
                        requests: request_tx,
                        results: result_rx,
                    }),
                    handle: Some(handle),
                    connection_name: connection_name.to_string(),
                })
            }
            Ok(Err(msg)) => {
                let _ = handle.join();
                Err(DatabaseError::Open(msg))
            }
            Err(_) => {
                let _ = handle.join();
                Err(DatabaseError::Open(format!(
                    "worker for {connection_name} exited before opening"
                )))
            }
        }
    }

    /// Send a request and wait for its result.
    ///
    /// The worker never answers `NoAnswer` requests, so those are queued
    /// and an empty successful result is returned straight away.
    pub fn call(&self, request: ThreadedQueryRequest) -> DatabaseResult<QueryResult> {
        if !request.wants_answer() {
            self.send(request)?;
            return Ok(QueryResult::new(true, Vec::new(), Vec::new(), Value::Null));
        }
        let channels = self.channels.lock();
        channels
            .requests
            .send(WorkerCommand::Execute(request))
            .map_err(|_| DatabaseError::WorkerGone)?;
        channels.results.recv().map_err(|_| DatabaseError::WorkerGone)?
    }

    /// Queue a request without waiting. Used for `NoAnswer` requests and
    /// the abort sentinel.
    pub fn send(&self, request: ThreadedQueryRequest) -> DatabaseResult<()> {
        self.channels
            .lock()
            .requests
            .send(WorkerCommand::Execute(request))
            .map_err(|_| DatabaseError::WorkerGone)
    }

    /// Reopen the connection on the worker, waiting for the outcome.
    pub fn reconnect(&self) -> DatabaseResult<()> {
        let channels = self.channels.lock();
        channels
            .requests
            .send(WorkerCommand::Reconnect)
            .map_err(|_| DatabaseError::WorkerGone)?;
        channels
            .results
            .recv()
            .map_err(|_| DatabaseError::WorkerGone)?
            .map(|_| ())
    }

    /// Stop the worker after it has finished everything already queued.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.send(ThreadedQueryRequest::abort()).is_err() {
            warn!(connection = %self.connection_name, "Worker already gone at shutdown");
        }
        if handle.join().is_err() {
            error!(connection = %self.connection_name, "Database worker panicked");
        }
    }
}

impl Drop for DatabaseWorkerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut conn: Connection,
    filename: &Path,
    connection_name: &str,
    factory: &dyn ConnectionFactory,
    requests: Receiver<WorkerCommand>,
    results: Sender<DatabaseResult<QueryResult>>,
) {
    // Blocks between requests; exits on the abort sentinel or when the
    // manager side has gone away.
    for command in requests {
        match command {
            WorkerCommand::Execute(request) if request.is_abort_request => {
                debug!(connection = %connection_name, "Worker received abort");
                break;
            }
            WorkerCommand::Execute(request) => {
                let result = exec_query(&conn, &request);
                if request.wants_answer() && results.send(Ok(result)).is_err() {
                    break;
                }
            }
            WorkerCommand::Reconnect => {
                let outcome = reopen(&mut conn, filename, factory);
                if results.send(outcome.map(|_| QueryResult::default())).is_err() {
                    break;
                }
            }
        }
    }
    close(conn, connection_name);
}

pub(crate) fn reopen(
    conn: &mut Connection,
    filename: &Path,
    factory: &dyn ConnectionFactory,
) -> DatabaseResult<()> {
    let fresh = factory.open(filename)?;
    let old = std::mem::replace(conn, fresh);
    if let Err((_, e)) = old.close() {
        warn!(error = %e, "Error closing connection during reconnect");
    }
    Ok(())
}

pub(crate) fn close(conn: Connection, connection_name: &str) {
    match conn.close() {
        Ok(()) => info!(connection = %connection_name, "Database closed"),
        Err((_, e)) => error!(connection = %connection_name, error = %e, "Error closing database"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use crate::query_result::FetchMode;
    use crate::sqlargs::SqlArgs;

    fn worker() -> DatabaseWorkerThread {
        DatabaseWorkerThread::spawn(PathBuf::from(":memory:"), "test", Arc::new(MemoryDriver)).unwrap()
    }

    fn req(sql: &str, fetch_mode: FetchMode) -> ThreadedQueryRequest {
        ThreadedQueryRequest::new(sql.into(), fetch_mode, false, false)
    }

    #[test]
    fn test_call_returns_result() {
        let worker = worker();
        let result = worker.call(req("SELECT 41 + 1", FetchMode::FetchFirst)).unwrap();
        assert_eq!(result.first_value(), &Value::Int64(42));
    }

    #[test]
    fn test_call_with_no_answer_does_not_block() {
        let worker = worker();
        let result = worker.call(req("CREATE TABLE t (n INTEGER)", FetchMode::NoAnswer)).unwrap();
        assert!(result.succeeded());
        assert_eq!(result.n_rows(), 0);

        let result = worker
            .call(req("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'", FetchMode::FetchFirst))
            .unwrap();
        assert_eq!(result.first_value(), &Value::Int64(1));
    }

    #[test]
    fn test_no_answer_requests_stay_in_order() {
        let worker = worker();
        worker.send(req("CREATE TABLE t (n INTEGER)", FetchMode::NoAnswer)).unwrap();
        for i in 0..10 {
            let insert = SqlArgs::new("INSERT INTO t (n) VALUES (?)", vec![Value::Int(i)]);
            worker
                .send(ThreadedQueryRequest::new(insert, FetchMode::NoAnswer, false, false))
                .unwrap();
        }
        let result = worker.call(req("SELECT COUNT(*) FROM t", FetchMode::FetchFirst)).unwrap();
        assert_eq!(result.first_value(), &Value::Int64(10));
    }

    #[test]
    fn test_reconnect_gives_fresh_memory_database() {
        let worker = worker();
        worker.call(req("CREATE TABLE t (n INTEGER)", FetchMode::NoFetch)).unwrap();
        worker.reconnect().unwrap();
        let result = worker
            .call(ThreadedQueryRequest::new("SELECT * FROM t".into(), FetchMode::FetchAll, false, true))
            .unwrap();
        assert!(!result.succeeded());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut worker = worker();
        worker.shutdown();
        worker.shutdown();
        assert!(worker.call(req("SELECT 1", FetchMode::FetchAll)).is_err());
    }
}
