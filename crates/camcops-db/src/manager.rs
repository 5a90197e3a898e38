//! Single point of access to one physical database file.
//!
//! A [`DatabaseManager`] either owns its connection directly or hands every
//! statement to a [`DatabaseWorkerThread`]. Callers see the same blocking
//! API in both modes. Schema migration, transactions and the SQLCipher key
//! operations are all built on [`DatabaseManager::query`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::driver::{exec_query, ConnectionFactory, MemoryDriver};
use crate::error::{DatabaseError, DatabaseResult};
use crate::field::Field;
use crate::query_result::{FetchMode, QueryResult};
use crate::request::ThreadedQueryRequest;
use crate::schema::{
    field_names_from_pragma_info, make_creation_sql_from_pragma_info, plan_table_changes,
    SqlitePragmaInfoField, TABLE_TEMP_SUFFIX,
};
use crate::sqlargs::{delimit, sql_create_table, SqlArgs, WhereConditions};
use crate::value::Value;
use crate::worker::{self, DatabaseWorkerThread};

pub const DATA_DATABASE_FILENAME: &str = "camcops_data.sqlite";
pub const SYSTEM_DATABASE_FILENAME: &str = "camcops_sys.sqlite";

/// Value used where a PK is required but none exists.
pub const NONEXISTENT_PK: i64 = -1;

enum Backend {
    Direct(Mutex<Option<Connection>>),
    Threaded(DatabaseWorkerThread),
}

pub struct DatabaseManager {
    filename: PathBuf,
    connection_name: String,
    factory: Arc<dyn ConnectionFactory>,
    system_db: bool,
    vacuum_on_close: AtomicBool,
    created_tables: Mutex<Vec<String>>,
    queries_executed: AtomicU64,
    backend: Backend,
}

impl DatabaseManager {
    /// Open `filename`, on a dedicated worker thread if `threaded`.
    ///
    /// In threaded mode this blocks until the worker has opened the file.
    pub fn open(
        filename: impl Into<PathBuf>,
        connection_name: &str,
        factory: Arc<dyn ConnectionFactory>,
        threaded: bool,
    ) -> DatabaseResult<Self> {
        let filename = filename.into();
        info!(
            file = %filename.display(),
            connection = %connection_name,
            driver = %factory.driver_name(),
            threaded,
            "Opening database"
        );
        let backend = if threaded {
            Backend::Threaded(DatabaseWorkerThread::spawn(
                filename.clone(),
                connection_name,
                Arc::clone(&factory),
            )?)
        } else {
            let conn = factory
                .open(&filename)
                .map_err(|e| DatabaseError::Open(e.to_string()))?;
            Backend::Direct(Mutex::new(Some(conn)))
        };
        Ok(Self {
            filename,
            connection_name: connection_name.to_string(),
            factory,
            system_db: false,
            vacuum_on_close: AtomicBool::new(true),
            created_tables: Mutex::new(Vec::new()),
            queries_executed: AtomicU64::new(0),
            backend,
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory(connection_name: &str, threaded: bool) -> DatabaseResult<Self> {
        Self::open(":memory:", connection_name, Arc::new(MemoryDriver), threaded)
    }

    /// Mark this as the system database (no BLOB cleanup on delete).
    pub fn with_system_db(mut self, system_db: bool) -> Self {
        self.system_db = system_db;
        self
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn driver_name(&self) -> &str {
        self.factory.driver_name()
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self.backend, Backend::Threaded(_))
    }

    pub fn is_system_db(&self) -> bool {
        self.system_db
    }

    pub fn set_vacuum_on_close(&self, vacuum_on_close: bool) {
        self.vacuum_on_close.store(vacuum_on_close, Ordering::Relaxed);
    }

    /// Number of requests submitted to the connection so far.
    pub fn queries_executed(&self) -> u64 {
        self.queries_executed.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Querying
    // ========================================================================

    fn submit(&self, request: ThreadedQueryRequest) -> QueryResult {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        match &self.backend {
            Backend::Direct(conn) => match conn.lock().as_ref() {
                Some(conn) => exec_query(conn, &request),
                None => {
                    error!(connection = %self.connection_name, "Query on closed database");
                    QueryResult::failure()
                }
            },
            Backend::Threaded(worker) if request.wants_answer() => {
                worker.call(request).unwrap_or_else(|e| {
                    error!(connection = %self.connection_name, error = %e, "Worker call failed");
                    QueryResult::failure()
                })
            }
            Backend::Threaded(worker) => {
                if let Err(e) = worker.send(request) {
                    error!(connection = %self.connection_name, error = %e, "Worker send failed");
                }
                QueryResult::new(true, Vec::new(), Vec::new(), Value::Null)
            }
        }
    }

    /// Run a statement and wait for its result.
    ///
    /// With [`FetchMode::NoAnswer`] the statement is queued and an empty
    /// successful result returned at once.
    pub fn query(
        &self,
        sqlargs: impl Into<SqlArgs>,
        fetch_mode: FetchMode,
        store_column_names: bool,
        suppress_errors: bool,
    ) -> QueryResult {
        self.submit(ThreadedQueryRequest::new(
            sqlargs.into(),
            fetch_mode,
            store_column_names,
            suppress_errors,
        ))
    }

    /// All rows, with column names.
    pub fn query_all(&self, sqlargs: impl Into<SqlArgs>) -> QueryResult {
        self.query(sqlargs, FetchMode::FetchAll, true, false)
    }

    /// Execute, reporting success only.
    pub fn exec(&self, sqlargs: impl Into<SqlArgs>) -> bool {
        self.query(sqlargs, FetchMode::NoFetch, false, false).succeeded()
    }

    pub fn exec_suppressed(&self, sqlargs: impl Into<SqlArgs>) -> bool {
        self.query(sqlargs, FetchMode::NoFetch, false, true).succeeded()
    }

    /// Execute without waiting for the outcome.
    pub fn exec_no_answer(&self, sqlargs: impl Into<SqlArgs>) {
        self.query(sqlargs, FetchMode::NoAnswer, false, false);
    }

    pub fn fetch_first_value(&self, sqlargs: impl Into<SqlArgs>) -> Value {
        self.query(sqlargs, FetchMode::FetchFirst, false, false)
            .first_value()
            .clone()
    }

    /// First value as an integer, or `failure_default` if the query failed.
    pub fn fetch_int(&self, sqlargs: impl Into<SqlArgs>, failure_default: i64) -> i64 {
        let result = self.query(sqlargs, FetchMode::FetchFirst, false, false);
        if !result.succeeded() {
            return failure_default;
        }
        result.first_value().to_i64().unwrap_or(0)
    }

    pub fn count(&self, tablename: &str, where_conditions: &WhereConditions) -> i64 {
        let mut sqlargs = SqlArgs::from_sql(format!("SELECT COUNT(*) FROM {}", delimit(tablename)));
        where_conditions.append_where_clause_to(&mut sqlargs);
        self.fetch_int(sqlargs, 0)
    }

    pub fn get_single_field_as_int_list(
        &self,
        tablename: &str,
        fieldname: &str,
        where_conditions: &WhereConditions,
    ) -> Vec<i64> {
        let mut sqlargs = SqlArgs::from_sql(format!(
            "SELECT {} FROM {}",
            delimit(fieldname),
            delimit(tablename)
        ));
        where_conditions.append_where_clause_to(&mut sqlargs);
        self.query(sqlargs, FetchMode::FetchAll, false, false)
            .first_column_as_int_list()
    }

    pub fn get_pks(&self, tablename: &str, pkname: &str, where_conditions: &WhereConditions) -> Vec<i64> {
        self.get_single_field_as_int_list(tablename, pkname, where_conditions)
    }

    pub fn exists_by_pk(&self, tablename: &str, pkname: &str, pkvalue: i64) -> bool {
        let sqlargs = SqlArgs::new(
            format!(
                "SELECT EXISTS(SELECT * FROM {} WHERE {} = ?)",
                delimit(tablename),
                delimit(pkname)
            ),
            vec![Value::Int64(pkvalue)],
        );
        self.fetch_int(sqlargs, 0) == 1
    }

    pub fn delete_from(&self, tablename: &str, where_conditions: &WhereConditions) -> bool {
        let mut sqlargs = SqlArgs::from_sql(format!("DELETE FROM {}", delimit(tablename)));
        where_conditions.append_where_clause_to(&mut sqlargs);
        self.exec(sqlargs)
    }

    // ========================================================================
    // Transactions. Not nestable.
    // ========================================================================

    pub fn begin_transaction(&self) {
        self.exec_no_answer("BEGIN TRANSACTION");
    }

    pub fn commit(&self) {
        self.exec_no_answer("COMMIT");
    }

    pub fn rollback(&self) {
        self.exec_no_answer("ROLLBACK");
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// User tables, sorted by name.
    pub fn get_all_tables(&self) -> Vec<String> {
        self.query(
            r"SELECT name FROM sqlite_master WHERE sql NOT NULL AND type='table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\' ORDER BY name",
            FetchMode::FetchAll,
            false,
            false,
        )
        .first_column_as_string_list()
    }

    pub fn table_exists(&self, tablename: &str) -> bool {
        let sqlargs = SqlArgs::new(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            vec![Value::from(tablename)],
        );
        self.fetch_int(sqlargs, 0) > 0
    }

    pub fn get_pragma_info(&self, tablename: &str) -> DatabaseResult<Vec<SqlitePragmaInfoField>> {
        let result = self.query(
            format!("PRAGMA table_info({})", delimit(tablename)),
            FetchMode::FetchAll,
            false,
            false,
        );
        if !result.succeeded() {
            return Err(DatabaseError::schema(format!(
                "PRAGMA table_info failed for table {tablename}"
            )));
        }
        Ok(SqlitePragmaInfoField::from_query_result(&result))
    }

    pub fn get_field_names(&self, tablename: &str) -> DatabaseResult<Vec<String>> {
        Ok(field_names_from_pragma_info(&self.get_pragma_info(tablename)?, false))
    }

    pub fn primary_key_columns(&self, tablename: &str) -> DatabaseResult<Vec<String>> {
        Ok(self
            .get_pragma_info(tablename)?
            .into_iter()
            .filter(|info| info.pk)
            .map(|info| info.name)
            .collect())
    }

    /// The `CREATE TABLE` statement SQLite stored for a table.
    pub fn db_table_definition_sql(&self, tablename: &str) -> String {
        let sqlargs = SqlArgs::new(
            "SELECT sql FROM sqlite_master WHERE tbl_name=? AND type='table'",
            vec![Value::from(tablename)],
        );
        self.fetch_first_value(sqlargs).to_text()
    }

    /// Size in bytes, from the page count and page size.
    pub fn approximate_database_size(&self) -> i64 {
        self.fetch_int(
            "SELECT page_count * page_size AS size FROM pragma_page_count(), pragma_page_size()",
            0,
        )
    }

    /// Tables that have not been passed to `create_table` on this manager.
    pub fn tables_not_explicitly_created_by_us(&self) -> Vec<String> {
        let created = self.created_tables.lock();
        self.get_all_tables()
            .into_iter()
            .filter(|t| !created.contains(t))
            .collect()
    }

    // ========================================================================
    // Schema changes
    // ========================================================================

    /// Create a table, or migrate an existing one to exactly `fields`.
    ///
    /// Missing columns are added with `ALTER TABLE`. Superfluous columns and
    /// columns whose type, nullability or PK status differ are handled by
    /// rebuilding the table through a temporary copy, keeping the data of
    /// every column that survives.
    pub fn create_table(&self, tablename: &str, fields: &[Field]) -> DatabaseResult<()> {
        self.created_tables.lock().push(tablename.to_string());

        let creation_sql = sql_create_table(tablename, fields);
        if !self.table_exists(tablename) {
            info!(table = %tablename, "Creating table");
            if !self.exec(creation_sql.as_str()) {
                return Err(DatabaseError::Migration(format!("failed to create table {tablename}")));
            }
            return Ok(());
        }

        let infolist = self.get_pragma_info(tablename)?;
        let plans = plan_table_changes(fields, &infolist);

        let mut drop_or_change_required = false;
        for plan in &plans {
            if let (true, Some(field)) = (plan.add, &plan.intended_field) {
                if field.is_pk() {
                    return Err(DatabaseError::schema(format!(
                        "create_table: cannot add a PRIMARY KEY column ({tablename}.{})",
                        plan.name
                    )));
                }
                if field.not_null() && !field.has_db_default_value() {
                    return Err(DatabaseError::schema(format!(
                        "create_table: cannot add a NOT NULL column to an existing table \
                         without a database default ({tablename}.{})",
                        plan.name
                    )));
                }
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    delimit(tablename),
                    delimit(&plan.name),
                    field.sql_column_def()
                );
                if !self.exec(sql.as_str()) {
                    return Err(DatabaseError::Migration(format!(
                        "failed to add column {tablename}.{}",
                        plan.name
                    )));
                }
            }
            drop_or_change_required |= plan.drop || plan.change;
        }

        if !drop_or_change_required {
            debug!(table = %tablename, "Table structure OK");
            return Ok(());
        }

        for plan in &plans {
            debug!(table = %tablename, plan = %plan, "Amendment plan");
        }
        let dummytable = format!("{tablename}{TABLE_TEMP_SUFFIX}");
        self.require_no_temp_table(&dummytable, "create_table")?;
        let goodfields: Vec<String> = fields.iter().map(|f| delimit(f.name())).collect();
        let goodfields = goodfields.join(",");
        info!(table = %tablename, "Modifying structure of table");
        self.rebuild_table(tablename, &dummytable, &creation_sql, &goodfields, &goodfields)
    }

    /// Rename columns, given `(from, to)` pairs.
    pub fn rename_columns(&self, tablename: &str, from_to: &[(&str, &str)]) -> DatabaseResult<()> {
        if !self.table_exists(tablename) {
            warn!(table = %tablename, "rename_columns: table does not exist");
            return Ok(());
        }
        let dummytable = format!("{tablename}{TABLE_TEMP_SUFFIX}");
        self.require_no_temp_table(&dummytable, "rename_columns")?;

        let old_fieldnames = self.get_field_names(tablename)?;
        let mut new_fieldnames = old_fieldnames.clone();
        let mut creation_sql = self.db_table_definition_sql(tablename);
        let mut any_changes = false;
        for (from, to) in from_to {
            if from == to {
                continue;
            }
            let Some(index) = new_fieldnames.iter().position(|f| f == from) else {
                return Err(DatabaseError::schema(format!(
                    "rename_columns: 'from' field doesn't exist: {tablename}.{from}"
                )));
            };
            if new_fieldnames.iter().any(|f| f == to) {
                return Err(DatabaseError::schema(format!(
                    "rename_columns: 'to' field already exists: {tablename}.{to}"
                )));
            }
            new_fieldnames[index] = to.to_string();
            // Column names are always delimited in our DDL.
            creation_sql = creation_sql.replace(&delimit(from), &delimit(to));
            any_changes = true;
        }
        if !any_changes {
            debug!(table = %tablename, "rename_columns: nothing to do");
            return Ok(());
        }
        info!(table = %tablename, ?from_to, "Renaming columns");
        let delimited = |names: &[String]| names.iter().map(|n| delimit(n)).collect::<Vec<_>>().join(",");
        self.rebuild_table(
            tablename,
            &dummytable,
            &creation_sql,
            &delimited(&new_fieldnames),
            &delimited(&old_fieldnames),
        )
    }

    pub fn rename_table(&self, from: &str, to: &str) -> DatabaseResult<()> {
        if !self.table_exists(from) {
            warn!(from = %from, to = %to, "rename_table: source table doesn't exist");
            return Ok(());
        }
        if self.table_exists(to) {
            return Err(DatabaseError::schema(format!(
                "rename_table: destination table already exists: {to}"
            )));
        }
        info!(from = %from, to = %to, "Renaming table");
        let sql = format!("ALTER TABLE {} RENAME TO {}", delimit(from), delimit(to));
        if self.exec(sql.as_str()) {
            Ok(())
        } else {
            Err(DatabaseError::Migration(format!("failed to rename table {from} to {to}")))
        }
    }

    /// Change the declared SQL type of columns, given `(column, type)` pairs.
    /// Column names match case-insensitively.
    pub fn change_column_types(&self, tablename: &str, changes: &[(&str, &str)]) -> DatabaseResult<()> {
        if !self.table_exists(tablename) {
            warn!(table = %tablename, "change_column_types: table does not exist");
            return Ok(());
        }
        let dummytable = format!("{tablename}{TABLE_TEMP_SUFFIX}");
        self.require_no_temp_table(&dummytable, "change_column_types")?;

        let mut infolist = self.get_pragma_info(tablename)?;
        let mut any_changes = false;
        for (column, new_type) in changes {
            let target = infolist
                .iter_mut()
                .find(|info| info.name.eq_ignore_ascii_case(column));
            match target {
                Some(info) if !info.column_type.eq_ignore_ascii_case(new_type) => {
                    info.column_type = new_type.to_string();
                    any_changes = true;
                }
                Some(_) => {}
                None => warn!(table = %tablename, column = %column, "change_column_types: no such column"),
            }
        }
        if !any_changes {
            debug!(table = %tablename, "change_column_types: nothing to do");
            return Ok(());
        }
        info!(table = %tablename, ?changes, "Changing column types");
        let creation_sql = make_creation_sql_from_pragma_info(tablename, &infolist);
        let fieldnames = field_names_from_pragma_info(&infolist, true).join(",");
        self.rebuild_table(tablename, &dummytable, &creation_sql, &fieldnames, &fieldnames)
    }

    pub fn create_index(&self, index_name: &str, tablename: &str, fieldnames: &[&str]) -> bool {
        if !self.table_exists(tablename) {
            warn!(table = %tablename, index = %index_name, "create_index: no such table");
            return false;
        }
        let columns: Vec<String> = fieldnames.iter().map(|f| delimit(f)).collect();
        self.exec(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            delimit(index_name),
            delimit(tablename),
            columns.join(", ")
        ))
    }

    pub fn drop_table(&self, tablename: &str) {
        info!(table = %tablename, "Dropping table");
        self.exec_no_answer(format!("DROP TABLE {}", delimit(tablename)));
    }

    pub fn drop_tables<S: AsRef<str>>(&self, tablenames: &[S]) {
        for tablename in tablenames {
            self.drop_table(tablename.as_ref());
        }
    }

    /// Drop every user table except those named in `keep`.
    pub fn drop_tables_not_in<S: AsRef<str>>(&self, keep: &[S]) {
        let doomed: Vec<String> = self
            .get_all_tables()
            .into_iter()
            .filter(|t| !keep.iter().any(|k| k.as_ref() == t))
            .collect();
        self.drop_tables(&doomed);
    }

    pub fn drop_tables_not_explicitly_created_by_us(&self) {
        let doomed = self.tables_not_explicitly_created_by_us();
        self.drop_tables(&doomed);
    }

    pub fn vacuum(&self) {
        info!(connection = %self.connection_name, "Vacuuming database");
        self.exec_no_answer("VACUUM");
    }

    fn require_no_temp_table(&self, dummytable: &str, operation: &str) -> DatabaseResult<()> {
        if self.table_exists(dummytable) {
            return Err(DatabaseError::schema(format!(
                "{operation}: temporary table exists: {dummytable}"
            )));
        }
        Ok(())
    }

    /// Rename the table aside, create it afresh, copy the data back and
    /// drop the old copy, all in one transaction.
    fn rebuild_table(
        &self,
        tablename: &str,
        dummytable: &str,
        creation_sql: &str,
        new_columns: &str,
        old_columns: &str,
    ) -> DatabaseResult<()> {
        let steps = [
            format!("ALTER TABLE {} RENAME TO {}", delimit(tablename), delimit(dummytable)),
            creation_sql.to_string(),
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                delimit(tablename),
                new_columns,
                old_columns,
                delimit(dummytable)
            ),
            format!("DROP TABLE {}", delimit(dummytable)),
        ];
        self.begin_transaction();
        for sql in &steps {
            if !self.exec(sql.as_str()) {
                self.rollback();
                return Err(DatabaseError::Migration(format!(
                    "rebuilding table {tablename} failed at: {sql}"
                )));
            }
        }
        self.commit();
        Ok(())
    }

    // ========================================================================
    // Encryption
    // ========================================================================

    /// Whether the database can be read, e.g. with the current key.
    pub fn can_read_database(&self) -> bool {
        self.query("SELECT COUNT(*) FROM sqlite_master", FetchMode::NoFetch, false, true)
            .succeeded()
    }

    pub fn database_is_empty(&self) -> bool {
        self.count("sqlite_master", &WhereConditions::new()) == 0
    }

    pub fn pragma_key(&self, passphrase: &str) -> bool {
        self.exec(format!("PRAGMA key={}", Value::from(passphrase).to_sql_literal()))
    }

    pub fn pragma_rekey(&self, passphrase: &str) -> bool {
        self.exec(format!("PRAGMA rekey={}", Value::from(passphrase).to_sql_literal()))
    }

    /// Set SQLCipher compatibility to a major version; `version` must be at
    /// least 1.
    pub fn pragma_cipher_compatibility(&self, version: i32) -> bool {
        if version < 1 {
            warn!(version, "Invalid SQLCipher compatibility version");
            return false;
        }
        self.exec(format!("PRAGMA cipher_compatibility = {version}"))
    }

    /// Upgrade a database written by an older SQLCipher. SQLCipher reports
    /// 0 on success.
    pub fn pragma_cipher_migrate(&self) -> bool {
        let result = self.query("PRAGMA cipher_migrate", FetchMode::FetchAll, false, false);
        result.succeeded() && result.first_value().to_i64() == Some(0)
    }

    /// Apply a passphrase and check the database can be read, migrating
    /// from an older SQLCipher format if necessary.
    pub fn decrypt(&self, passphrase: &str) -> bool {
        if self.pragma_key(passphrase) && self.can_read_database() {
            return true;
        }
        info!(connection = %self.connection_name, "Key did not open database; trying cipher migration");
        if let Err(e) = self.reconnect_database() {
            error!(error = %e, "Reconnect failed");
            return false;
        }
        if self.pragma_key(passphrase) && (self.can_read_database() || self.pragma_cipher_migrate()) {
            return true;
        }
        if let Err(e) = self.reconnect_database() {
            error!(error = %e, "Reconnect failed");
        }
        false
    }

    /// Write an encrypted copy of this database to `filename`. The current
    /// connection is left as it was.
    pub fn encrypt_to_another(&self, filename: &Path, passphrase: &str) -> bool {
        let target = Value::from(filename.to_string_lossy().into_owned()).to_sql_literal();
        let key = Value::from(passphrase).to_sql_literal();
        info!(target = %filename.display(), "Exporting encrypted copy of database");
        if !self.exec(format!("ATTACH DATABASE {target} AS encrypted KEY {key}")) {
            return false;
        }
        let exported = self.exec("SELECT sqlcipher_export('encrypted')");
        // Detach even after a failed export, or the next attach collides.
        let detached = self.exec("DETACH DATABASE encrypted");
        exported && detached
    }

    /// Close and reopen the connection through the factory.
    pub fn reconnect_database(&self) -> DatabaseResult<()> {
        debug!(connection = %self.connection_name, "Reconnecting");
        match &self.backend {
            Backend::Direct(conn) => {
                let mut guard = conn.lock();
                match guard.as_mut() {
                    Some(conn) => worker::reopen(conn, &self.filename, self.factory.as_ref()),
                    None => {
                        *guard = Some(self.factory.open(&self.filename)?);
                        Ok(())
                    }
                }
            }
            Backend::Threaded(worker) => worker.reconnect(),
        }
    }

    // ========================================================================
    // JSON
    // ========================================================================

    pub fn get_table_as_json(&self, tablename: &str) -> serde_json::Value {
        self.query_all(format!("SELECT * FROM {}", delimit(tablename)))
            .to_json_rows()
    }

    /// Every user table as `{"table": [{row}, ...], ...}`.
    pub fn get_database_as_json(&self) -> DatabaseResult<String> {
        let tables: serde_json::Map<String, serde_json::Value> = self
            .get_all_tables()
            .into_iter()
            .map(|t| {
                let rows = self.get_table_as_json(&t);
                (t, rows)
            })
            .collect();
        Ok(serde_json::to_string(&serde_json::Value::Object(tables))?)
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("filename", &self.filename)
            .field("connection_name", &self.connection_name)
            .field("driver", &self.factory.driver_name())
            .field("threaded", &self.is_threaded())
            .field("system_db", &self.system_db)
            .finish()
    }
}

impl Drop for DatabaseManager {
    fn drop(&mut self) {
        if self.vacuum_on_close.load(Ordering::Relaxed) && self.can_read_database() {
            self.vacuum();
        }
        match &mut self.backend {
            Backend::Threaded(worker) => worker.shutdown(),
            Backend::Direct(conn) => {
                if let Some(conn) = conn.get_mut().take() {
                    worker::close(conn, &self.connection_name);
                }
            }
        }
    }
}
