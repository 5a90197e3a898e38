//! Active-record mapping of one table row.
//!
//! A [`DatabaseObject`] holds a fixed set of named [`Field`]s, one of which
//! is the integer primary key. It generates its own DDL, loads itself from
//! the first matching row, and saves only what changed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::blob::{BLOB_TABLENAME, SRC_PK_FIELDNAME, SRC_TABLE_FIELDNAME};
use crate::error::{DatabaseError, DatabaseResult};
use crate::field::{Field, FieldType};
use crate::fieldref::{FieldRef, FieldRefPtr};
use crate::manager::{DatabaseManager, NONEXISTENT_PK};
use crate::query_result::{FetchMode, QueryResult};
use crate::sqlargs::{add_order_by_clause, delimit, sql_create_table, OrderBy, SqlArgs, WhereConditions};
use crate::value::{truncate_to_millis, Value};

pub const PK_FIELDNAME: &str = "id";
pub const MODIFICATION_TIMESTAMP_FIELDNAME: &str = "when_last_modified";
pub const CREATION_TIMESTAMP_FIELDNAME: &str = "when_created";
pub const MOVE_OFF_TABLET_FIELDNAME: &str = "_move_off_tablet";

static NULL_VALUE: Value = Value::Null;

/// Shared handle, as needed by [`FieldRef`]s bound to the object.
pub type DatabaseObjectPtr = Arc<Mutex<DatabaseObject>>;

/// Standard fields added to every object of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectOptions {
    pub pk_fieldname: String,
    pub has_modification_timestamp: bool,
    pub has_creation_timestamp: bool,
    pub has_move_off_tablet_field: bool,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            pk_fieldname: PK_FIELDNAME.to_string(),
            has_modification_timestamp: true,
            has_creation_timestamp: false,
            has_move_off_tablet_field: true,
        }
    }
}

impl ObjectOptions {
    /// Only the PK; no timestamps or flags.
    pub fn bare() -> Self {
        Self {
            pk_fieldname: PK_FIELDNAME.to_string(),
            has_modification_timestamp: false,
            has_creation_timestamp: false,
            has_move_off_tablet_field: false,
        }
    }
}

pub struct DatabaseObjectBuilder {
    db: Arc<DatabaseManager>,
    tablename: String,
    options: ObjectOptions,
    fields: Vec<Field>,
}

impl DatabaseObjectBuilder {
    pub fn options(mut self, options: ObjectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn build(self) -> DatabaseResult<DatabaseObject> {
        let options = self.options;
        if options.pk_fieldname.is_empty() {
            return Err(DatabaseError::schema(format!(
                "missing PK fieldname; table={}",
                self.tablename
            )));
        }
        let mut obj = DatabaseObject {
            db: self.db,
            tablename: self.tablename,
            pk_fieldname: options.pk_fieldname.clone(),
            has_modification_timestamp: options.has_modification_timestamp,
            has_move_off_tablet_field: options.has_move_off_tablet_field,
            record: BTreeMap::new(),
            ordered_fieldnames: Vec::new(),
            exists_in_db: false,
            fieldrefs: HashMap::new(),
        };
        obj.add_field(Field::new(&options.pk_fieldname, FieldType::Int).pk(true))?;
        if options.has_move_off_tablet_field {
            obj.add_field(Field::new(MOVE_OFF_TABLET_FIELDNAME, FieldType::Bool))?;
        }
        if options.has_modification_timestamp {
            obj.add_field(Field::new(MODIFICATION_TIMESTAMP_FIELDNAME, FieldType::DateTime))?;
        }
        if options.has_creation_timestamp {
            let mut created = Field::new(CREATION_TIMESTAMP_FIELDNAME, FieldType::DateTime);
            created.set_value(now())?;
            obj.add_field(created)?;
        }
        for field in self.fields {
            if field.is_pk() {
                return Err(DatabaseError::schema(format!(
                    "{}.{}: only {} may be the PK",
                    obj.tablename,
                    field.name(),
                    obj.pk_fieldname
                )));
            }
            obj.add_field(field)?;
        }
        Ok(obj)
    }
}

pub struct DatabaseObject {
    db: Arc<DatabaseManager>,
    tablename: String,
    pk_fieldname: String,
    has_modification_timestamp: bool,
    has_move_off_tablet_field: bool,
    /// Sorted by name; SELECTs and INSERTs use this order.
    record: BTreeMap<String, Field>,
    /// Declaration order, used for DDL and summaries.
    ordered_fieldnames: Vec<String>,
    exists_in_db: bool,
    fieldrefs: HashMap<String, FieldRefPtr>,
}

impl DatabaseObject {
    pub fn builder(db: Arc<DatabaseManager>, tablename: impl Into<String>) -> DatabaseObjectBuilder {
        DatabaseObjectBuilder {
            db,
            tablename: tablename.into(),
            options: ObjectOptions::default(),
            fields: Vec::new(),
        }
    }

    pub fn into_ptr(self) -> DatabaseObjectPtr {
        Arc::new(Mutex::new(self))
    }

    fn add_field(&mut self, field: Field) -> DatabaseResult<()> {
        if self.record.contains_key(field.name()) {
            return Err(DatabaseError::schema(format!(
                "duplicate field {}.{}",
                self.tablename,
                field.name()
            )));
        }
        self.ordered_fieldnames.push(field.name().to_string());
        self.record.insert(field.name().to_string(), field);
        Ok(())
    }

    pub fn tablename(&self) -> &str {
        &self.tablename
    }

    pub fn pkname(&self) -> &str {
        &self.pk_fieldname
    }

    pub fn database(&self) -> &Arc<DatabaseManager> {
        &self.db
    }

    // ------------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------------

    pub fn has_field(&self, fieldname: &str) -> bool {
        self.record.contains_key(fieldname)
    }

    pub fn require_field(&self, fieldname: &str) -> DatabaseResult<()> {
        if self.has_field(fieldname) {
            Ok(())
        } else {
            Err(DatabaseError::schema(format!(
                "no such field: {}.{fieldname}",
                self.tablename
            )))
        }
    }

    pub fn field(&self, fieldname: &str) -> DatabaseResult<&Field> {
        self.record.get(fieldname).ok_or_else(|| {
            DatabaseError::schema(format!("no such field: {}.{fieldname}", self.tablename))
        })
    }

    pub fn field_type(&self, fieldname: &str) -> Option<&FieldType> {
        self.record.get(fieldname).map(Field::field_type)
    }

    /// Field names in declaration order.
    pub fn fieldnames(&self) -> &[String] {
        &self.ordered_fieldnames
    }

    pub fn fields_ordered(&self) -> Vec<Field> {
        self.ordered_fieldnames
            .iter()
            .filter_map(|name| self.record.get(name).cloned())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Setting values
    // ------------------------------------------------------------------------

    /// Set a field, returning whether the value changed. A change also
    /// updates the modification timestamp if `touch_record`.
    pub fn set_value(
        &mut self,
        fieldname: &str,
        value: impl Into<Value>,
        touch_record: bool,
    ) -> DatabaseResult<bool> {
        let tablename = &self.tablename;
        let field = self.record.get_mut(fieldname).ok_or_else(|| {
            DatabaseError::schema(format!("no such field: {tablename}.{fieldname}"))
        })?;
        let changed = field.set_value(value)?;
        if changed && touch_record {
            self.touch(false);
        }
        Ok(changed)
    }

    pub fn add_to_value_int(&mut self, fieldname: &str, increment: i64) -> DatabaseResult<bool> {
        let current = self.value_i64(fieldname);
        let updated = Value::Int64(current + increment);
        self.set_value(fieldname, updated, true)
    }

    // ------------------------------------------------------------------------
    // Reading values
    // ------------------------------------------------------------------------

    /// The value of a field; NULL (with an error logged) for unknown fields.
    pub fn value(&self, fieldname: &str) -> &Value {
        match self.record.get(fieldname) {
            Some(field) => field.value(),
            None => {
                error!(table = %self.tablename, field = %fieldname, "No such field");
                &NULL_VALUE
            }
        }
    }

    pub fn pretty_value(&self, fieldname: &str) -> String {
        self.value(fieldname).to_string()
    }

    pub fn value_is_null(&self, fieldname: &str) -> bool {
        self.value(fieldname).is_null()
    }

    pub fn value_is_null_or_empty(&self, fieldname: &str) -> bool {
        let v = self.value(fieldname);
        v.is_null() || v.to_text().is_empty()
    }

    pub fn value_is_false_not_null(&self, fieldname: &str) -> bool {
        let v = self.value(fieldname);
        !v.is_null() && !v.to_bool()
    }

    pub fn value_bool(&self, fieldname: &str) -> bool {
        self.value(fieldname).to_bool()
    }

    pub fn value_int(&self, fieldname: &str) -> i32 {
        self.value(fieldname)
            .to_i64()
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(0)
    }

    pub fn value_i64(&self, fieldname: &str) -> i64 {
        self.value(fieldname).to_i64().unwrap_or(0)
    }

    pub fn value_double(&self, fieldname: &str) -> f64 {
        self.value(fieldname).to_f64().unwrap_or(0.0)
    }

    pub fn value_string(&self, fieldname: &str) -> String {
        self.value(fieldname).to_text()
    }

    pub fn value_date(&self, fieldname: &str) -> Option<NaiveDate> {
        self.value(fieldname).to_date()
    }

    pub fn value_datetime(&self, fieldname: &str) -> Option<DateTime<FixedOffset>> {
        self.value(fieldname).to_datetime()
    }

    pub fn value_bytes(&self, fieldname: &str) -> Vec<u8> {
        let v = self.value(fieldname);
        match v.as_bytes() {
            Some(bytes) => bytes.to_vec(),
            None => v.to_text().into_bytes(),
        }
    }

    pub fn value_string_list(&self, fieldname: &str) -> Vec<String> {
        self.value(fieldname).to_string_list()
    }

    pub fn value_int_list(&self, fieldname: &str) -> Vec<i32> {
        self.value(fieldname).to_int_list()
    }

    pub fn value_as_json(&self, fieldname: &str) -> serde_json::Value {
        self.value(fieldname).to_json()
    }

    pub fn values(&self, fieldnames: &[&str]) -> Vec<Value> {
        fieldnames.iter().map(|f| self.value(f).clone()).collect()
    }

    pub fn any_values_null(&self, fieldnames: &[&str]) -> bool {
        fieldnames.iter().any(|f| self.value_is_null(f))
    }

    pub fn no_values_null(&self, fieldnames: &[&str]) -> bool {
        !self.any_values_null(fieldnames)
    }

    pub fn any_values_null_or_empty(&self, fieldnames: &[&str]) -> bool {
        fieldnames.iter().any(|f| self.value_is_null_or_empty(f))
    }

    pub fn all_values_true(&self, fieldnames: &[&str]) -> bool {
        fieldnames.iter().all(|f| self.value_bool(f))
    }

    pub fn any_values_true(&self, fieldnames: &[&str]) -> bool {
        fieldnames.iter().any(|f| self.value_bool(f))
    }

    pub fn all_values_false_or_null(&self, fieldnames: &[&str]) -> bool {
        fieldnames.iter().all(|f| !self.value_bool(f))
    }

    pub fn pk_value(&self) -> &Value {
        self.value(&self.pk_fieldname)
    }

    /// The PK, or [`NONEXISTENT_PK`] if it is NULL.
    pub fn pk_value_int(&self) -> i64 {
        self.pk_value().to_i64().unwrap_or(NONEXISTENT_PK)
    }

    pub fn is_pk_null(&self) -> bool {
        self.pk_value().is_null()
    }

    // ------------------------------------------------------------------------
    // Field references
    // ------------------------------------------------------------------------

    /// Shared reference to a field. Asking twice for the same field returns
    /// the same [`FieldRef`], whatever `mandatory` and `autosave` say the
    /// second time.
    pub fn field_ref(
        obj: &DatabaseObjectPtr,
        fieldname: &str,
        mandatory: bool,
        autosave: bool,
    ) -> DatabaseResult<FieldRefPtr> {
        let mut guard = obj.lock();
        guard.require_field(fieldname)?;
        if let Some(existing) = guard.fieldrefs.get(fieldname) {
            return Ok(Arc::clone(existing));
        }
        let fieldref = Arc::new(FieldRef::for_record(
            Arc::downgrade(obj),
            fieldname,
            mandatory,
            autosave,
        ));
        guard
            .fieldrefs
            .insert(fieldname.to_string(), Arc::clone(&fieldref));
        Ok(fieldref)
    }

    /// Shared reference to a BLOB held in the `blobs` table, whose PK is
    /// stored in `fieldname`. Saves the object first so that it has a PK.
    pub fn blob_field_ref(
        obj: &DatabaseObjectPtr,
        fieldname: &str,
        mandatory: bool,
    ) -> DatabaseResult<FieldRefPtr> {
        {
            let guard = obj.lock();
            guard.require_field(fieldname)?;
            if let Some(existing) = guard.fieldrefs.get(fieldname) {
                return Ok(Arc::clone(existing));
            }
        }
        let fieldref = Arc::new(FieldRef::for_record_blob(obj, fieldname, mandatory)?);
        let mut guard = obj.lock();
        Ok(Arc::clone(
            guard
                .fieldrefs
                .entry(fieldname.to_string())
                .or_insert(fieldref),
        ))
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    pub fn load_by_pk(&mut self, pk: i64) -> bool {
        if pk == NONEXISTENT_PK {
            debug!(table = %self.tablename, "Ignoring load of nonexistent PK");
            return false;
        }
        let mut where_conditions = WhereConditions::new();
        where_conditions.add(self.pk_fieldname.clone(), Value::Int64(pk));
        self.load(&where_conditions)
    }

    pub fn load_by_field(&mut self, fieldname: &str, value: impl Into<Value>) -> bool {
        if !self.has_field(fieldname) {
            error!(table = %self.tablename, field = %fieldname, "Attempt to load with nonexistent fieldname");
            self.nullify();
            return false;
        }
        let mut where_conditions = WhereConditions::new();
        where_conditions.add(fieldname, value);
        self.load(&where_conditions)
    }

    /// Load from the first matching row. On no match, or on failure, every
    /// field is nulled and `false` returned.
    pub fn load(&mut self, where_conditions: &WhereConditions) -> bool {
        let sqlargs = self.fetch_query_sql(where_conditions, &OrderBy::new());
        let result = self.db.query(sqlargs, FetchMode::FetchFirst, false, false);
        if result.is_empty() {
            self.nullify();
            return false;
        }
        if let Err(e) = self.set_from_query(&result, 0, true) {
            error!(table = %self.tablename, error = %e, "Failed to load record");
            self.nullify();
            return false;
        }
        true
    }

    /// `SELECT` over every field, in name order.
    pub fn fetch_query_sql(&self, where_conditions: &WhereConditions, order_by: &OrderBy) -> SqlArgs {
        let columns: Vec<String> = self.record.keys().map(|f| delimit(f)).collect();
        let mut sqlargs = SqlArgs::from_sql(format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            delimit(&self.tablename)
        ));
        where_conditions.append_where_clause_to(&mut sqlargs);
        add_order_by_clause(order_by, &mut sqlargs);
        sqlargs
    }

    /// Populate from a row. If `order_matches_fetch_query`, columns are
    /// taken positionally as produced by [`Self::fetch_query_sql`];
    /// otherwise by name, which needs column names in the result.
    pub fn set_from_query(
        &mut self,
        result: &QueryResult,
        row: usize,
        order_matches_fetch_query: bool,
    ) -> DatabaseResult<()> {
        for (index, (fieldname, field)) in self.record.iter_mut().enumerate() {
            let value = if order_matches_fetch_query {
                result.at(row, index)
            } else {
                result.at_by_name(row, fieldname)
            };
            field.set_from_database_value(value.to_storage())?;
        }
        self.exists_in_db = true;
        Ok(())
    }

    pub fn exists_in_db(&self) -> bool {
        self.exists_in_db
    }

    pub fn get_all_pks(&self) -> Vec<i64> {
        self.db
            .get_pks(&self.tablename, &self.pk_fieldname, &WhereConditions::new())
    }

    // ------------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------------

    /// Write changes. Does nothing if no field is dirty.
    ///
    /// Objects not yet known to be in the database are inserted, reading
    /// back the new PK if it was NULL. Others are updated in the background,
    /// writing dirty fields only.
    pub fn save(&mut self) -> bool {
        self.touch(true);
        if !self.any_dirty() {
            return true;
        }
        let success = if self.exists_in_db {
            self.save_update()
        } else {
            let read_pk = self.is_pk_null();
            self.save_insert(read_pk)
        };
        self.clear_all_dirty();
        self.exists_in_db = success;
        success
    }

    /// Save as a new row in the background, without reading the new PK.
    pub fn save_without_keeping_pk(&mut self) {
        self.touch(true);
        if !self.any_dirty() {
            return;
        }
        if self.exists_in_db {
            self.save_update();
        } else {
            self.save_insert(false);
        }
        self.exists_in_db = true;
        self.clear_all_dirty();
    }

    fn save_insert(&mut self, read_pk_from_database: bool) -> bool {
        let mut columns = Vec::new();
        let mut args = Vec::new();
        for (fieldname, field) in &self.record {
            if field.is_pk() && field.is_null() {
                // Autonumbered by the database.
                continue;
            }
            if field.is_mandatory() && field.is_null() {
                warn!(table = %self.tablename, field = %fieldname, "Mandatory field is NULL at save");
            }
            columns.push(delimit(fieldname));
            args.push(Value::from_sql(field.database_value()));
        }
        let sqlargs = SqlArgs::new(
            format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                delimit(&self.tablename),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            ),
            args,
        );

        if !read_pk_from_database {
            self.db.exec_no_answer(sqlargs);
            return true;
        }
        let result = self.db.query(sqlargs, FetchMode::NoFetch, false, false);
        if !result.succeeded() {
            error!(table = %self.tablename, "Failed to INSERT record");
            return false;
        }
        let new_pk = result.last_insert_id().clone();
        let pkname = self.pk_fieldname.clone();
        if let Err(e) = self.set_value(&pkname, new_pk, false) {
            error!(table = %self.tablename, error = %e, "Cannot store new PK");
            return false;
        }
        debug!(table = %self.tablename, pk = %self.pk_value(), "Inserted record");
        true
    }

    fn save_update(&mut self) -> bool {
        let mut assignments = Vec::new();
        let mut args = Vec::new();
        for (fieldname, field) in &self.record {
            if !field.is_dirty() {
                continue;
            }
            if field.is_mandatory() && field.is_null() {
                warn!(table = %self.tablename, field = %fieldname, "Mandatory field is NULL at save");
            }
            assignments.push(format!("{}=?", delimit(fieldname)));
            args.push(Value::from_sql(field.database_value()));
        }
        if assignments.is_empty() {
            return true;
        }
        args.push(self.pk_value().clone());
        let sqlargs = SqlArgs::new(
            format!(
                "UPDATE {} SET {} WHERE {}=?",
                delimit(&self.tablename),
                assignments.join(", "),
                delimit(&self.pk_fieldname)
            ),
            args,
        );
        self.db.exec_no_answer(sqlargs);
        true
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// Set every field to NULL; the object no longer corresponds to a row.
    pub fn nullify(&mut self) {
        for field in self.record.values_mut() {
            field.nullify();
        }
        self.exists_in_db = false;
    }

    /// Stamp the modification time, if the object has one.
    pub fn touch(&mut self, only_if_unset: bool) {
        if !self.has_modification_timestamp {
            return;
        }
        let Some(field) = self.record.get_mut(MODIFICATION_TIMESTAMP_FIELDNAME) else {
            return;
        };
        if only_if_unset && !field.is_null() {
            return;
        }
        if let Err(e) = field.set_value(now()) {
            warn!(table = %self.tablename, error = %e, "Cannot set modification timestamp");
        }
    }

    pub fn set_all_dirty(&mut self) {
        for field in self.record.values_mut() {
            field.set_dirty();
        }
    }

    pub fn any_dirty(&self) -> bool {
        self.record.values().any(Field::is_dirty)
    }

    fn clear_all_dirty(&mut self) {
        for field in self.record.values_mut() {
            field.clear_dirty();
        }
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Delete the row and any BLOBs it owns, then nullify.
    pub fn delete_from_database(&mut self) {
        if self.is_pk_null() {
            warn!(table = %self.tablename, "Attempting to delete an object with a NULL PK; ignored");
            return;
        }
        let pk = self.pk_value().clone();
        if !self.db.is_system_db() && self.db.table_exists(BLOB_TABLENAME) {
            let mut where_blob = WhereConditions::new();
            where_blob
                .add(SRC_TABLE_FIELDNAME, self.tablename.as_str())
                .add(SRC_PK_FIELDNAME, pk.clone());
            if !self.db.delete_from(BLOB_TABLENAME, &where_blob) {
                warn!(table = %self.tablename, pk = %pk, "Failed to delete BLOB(s)");
            }
        }
        let mut where_self = WhereConditions::new();
        where_self.add(self.pk_fieldname.clone(), pk);
        if !self.db.delete_from(&self.tablename, &where_self) {
            error!(table = %self.tablename, "Failed to delete record");
        }
        self.nullify();
    }

    // ------------------------------------------------------------------------
    // Move-off-tablet flag
    // ------------------------------------------------------------------------

    pub fn should_move_off_tablet(&self) -> bool {
        self.has_move_off_tablet_field && self.value_bool(MOVE_OFF_TABLET_FIELDNAME)
    }

    pub fn set_move_off_tablet(&mut self, move_off: bool) -> DatabaseResult<()> {
        if !self.has_move_off_tablet_field {
            return Err(DatabaseError::schema(format!(
                "{} has no move-off-tablet field",
                self.tablename
            )));
        }
        self.set_value(MOVE_OFF_TABLET_FIELDNAME, move_off, false)?;
        self.save();
        Ok(())
    }

    pub fn toggle_move_off_tablet(&mut self) -> DatabaseResult<()> {
        let current = self.should_move_off_tablet();
        self.set_move_off_tablet(!current)
    }

    // ------------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------------

    pub fn sql_create_table(&self) -> String {
        sql_create_table(&self.tablename, &self.fields_ordered())
    }

    /// Create or migrate the table to match this object's fields.
    pub fn make_table(&self) -> DatabaseResult<()> {
        self.db.create_table(&self.tablename, &self.fields_ordered())
    }

    // ------------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------------

    /// `name<separator>value<suffix>` per field, in declaration order.
    pub fn record_summary_lines(&self, separator: &str, suffix: &str) -> Vec<String> {
        self.ordered_fieldnames
            .iter()
            .filter_map(|name| self.record.get(name))
            .map(|field| format!("{}{separator}{}{suffix}", field.name(), field.pretty_value()))
            .collect()
    }

    pub fn record_summary_csv_string(&self, equals: &str, comma: &str) -> String {
        self.record_summary_lines(equals, "").join(comma)
    }
}

impl fmt::Debug for DatabaseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseObject")
            .field("tablename", &self.tablename)
            .field("record", &self.record)
            .field("exists_in_db", &self.exists_in_db)
            .finish()
    }
}

impl fmt::Display for DatabaseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}={}]: {}",
            self.tablename,
            self.pk_fieldname,
            self.pk_value(),
            self.record_summary_csv_string("=", ", ")
        )
    }
}

fn now() -> DateTime<FixedOffset> {
    truncate_to_millis(Local::now().fixed_offset())
}
