//! Named, typed, persistent settings kept in the `storedvars` table.
//!
//! Each variable is one row. Its value lives in whichever of the four
//! `value_*` columns matches the SQLite storage class of its type. A cache
//! layer lets a settings editor stage changes and then commit or discard
//! them as a whole.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{DatabaseError, DatabaseResult};
use crate::field::{Field, FieldType, SQLITE_TYPE_BLOB, SQLITE_TYPE_INTEGER, SQLITE_TYPE_REAL};
use crate::manager::DatabaseManager;
use crate::object::{DatabaseObject, ObjectOptions};
use crate::value::Value;

pub const STOREDVAR_TABLENAME: &str = "storedvars";
pub const NAME_FIELDNAME: &str = "name";
pub const TYPE_FIELDNAME: &str = "type";
pub const VALUE_INTEGER_FIELDNAME: &str = "value_integer";
pub const VALUE_REAL_FIELDNAME: &str = "value_real";
pub const VALUE_TEXT_FIELDNAME: &str = "value_text";
pub const VALUE_BLOB_FIELDNAME: &str = "value_blob";

const VALUE_FIELDNAMES: [&str; 4] = [
    VALUE_INTEGER_FIELDNAME,
    VALUE_REAL_FIELDNAME,
    VALUE_TEXT_FIELDNAME,
    VALUE_BLOB_FIELDNAME,
];

fn value_fieldname(ty: &FieldType) -> &'static str {
    match ty.sql_column_type() {
        SQLITE_TYPE_INTEGER => VALUE_INTEGER_FIELDNAME,
        SQLITE_TYPE_REAL => VALUE_REAL_FIELDNAME,
        SQLITE_TYPE_BLOB => VALUE_BLOB_FIELDNAME,
        _ => VALUE_TEXT_FIELDNAME,
    }
}

fn storedvar_object(db: Arc<DatabaseManager>) -> DatabaseResult<DatabaseObject> {
    DatabaseObject::builder(db, STOREDVAR_TABLENAME)
        .options(ObjectOptions {
            has_move_off_tablet_field: false,
            ..ObjectOptions::default()
        })
        .fields([
            Field::new(NAME_FIELDNAME, FieldType::String)
                .unique(true)
                .mandatory(true),
            Field::new(TYPE_FIELDNAME, FieldType::String).mandatory(true),
            Field::new(VALUE_INTEGER_FIELDNAME, FieldType::LongLong),
            Field::new(VALUE_REAL_FIELDNAME, FieldType::Double),
            Field::new(VALUE_TEXT_FIELDNAME, FieldType::String),
            Field::new(VALUE_BLOB_FIELDNAME, FieldType::ByteArray),
        ])
        .build()
}

/// One row of `storedvars`.
struct StoredVar {
    object: DatabaseObject,
    field_type: FieldType,
}

impl StoredVar {
    fn value(&self) -> DatabaseResult<Value> {
        let column = value_fieldname(&self.field_type);
        Value::from_storage(self.object.value(column).to_storage(), &self.field_type)
    }

    /// Returns whether the stored value changed.
    fn set_value(&mut self, value: Value, save: bool) -> DatabaseResult<bool> {
        let typed = value.coerce(&self.field_type)?;
        let column = value_fieldname(&self.field_type);
        let changed = self
            .object
            .set_value(column, Value::from_sql(typed.to_storage()), true)?;
        if save && changed {
            self.object.save();
        }
        Ok(changed)
    }

    /// Move an existing variable to a new type, converting its value if
    /// possible and falling back to `default` otherwise.
    fn convert(&mut self, new_type: FieldType, default: Value) -> DatabaseResult<()> {
        let old_value = self.value().unwrap_or(Value::Null);
        let new_value = match old_value.coerce(&new_type) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Stored variable could not be converted; using default");
                default
            }
        };
        for column in VALUE_FIELDNAMES {
            self.object.set_value(column, Value::Null, true)?;
        }
        self.object.set_value(TYPE_FIELDNAME, new_type.name(), true)?;
        self.field_type = new_type;
        self.set_value(new_value, false)?;
        self.object.save();
        Ok(())
    }
}

pub struct StoredVarStore {
    db: Arc<DatabaseManager>,
    vars: Mutex<BTreeMap<String, StoredVar>>,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl StoredVarStore {
    /// Ensure the `storedvars` table exists and return an empty store.
    pub fn new(db: Arc<DatabaseManager>) -> DatabaseResult<Self> {
        storedvar_object(Arc::clone(&db))?.make_table()?;
        Ok(Self {
            db,
            vars: Mutex::new(BTreeMap::new()),
            cache: Mutex::new(BTreeMap::new()),
        })
    }

    /// Register a variable, creating its row with `default` if it is new.
    ///
    /// An existing row keeps its value. If its stored type differs from
    /// `field_type`, the value is converted.
    pub fn create_var(
        &self,
        name: &str,
        field_type: FieldType,
        default: impl Into<Value>,
    ) -> DatabaseResult<()> {
        let default = default.into().coerce(&field_type)?;
        let mut vars = self.vars.lock();
        if vars.contains_key(name) {
            return Err(DatabaseError::schema(format!(
                "stored variable {name} created twice"
            )));
        }
        let mut object = storedvar_object(Arc::clone(&self.db))?;
        let var = if object.load_by_field(NAME_FIELDNAME, name) {
            let stored_type = FieldType::from_name(&object.value_string(TYPE_FIELDNAME));
            let mut var = StoredVar {
                object,
                field_type: stored_type.clone(),
            };
            if stored_type != field_type {
                info!(var = %name, from = %stored_type, to = %field_type, "Converting stored variable type");
                var.convert(field_type, default)?;
            }
            var
        } else {
            object.set_value(NAME_FIELDNAME, name, true)?;
            object.set_value(TYPE_FIELDNAME, field_type.name(), true)?;
            let mut var = StoredVar { object, field_type };
            var.set_value(default, false)?;
            var.object.save();
            var
        };
        vars.insert(name.to_string(), var);
        Ok(())
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.lock().contains_key(name)
    }

    pub fn var_names(&self) -> Vec<String> {
        self.vars.lock().keys().cloned().collect()
    }

    pub fn var_type(&self, name: &str) -> Option<FieldType> {
        self.vars.lock().get(name).map(|v| v.field_type.clone())
    }

    pub fn var(&self, name: &str) -> DatabaseResult<Value> {
        self.with_var(name, |var| var.value())
    }

    /// Set and save a variable. Returns whether its value changed.
    pub fn set_var(&self, name: &str, value: impl Into<Value>) -> DatabaseResult<bool> {
        let value = value.into();
        self.with_var(name, |var| var.set_value(value, true))
    }

    fn with_var<T>(&self, name: &str, f: impl FnOnce(&mut StoredVar) -> DatabaseResult<T>) -> DatabaseResult<T> {
        let mut vars = self.vars.lock();
        let var = vars
            .get_mut(name)
            .ok_or_else(|| DatabaseError::schema(format!("no such stored variable: {name}")))?;
        f(var)
    }

    // ------------------------------------------------------------------------
    // Editing cache
    // ------------------------------------------------------------------------

    /// The staged value if there is one, else the stored value.
    pub fn cached_var(&self, name: &str) -> DatabaseResult<Value> {
        if let Some(value) = self.cache.lock().get(name) {
            return Ok(value.clone());
        }
        self.var(name)
    }

    /// Stage a value without saving it. Returns whether it differs from
    /// what was visible before.
    pub fn set_cached_var(&self, name: &str, value: impl Into<Value>) -> DatabaseResult<bool> {
        let field_type = self
            .var_type(name)
            .ok_or_else(|| DatabaseError::schema(format!("no such stored variable: {name}")))?;
        let value = value.into().coerce(&field_type)?;
        let changed = self.cached_var(name)? != value;
        self.cache.lock().insert(name.to_string(), value);
        Ok(changed)
    }

    /// Save every staged value and empty the cache.
    pub fn commit_cached_vars(&self) -> DatabaseResult<()> {
        let staged = std::mem::take(&mut *self.cache.lock());
        info!(n = staged.len(), "Committing cached stored variables");
        for (name, value) in staged {
            self.set_var(&name, value)?;
        }
        Ok(())
    }

    /// Discard every staged value.
    pub fn clear_cached_vars(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Arc<DatabaseManager> {
        let db = DatabaseManager::open_in_memory("storedvar-test", false).unwrap();
        db.set_vacuum_on_close(false);
        Arc::new(db)
    }

    #[test]
    fn test_create_and_set() {
        let db = db();
        let store = StoredVarStore::new(Arc::clone(&db)).unwrap();
        store.create_var("server_port", FieldType::Int, 443).unwrap();
        store.create_var("server_name", FieldType::String, "").unwrap();
        assert_eq!(store.var("server_port").unwrap(), Value::Int(443));
        assert!(store.set_var("server_port", 8443).unwrap());
        assert!(!store.set_var("server_port", 8443).unwrap());
        assert!(store.set_var("server_name", "example.org").unwrap());

        // A fresh store sees the saved values rather than the defaults.
        let again = StoredVarStore::new(db).unwrap();
        again.create_var("server_port", FieldType::Int, 443).unwrap();
        again.create_var("server_name", FieldType::String, "").unwrap();
        assert_eq!(again.var("server_port").unwrap(), Value::Int(8443));
        assert_eq!(again.var("server_name").unwrap(), Value::from("example.org"));
        assert_eq!(again.var_names(), vec!["server_name", "server_port"]);
    }

    #[test]
    fn test_unknown_var_is_schema_violation() {
        let store = StoredVarStore::new(db()).unwrap();
        assert!(store.var("nope").unwrap_err().is_fatal());
        assert!(store.set_var("nope", 1).unwrap_err().is_fatal());
    }

    #[test]
    fn test_type_change_converts_value() {
        let db = db();
        {
            let store = StoredVarStore::new(Arc::clone(&db)).unwrap();
            store.create_var("timeout", FieldType::String, "30").unwrap();
        }
        let store = StoredVarStore::new(Arc::clone(&db)).unwrap();
        store.create_var("timeout", FieldType::Int, 10).unwrap();
        assert_eq!(store.var("timeout").unwrap(), Value::Int(30));
        assert_eq!(
            db.fetch_first_value("SELECT type FROM storedvars WHERE name = 'timeout'"),
            Value::from("int")
        );
        assert!(db
            .fetch_first_value("SELECT value_text FROM storedvars WHERE name = 'timeout'")
            .is_null());
    }

    #[test]
    fn test_cache_commit_and_clear() {
        let store = StoredVarStore::new(db()).unwrap();
        store.create_var("flag", FieldType::Bool, false).unwrap();

        assert!(store.set_cached_var("flag", true).unwrap());
        assert_eq!(store.cached_var("flag").unwrap(), Value::Bool(true));
        assert_eq!(store.var("flag").unwrap(), Value::Bool(false));
        store.clear_cached_vars();
        assert_eq!(store.cached_var("flag").unwrap(), Value::Bool(false));

        store.set_cached_var("flag", true).unwrap();
        store.commit_cached_vars().unwrap();
        assert_eq!(store.var("flag").unwrap(), Value::Bool(true));
    }
}
