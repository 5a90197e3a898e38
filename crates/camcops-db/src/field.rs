//! A single typed, nullable column value with dirty tracking.

use std::fmt;

use rusqlite::types::Value as SqlValue;

use crate::error::DatabaseResult;
use crate::value::Value;

pub const SQLITE_TYPE_BLOB: &str = "BLOB";
pub const SQLITE_TYPE_INTEGER: &str = "INTEGER";
pub const SQLITE_TYPE_REAL: &str = "REAL";
pub const SQLITE_TYPE_TEXT: &str = "TEXT";

/// Declared in-memory type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    LongLong,
    ULongLong,
    Double,
    Char,
    Date,
    DateTime,
    String,
    StringList,
    IntList,
    Version,
    ByteArray,
    Uuid,
    /// Opaque application type, stored as a BLOB.
    UserType(String),
}

impl FieldType {
    /// SQLite storage class used for this type.
    pub fn sql_column_type(&self) -> &'static str {
        match self {
            FieldType::Bool | FieldType::Int | FieldType::LongLong | FieldType::ULongLong => {
                SQLITE_TYPE_INTEGER
            }
            FieldType::Double => SQLITE_TYPE_REAL,
            FieldType::Char
            | FieldType::Date
            | FieldType::DateTime
            | FieldType::String
            | FieldType::StringList
            | FieldType::IntList
            | FieldType::Version
            | FieldType::Uuid => SQLITE_TYPE_TEXT,
            FieldType::ByteArray | FieldType::UserType(_) => SQLITE_TYPE_BLOB,
        }
    }

    /// Name stored alongside persisted variables; see [`FieldType::from_name`].
    pub fn name(&self) -> &str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::LongLong => "qlonglong",
            FieldType::ULongLong => "qulonglong",
            FieldType::Double => "double",
            FieldType::Char => "QChar",
            FieldType::Date => "QDate",
            FieldType::DateTime => "QDateTime",
            FieldType::String => "QString",
            FieldType::StringList => "QStringList",
            FieldType::IntList => "QVector<int>",
            FieldType::Version => "Version",
            FieldType::ByteArray => "QByteArray",
            FieldType::Uuid => "QUuid",
            FieldType::UserType(name) => name,
        }
    }

    pub fn from_name(name: &str) -> FieldType {
        match name {
            "bool" => FieldType::Bool,
            "int" => FieldType::Int,
            "qlonglong" => FieldType::LongLong,
            "qulonglong" => FieldType::ULongLong,
            "double" => FieldType::Double,
            "QChar" => FieldType::Char,
            "QDate" => FieldType::Date,
            "QDateTime" => FieldType::DateTime,
            "QString" => FieldType::String,
            "QStringList" => FieldType::StringList,
            "QVector<int>" => FieldType::IntList,
            "Version" => FieldType::Version,
            "QByteArray" => FieldType::ByteArray,
            "QUuid" => FieldType::Uuid,
            other => FieldType::UserType(other.to_string()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One column of a record.
///
/// A PK field is always unique and mandatory. New fields start out dirty so
/// that a freshly constructed record writes every column on first save.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    field_type: FieldType,
    pk: bool,
    unique: bool,
    mandatory: bool,
    value: Value,
    default_value: Value,
    db_default_value: Value,
    set: bool,
    dirty: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            pk: false,
            unique: false,
            mandatory: false,
            value: Value::Null,
            default_value: Value::Null,
            db_default_value: Value::Null,
            set: false,
            dirty: true,
        }
    }

    pub fn pk(mut self, pk: bool) -> Self {
        self.pk = pk;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// In-memory default; becomes the value while the field is unset.
    pub fn with_default(mut self, value: impl Into<Value>) -> DatabaseResult<Self> {
        self.set_default_value(value)?;
        Ok(self)
    }

    /// Default written into the column DDL.
    pub fn with_db_default(mut self, value: impl Into<Value>) -> DatabaseResult<Self> {
        self.db_default_value = value.into().coerce(&self.field_type)?;
        Ok(self)
    }

    pub fn set_default_value(&mut self, value: impl Into<Value>) -> DatabaseResult<()> {
        self.default_value = value.into().coerce(&self.field_type)?;
        if !self.set {
            self.value = self.default_value.clone();
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_pk(&self) -> bool {
        self.pk
    }

    pub fn is_unique(&self) -> bool {
        self.unique || self.pk
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory || self.pk
    }

    pub fn not_null(&self) -> bool {
        self.is_mandatory()
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn has_db_default_value(&self) -> bool {
        !self.db_default_value.is_null()
    }

    pub fn sql_column_type(&self) -> &'static str {
        self.field_type.sql_column_type()
    }

    /// Column definition for CREATE TABLE / ALTER TABLE ADD COLUMN.
    pub fn sql_column_def(&self) -> String {
        let mut def = self.sql_column_type().to_string();
        if self.pk {
            def.push_str(" PRIMARY KEY");
        }
        if self.is_unique() && !self.pk {
            def.push_str(" UNIQUE");
        }
        if self.not_null() {
            def.push_str(" NOT NULL");
        }
        if self.has_db_default_value() {
            def.push_str(" DEFAULT ");
            def.push_str(&self.db_default_value.to_sql_literal());
        }
        def
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn pretty_value(&self) -> String {
        self.value.to_string()
    }

    /// Set the value, returning whether it changed.
    ///
    /// The value is coerced to the declared type first; on failure nothing
    /// is modified.
    pub fn set_value(&mut self, value: impl Into<Value>) -> DatabaseResult<bool> {
        let value = value.into().coerce(&self.field_type)?;
        let changed = !self.set || value != self.value;
        if changed {
            self.dirty = true;
        }
        self.value = value;
        self.set = true;
        Ok(changed)
    }

    /// Set to NULL, returning whether anything changed.
    pub fn nullify(&mut self) -> bool {
        let changed = !self.set || !self.value.is_null();
        if changed {
            self.dirty = true;
        }
        self.value = Value::Null;
        self.set = true;
        changed
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Load a value read from the database; the field is then clean.
    pub fn set_from_database_value(&mut self, raw: SqlValue) -> DatabaseResult<()> {
        self.value = Value::from_storage(raw, &self.field_type)?;
        self.set = true;
        self.dirty = false;
        Ok(())
    }

    /// The value as it is written to the database.
    pub fn database_value(&self) -> SqlValue {
        self.value.to_storage()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_null() {
            write!(f, "NULL ({})", self.field_type)?;
        } else {
            write!(f, "{}", self.value)?;
        }
        if self.dirty {
            f.write_str(" (*)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Version;
    use chrono::NaiveDate;

    #[test]
    fn test_pk_implies_unique_and_mandatory() {
        let field = Field::new("id", FieldType::Int).pk(true);
        assert!(field.is_unique());
        assert!(field.is_mandatory());
        assert!(field.not_null());
        assert_eq!(field.sql_column_def(), "INTEGER PRIMARY KEY NOT NULL");
    }

    #[test]
    fn test_column_defs() {
        let name = Field::new("name", FieldType::String);
        assert_eq!(name.sql_column_def(), "TEXT");

        let code = Field::new("code", FieldType::String).unique(true).mandatory(true);
        assert_eq!(code.sql_column_def(), "TEXT UNIQUE NOT NULL");

        let flag = Field::new("flag", FieldType::Bool)
            .mandatory(true)
            .with_db_default(false)
            .unwrap();
        assert_eq!(flag.sql_column_def(), "INTEGER NOT NULL DEFAULT 0");

        let photo = Field::new("photo", FieldType::ByteArray);
        assert_eq!(photo.sql_column_def(), "BLOB");
        assert_eq!(Field::new("v", FieldType::Version).sql_column_type(), "TEXT");
        assert_eq!(Field::new("x", FieldType::Double).sql_column_type(), "REAL");
    }

    #[test]
    fn test_new_field_is_dirty_and_unset() {
        let field = Field::new("score", FieldType::Int);
        assert!(field.is_dirty());
        assert!(!field.is_set());
        assert!(field.is_null());
    }

    #[test]
    fn test_set_value_tracks_changes() {
        let mut field = Field::new("score", FieldType::Int);
        assert!(field.set_value(5).unwrap());
        field.clear_dirty();

        assert!(!field.set_value(5).unwrap());
        assert!(!field.is_dirty());

        assert!(field.set_value(6).unwrap());
        assert!(field.is_dirty());
    }

    #[test]
    fn test_first_set_counts_as_change_even_if_equal_to_default() {
        let mut field = Field::new("n", FieldType::Int).with_default(3).unwrap();
        assert_eq!(field.value(), &Value::Int(3));
        field.clear_dirty();
        assert!(field.set_value(3).unwrap());
        assert!(field.is_dirty());
    }

    #[test]
    fn test_failed_coercion_leaves_field_untouched() {
        let mut field = Field::new("n", FieldType::Int);
        field.set_value(1).unwrap();
        field.clear_dirty();

        assert!(field.set_value("not a number").is_err());
        assert_eq!(field.value(), &Value::Int(1));
        assert!(!field.is_dirty());
    }

    #[test]
    fn test_nullify() {
        let mut field = Field::new("n", FieldType::Int);
        field.set_value(1).unwrap();
        field.clear_dirty();
        assert!(field.nullify());
        assert!(field.is_dirty());
        field.clear_dirty();
        assert!(!field.nullify());
        assert!(!field.is_dirty());
    }

    #[test]
    fn test_database_value_round_trip_clears_dirty() {
        let cases = vec![
            (FieldType::Date, Value::Date(NaiveDate::from_ymd_opt(2023, 7, 28).unwrap())),
            (FieldType::Version, Value::Version(Version::new(2, 4, 1))),
            (FieldType::IntList, Value::IntList(vec![4, 5, 6])),
            (FieldType::Char, Value::Char('x')),
            (FieldType::String, Value::from("text")),
        ];
        for (ty, value) in cases {
            let mut source = Field::new("f", ty.clone());
            source.set_value(value.clone()).unwrap();

            let mut target = Field::new("f", ty);
            target.set_from_database_value(source.database_value()).unwrap();
            assert_eq!(target.value(), &value);
            assert!(!target.is_dirty());
        }
    }

    #[test]
    fn test_display_marks_dirty() {
        let mut field = Field::new("n", FieldType::Int);
        assert_eq!(field.to_string(), "NULL (int) (*)");
        field.set_value(7).unwrap();
        field.clear_dirty();
        assert_eq!(field.to_string(), "7");
    }

    #[test]
    fn test_type_names_round_trip() {
        for ty in [
            FieldType::Bool,
            FieldType::LongLong,
            FieldType::StringList,
            FieldType::IntList,
            FieldType::UserType("Custom".into()),
        ] {
            assert_eq!(FieldType::from_name(ty.name()), ty);
        }
    }
}
