//! Binary values stored out of line in the `blobs` table.
//!
//! A record refers to its BLOB by storing the BLOB's PK in an integer
//! field; the BLOB row records the source table, PK and field in turn.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::DatabaseResult;
use crate::field::{Field, FieldType};
use crate::manager::{DatabaseManager, NONEXISTENT_PK};
use crate::object::{DatabaseObject, ObjectOptions};
use crate::sqlargs::WhereConditions;
use crate::value::Value;

pub const BLOB_TABLENAME: &str = "blobs";
pub const SRC_TABLE_FIELDNAME: &str = "tablename";
pub const SRC_PK_FIELDNAME: &str = "tablepk";
pub const SRC_FIELD_FIELDNAME: &str = "fieldname";
pub const FILENAME_FIELDNAME: &str = "filename";
pub const MIMETYPE_FIELDNAME: &str = "mimetype";
pub const ROTATION_FIELDNAME: &str = "image_rotation_deg_cw";
pub const BLOB_FIELDNAME: &str = "theblob";

pub struct Blob {
    object: DatabaseObject,
}

impl Blob {
    /// The BLOB belonging to one cell of a source table. Loads the existing
    /// row if there is one.
    pub fn new(
        db: Arc<DatabaseManager>,
        src_table: &str,
        src_pk: i64,
        src_field: &str,
    ) -> DatabaseResult<Self> {
        let object = DatabaseObject::builder(db, BLOB_TABLENAME)
            .options(ObjectOptions::default())
            .fields([
                Field::new(SRC_TABLE_FIELDNAME, FieldType::String).mandatory(true),
                Field::new(SRC_PK_FIELDNAME, FieldType::Int).mandatory(true),
                Field::new(SRC_FIELD_FIELDNAME, FieldType::String).mandatory(true),
                Field::new(FILENAME_FIELDNAME, FieldType::String),
                Field::new(MIMETYPE_FIELDNAME, FieldType::String),
                Field::new(ROTATION_FIELDNAME, FieldType::Int)
                    .mandatory(true)
                    .with_default(0)?
                    .with_db_default(0)?,
                Field::new(BLOB_FIELDNAME, FieldType::ByteArray),
            ])
            .build()?;
        let mut blob = Self { object };

        let db = Arc::clone(blob.object.database());
        let mut found = false;
        if src_pk != NONEXISTENT_PK && db.table_exists(BLOB_TABLENAME) {
            let mut where_conditions = WhereConditions::new();
            where_conditions
                .add(SRC_TABLE_FIELDNAME, src_table)
                .add(SRC_PK_FIELDNAME, Value::Int64(src_pk))
                .add(SRC_FIELD_FIELDNAME, src_field);
            found = blob.object.load(&where_conditions);
        }
        if !found {
            // A failed load nulls everything, so set the source afresh.
            blob.object.set_value(SRC_TABLE_FIELDNAME, src_table, false)?;
            blob.object.set_value(SRC_PK_FIELDNAME, Value::Int64(src_pk), false)?;
            blob.object.set_value(SRC_FIELD_FIELDNAME, src_field, false)?;
            blob.object.set_value(ROTATION_FIELDNAME, 0, false)?;
        }
        Ok(blob)
    }

    /// Create or migrate the `blobs` table.
    pub fn make_table(db: &Arc<DatabaseManager>) -> DatabaseResult<()> {
        Self::new(Arc::clone(db), "", NONEXISTENT_PK, "")?.object.make_table()
    }

    /// Set the BLOB contents, returning whether they changed. A new image
    /// resets the rotation.
    pub fn set_blob(&mut self, value: impl Into<Value>, save_to_db: bool) -> DatabaseResult<bool> {
        let changed = self.object.set_value(BLOB_FIELDNAME, value, true)?;
        if changed {
            self.object.set_value(ROTATION_FIELDNAME, 0, true)?;
        }
        if save_to_db {
            self.save();
        }
        Ok(changed)
    }

    pub fn blob_value(&self) -> &Value {
        self.object.value(BLOB_FIELDNAME)
    }

    pub fn blob_bytes(&self) -> Vec<u8> {
        self.object.value_bytes(BLOB_FIELDNAME)
    }

    /// Store encoded image data as-is, along with its filename extension
    /// and MIME type.
    pub fn set_raw_image(
        &mut self,
        data: Vec<u8>,
        extension_without_dot: &str,
        mimetype: &str,
        save_to_db: bool,
    ) -> DatabaseResult<bool> {
        let mut changed = self.object.set_value(BLOB_FIELDNAME, data, true)?;
        changed |= self.object.set_value(
            FILENAME_FIELDNAME,
            format!("image.{extension_without_dot}"),
            true,
        )?;
        changed |= self.object.set_value(MIMETYPE_FIELDNAME, mimetype, true)?;
        changed |= self.object.set_value(ROTATION_FIELDNAME, 0, true)?;
        if save_to_db {
            self.save();
        }
        Ok(changed)
    }

    /// Clockwise rotation to apply when displaying, in degrees.
    pub fn rotation(&self) -> i32 {
        self.object.value_int(ROTATION_FIELDNAME)
    }

    /// Set the rotation, normalised to 0..360. Returns whether it changed.
    pub fn set_rotation(&mut self, degrees_clockwise: i32, save_to_db: bool) -> DatabaseResult<bool> {
        let normalised = degrees_clockwise.rem_euclid(360);
        if normalised % 90 != 0 {
            warn!(degrees = degrees_clockwise, "Image rotation is not a multiple of 90 degrees");
        }
        let changed = self.object.set_value(ROTATION_FIELDNAME, normalised, true)?;
        if save_to_db {
            self.save();
        }
        Ok(changed)
    }

    pub fn mimetype(&self) -> String {
        self.object.value_string(MIMETYPE_FIELDNAME)
    }

    pub fn filename(&self) -> String {
        self.object.value_string(FILENAME_FIELDNAME)
    }

    pub fn pk_value(&self) -> i64 {
        self.object.pk_value_int()
    }

    pub fn save(&mut self) -> bool {
        self.object.save()
    }

    pub fn object(&self) -> &DatabaseObject {
        &self.object
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("pk", &self.pk_value())
            .field("src_table", self.object.value(SRC_TABLE_FIELDNAME))
            .field("src_pk", self.object.value(SRC_PK_FIELDNAME))
            .field("src_field", self.object.value(SRC_FIELD_FIELDNAME))
            .field("size", &self.blob_value().as_bytes().map_or(0, <[u8]>::len))
            .finish()
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blob {} for {}.{}[{}] ({})",
            self.pk_value(),
            self.object.value(SRC_TABLE_FIELDNAME),
            self.object.value(SRC_FIELD_FIELDNAME),
            self.object.value(SRC_PK_FIELDNAME),
            self.blob_value()
        )
    }
}
