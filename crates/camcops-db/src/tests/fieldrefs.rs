//! FieldRef bindings that reach into the database.

use std::sync::Arc;

use parking_lot::Mutex;

use super::harness::{memory_db, person, person_with_photo, PERSON_TABLE};
use crate::blob::{Blob, BLOB_TABLENAME};
use crate::field::FieldType;
use crate::fieldref::{FieldRef, FieldRefSignal};
use crate::manager::NONEXISTENT_PK;
use crate::object::DatabaseObject;
use crate::sqlargs::WhereConditions;
use crate::stored_var::StoredVarStore;
use crate::value::Value;

#[test]
fn test_field_ref_is_shared_per_field() {
    let db = memory_db(false);
    let obj = person(&db).into_ptr();
    let a = DatabaseObject::field_ref(&obj, "name", false, true).unwrap();
    let b = DatabaseObject::field_ref(&obj, "name", true, false).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!b.mandatory());
    let c = DatabaseObject::field_ref(&obj, "score", false, true).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert!(DatabaseObject::field_ref(&obj, "nope", false, true)
        .unwrap_err()
        .is_fatal());
}

#[test]
fn test_autosave_happens_after_notification() {
    let db = memory_db(false);
    let obj = person(&db).into_ptr();
    obj.lock().make_table().unwrap();
    let name = DatabaseObject::field_ref(&obj, "name", true, true).unwrap();

    let rows_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rows_seen);
    let observer_db = Arc::clone(&db);
    name.subscribe(move |fieldref, event| {
        assert_eq!(event.signal, FieldRefSignal::ValueChanged);
        assert!(!fieldref.missing_input());
        sink.lock()
            .push(observer_db.count(PERSON_TABLE, &WhereConditions::new()));
    });

    assert!(name.set_value("Ann", None).unwrap());
    assert_eq!(*rows_seen.lock(), vec![0]);
    assert_eq!(db.count(PERSON_TABLE, &WhereConditions::new()), 1);
    assert!(obj.lock().exists_in_db());

    assert!(name.set_value("Bea", None).unwrap());
    let mut reloaded = person(&db);
    assert!(reloaded.load_by_pk(1));
    assert_eq!(reloaded.value_string("name"), "Bea");
    assert_eq!(name.target_description(), "person.name");
}

#[test]
fn test_without_autosave_nothing_is_written() {
    let db = memory_db(false);
    let obj = person(&db).into_ptr();
    obj.lock().make_table().unwrap();
    let score = DatabaseObject::field_ref(&obj, "score", false, false).unwrap();
    assert!(score.set_value(4, None).unwrap());
    assert_eq!(score.value_int(), 4);
    assert_eq!(db.count(PERSON_TABLE, &WhereConditions::new()), 0);
    assert!(obj.lock().save());
    assert_eq!(db.fetch_int("SELECT score FROM person", -1), 4);
}

#[test]
fn test_dead_object_reads_null() {
    let db = memory_db(false);
    let obj = person(&db).into_ptr();
    let name = DatabaseObject::field_ref(&obj, "name", false, false).unwrap();
    name.set_value("Ann", None).unwrap();
    assert!(name.valid());
    drop(obj);
    assert!(!name.valid());
    assert!(name.value().is_null());
    assert!(!name.set_value("Bob", None).unwrap());
}

#[test]
fn test_blob_ref_stores_blob_pk_in_owner() {
    let db = memory_db(false);
    Blob::make_table(&db).unwrap();
    let obj = person_with_photo(&db).into_ptr();
    obj.lock().make_table().unwrap();

    let photo = DatabaseObject::blob_field_ref(&obj, "photo", true).unwrap();
    assert!(photo.is_blob());
    assert_eq!(obj.lock().pk_value_int(), 1);
    assert!(photo.missing_input());

    assert!(photo
        .set_raw_image(vec![0x89, b'P', b'N', b'G'], "png", "image/png", None)
        .unwrap());
    assert!(!photo.missing_input());
    let blob_pk = db.fetch_int("SELECT id FROM blobs", -1);
    assert!(blob_pk > 0);
    assert_eq!(obj.lock().value_i64("photo"), blob_pk);
    assert_eq!(db.fetch_int("SELECT photo FROM person WHERE id = 1", -1), blob_pk);

    photo.rotate_image(-90, None).unwrap();
    assert_eq!(photo.rotation(), 270);
    let stored = Blob::new(Arc::clone(&db), PERSON_TABLE, 1, "photo").unwrap();
    assert_eq!(stored.rotation(), 270);
    assert_eq!(stored.mimetype(), "image/png");
    assert_eq!(stored.blob_bytes(), vec![0x89, b'P', b'N', b'G']);

    let again = DatabaseObject::blob_field_ref(&obj, "photo", true).unwrap();
    assert!(Arc::ptr_eq(&photo, &again));

    obj.lock().delete_from_database();
    assert_eq!(db.count(BLOB_TABLENAME, &WhereConditions::new()), 0);
}

#[test]
fn test_non_blob_rotation_is_an_error() {
    let db = memory_db(false);
    let obj = person(&db).into_ptr();
    let name = DatabaseObject::field_ref(&obj, "name", false, false).unwrap();
    assert!(name.rotate_image(90, None).is_err());
    assert_eq!(name.rotation(), 0);
}

#[test]
fn test_stored_var_bindings() {
    let db = memory_db(false);
    let store = Arc::new(StoredVarStore::new(db).unwrap());
    store.create_var("volume", FieldType::Int, 5).unwrap();

    let direct = FieldRef::for_stored_var(Arc::clone(&store), "volume", false, false);
    let cached = FieldRef::for_stored_var(Arc::clone(&store), "volume", false, true);
    assert_eq!(direct.method_description(), "StoredVar");
    assert_eq!(cached.method_description(), "CachedStoredVar");

    assert!(cached.set_value(7, None).unwrap());
    assert_eq!(cached.value_int(), 7);
    assert_eq!(direct.value_int(), 5);

    store.commit_cached_vars().unwrap();
    assert_eq!(direct.value_int(), 7);

    assert!(direct.set_value(9, None).unwrap());
    assert_eq!(store.var("volume").unwrap(), Value::Int(9));

    let missing = FieldRef::for_stored_var(store, "nope", false, false);
    assert!(!missing.valid());
    assert!(missing.value().is_null());
}

#[test]
fn test_rotate_image_by_extreme_angles() {
    let db = memory_db(false);
    let blob = Blob::new(Arc::clone(&db), "specimen", NONEXISTENT_PK, "img").unwrap();
    let fr = FieldRef::for_isolated_blob(blob, false);

    // 2_147_483_610 is 90 modulo 360.
    let angle = 2_147_483_610;
    fr.rotate_image(angle, None).unwrap();
    assert_eq!(fr.rotation(), 90);
    fr.rotate_image(angle, None).unwrap();
    assert_eq!(fr.rotation(), 180);
    fr.rotate_image(i32::MIN, None).unwrap();
    assert_eq!(fr.rotation(), (180 + i32::MIN.rem_euclid(360)) % 360);
}
