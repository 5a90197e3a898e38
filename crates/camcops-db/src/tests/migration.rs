//! Table creation and in-place migration.

use super::harness::{memory_db, person, PERSON_TABLE};
use crate::field::{Field, FieldType};
use crate::sqlargs::{SqlArgs, WhereConditions};
use crate::value::Value;

fn pk() -> Field {
    Field::new("id", FieldType::Int).pk(true)
}

fn column_type(db: &crate::manager::DatabaseManager, column: &str) -> String {
    db.get_pragma_info(PERSON_TABLE)
        .unwrap()
        .into_iter()
        .find(|info| info.name == column)
        .map(|info| info.column_type)
        .unwrap_or_default()
}

#[test]
fn test_added_column_is_null_for_existing_rows() {
    let db = memory_db(false);
    db.create_table(PERSON_TABLE, &[pk(), Field::new("name", FieldType::String)])
        .unwrap();
    assert!(db.exec("INSERT INTO person (id, name) VALUES (1, 'Ann'), (2, 'Bob')"));

    person(&db).make_table().unwrap();
    assert_eq!(db.get_field_names(PERSON_TABLE).unwrap(), vec!["id", "name", "score"]);

    let mut bob = person(&db);
    assert!(bob.load_by_pk(2));
    assert_eq!(bob.value_string("name"), "Bob");
    assert!(bob.value_is_null("score"));
}

#[test]
fn test_undeclared_column_is_dropped_and_data_kept() {
    let db = memory_db(false);
    db.create_table(
        PERSON_TABLE,
        &[
            pk(),
            Field::new("name", FieldType::String),
            Field::new("score", FieldType::Int),
            Field::new("legacy", FieldType::String),
        ],
    )
    .unwrap();
    assert!(db.exec("INSERT INTO person (id, name, legacy) VALUES (1, 'Bob', 'old')"));

    person(&db).make_table().unwrap();
    assert_eq!(db.get_field_names(PERSON_TABLE).unwrap(), vec!["id", "name", "score"]);
    assert!(!db.table_exists("person_temp"));

    let mut bob = person(&db);
    assert!(bob.load_by_pk(1));
    assert_eq!(bob.value_string("name"), "Bob");
}

#[test]
fn test_type_change_converges_and_is_idempotent() {
    let db = memory_db(false);
    db.create_table(
        PERSON_TABLE,
        &[
            pk(),
            Field::new("name", FieldType::String),
            Field::new("score", FieldType::String),
        ],
    )
    .unwrap();
    assert_eq!(column_type(&db, "score"), "TEXT");
    assert!(db.exec("INSERT INTO person (id, name, score) VALUES (1, 'Ann', '7')"));

    person(&db).make_table().unwrap();
    assert_eq!(column_type(&db, "score"), "INTEGER");
    assert_eq!(db.fetch_int("SELECT score FROM person WHERE id = 1", -1), 7);

    let definition = db.db_table_definition_sql(PERSON_TABLE);
    person(&db).make_table().unwrap();
    assert_eq!(db.db_table_definition_sql(PERSON_TABLE), definition);
    assert_eq!(db.count(PERSON_TABLE, &WhereConditions::new()), 1);
}

#[test]
fn test_rename_columns() {
    let db = memory_db(false);
    person(&db).make_table().unwrap();
    assert!(db.exec(SqlArgs::new(
        "INSERT INTO person (name, score) VALUES (?, ?)",
        vec![Value::from("Ann"), Value::from(3)]
    )));

    db.rename_columns(PERSON_TABLE, &[("name", "full_name"), ("score", "score")])
        .unwrap();
    assert_eq!(
        db.get_field_names(PERSON_TABLE).unwrap(),
        vec!["id", "full_name", "score"]
    );
    assert_eq!(db.fetch_first_value("SELECT full_name FROM person"), Value::from("Ann"));

    assert!(db
        .rename_columns(PERSON_TABLE, &[("name", "other")])
        .unwrap_err()
        .is_fatal());
    assert!(db
        .rename_columns(PERSON_TABLE, &[("full_name", "score")])
        .unwrap_err()
        .is_fatal());
}

#[test]
fn test_change_column_types_matches_case_insensitively() {
    let db = memory_db(false);
    person(&db).make_table().unwrap();
    assert!(db.exec("INSERT INTO person (name, score) VALUES ('Ann', 3)"));

    db.change_column_types(PERSON_TABLE, &[("SCORE", "TEXT"), ("missing", "REAL")])
        .unwrap();
    assert_eq!(column_type(&db, "score"), "TEXT");
    assert_eq!(db.fetch_first_value("SELECT typeof(score) FROM person"), Value::from("text"));

    // Declaring the object again moves the column back.
    person(&db).make_table().unwrap();
    assert_eq!(column_type(&db, "score"), "INTEGER");
}

#[test]
fn test_contradictory_migrations_are_fatal() {
    let db = memory_db(false);
    person(&db).make_table().unwrap();

    let mandatory = Field::new("age", FieldType::Int).mandatory(true);
    let err = db
        .create_table(PERSON_TABLE, &[pk(), Field::new("name", FieldType::String), mandatory])
        .unwrap_err();
    assert!(err.is_fatal());

    let with_default = Field::new("age", FieldType::Int)
        .mandatory(true)
        .with_db_default(0)
        .unwrap();
    db.create_table(
        PERSON_TABLE,
        &[
            pk(),
            Field::new("name", FieldType::String),
            Field::new("score", FieldType::Int),
            with_default,
        ],
    )
    .unwrap();
    assert!(db.get_field_names(PERSON_TABLE).unwrap().contains(&"age".to_string()));
}
