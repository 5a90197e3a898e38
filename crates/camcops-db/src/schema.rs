//! Live table structure and the plans used to migrate it.

use std::fmt;

use crate::field::Field;
use crate::query_result::QueryResult;
use crate::sqlargs::delimit;
use crate::value::Value;

/// Suffix for the temporary table used while rebuilding a table.
pub const TABLE_TEMP_SUFFIX: &str = "_temp";

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlitePragmaInfoField {
    pub cid: i64,
    pub name: String,
    pub column_type: String,
    pub notnull: bool,
    /// Default as SQL text (already quoted by SQLite), or NULL.
    pub dflt_value: Value,
    pub pk: bool,
}

impl SqlitePragmaInfoField {
    /// Parse the rows of a `PRAGMA table_info` query.
    pub fn from_query_result(result: &QueryResult) -> Vec<Self> {
        (0..result.n_rows())
            .map(|row| Self {
                cid: result.at(row, 0).to_i64().unwrap_or_default(),
                name: result.at(row, 1).to_text(),
                column_type: result.at(row, 2).to_text(),
                notnull: result.at(row, 3).to_bool(),
                dflt_value: result.at(row, 4).clone(),
                pk: result.at(row, 5).to_bool(),
            })
            .collect()
    }
}

impl fmt::Display for SqlitePragmaInfoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}{}{}",
            self.cid,
            self.name,
            self.column_type,
            if self.notnull { " NOT NULL" } else { "" },
            if self.pk { " PK" } else { "" }
        )
    }
}

pub fn field_names_from_pragma_info(infolist: &[SqlitePragmaInfoField], delimited: bool) -> Vec<String> {
    infolist
        .iter()
        .map(|info| {
            if delimited {
                delimit(&info.name)
            } else {
                info.name.clone()
            }
        })
        .collect()
}

/// Recreate `CREATE TABLE` SQL from live column information.
pub fn make_creation_sql_from_pragma_info(tablename: &str, infolist: &[SqlitePragmaInfoField]) -> String {
    let fieldspecs: Vec<String> = infolist
        .iter()
        .map(|info| {
            let mut elements = vec![delimit(&info.name), info.column_type.clone()];
            if info.notnull {
                elements.push("NOT NULL".to_string());
            }
            if !info.dflt_value.is_null() {
                elements.push(format!("DEFAULT {}", info.dflt_value.to_text()));
            }
            if info.pk {
                elements.push("PRIMARY KEY".to_string());
            }
            elements.join(" ")
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        delimit(tablename),
        fieldspecs.join(", ")
    )
}

/// What `create_table` intends to do with one column.
#[derive(Debug, Clone, Default)]
pub struct FieldCreationPlan {
    pub name: String,
    pub intended_field: Option<Field>,
    pub exists_in_db: bool,
    pub existing_type: String,
    pub existing_not_null: bool,
    pub existing_pk: bool,
    pub add: bool,
    pub drop: bool,
    pub change: bool,
}

impl FieldCreationPlan {
    fn for_intended(field: &Field) -> Self {
        Self {
            name: field.name().to_string(),
            intended_field: Some(field.clone()),
            add: true,
            ..Default::default()
        }
    }

    fn for_superfluous(info: &SqlitePragmaInfoField) -> Self {
        Self {
            name: info.name.clone(),
            exists_in_db: true,
            existing_type: info.column_type.clone(),
            existing_not_null: info.notnull,
            existing_pk: info.pk,
            drop: true,
            ..Default::default()
        }
    }
}

impl fmt::Display for FieldCreationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let intended = self
            .intended_field
            .as_ref()
            .map_or_else(|| "-".to_string(), Field::sql_column_def);
        write!(
            f,
            "{} (intended: {}; existing: {}; add={} drop={} change={})",
            self.name,
            intended,
            if self.exists_in_db { &self.existing_type } else { "-" },
            self.add,
            self.drop,
            self.change
        )
    }
}

/// Compare desired fields with live columns.
///
/// Desired fields absent from the table are added; live columns that
/// differ in type, nullability or PK status are changed; live columns not
/// desired are dropped.
pub fn plan_table_changes(fields: &[Field], infolist: &[SqlitePragmaInfoField]) -> Vec<FieldCreationPlan> {
    let mut plans: Vec<FieldCreationPlan> = fields.iter().map(FieldCreationPlan::for_intended).collect();
    for info in infolist {
        let existing = plans
            .iter_mut()
            .find(|p| !p.exists_in_db && p.intended_field.is_some() && p.name == info.name);
        match existing {
            Some(plan) => {
                plan.exists_in_db = true;
                plan.add = false;
                plan.existing_type = info.column_type.clone();
                plan.existing_not_null = info.notnull;
                plan.existing_pk = info.pk;
                if let Some(field) = &plan.intended_field {
                    plan.change = info.column_type != field.sql_column_type()
                        || info.notnull != field.not_null()
                        || info.pk != field.is_pk();
                }
            }
            None => plans.push(FieldCreationPlan::for_superfluous(info)),
        }
    }
    plans
}
