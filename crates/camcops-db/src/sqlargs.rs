//! Parameterised SQL and the fragments used to build it.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DatabaseError, DatabaseResult};
use crate::field::Field;
use crate::value::Value;

/// Positional arguments for `?` placeholders.
pub type ArgList = Vec<Value>;

/// Column-to-new-value map for UPDATE statements.
pub type UpdateValues = BTreeMap<String, Value>;

/// `(column, ascending)` pairs.
pub type OrderBy = Vec<(String, bool)>;

/// SQL text with `?` placeholders plus the arguments that fill them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlArgs {
    pub sql: String,
    pub args: ArgList,
}

impl SqlArgs {
    pub fn new(sql: impl Into<String>, args: ArgList) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// SQL with no arguments.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// Render the SQL with each `?` replaced by its argument as a literal.
    ///
    /// Placeholders inside quoted strings are left alone. Fails if the
    /// number of placeholders differs from the number of arguments.
    pub fn literal_for_debug(&self) -> DatabaseResult<String> {
        let mut out = String::with_capacity(self.sql.len());
        let mut args = self.args.iter();
        let mut quote: Option<char> = None;
        let mut placeholders = 0usize;
        for c in self.sql.chars() {
            match (quote, c) {
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (None, '?') => {
                    placeholders += 1;
                    match args.next() {
                        Some(arg) => out.push_str(&arg.to_sql_literal()),
                        None => out.push('?'),
                    }
                }
                _ => out.push(c),
            }
        }
        if placeholders != self.args.len() {
            return Err(DatabaseError::InvalidQuery(format!(
                "SQL has {} placeholder(s) but {} argument(s): {}",
                placeholders,
                self.args.len(),
                self.sql
            )));
        }
        Ok(out)
    }
}

impl From<&str> for SqlArgs {
    fn from(sql: &str) -> Self {
        Self::from_sql(sql)
    }
}

impl From<String> for SqlArgs {
    fn from(sql: String) -> Self {
        Self::from_sql(sql)
    }
}

impl fmt::Display for SqlArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.literal_for_debug() {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => write!(f, "{} -- args: {:?}", self.sql, self.args),
        }
    }
}

// ============================================================================
// WHERE clauses
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Compare {
        column: String,
        op: String,
        value: Value,
    },
    In {
        column: String,
        values: ArgList,
    },
}

/// AND-joined conditions for a WHERE clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereConditions {
    conditions: Vec<Condition>,
}

impl WhereConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`; a NULL value becomes `column IS NULL`.
    pub fn add(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.add_op(column, "=", value)
    }

    pub fn add_op(
        &mut self,
        column: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.conditions.push(Condition::Compare {
            column: column.into(),
            op: op.into(),
            value: value.into(),
        });
        self
    }

    /// `column IN (?, ?, ...)`. An empty list matches nothing.
    pub fn add_in(&mut self, column: impl Into<String>, values: ArgList) -> &mut Self {
        self.conditions.push(Condition::In {
            column: column.into(),
            values,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn append_where_clause_to(&self, sqlargs: &mut SqlArgs) {
        if self.conditions.is_empty() {
            return;
        }
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            match condition {
                Condition::Compare { column, op, value } if value.is_null() => {
                    let test = if op == "<>" || op == "!=" {
                        "IS NOT NULL"
                    } else {
                        "IS NULL"
                    };
                    clauses.push(format!("{} {}", delimit(column), test));
                }
                Condition::Compare { column, op, value } => {
                    clauses.push(format!("{} {} ?", delimit(column), op));
                    sqlargs.args.push(value.clone());
                }
                Condition::In { column, values } if values.is_empty() => {
                    clauses.push(format!("0 /* {} IN () */", delimit(column)));
                }
                Condition::In { column, values } => {
                    clauses.push(format!(
                        "{} IN ({})",
                        delimit(column),
                        sql_param_holders(values.len())
                    ));
                    sqlargs.args.extend(values.iter().cloned());
                }
            }
        }
        sqlargs.sql.push_str(" WHERE ");
        sqlargs.sql.push_str(&clauses.join(" AND "));
    }
}

// ============================================================================
// SQL fragments
// ============================================================================

/// Delimit a table or column name. Everything is delimited since the list
/// of SQLite keywords is long.
pub fn delimit(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// `SELECT "a","b" FROM "table"`
pub fn select_columns<S: AsRef<str>>(columns: &[S], table: &str) -> String {
    let delimited: Vec<String> = columns.iter().map(|c| delimit(c.as_ref())).collect();
    format!("SELECT {} FROM {}", delimited.join(","), delimit(table))
}

/// `UPDATE "table" SET "a"=?, "b"=?` with the values as arguments.
pub fn update_columns(values: &UpdateValues, table: &str) -> SqlArgs {
    let mut columns = Vec::with_capacity(values.len());
    let mut args = Vec::with_capacity(values.len());
    for (column, value) in values {
        columns.push(format!("{}=?", delimit(column)));
        args.push(value.clone());
    }
    SqlArgs::new(
        format!("UPDATE {} SET {}", delimit(table), columns.join(", ")),
        args,
    )
}

pub fn add_order_by_clause(order_by: &OrderBy, sqlargs: &mut SqlArgs) {
    if order_by.is_empty() {
        return;
    }
    let clauses: Vec<String> = order_by
        .iter()
        .map(|(column, ascending)| {
            format!("{} {}", delimit(column), if *ascending { "ASC" } else { "DESC" })
        })
        .collect();
    sqlargs.sql.push_str(" ORDER BY ");
    sqlargs.sql.push_str(&clauses.join(", "));
}

/// `?,?,?` for `n` placeholders.
pub fn sql_param_holders(n: usize) -> String {
    vec!["?"; n].join(",")
}

pub fn arg_list_from_int_list(ints: &[i64]) -> ArgList {
    ints.iter().map(|&i| Value::Int64(i)).collect()
}

/// `CREATE TABLE IF NOT EXISTS` for the fields, in the order given.
pub fn sql_create_table(tablename: &str, fields: &[Field]) -> String {
    let coldefs: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", delimit(f.name()), f.sql_column_def()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        delimit(tablename),
        coldefs.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    #[test]
    fn test_delimit_escapes_quotes() {
        assert_eq!(delimit("name"), "\"name\"");
        assert_eq!(delimit("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_where_clause() {
        let mut sqlargs = SqlArgs::from_sql("SELECT * FROM \"t\"");
        let mut wc = WhereConditions::new();
        wc.add("a", 1).add_op("b", ">", 2.5).add("c", Value::Null);
        wc.append_where_clause_to(&mut sqlargs);
        assert_eq!(
            sqlargs.sql,
            "SELECT * FROM \"t\" WHERE \"a\" = ? AND \"b\" > ? AND \"c\" IS NULL"
        );
        assert_eq!(sqlargs.args, vec![Value::Int(1), Value::Double(2.5)]);
    }

    #[test]
    fn test_where_in_clause() {
        let mut sqlargs = SqlArgs::from_sql("DELETE FROM \"t\"");
        let mut wc = WhereConditions::new();
        wc.add_in("id", arg_list_from_int_list(&[1, 2, 3]));
        wc.append_where_clause_to(&mut sqlargs);
        assert_eq!(sqlargs.sql, "DELETE FROM \"t\" WHERE \"id\" IN (?,?,?)");
        assert_eq!(sqlargs.args.len(), 3);
    }

    #[test]
    fn test_empty_where_conditions_add_nothing() {
        let mut sqlargs = SqlArgs::from_sql("SELECT 1");
        WhereConditions::new().append_where_clause_to(&mut sqlargs);
        assert_eq!(sqlargs.sql, "SELECT 1");
    }

    #[test]
    fn test_order_by() {
        let mut sqlargs = SqlArgs::from_sql(select_columns(&["id", "name"], "t"));
        add_order_by_clause(&vec![("name".into(), true), ("id".into(), false)], &mut sqlargs);
        assert_eq!(
            sqlargs.sql,
            "SELECT \"id\",\"name\" FROM \"t\" ORDER BY \"name\" ASC, \"id\" DESC"
        );
    }

    #[test]
    fn test_update_columns_sorted_by_column() {
        let mut values = UpdateValues::new();
        values.insert("b".into(), Value::Int(2));
        values.insert("a".into(), Value::from("x"));
        let sqlargs = update_columns(&values, "t");
        assert_eq!(sqlargs.sql, "UPDATE \"t\" SET \"a\"=?, \"b\"=?");
        assert_eq!(sqlargs.args, vec![Value::from("x"), Value::Int(2)]);
    }

    #[test]
    fn test_literal_for_debug() {
        let sqlargs = SqlArgs::new(
            "SELECT * FROM t WHERE a = ? AND b = '?' AND c = ?",
            vec![Value::Int(1), Value::from("it's")],
        );
        assert_eq!(
            sqlargs.literal_for_debug().unwrap(),
            "SELECT * FROM t WHERE a = 1 AND b = '?' AND c = 'it''s'"
        );
    }

    #[test]
    fn test_literal_for_debug_detects_mismatch() {
        let sqlargs = SqlArgs::new("SELECT ?", vec![Value::Int(1), Value::Int(2)]);
        assert!(sqlargs.literal_for_debug().is_err());
        assert!(sqlargs.to_string().contains("args"));
    }

    #[test]
    fn test_sql_create_table() {
        let fields = vec![
            Field::new("id", FieldType::Int).pk(true),
            Field::new("name", FieldType::String),
        ];
        assert_eq!(
            sql_create_table("people", &fields),
            "CREATE TABLE IF NOT EXISTS \"people\" (\"id\" INTEGER PRIMARY KEY NOT NULL, \"name\" TEXT)"
        );
    }

    #[test]
    fn test_param_holders() {
        assert_eq!(sql_param_holders(0), "");
        assert_eq!(sql_param_holders(3), "?,?,?");
    }
}
