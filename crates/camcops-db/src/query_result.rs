//! Immutable snapshot of a query's outcome.

use std::fmt;

use crate::value::Value;

static NULL_VALUE: Value = Value::Null;

/// How much of a statement's output to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Execute without waiting for a reply at all.
    NoAnswer,
    /// Execute and report success only.
    NoFetch,
    /// Keep the first row.
    FetchFirst,
    /// Keep every row.
    #[default]
    FetchAll,
}

/// Success flag, optional column names, a row-major grid of values and the
/// last-insert-id of an INSERT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    succeeded: bool,
    column_names: Vec<String>,
    data: Vec<Vec<Value>>,
    n_rows: usize,
    n_cols: usize,
    last_insert_id: Value,
}

impl QueryResult {
    pub fn new(
        succeeded: bool,
        column_names: Vec<String>,
        data: Vec<Vec<Value>>,
        last_insert_id: Value,
    ) -> Self {
        let n_rows = data.len();
        let n_cols = data.first().map_or(column_names.len(), Vec::len);
        Self {
            succeeded,
            column_names,
            data,
            n_rows,
            n_cols,
            last_insert_id,
        }
    }

    /// Result for a statement that could not run.
    pub fn failure() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Empty unless column names were requested.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.data
    }

    /// Value at `(row, col)`; NULL when out of range.
    pub fn at(&self, row: usize, col: usize) -> &Value {
        self.data
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL_VALUE)
    }

    /// Value at `row` in the named column. Requires column names.
    pub fn at_by_name(&self, row: usize, column: &str) -> &Value {
        match self.column_index(column) {
            Some(col) => self.at(row, col),
            None => &NULL_VALUE,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == column)
    }

    pub fn first_value(&self) -> &Value {
        self.at(0, 0)
    }

    pub fn column(&self, col: usize) -> Vec<Value> {
        (0..self.n_rows).map(|row| self.at(row, col).clone()).collect()
    }

    /// The first column as integers, skipping values that are not integers.
    pub fn first_column_as_int_list(&self) -> Vec<i64> {
        self.data
            .iter()
            .filter_map(|row| row.first().and_then(Value::to_i64))
            .collect()
    }

    pub fn first_column_as_string_list(&self) -> Vec<String> {
        self.data
            .iter()
            .filter_map(|row| row.first().map(Value::to_text))
            .collect()
    }

    /// Row id of the last INSERT/REPLACE; NULL for other statements.
    pub fn last_insert_id(&self) -> &Value {
        &self.last_insert_id
    }

    /// Rows as JSON objects keyed by column name. Requires column names.
    pub fn to_json_rows(&self) -> serde_json::Value {
        let rows = self
            .data
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .column_names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    pub fn cursor(&self) -> ResultCursor<'_> {
        ResultCursor {
            result: self,
            pos: None,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.succeeded {
            return f.write_str("<failed query>");
        }
        if !self.column_names.is_empty() {
            writeln!(f, "{}", self.column_names.join(" | "))?;
        }
        for row in &self.data {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        write!(f, "({} row(s))", self.n_rows)
    }
}

/// Bidirectional cursor over a cached result.
///
/// Starts positioned before the first row.
#[derive(Debug, Clone)]
pub struct ResultCursor<'a> {
    result: &'a QueryResult,
    pos: Option<usize>,
}

impl<'a> ResultCursor<'a> {
    pub fn at(&self) -> Option<usize> {
        self.pos
    }

    pub fn seek(&mut self, row: usize) -> bool {
        if row < self.result.n_rows() {
            self.pos = Some(row);
            true
        } else {
            false
        }
    }

    pub fn fetch_first(&mut self) -> bool {
        self.seek(0)
    }

    pub fn fetch_last(&mut self) -> bool {
        match self.result.n_rows().checked_sub(1) {
            Some(last) => self.seek(last),
            None => false,
        }
    }

    pub fn fetch_next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p + 1);
        self.seek(next)
    }

    pub fn fetch_previous(&mut self) -> bool {
        match self.pos.and_then(|p| p.checked_sub(1)) {
            Some(prev) => self.seek(prev),
            None => false,
        }
    }

    /// Column value in the current row; NULL when not on a row.
    pub fn value(&self, col: usize) -> &'a Value {
        match self.pos {
            Some(row) => self.result.at(row, col),
            None => &NULL_VALUE,
        }
    }

    pub fn value_by_name(&self, column: &str) -> &'a Value {
        match self.pos {
            Some(row) => self.result.at_by_name(row, column),
            None => &NULL_VALUE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::new(
            true,
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int64(1), Value::from("Alice")],
                vec![Value::Int64(2), Value::from("Bob")],
            ],
            Value::Null,
        )
    }

    #[test]
    fn test_counts_and_access() {
        let result = sample();
        assert!(result.succeeded());
        assert_eq!(result.n_rows(), 2);
        assert_eq!(result.n_cols(), 2);
        assert_eq!(result.at(1, 1), &Value::from("Bob"));
        assert_eq!(result.at(5, 5), &Value::Null);
        assert_eq!(result.at_by_name(0, "name"), &Value::from("Alice"));
        assert_eq!(result.at_by_name(0, "missing"), &Value::Null);
        assert_eq!(result.first_value(), &Value::Int64(1));
    }

    #[test]
    fn test_first_column_lists() {
        let result = sample();
        assert_eq!(result.first_column_as_int_list(), vec![1, 2]);
        assert_eq!(result.first_column_as_string_list(), vec!["1", "2"]);
    }

    #[test]
    fn test_failure_is_empty() {
        let result = QueryResult::failure();
        assert!(!result.succeeded());
        assert!(result.is_empty());
        assert_eq!(result.first_value(), &Value::Null);
        assert_eq!(result.to_string(), "<failed query>");
    }

    #[test]
    fn test_json_rows() {
        let json = sample().to_json_rows();
        assert_eq!(
            json,
            serde_json::json!([{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}])
        );
    }

    #[test]
    fn test_cursor_navigation() {
        let result = sample();
        let mut cursor = result.cursor();
        assert_eq!(cursor.value(0), &Value::Null);
        assert!(!cursor.fetch_previous());

        assert!(cursor.fetch_next());
        assert_eq!(cursor.value_by_name("name"), &Value::from("Alice"));
        assert!(cursor.fetch_next());
        assert!(!cursor.fetch_next());
        assert_eq!(cursor.at(), Some(1));

        assert!(cursor.fetch_first());
        assert_eq!(cursor.value(0), &Value::Int64(1));
        assert!(cursor.fetch_last());
        assert!(cursor.fetch_previous());
        assert_eq!(cursor.at(), Some(0));
    }

    #[test]
    fn test_cursor_on_empty_result() {
        let result = QueryResult::new(true, Vec::new(), Vec::new(), Value::Null);
        let mut cursor = result.cursor();
        assert!(!cursor.fetch_first());
        assert!(!cursor.fetch_last());
        assert!(!cursor.fetch_next());
    }
}
