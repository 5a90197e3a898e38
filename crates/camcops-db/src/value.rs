//! Closed value type for field contents, with conversions to and from
//! SQLite storage classes.
//!
//! Structured values (dates, string lists, integer lists, UUIDs, version
//! numbers) are stored as TEXT. [`Value::to_storage`] and
//! [`Value::from_storage`] are the symmetric pair that decide those
//! encodings; every value that goes in comes back out unchanged.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseResult};
use crate::field::FieldType;

/// Storage format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage format for date/times: ISO-8601 with milliseconds and offset,
/// e.g. `2023-07-13T16:08:49.512+00:00`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

// ============================================================================
// Version
// ============================================================================

/// A `major.minor.patch` version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = DatabaseError;

    /// Accepts one to three dot-separated components; missing ones are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(DatabaseError::conversion("Version", s));
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .trim()
                .parse()
                .map_err(|_| DatabaseError::conversion("Version", s))?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

// ============================================================================
// Value
// ============================================================================

/// A nullable, typed value held by a field or returned from a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Char(char),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    StringList(Vec<String>),
    IntList(Vec<i32>),
    Uuid(Uuid),
    Version(Version),
    Custom { tag: String, bytes: Vec<u8> },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Int64(_) => "Int64",
            Value::UInt64(_) => "UInt64",
            Value::Double(_) => "Double",
            Value::Char(_) => "Char",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Bytes(_) => "Bytes",
            Value::StringList(_) => "StringList",
            Value::IntList(_) => "IntList",
            Value::Uuid(_) => "Uuid",
            Value::Version(_) => "Version",
            Value::Custom { .. } => "Custom",
        }
    }

    /// Whether the variant is the one a field of type `ty` stores.
    /// NULL is acceptable for every type.
    pub fn matches_type(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (Value::Null, _) => true,
            (Value::Bool(_), FieldType::Bool)
            | (Value::Int(_), FieldType::Int)
            | (Value::Int64(_), FieldType::LongLong)
            | (Value::UInt64(_), FieldType::ULongLong)
            | (Value::Double(_), FieldType::Double)
            | (Value::Char(_), FieldType::Char)
            | (Value::String(_), FieldType::String)
            | (Value::Date(_), FieldType::Date)
            | (Value::DateTime(_), FieldType::DateTime)
            | (Value::Bytes(_), FieldType::ByteArray)
            | (Value::StringList(_), FieldType::StringList)
            | (Value::IntList(_), FieldType::IntList)
            | (Value::Uuid(_), FieldType::Uuid)
            | (Value::Version(_), FieldType::Version) => true,
            (Value::Custom { tag, .. }, FieldType::UserType(name)) => tag == name,
            _ => false,
        }
    }

    /// Convert to the variant required by `ty`.
    ///
    /// Values already of the right variant pass through. Anything else is
    /// routed through its storage form and decoded as `ty`, so `"5"` becomes
    /// `Int(5)` but `"five"` is a conversion error. Date-times are cut to
    /// millisecond precision, matching storage.
    pub fn coerce(self, ty: &FieldType) -> DatabaseResult<Value> {
        if self.matches_type(ty) {
            return Ok(match self {
                Value::DateTime(dt) => Value::DateTime(truncate_to_millis(dt)),
                other => other,
            });
        }
        let found = format!("{self:?}");
        Value::from_storage(self.to_storage(), ty).map_err(|_| DatabaseError::conversion(ty, found))
    }

    // ------------------------------------------------------------------------
    // Storage encoding
    // ------------------------------------------------------------------------

    /// Encode into one of SQLite's storage classes.
    pub fn to_storage(&self) -> SqlValue {
        match self {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Int(i) => SqlValue::Integer(i64::from(*i)),
            Value::Int64(i) => SqlValue::Integer(*i),
            Value::UInt64(u) => match i64::try_from(*u) {
                Ok(i) => SqlValue::Integer(i),
                Err(_) => SqlValue::Text(u.to_string()),
            },
            Value::Double(d) => SqlValue::Real(*d),
            Value::Char(c) => SqlValue::Text(c.to_string()),
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
            Value::Bytes(b) => SqlValue::Blob(b.clone()),
            Value::StringList(list) => SqlValue::Text(string_list_to_csv(list)),
            Value::IntList(list) => SqlValue::Text(int_list_to_csv(list)),
            Value::Uuid(u) => SqlValue::Text(u.braced().to_string()),
            Value::Version(v) => SqlValue::Text(v.to_string()),
            Value::Custom { bytes, .. } => SqlValue::Blob(bytes.clone()),
        }
    }

    /// Decode a storage value as declared type `ty`.
    pub fn from_storage(raw: SqlValue, ty: &FieldType) -> DatabaseResult<Value> {
        let fail = |raw: &SqlValue| DatabaseError::conversion(ty, format!("{raw:?}"));
        let value = match (ty, raw) {
            (_, SqlValue::Null) => Value::Null,

            (FieldType::Bool, SqlValue::Integer(i)) => Value::Bool(i != 0),
            (FieldType::Bool, SqlValue::Real(f)) => Value::Bool(f != 0.0),
            (FieldType::Bool, SqlValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Value::Bool(true),
                "0" | "false" => Value::Bool(false),
                _ => return Err(fail(&SqlValue::Text(s))),
            },

            (FieldType::Int, raw) => {
                let i = storage_to_i64(&raw).ok_or_else(|| fail(&raw))?;
                Value::Int(i32::try_from(i).map_err(|_| fail(&raw))?)
            }
            (FieldType::LongLong, raw) => {
                Value::Int64(storage_to_i64(&raw).ok_or_else(|| fail(&raw))?)
            }
            (FieldType::ULongLong, SqlValue::Text(s)) => match s.trim().parse() {
                Ok(u) => Value::UInt64(u),
                Err(_) => return Err(fail(&SqlValue::Text(s))),
            },
            (FieldType::ULongLong, raw) => {
                let i = storage_to_i64(&raw).ok_or_else(|| fail(&raw))?;
                Value::UInt64(u64::try_from(i).map_err(|_| fail(&raw))?)
            }

            (FieldType::Double, SqlValue::Real(f)) => Value::Double(f),
            (FieldType::Double, SqlValue::Integer(i)) => Value::Double(i as f64),
            (FieldType::Double, SqlValue::Text(s)) => match s.trim().parse() {
                Ok(f) => Value::Double(f),
                Err(_) => return Err(fail(&SqlValue::Text(s))),
            },

            (FieldType::Char, SqlValue::Text(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (None, _) => Value::Null,
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(fail(&SqlValue::Text(s))),
                }
            }

            (FieldType::Date, SqlValue::Text(s)) => match parse_date(&s) {
                Some(d) => Value::Date(d),
                None => return Err(fail(&SqlValue::Text(s))),
            },
            (FieldType::DateTime, SqlValue::Text(s)) => match parse_datetime(&s) {
                Some(dt) => Value::DateTime(dt),
                None => return Err(fail(&SqlValue::Text(s))),
            },

            (FieldType::String, SqlValue::Text(s)) => Value::String(s),
            (FieldType::String, SqlValue::Integer(i)) => Value::String(i.to_string()),
            (FieldType::String, SqlValue::Real(f)) => Value::String(f.to_string()),
            (FieldType::String, SqlValue::Blob(b)) => match String::from_utf8(b) {
                Ok(s) => Value::String(s),
                Err(e) => return Err(fail(&SqlValue::Blob(e.into_bytes()))),
            },

            (FieldType::StringList, SqlValue::Text(s)) => Value::StringList(csv_to_string_list(&s)),
            (FieldType::IntList, SqlValue::Text(s)) => match csv_to_int_list(&s) {
                Some(list) => Value::IntList(list),
                None => return Err(fail(&SqlValue::Text(s))),
            },
            (FieldType::IntList, SqlValue::Integer(i)) => match i32::try_from(i) {
                Ok(i) => Value::IntList(vec![i]),
                Err(_) => return Err(fail(&SqlValue::Integer(i))),
            },
            (FieldType::Uuid, SqlValue::Text(s)) => match Uuid::parse_str(s.trim()) {
                Ok(u) => Value::Uuid(u),
                Err(_) => return Err(fail(&SqlValue::Text(s))),
            },
            (FieldType::Version, SqlValue::Text(s)) => Value::Version(s.parse()?),

            (FieldType::ByteArray, SqlValue::Blob(b)) => Value::Bytes(b),
            (FieldType::ByteArray, SqlValue::Text(s)) => Value::Bytes(s.into_bytes()),
            (FieldType::UserType(tag), SqlValue::Blob(bytes)) => Value::Custom {
                tag: tag.clone(),
                bytes,
            },

            (_, raw) => return Err(fail(&raw)),
        };
        Ok(value)
    }

    /// Wrap an untyped storage value, as read back from an arbitrary query.
    pub fn from_sql(raw: SqlValue) -> Value {
        match raw {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Int64(i),
            SqlValue::Real(f) => Value::Double(f),
            SqlValue::Text(s) => Value::String(s),
            SqlValue::Blob(b) => Value::Bytes(b),
        }
    }

    /// SQL literal suitable for DDL defaults and debug rendering.
    pub fn to_sql_literal(&self) -> String {
        match self.to_storage() {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => f.to_string(),
            SqlValue::Text(s) => sql_quote_string(&s),
            SqlValue::Blob(b) => format!("X'{}'", to_hex(&b)),
        }
    }

    /// JSON rendering; BLOBs become base64 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Int64(i) => Json::from(*i),
            Value::UInt64(u) => Json::from(*u),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::StringList(list) => Json::from(list.clone()),
            Value::IntList(list) => Json::from(list.clone()),
            Value::Bytes(b) | Value::Custom { bytes: b, .. } => {
                Json::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            other => Json::String(other.to_text()),
        }
    }

    // ------------------------------------------------------------------------
    // Loose accessors
    // ------------------------------------------------------------------------

    /// Textual form; NULL is the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) | Value::Custom { bytes: b, .. } => {
                String::from_utf8_lossy(b).into_owned()
            }
            Value::StringList(list) => list.join(","),
            other => match other.to_storage() {
                SqlValue::Integer(i) => i.to_string(),
                SqlValue::Real(f) => f.to_string(),
                SqlValue::Text(s) => s,
                SqlValue::Null | SqlValue::Blob(_) => String::new(),
            },
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Double(d) => *d != 0.0,
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
            other => other.to_i64().is_some_and(|i| i != 0),
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(i64::from(*i)),
            Value::Int64(i) => Some(*i),
            Value::UInt64(u) => i64::try_from(*u).ok(),
            Value::Double(d) if d.is_finite() => Some(d.trunc() as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::String(s) => s.trim().parse().ok(),
            other => other.to_i64().map(|i| i as f64),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) | Value::Custom { bytes: b, .. } => Some(b),
            _ => None,
        }
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date_naive()),
            Value::String(s) => parse_date(s),
            _ => None,
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::String(s) => parse_datetime(s),
            _ => None,
        }
    }

    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            Value::StringList(list) => list.clone(),
            Value::String(s) => csv_to_string_list(s),
            Value::Null => Vec::new(),
            other => vec![other.to_text()],
        }
    }

    pub fn to_int_list(&self) -> Vec<i32> {
        match self {
            Value::IntList(list) => list.clone(),
            Value::String(s) => csv_to_int_list(s).unwrap_or_default(),
            other => other
                .to_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(|i| vec![i])
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bytes(b) | Value::Custom { bytes: b, .. } => write!(f, "<{} bytes>", b.len()),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_storage()))
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    char => Char,
    String => String,
    NaiveDate => Date,
    Vec<u8> => Bytes,
    Vec<String> => StringList,
    Vec<i32> => IntList,
    Uuid => Uuid,
    Version => Version,
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(truncate_to_millis(v))
    }
}

/// Drop sub-millisecond precision; storage keeps milliseconds only.
pub(crate) fn truncate_to_millis(dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let nanos = dt.nanosecond();
    dt.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(dt)
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Encoding helpers
// ============================================================================

fn storage_to_i64(raw: &SqlValue) -> Option<i64> {
    match raw {
        SqlValue::Integer(i) => Some(*i),
        SqlValue::Real(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
}

fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, DATETIME_FORMAT))
        .ok()
}

/// Quote a string for SQL: `it's` becomes `'it''s'`.
pub fn sql_quote_string(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Encode integers as plain CSV: `1,2,3`.
pub fn int_list_to_csv(list: &[i32]) -> String {
    list.iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode plain integer CSV. Empty input is an empty list.
pub fn csv_to_int_list(csv: &str) -> Option<Vec<i32>> {
    if csv.trim().is_empty() {
        return Some(Vec::new());
    }
    csv.split(',').map(|s| s.trim().parse().ok()).collect()
}

/// Encode strings as comma-separated C-style quoted literals:
/// `["one", "two"]` becomes `"one","two"`.
pub fn string_list_to_csv(list: &[String]) -> String {
    list.iter()
        .map(|s| format!("\"{}\"", escape_c_literal(s)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a string list. Commas inside double quotes do not split, and
/// unquoted words (`one,two,three`) are accepted too.
pub fn csv_to_string_list(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_quote = false;
    let mut in_escape = false;
    for c in csv.chars() {
        if in_escape {
            word.push(c);
            in_escape = false;
        } else if c == '\\' {
            word.push(c);
            in_escape = true;
        } else if in_quote {
            word.push(c);
            if c == '"' {
                in_quote = false;
            }
        } else if c == ',' {
            words.push(c_literal_to_string(word.trim()));
            word.clear();
        } else {
            if c == '"' {
                in_quote = true;
            }
            word.push(c);
        }
    }
    words.push(c_literal_to_string(word.trim()));
    words
}

fn escape_c_literal(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\x{:02x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

fn c_literal_to_string(literal: &str) -> String {
    let inner = if literal.len() >= 2 && literal.starts_with('"') && literal.ends_with('"') {
        &literal[1..literal.len() - 1]
    } else {
        literal
    };
    let mut raw = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            raw.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => raw.push('\n'),
            Some('r') => raw.push('\r'),
            Some('t') => raw.push('\t'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    raw.push(decoded);
                }
            }
            Some(other) => raw.push(other),
            None => {}
        }
    }
    raw
}
