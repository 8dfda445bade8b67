//! Tagged field values and result rows.
//!
//! `Value` is the closed input domain for type inference and the only shape in
//! which field data travels between entities and collaborators.

use crate::error::DbError;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Normalize a value for storage.
    ///
    /// JSON objects and arrays become their compact serialized text; JSON
    /// scalars collapse onto the matching scalar variant. Other variants are
    /// returned untouched.
    pub fn canonicalize(self) -> Value {
        match self {
            Value::Json(json) => match json {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::Bool(b) => Value::Bool(b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::Int(i),
                    None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
                },
                serde_json::Value::String(s) => Value::Text(s),
                composite => Value::Text(composite.to_string()),
            },
            other => other,
        }
    }

    /// Textual form used for length and numeric-string checks.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            Value::Json(v) => v.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Row data from a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl DbRow {
    /// Create a new row with column names and values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, DbError> {
        self.values
            .get(index)
            .ok_or_else(|| {
                DbError::type_conversion(format!("Column index {} out of bounds", index))
            })
            .and_then(|v| T::from_db_value(v))
    }

    /// Get a value by column name.
    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, DbError> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::type_conversion(format!("Column '{}' not found", name)))?;
        self.get(index)
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the column names.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Get the raw Value at an index.
    pub fn get_raw(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Consume the row into `(column, value)` pairs.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        self.columns.into_iter().zip(self.values)
    }
}

/// Trait for converting from Value.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &Value) -> Result<Self, DbError>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::Bool(v) => Ok(*v as i64),
            Value::Null => Err(DbError::type_conversion(
                "i64 field is NULL - use Option<i64> for nullable columns",
            )),
            _ => Err(DbError::type_conversion("Expected integer")),
        }
    }
}

impl FromDbValue for u64 {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        let v = i64::from_db_value(value)?;
        u64::try_from(v).map_err(|_| DbError::type_conversion("Expected non-negative integer"))
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Null => Err(DbError::type_conversion(
                "f64 field is NULL - use Option<f64> for nullable columns",
            )),
            _ => Err(DbError::type_conversion("Expected real")),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            // MySQL hands back information_schema text as binary strings.
            Value::Bytes(v) => String::from_utf8(v.clone())
                .map_err(|_| DbError::type_conversion("Expected UTF-8 text")),
            Value::Null => Err(DbError::type_conversion(
                "String field is NULL - use Option<String> for nullable columns",
            )),
            _ => Err(DbError::type_conversion("Expected text")),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            Value::Null => Err(DbError::type_conversion(
                "bool field is NULL - use Option<bool> for nullable columns",
            )),
            _ => Err(DbError::type_conversion("Expected boolean")),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Text(v) => Ok(v.clone().into_bytes()),
            Value::Null => Err(DbError::type_conversion(
                "Vec<u8> field is NULL - use Option<Vec<u8>> for nullable columns",
            )),
            _ => Err(DbError::type_conversion("Expected blob")),
        }
    }
}

impl FromDbValue for Value {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        Ok(value.clone())
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &Value) -> Result<Self, DbError> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_db_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_composite_json_to_text() {
        let value = Value::from(json!({"hello": "world"}));
        assert_eq!(
            value.canonicalize(),
            Value::Text(r#"{"hello":"world"}"#.to_string())
        );

        let list = Value::from(json!([1, 2, 3]));
        assert_eq!(list.canonicalize(), Value::Text("[1,2,3]".to_string()));
    }

    #[test]
    fn test_canonicalize_json_scalars() {
        assert_eq!(Value::from(json!(null)).canonicalize(), Value::Null);
        assert_eq!(Value::from(json!(true)).canonicalize(), Value::Bool(true));
        assert_eq!(Value::from(json!(7)).canonicalize(), Value::Int(7));
        assert_eq!(Value::from(json!(1.5)).canonicalize(), Value::Float(1.5));
        assert_eq!(
            Value::from(json!("x")).canonicalize(),
            Value::Text("x".to_string())
        );
        assert_eq!(Value::Int(3).canonicalize(), Value::Int(3));
    }

    #[test]
    fn test_row_accessors() {
        let row = DbRow::new(
            vec!["id".to_string(), "name".to_string(), "note".to_string()],
            vec![Value::Int(4), Value::from("john"), Value::Null],
        );

        assert_eq!(row.get::<i64>(0).unwrap(), 4);
        assert_eq!(row.get_by_name::<String>("name").unwrap(), "john");
        assert_eq!(row.get_by_name::<Option<String>>("note").unwrap(), None);
        assert!(row.get_by_name::<String>("note").is_err());
        assert!(row.get_by_name::<i64>("missing").is_err());
        assert!(row.get::<i64>(9).is_err());
    }

    #[test]
    fn test_string_from_utf8_bytes() {
        let row = DbRow::new(vec!["Type".to_string()], vec![Value::Bytes(b"int".to_vec())]);
        assert_eq!(row.get::<String>(0).unwrap(), "int");
    }
}
