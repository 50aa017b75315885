use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a table or column.
pub type Identifier = String;

/// Data types a column can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Text,
    Boolean,
}

impl DataType {
    /// Parses the name written by `Display`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INT" => Some(DataType::Int),
            "TEXT" => Some(DataType::Text),
            "BOOLEAN" => Some(DataType::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// Values that can be stored in a row.
///
/// The derived ordering compares same-typed values directly and orders
/// different types as Int < Text < Boolean.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Text(String),
    Boolean(bool),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Text(_) => DataType::Text,
            Value::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        self.data_type() == data_type
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// A row maps column names to values. Stored rows always carry every column
/// of their table.
pub type Row = BTreeMap<Identifier, Value>;

/// Builds a row from `(column, value)` pairs.
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<Identifier>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(column, value)| (column.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compatibility() {
        assert!(Value::Boolean(true).is_compatible_with(DataType::Boolean));
        assert!(Value::Int(42).is_compatible_with(DataType::Int));
        assert!(Value::from("hello").is_compatible_with(DataType::Text));

        assert!(!Value::Boolean(true).is_compatible_with(DataType::Int));
        assert!(!Value::Int(42).is_compatible_with(DataType::Text));
    }

    #[test]
    fn test_data_type_names() {
        for data_type in [DataType::Int, DataType::Text, DataType::Boolean] {
            assert_eq!(DataType::parse(&data_type.to_string()), Some(data_type));
        }
        assert_eq!(DataType::parse("boolean"), Some(DataType::Boolean));
        assert_eq!(DataType::parse("DOUBLE"), None);
    }

    #[test]
    fn test_same_type_ordering() {
        assert!(Value::Int(-3) < Value::Int(7));
        assert!(Value::from("apple") < Value::from("banana"));
        assert!(Value::Boolean(false) < Value::Boolean(true));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
    }

    #[test]
    fn test_cross_type_ordering_is_total() {
        let mut values = vec![
            Value::Boolean(false),
            Value::from("a"),
            Value::Int(100),
            Value::Int(-1),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Int(-1),
                Value::Int(100),
                Value::from("a"),
                Value::Boolean(false),
            ]
        );
        assert_ne!(Value::Int(1), Value::Boolean(true));
    }

    #[test]
    fn test_row_builder() {
        let r = row([("a", Value::Int(12)), ("b", Value::from("Hello!"))]);
        assert_eq!(r.len(), 2);
        assert_eq!(r["a"], Value::Int(12));
        assert_eq!(r["b"], Value::from("Hello!"));
    }
}
