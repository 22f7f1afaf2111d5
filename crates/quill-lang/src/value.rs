use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;

use crate::ident::Ident;
use crate::number::Number;

/// Runtime value stored in and produced by scopes.
#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Number(Number),
    Bool(bool),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<Ident, Value>),
    #[default]
    None,
}

impl Value {
    /// Truthiness used by the logic operators: only `false` and no value are
    /// falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::None)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::None => "none",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<BTreeMap<Ident, Value>> for Value {
    fn from(map: BTreeMap<Ident, Value>) -> Self {
        Value::Map(map)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let value: Cow<'_, str> = match self {
            Self::Number(n) => Cow::Owned(n.to_string()),
            Self::Bool(b) => Cow::Owned(b.to_string()),
            Self::String(s) => Cow::Borrowed(s),
            Self::Array(values) => {
                Cow::Owned(format!("[{}]", values.iter().format(", ")))
            }
            Self::Map(map) => Cow::Owned(format!(
                "{{{}}}",
                map.iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .join(", ")
            )),
            Self::None => Cow::Borrowed(""),
        };
        write!(f, "{}", value)
    }
}
