//! Bind values handed to the database driver

use minijinja::value::{Value, ValueKind};
use serde::Serialize;

use crate::error::BindError;

/// A value captured from template output, ready to be bound by a driver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindValue {
    /// NULL value (also used for undefined template variables)
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// Integer outside the i64 range, kept as text for precision
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Array of values, bound as a single parameter
    Array(Vec<BindValue>),
}

impl BindValue {
    /// Convert a template value into a bind value.
    ///
    /// `origin` names the expression the value came from and is only used
    /// in error messages. Mappings are rejected at any nesting depth.
    pub fn from_template_value(value: &Value, origin: &str) -> Result<Self, BindError> {
        match value.kind() {
            ValueKind::Undefined | ValueKind::None => Ok(BindValue::Null),
            ValueKind::Bool => Ok(BindValue::Bool(value.is_true())),
            ValueKind::Number => Ok(number(value)),
            ValueKind::String => Ok(BindValue::String(
                value.as_str().unwrap_or_default().to_string(),
            )),
            ValueKind::Bytes => Ok(BindValue::Bytes(
                value.as_bytes().map(<[u8]>::to_vec).unwrap_or_default(),
            )),
            ValueKind::Seq => {
                let items = value
                    .try_iter()
                    .map_err(|_| BindError::InvalidBindParameter(origin.to_string()))?;
                items
                    .map(|item| BindValue::from_template_value(&item, origin))
                    .collect::<Result<Vec<_>, _>>()
                    .map(BindValue::Array)
            }
            ValueKind::Map => Err(BindError::InvalidBindParameter(origin.to_string())),
            _ => Ok(BindValue::String(value.to_string())),
        }
    }

    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BindValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BindValue::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

fn number(value: &Value) -> BindValue {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                BindValue::Int64(v)
            } else if n.is_u64() {
                BindValue::Decimal(n.to_string())
            } else {
                n.as_f64()
                    .map(BindValue::Float64)
                    .unwrap_or_else(|| BindValue::Decimal(n.to_string()))
            }
        }
        _ => BindValue::Decimal(value.to_string()),
    }
}

impl std::fmt::Display for BindValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindValue::Null => write!(f, "NULL"),
            BindValue::Bool(v) => write!(f, "{}", v),
            BindValue::Int64(v) => write!(f, "{}", v),
            BindValue::Float64(v) => write!(f, "{}", v),
            BindValue::Decimal(v) => write!(f, "{}", v),
            BindValue::String(v) => write!(f, "{}", v),
            BindValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            BindValue::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Bool(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int64(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float64(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::String(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::String(value)
    }
}
