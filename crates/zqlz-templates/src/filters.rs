//! Custom SQL filters for MiniJinja

use std::fmt;
use std::sync::Arc;

use minijinja::value::{Object, ObjectRepr, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};

use crate::error::BindError;

/// A value tagged with the parameter name derived from its expression.
///
/// Produced by the `bind` filter; unwrapped again by the interceptor.
#[derive(Debug)]
pub struct NamedBind {
    pub name: Option<String>,
    pub value: Value,
}

impl Object for NamedBind {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

/// A list validated by `inclause`, expanded into one placeholder per item
#[derive(Debug)]
pub struct InClause {
    pub items: Vec<Value>,
}

impl Object for InClause {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} values)", self.items.len())
    }
}

/// SQL-specific filters
pub struct SqlFilters;

impl SqlFilters {
    /// Mark text as trusted so it is inlined verbatim
    pub fn sqlsafe(value: Value) -> Value {
        if value.is_safe() {
            value
        } else {
            Value::from_safe_string(value.to_string())
        }
    }

    /// Serialize a value to JSON as plain text, so the result is bound
    pub fn tojson(value: Value) -> Result<String, Error> {
        serde_json::to_string(&value).map_err(|err| {
            Error::new(ErrorKind::InvalidOperation, "cannot serialize value to JSON")
                .with_source(err)
        })
    }

    /// Join items into plain text.
    ///
    /// The result is never trusted, even when every item is. Apply
    /// `sqlsafe` to the joined text to inline it.
    pub fn join(value: Value, joiner: Option<&str>) -> Result<String, Error> {
        let joiner = joiner.unwrap_or_default();
        if value.is_undefined() || value.is_none() {
            return Ok(String::new());
        }
        if let Some(text) = value.as_str() {
            let chars: Vec<String> = text.chars().map(String::from).collect();
            return Ok(chars.join(joiner));
        }

        let items: Vec<String> = value.try_iter()?.map(|item| item.to_string()).collect();
        Ok(items.join(joiner))
    }

    /// Attach a parameter name to a value
    pub fn bind(value: Value, name: Option<String>) -> Value {
        Value::from_object(NamedBind { name, value })
    }

    /// Validate a list for IN clause expansion.
    ///
    /// Only finite sequences are accepted; strings, mappings, lazy
    /// iterables and scalars are rejected.
    pub fn inclause(value: Value) -> Result<InClause, BindError> {
        match value.kind() {
            ValueKind::Seq => {
                let items = value.try_iter().map_err(|_| BindError::MissingInClause {
                    found: "a list that cannot be iterated".to_string(),
                })?;
                Ok(InClause {
                    items: items.collect(),
                })
            }
            kind => Err(BindError::MissingInClause {
                found: describe_kind(kind),
            }),
        }
    }
}

fn describe_kind(kind: ValueKind) -> String {
    match kind {
        ValueKind::Undefined => "an undefined value".to_string(),
        ValueKind::None => "none".to_string(),
        ValueKind::Map => "a mapping".to_string(),
        ValueKind::String => "a string".to_string(),
        other => format!("a {:?} value", other).to_lowercase(),
    }
}

/// Register the stateless SQL filters with a MiniJinja environment.
///
/// `safe` is an alias of `sqlsafe`. The builtin `tojson` and `join` are
/// replaced by versions that return plain text, so their output is bound
/// like any other value.
///
/// `inclause` depends on the per-render interceptor and is installed by
/// [`crate::interceptor::Interceptor::install`].
pub fn register_filters(env: &mut Environment) {
    env.add_filter("sqlsafe", SqlFilters::sqlsafe);
    env.add_filter("safe", SqlFilters::sqlsafe);
    env.add_filter("bind", SqlFilters::bind);
    env.add_filter("tojson", SqlFilters::tojson);
    env.add_filter("join", SqlFilters::join);
}
