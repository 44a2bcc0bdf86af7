//! Placeholder rendering
//!
//! Converts the placeholder tokens left in rendered text into the syntax
//! of a [`ParamStyle`] and collects the bind values in the order the
//! placeholders appear.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::collector::{BindCollector, BindSlot, SlotId, find_tokens};
use crate::error::BindError;
use crate::style::ParamStyle;
use crate::value::BindValue;

/// Bind parameters in the container shape of the parameter style
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindParams {
    /// Ordered values for `format`, `qmark`, `numeric` and `asyncpg`
    Positional(Vec<BindValue>),
    /// Name-keyed values for `named` and `pyformat`, in placeholder order
    Named(IndexMap<String, BindValue>),
}

impl BindParams {
    /// Number of bind values
    pub fn len(&self) -> usize {
        match self {
            BindParams::Positional(values) => values.len(),
            BindParams::Named(values) => values.len(),
        }
    }

    /// Check if there are no bind values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the ordered values, if positional
    pub fn as_positional(&self) -> Option<&[BindValue]> {
        match self {
            BindParams::Positional(values) => Some(values),
            BindParams::Named(_) => None,
        }
    }

    /// Get the name-keyed values, if named
    pub fn as_named(&self) -> Option<&IndexMap<String, BindValue>> {
        match self {
            BindParams::Named(values) => Some(values),
            BindParams::Positional(_) => None,
        }
    }

    /// Values in placeholder order, regardless of container shape
    pub fn values(&self) -> Vec<&BindValue> {
        match self {
            BindParams::Positional(values) => values.iter().collect(),
            BindParams::Named(values) => values.values().collect(),
        }
    }
}

/// Result of preparing a SQL template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedQuery {
    /// SQL text with driver placeholders
    pub sql: String,
    /// Values to bind to the placeholders
    pub params: BindParams,
}

impl PreparedQuery {
    /// Split into the SQL text and its bind parameters
    pub fn into_parts(self) -> (String, BindParams) {
        (self.sql, self.params)
    }
}

/// Resolve placeholder tokens in `text` against `collector`.
///
/// Every token must refer to a captured slot and every slot must be
/// referenced by at least one token. A slot referenced more than once
/// (a captured block output emitted twice) is bound at each position,
/// or under the same key for named styles.
pub fn render_placeholders(
    text: &str,
    collector: &BindCollector,
    style: ParamStyle,
    dedupe_names: bool,
) -> Result<PreparedQuery, BindError> {
    let tokens = find_tokens(text)?;
    let mut sql = String::with_capacity(text.len());
    let mut positional = Vec::new();
    let mut named = NamedParams::new(dedupe_names);
    let mut referenced = vec![false; collector.len()];
    let mut last = 0;

    for (position, token) in tokens.iter().enumerate() {
        let slot = collector.get(token.id).ok_or_else(|| {
            BindError::PlaceholderMismatch(format!(
                "placeholder refers to unknown bind slot {}",
                token.id.index()
            ))
        })?;
        referenced[token.id.index()] = true;

        sql.push_str(&text[last..token.start]);
        if style.is_named() {
            let key = named.key_for(slot, position)?;
            sql.push_str(&style.placeholder(position, &key));
        } else {
            positional.push(slot.value.clone());
            sql.push_str(&style.placeholder(position, ""));
        }
        last = token.end;
    }
    sql.push_str(&text[last..]);

    if let Some(unused) = referenced.iter().position(|used| !used) {
        return Err(BindError::PlaceholderMismatch(format!(
            "bind slot {} was captured but never emitted",
            unused
        )));
    }

    let params = if style.is_named() {
        BindParams::Named(named.values)
    } else {
        BindParams::Positional(positional)
    };

    Ok(PreparedQuery { sql, params })
}

/// Key assignment for the named styles
struct NamedParams {
    values: IndexMap<String, BindValue>,
    keys: HashMap<SlotId, String>,
    dedupe: bool,
}

impl NamedParams {
    fn new(dedupe: bool) -> Self {
        Self {
            values: IndexMap::new(),
            keys: HashMap::new(),
            dedupe,
        }
    }

    fn key_for(&mut self, slot: &BindSlot, position: usize) -> Result<String, BindError> {
        if let Some(key) = self.keys.get(&slot.id) {
            return Ok(key.clone());
        }

        let base = slot
            .name
            .clone()
            .unwrap_or_else(|| format!("bind.{}", position));
        let key = self.claim(base, &slot.value)?;
        self.keys.insert(slot.id, key.clone());
        Ok(key)
    }

    /// Find a key for `value`, reusing an existing key holding the same value
    fn claim(&mut self, base: String, value: &BindValue) -> Result<String, BindError> {
        match self.values.get(&base) {
            None => {
                self.values.insert(base.clone(), value.clone());
                return Ok(base);
            }
            Some(existing) if existing == value => return Ok(base),
            Some(_) if !self.dedupe => {
                return Err(BindError::DuplicateBindName { name: base });
            }
            Some(_) => {}
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            match self.values.get(&candidate) {
                None => {
                    self.values.insert(candidate.clone(), value.clone());
                    return Ok(candidate);
                }
                Some(existing) if existing == value => return Ok(candidate),
                Some(_) => suffix += 1,
            }
        }
    }
}
