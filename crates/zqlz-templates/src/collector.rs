//! Bind collector and placeholder tokens
//!
//! Every value intercepted during rendering is appended to a
//! [`BindCollector`] and replaced in the output by an opaque token that
//! carries the slot id. Tokens are delimited by Unicode noncharacters so
//! they never occur in template text or context values and survive any
//! string operation the evaluator applies to captured output.

use std::collections::HashMap;

use crate::error::BindError;
use crate::value::BindValue;

const TOKEN_OPEN: char = '\u{FDD0}';
const TOKEN_CLOSE: char = '\u{FDD1}';

/// Identifier of a captured value, in capture order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    /// Position of the slot in capture order
    pub fn index(self) -> usize {
        self.0
    }
}

/// One captured value
#[derive(Debug, Clone, PartialEq)]
pub struct BindSlot {
    pub id: SlotId,
    pub value: BindValue,
    /// Name derived from the originating expression, if any
    pub name: Option<String>,
}

/// Append-only store of the values captured by one evaluation
#[derive(Debug, Default)]
pub struct BindCollector {
    slots: Vec<BindSlot>,
    by_name: HashMap<String, SlotId>,
}

impl BindCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a value and return its slot
    pub fn capture(&mut self, value: BindValue, name: Option<String>) -> SlotId {
        let id = SlotId(self.slots.len());
        if let Some(name) = &name {
            self.by_name.entry(name.clone()).or_insert(id);
        }
        tracing::trace!(slot = id.0, name = name.as_deref(), "captured bind value");
        self.slots.push(BindSlot { id, value, name });
        id
    }

    /// Get a slot by id
    pub fn get(&self, id: SlotId) -> Option<&BindSlot> {
        self.slots.get(id.0)
    }

    /// First slot captured under `name`
    pub fn get_by_name(&self, name: &str) -> Option<&BindSlot> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    /// All slots in capture order
    pub fn slots(&self) -> &[BindSlot] {
        &self.slots
    }

    /// Number of captured values
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if nothing was captured
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The text emitted in place of a captured value
pub fn placeholder_token(id: SlotId) -> String {
    format!("{}{}{}", TOKEN_OPEN, id.0, TOKEN_CLOSE)
}

/// Whether `text` carries a placeholder token
pub(crate) fn contains_token(text: &str) -> bool {
    text.contains(TOKEN_OPEN)
}

/// Location of a placeholder token inside rendered text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenSpan {
    pub start: usize,
    pub end: usize,
    pub id: SlotId,
}

/// Find all placeholder tokens in `text`, left to right
pub(crate) fn find_tokens(text: &str) -> Result<Vec<TokenSpan>, BindError> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(found) = text[offset..].find(TOKEN_OPEN) {
        let start = offset + found;
        let digits_start = start + TOKEN_OPEN.len_utf8();
        let close = text[digits_start..].find(TOKEN_CLOSE).ok_or_else(|| {
            BindError::PlaceholderMismatch(format!("unterminated placeholder at byte {}", start))
        })?;
        let digits = &text[digits_start..digits_start + close];
        let index = digits.parse::<usize>().map_err(|_| {
            BindError::PlaceholderMismatch(format!("malformed placeholder at byte {}", start))
        })?;
        let end = digits_start + close + TOKEN_CLOSE.len_utf8();

        spans.push(TokenSpan {
            start,
            end,
            id: SlotId(index),
        });
        offset = end;
    }

    Ok(spans)
}
