//! Error types for SQL template preparation

use thiserror::Error;

/// Failures raised while intercepting values or rewriting placeholders.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    /// A mapping reached an output site as a would-be bind value.
    #[error("cannot bind a mapping from {0}: mappings have no single bind value form")]
    InvalidBindParameter(String),

    /// A value was used where an `inclause` expansion was expected.
    #[error("expected a list expanded with `inclause`, found {found}")]
    MissingInClause { found: String },

    /// Two different values resolved to the same named parameter.
    #[error("bind name `{name}` is used for different values")]
    DuplicateBindName { name: String },

    /// Output of a macro, include or set block was turned back into a
    /// plain value, for example with `~` or a string filter. Its bound
    /// values can no longer be placed, so the value is refused.
    #[error(
        "{origin} combines macro, include or set block output with other text; \
         print the parts separately or mark the combined text with `sqlsafe`"
    )]
    EmbeddedTemplateOutput { origin: String },

    /// Rendered placeholders and captured slots disagree.
    #[error("placeholder mismatch: {0}")]
    PlaceholderMismatch(String),
}

/// Errors surfaced by [`crate::SqlTemplateEngine`].
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl PrepareError {
    /// Returns the binding failure, if this error is one.
    pub fn as_bind_error(&self) -> Option<&BindError> {
        match self {
            PrepareError::Bind(err) => Some(err),
            PrepareError::Template(_) => None,
        }
    }
}

/// Engine configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type PrepareResult<T> = Result<T, PrepareError>;
