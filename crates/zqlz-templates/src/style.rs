//! Parameter styles understood by database client libraries

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Placeholder convention used in the prepared SQL.
///
/// The style fixes both the placeholder syntax and the shape of the
/// returned bind parameters (ordered list or name-keyed map).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ParamStyle {
    /// `%s`
    #[default]
    Format,
    /// `?`
    Qmark,
    /// `:1`, `:2`, ...
    Numeric,
    /// `:name`
    Named,
    /// `%(name)s`
    Pyformat,
    /// `$1`, `$2`, ... (PostgreSQL native)
    Asyncpg,
}

impl ParamStyle {
    /// Whether bind parameters are returned keyed by name
    pub fn is_named(self) -> bool {
        matches!(self, ParamStyle::Named | ParamStyle::Pyformat)
    }

    /// Render the placeholder for the bind at `position` (0-based).
    ///
    /// `name` is only consulted by the named styles.
    pub fn placeholder(self, position: usize, name: &str) -> String {
        match self {
            ParamStyle::Format => "%s".to_string(),
            ParamStyle::Qmark => "?".to_string(),
            ParamStyle::Numeric => format!(":{}", position + 1),
            ParamStyle::Named => format!(":{}", name),
            ParamStyle::Pyformat => format!("%({})s", name),
            ParamStyle::Asyncpg => format!("${}", position + 1),
        }
    }
}
