//! Engine configuration

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::style::ParamStyle;

/// Configuration for [`crate::SqlTemplateEngine`].
///
/// ```toml
/// param_style = "pyformat"
/// cache_capacity = 256
/// dedupe_bind_names = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Placeholder syntax and bind parameter shape
    pub param_style: ParamStyle,
    /// Number of compiled query templates kept; 0 disables caching
    pub cache_capacity: usize,
    /// Fail on undefined variables instead of binding NULL
    pub strict_undefined: bool,
    /// Suffix colliding bind names (`name_2`, ...) instead of failing
    pub dedupe_bind_names: bool,
    /// Reject lists that reach an output site without `inclause`
    pub require_inclause: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            param_style: ParamStyle::default(),
            cache_capacity: 128,
            strict_undefined: false,
            dedupe_bind_names: false,
            require_inclause: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with `param_style` and default settings
    pub fn new(param_style: ParamStyle) -> Self {
        Self {
            param_style,
            ..Self::default()
        }
    }

    /// Set the number of cached query templates
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_strict_undefined(mut self, strict: bool) -> Self {
        self.strict_undefined = strict;
        self
    }

    /// Suffix colliding bind names instead of failing
    pub fn with_dedupe_bind_names(mut self, dedupe: bool) -> Self {
        self.dedupe_bind_names = dedupe;
        self
    }

    pub fn with_require_inclause(mut self, require: bool) -> Self {
        self.require_inclause = require;
        self
    }

    /// Parse a configuration from TOML
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config: {:?}", path))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse engine config: {:?}", path))
    }
}
