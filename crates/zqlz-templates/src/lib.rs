//! ZQLZ Templates - MiniJinja-based SQL templating with bind parameters
//!
//! Templates are written with ordinary Jinja expressions, but no value
//! printed with `{{ ... }}` ever ends up in the SQL text. Each one is
//! replaced by a placeholder and returned as a bind parameter, so the
//! prepared query is safe from SQL injection by construction.
//!
//! ## Features
//!
//! - **Parameter styles**: `format`, `qmark`, `numeric`, `named`, `pyformat`, `asyncpg`
//! - **SQL Filters**: `sqlsafe` to inline trusted text, `inclause` to expand
//!   lists into `(?, ?, ?)`, `bind` to name a parameter explicitly
//! - **Composition**: macros, imports, includes and `{% set %}` blocks keep
//!   their binds in the position their output lands in
//! - **Template cache**: query sources are compiled once
//!
//! ## Example
//!
//! ```rust,ignore
//! use zqlz_templates::{ParamStyle, SqlTemplateEngine};
//!
//! let engine = SqlTemplateEngine::with_style(ParamStyle::Pyformat);
//! let query = engine.prepare_query(
//!     r#"
//!     SELECT {{ columns | sqlsafe }} FROM timesheet
//!     WHERE project_id = {{ request.project_id }}
//!       AND day IN {{ request.days | inclause }}
//!     "#,
//!     serde_json::json!({
//!         "columns": "project, hours",
//!         "request": {"project_id": 123, "days": ["mon", "tue"]},
//!     }),
//! )?;
//!
//! // WHERE project_id = %(request.project_id)s
//! //   AND day IN (%(request.days_0)s,%(request.days_1)s)
//! let (sql, params) = query.into_parts();
//! ```
//!
//! ## Named parameters
//!
//! For `named` and `pyformat` the parameter name is the dotted variable
//! path of the expression (`request.project_id`). Expressions that are not
//! a plain path are named `bind.<n>` unless given a name with
//! `{{ expr | bind("name") }}`. Reusing a name for a different value (for
//! example printing a loop variable on every iteration) fails with
//! [`BindError::DuplicateBindName`] unless
//! [`EngineConfig::dedupe_bind_names`] is enabled.

mod cache;
mod collector;
mod config;
mod engine;
mod error;
mod filters;
mod interceptor;
mod renderer;
mod rewrite;
mod style;
mod value;

pub use cache::TemplateCache;
pub use collector::{BindCollector, BindSlot, SlotId, placeholder_token};
pub use config::EngineConfig;
pub use engine::SqlTemplateEngine;
pub use error::{BindError, ConfigError, PrepareError, PrepareResult};
pub use filters::{InClause, NamedBind, SqlFilters, register_filters};
pub use interceptor::Interceptor;
pub use renderer::{BindParams, PreparedQuery, render_placeholders};
pub use rewrite::derive_bind_names;
pub use style::ParamStyle;
pub use value::BindValue;
