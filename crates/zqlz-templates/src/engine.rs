//! Template engine using MiniJinja

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use crate::error::{PrepareError, PrepareResult};
use crate::filters::register_filters;
use crate::interceptor::Interceptor;
use crate::renderer::{PreparedQuery, render_placeholders};
use crate::rewrite::derive_bind_names;
use crate::style::ParamStyle;

/// Name used for query templates compiled without caching
const UNCACHED_QUERY: &str = "<query>";

struct CompiledTemplates {
    env: Environment<'static>,
    cache: TemplateCache,
}

/// SQL template engine that turns template output into bind parameters.
///
/// Every value printed with `{{ ... }}` is replaced by a placeholder in
/// the configured [`ParamStyle`] and returned separately as a bind value.
/// Text marked with the `sqlsafe` filter (and the output of macros,
/// includes and `{% set %}` blocks, whose own values were already bound)
/// is inlined verbatim.
///
/// ## Example
///
/// ```rust,ignore
/// use zqlz_templates::{ParamStyle, SqlTemplateEngine};
///
/// let engine = SqlTemplateEngine::with_style(ParamStyle::Qmark);
/// let query = engine.prepare_query(
///     "SELECT {{ cols|sqlsafe }} FROM t WHERE id = {{ id }}",
///     serde_json::json!({"cols": "a, b", "id": 7}),
/// )?;
///
/// assert_eq!(query.sql, "SELECT a, b FROM t WHERE id = ?");
/// ```
pub struct SqlTemplateEngine {
    compiled: Mutex<CompiledTemplates>,
    config: EngineConfig,
}

impl SqlTemplateEngine {
    /// Create an engine with the default `format` style
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine using `style` with default settings
    pub fn with_style(style: ParamStyle) -> Self {
        Self::with_config(EngineConfig::new(style))
    }

    /// Create an engine from a full configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let mut env = Environment::new();
        // Custom escaping makes macro, call and set-block output safe strings.
        env.set_auto_escape_callback(|_name: &str| AutoEscape::Custom("sql"));
        if config.strict_undefined {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        }
        register_filters(&mut env);

        Self {
            compiled: Mutex::new(CompiledTemplates {
                env,
                cache: TemplateCache::new(config.cache_capacity),
            }),
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the parameter style
    pub fn param_style(&self) -> ParamStyle {
        self.config.param_style
    }

    /// Register a named template for `include`, `import` and `extends`
    pub fn add_template(&self, name: impl Into<String>, source: &str) -> PrepareResult<()> {
        let name = name.into();
        debug!(template = %name, "registering template");
        self.compiled
            .lock()
            .env
            .add_template_owned(name, derive_bind_names(source))?;
        Ok(())
    }

    /// Install a loader for templates that were not registered up front
    pub fn set_loader<F>(&self, loader: F)
    where
        F: Fn(&str) -> Result<Option<String>, minijinja::Error> + Send + Sync + 'static,
    {
        self.compiled.lock().env.set_loader(move |name| {
            Ok(loader(name)?.map(|source| derive_bind_names(&source)))
        });
    }

    /// Number of query templates currently cached
    pub fn cached_templates(&self) -> usize {
        self.compiled.lock().cache.len()
    }

    /// Render `source` with `context` into SQL text and bind parameters
    pub fn prepare_query<S: Serialize>(
        &self,
        source: &str,
        context: S,
    ) -> PrepareResult<PreparedQuery> {
        let (env, name) = {
            let mut compiled = self.compiled.lock();
            let CompiledTemplates { env, cache } = &mut *compiled;
            match cache.get_or_compile(env, source)? {
                Some(name) => (env.clone(), name),
                None => {
                    let mut env = env.clone();
                    env.add_template_owned(UNCACHED_QUERY, derive_bind_names(source))?;
                    (env, UNCACHED_QUERY.to_string())
                }
            }
        };
        self.render(env, &name, context)
    }

    /// Render a registered (or loadable) template by name
    pub fn prepare_template<S: Serialize>(
        &self,
        name: &str,
        context: S,
    ) -> PrepareResult<PreparedQuery> {
        let env = self.compiled.lock().env.clone();
        self.render(env, name, context)
    }

    fn render<S: Serialize>(
        &self,
        mut env: Environment<'static>,
        name: &str,
        context: S,
    ) -> PrepareResult<PreparedQuery> {
        let interceptor = Interceptor::new(&self.config);
        interceptor.install(&mut env);

        let rendered = env
            .get_template(name)
            .and_then(|template| template.render(context));
        let text = match rendered {
            Ok(text) => text,
            Err(err) => {
                return Err(match interceptor.take_failure() {
                    Some(bind_err) => PrepareError::Bind(bind_err),
                    None => PrepareError::Template(err),
                });
            }
        };

        let collector = interceptor.finish()?;
        let prepared = render_placeholders(
            &text,
            &collector,
            self.config.param_style,
            self.config.dedupe_bind_names,
        )?;

        debug!(
            template = name,
            style = %self.config.param_style,
            binds = prepared.params.len(),
            "prepared query"
        );
        Ok(prepared)
    }
}

impl Default for SqlTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SqlTemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTemplateEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindError;
    use crate::renderer::BindParams;
    use crate::value::BindValue;

    #[test]
    fn test_simple_template() {
        let engine = SqlTemplateEngine::new();
        let query = engine
            .prepare_query(
                "SELECT * FROM users WHERE id = {{ id }} LIMIT {{ limit }}",
                serde_json::json!({"id": 7, "limit": 10}),
            )
            .unwrap();

        assert_eq!(query.sql, "SELECT * FROM users WHERE id = %s LIMIT %s");
        assert_eq!(
            query.params,
            BindParams::Positional(vec![BindValue::Int64(7), BindValue::Int64(10)])
        );
    }

    #[test]
    fn test_cache_reused_across_contexts() {
        let engine = SqlTemplateEngine::with_style(ParamStyle::Qmark);
        let source = "SELECT 1 WHERE id = {{ id }}";

        let first = engine.prepare_query(source, serde_json::json!({"id": 1})).unwrap();
        let second = engine.prepare_query(source, serde_json::json!({"id": 2})).unwrap();

        assert_eq!(engine.cached_templates(), 1);
        assert_eq!(first.sql, second.sql);
        assert_eq!(second.params.values(), vec![&BindValue::Int64(2)]);
    }

    #[test]
    fn test_uncached_engine() {
        let engine = SqlTemplateEngine::with_config(EngineConfig::default().with_cache_capacity(0));
        let query = engine
            .prepare_query("x = {{ x }}", serde_json::json!({"x": "y"}))
            .unwrap();

        assert_eq!(query.sql, "x = %s");
        assert_eq!(engine.cached_templates(), 0);
    }

    #[test]
    fn test_syntax_error_is_template_error() {
        let engine = SqlTemplateEngine::new();
        let err = engine
            .prepare_query("{% if %}", serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, PrepareError::Template(_)));
    }

    #[test]
    fn test_strict_undefined() {
        let lenient = SqlTemplateEngine::new();
        let query = lenient
            .prepare_query("x = {{ missing }}", serde_json::json!({}))
            .unwrap();
        assert_eq!(query.params.values(), vec![&BindValue::Null]);

        let strict =
            SqlTemplateEngine::with_config(EngineConfig::default().with_strict_undefined(true));
        let err = strict
            .prepare_query("x = {{ missing }}", serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, PrepareError::Template(_)));
    }

    #[test]
    fn test_prepare_registered_template() {
        let engine = SqlTemplateEngine::with_style(ParamStyle::Numeric);
        engine
            .add_template("by_id.sql", "SELECT * FROM t WHERE id = {{ id }}")
            .unwrap();

        let query = engine
            .prepare_template("by_id.sql", serde_json::json!({"id": 3}))
            .unwrap();
        assert_eq!(query.sql, "SELECT * FROM t WHERE id = :1");
    }

    #[test]
    fn test_loader_templates_are_rewritten() {
        let engine = SqlTemplateEngine::with_style(ParamStyle::Named);
        engine.set_loader(|name| {
            Ok((name == "filter.sql").then(|| "owner = {{ user.name }}".to_string()))
        });

        let query = engine
            .prepare_query(
                "SELECT * FROM t WHERE {% include 'filter.sql' %}",
                serde_json::json!({"user": {"name": "ann"}}),
            )
            .unwrap();
        assert_eq!(query.sql, "SELECT * FROM t WHERE owner = :user.name");
    }

    #[test]
    fn test_bind_error_is_typed() {
        let engine = SqlTemplateEngine::new();
        let err = engine
            .prepare_query("{{ x|inclause }}", serde_json::json!({"x": 1}))
            .unwrap_err();
        assert!(matches!(
            err.as_bind_error(),
            Some(BindError::MissingInClause { .. })
        ));
    }
}
