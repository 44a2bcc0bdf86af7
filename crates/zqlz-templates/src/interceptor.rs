//! Value interception for template output
//!
//! An [`Interceptor`] is created for every render and installed on a
//! private clone of the environment as its formatter. Each `{{ ... }}`
//! site is routed through it: trusted text is written verbatim, every
//! other value is captured into the [`BindCollector`] and replaced by a
//! placeholder token.

use std::sync::Arc;

use minijinja::value::ValueKind;
use minijinja::{Environment, Error, ErrorKind, Output, Value};
use parking_lot::Mutex;

use crate::collector::{BindCollector, contains_token, placeholder_token};
use crate::config::EngineConfig;
use crate::error::BindError;
use crate::filters::{InClause, NamedBind, SqlFilters};
use crate::value::BindValue;

/// How a value reaching an output site is emitted
enum Interpolation<'a> {
    /// Inlined verbatim
    Trusted(&'a str),
    /// Expanded into a parenthesized placeholder group
    InClause(&'a InClause),
    /// Captured as a single bind value
    Opaque(&'a Value),
}

impl<'a> Interpolation<'a> {
    fn classify(value: &'a Value) -> Self {
        if let Some(group) = value.downcast_object_ref::<InClause>() {
            return Interpolation::InClause(group);
        }
        match value.as_str() {
            Some(text) if value.is_safe() => Interpolation::Trusted(text),
            _ => Interpolation::Opaque(value),
        }
    }
}

/// Per-render interception state
#[derive(Debug, Default)]
pub struct Interceptor {
    collector: Mutex<BindCollector>,
    failure: Mutex<Option<BindError>>,
    require_inclause: bool,
    strict_undefined: bool,
}

impl Interceptor {
    /// Create the interceptor for one render
    pub fn new(config: &EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            require_inclause: config.require_inclause,
            strict_undefined: config.strict_undefined,
            ..Self::default()
        })
    }

    /// Install this interceptor as the formatter and `inclause` filter of `env`
    pub fn install(self: &Arc<Self>, env: &mut Environment<'_>) {
        let interceptor = Arc::clone(self);
        env.set_formatter(move |out, _state, value| interceptor.format(out, value));

        let interceptor = Arc::clone(self);
        env.add_filter("inclause", move |value: Value| -> Result<Value, Error> {
            SqlFilters::inclause(value)
                .map(Value::from_object)
                .map_err(|err| interceptor.fail(err))
        });
    }

    fn format(&self, out: &mut Output<'_>, value: &Value) -> Result<(), Error> {
        if self.strict_undefined && unwrap_named(value).0.is_undefined() {
            return Err(Error::new(
                ErrorKind::UndefinedError,
                "undefined value in template output",
            ));
        }
        let text = self.intercept(value).map_err(|err| self.fail(err))?;
        out.write_str(&text)
            .map_err(|_| Error::new(ErrorKind::InvalidOperation, "failed to write template output"))
    }

    /// Turn an output value into the text that replaces it
    pub fn intercept(&self, value: &Value) -> Result<String, BindError> {
        let (value, name) = unwrap_named(value);
        match Interpolation::classify(value) {
            Interpolation::Trusted(text) => Ok(text.to_string()),
            Interpolation::InClause(group) => self.expand(group, name),
            Interpolation::Opaque(value) => self.bind(value, name),
        }
    }

    fn bind(&self, value: &Value, name: Option<&str>) -> Result<String, BindError> {
        let origin = describe(name);
        match value.kind() {
            ValueKind::Map => return Err(BindError::InvalidBindParameter(origin)),
            ValueKind::Seq if self.require_inclause => {
                return Err(BindError::MissingInClause {
                    found: format!("a list at {} that was not expanded", origin),
                });
            }
            _ => {}
        }

        let bind_value = BindValue::from_template_value(value, &origin)?;
        if embeds_token(&bind_value) {
            return Err(BindError::EmbeddedTemplateOutput { origin });
        }
        let id = self
            .collector
            .lock()
            .capture(bind_value, name.map(str::to_string));
        Ok(placeholder_token(id))
    }

    fn expand(&self, group: &InClause, name: Option<&str>) -> Result<String, BindError> {
        let origin = describe(name);
        let values = group
            .items
            .iter()
            .map(|item| BindValue::from_template_value(item, &origin))
            .collect::<Result<Vec<_>, _>>()?;
        if values.iter().any(embeds_token) {
            return Err(BindError::EmbeddedTemplateOutput { origin });
        }

        let mut collector = self.collector.lock();
        let tokens: Vec<String> = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let item_name = name.map(|name| format!("{}_{}", name, index));
                placeholder_token(collector.capture(value, item_name))
            })
            .collect();

        Ok(format!("({})", tokens.join(",")))
    }

    /// Record the first binding failure and convert it for the engine
    fn fail(&self, err: BindError) -> Error {
        let message = err.to_string();
        self.failure.lock().get_or_insert(err);
        Error::new(ErrorKind::InvalidOperation, message)
    }

    /// The binding failure that aborted the render, if any
    pub fn take_failure(&self) -> Option<BindError> {
        self.failure.lock().take()
    }

    /// Hand over the captured values once rendering has finished
    pub fn finish(&self) -> Result<BindCollector, BindError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(std::mem::take(&mut *self.collector.lock()))
    }
}

/// Split a `bind` filter result into the value and its derived name
fn unwrap_named(value: &Value) -> (&Value, Option<&str>) {
    match value.downcast_object_ref::<NamedBind>() {
        Some(named) => (&named.value, named.name.as_deref()),
        None => (value, None),
    }
}

/// Whether a bound value still holds tokens of already captured values
fn embeds_token(value: &BindValue) -> bool {
    match value {
        BindValue::String(text) => contains_token(text),
        BindValue::Array(items) => items.iter().any(embeds_token),
        _ => false,
    }
}

fn describe(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("`{}`", name),
        None => "an unnamed expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::find_tokens;
    use crate::filters::register_filters;

    fn render(interceptor: &Arc<Interceptor>, source: &str, ctx: serde_json::Value) -> String {
        let mut env = Environment::new();
        register_filters(&mut env);
        interceptor.install(&mut env);
        env.render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_opaque_values_become_tokens() {
        let interceptor = Interceptor::new(&EngineConfig::default());
        let text = render(
            &interceptor,
            "id = {{ id }} AND name = {{ name }}",
            serde_json::json!({"id": 5, "name": "x'; DROP TABLE t; --"}),
        );

        assert!(!text.contains("DROP"));
        assert_eq!(find_tokens(&text).unwrap().len(), 2);

        let collector = interceptor.finish().unwrap();
        assert_eq!(collector.slots()[0].value, BindValue::Int64(5));
        assert_eq!(
            collector.slots()[1].value,
            BindValue::from("x'; DROP TABLE t; --")
        );
    }

    #[test]
    fn test_trusted_text_is_inlined() {
        let interceptor = Interceptor::new(&EngineConfig::default());
        let text = render(
            &interceptor,
            "SELECT {{ cols|sqlsafe }} FROM t",
            serde_json::json!({"cols": "a, b"}),
        );

        assert_eq!(text, "SELECT a, b FROM t");
        assert!(interceptor.finish().unwrap().is_empty());
    }

    #[test]
    fn test_named_bind_carries_name() {
        let interceptor = Interceptor::new(&EngineConfig::default());
        render(
            &interceptor,
            "{{ (request.id)|bind(\"request.id\") }}",
            serde_json::json!({"request": {"id": 9}}),
        );

        let collector = interceptor.finish().unwrap();
        assert_eq!(
            collector.get_by_name("request.id").unwrap().value,
            BindValue::Int64(9)
        );
    }

    #[test]
    fn test_inclause_items_named_by_index() {
        let interceptor = Interceptor::new(&EngineConfig::default());
        let text = render(
            &interceptor,
            "{{ (days|inclause)|bind(\"days\") }}",
            serde_json::json!({"days": ["mon", "tue"]}),
        );

        assert!(text.starts_with('(') && text.ends_with(')'));
        let collector = interceptor.finish().unwrap();
        assert_eq!(collector.slots()[0].name.as_deref(), Some("days_0"));
        assert_eq!(collector.slots()[1].name.as_deref(), Some("days_1"));
    }

    #[test]
    fn test_mapping_failure_is_recorded() {
        let interceptor = Interceptor::new(&EngineConfig::default());
        let mut env = Environment::new();
        interceptor.install(&mut env);

        let result = env.render_str("{{ project }}", serde_json::json!({"project": {"id": 1}}));
        assert!(result.is_err());
        assert!(matches!(
            interceptor.take_failure(),
            Some(BindError::InvalidBindParameter(_))
        ));
    }

    #[test]
    fn test_reused_tokens_are_refused() {
        let interceptor = Interceptor::new(&EngineConfig::default());
        let token = interceptor.intercept(&Value::from(1)).unwrap();

        assert!(matches!(
            interceptor.intercept(&Value::from(format!("b = {} AND 1=1", token))),
            Err(BindError::EmbeddedTemplateOutput { .. })
        ));
        assert!(matches!(
            interceptor.intercept(&Value::from(vec![Value::from(token.clone())])),
            Err(BindError::EmbeddedTemplateOutput { .. })
        ));
        assert_eq!(
            interceptor
                .intercept(&Value::from_safe_string(format!("b = {}", token)))
                .unwrap(),
            format!("b = {}", token)
        );
    }

    #[test]
    fn test_require_inclause_rejects_bare_lists() {
        let strict = Interceptor::new(&EngineConfig::default().with_require_inclause(true));
        assert!(matches!(
            strict.intercept(&Value::from(vec![1, 2])),
            Err(BindError::MissingInClause { .. })
        ));

        let lenient = Interceptor::new(&EngineConfig::default());
        lenient.intercept(&Value::from(vec![1, 2])).unwrap();
        assert_eq!(
            lenient.finish().unwrap().slots()[0].value,
            BindValue::Array(vec![BindValue::Int64(1), BindValue::Int64(2)])
        );
    }
}
