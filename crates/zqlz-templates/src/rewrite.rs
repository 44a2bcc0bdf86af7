//! Source rewriting for named bind parameters
//!
//! Before a template is compiled, every `{{ expr }}` site is rewritten to
//! `{{ (expr)|bind("path") }}` so the interceptor knows which variable a
//! value came from. The name is only derived when the expression is a bare
//! dotted path, optionally followed by filters; other expressions get an
//! unnamed `bind()`. Sites that already end in a `bind` filter are left
//! alone. Comments, `{% raw %}` blocks and string literals are skipped.

use std::borrow::Cow;

/// Rewrite all expression sites of `source`
pub fn derive_bind_names(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + source.len() / 4);
    let mut rest = source;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if let Some(body) = tail.strip_prefix("{{") {
            let Some(end) = find_close(body, "}}") else {
                out.push_str(tail);
                return out;
            };
            out.push_str("{{");
            out.push_str(&rewrite_expression(&body[..end]));
            out.push_str("}}");
            rest = &body[end + 2..];
        } else if let Some(body) = tail.strip_prefix("{#") {
            let end = body.find("#}").map(|end| end + 4).unwrap_or(tail.len());
            out.push_str(&tail[..end]);
            rest = &tail[end..];
        } else if let Some(body) = tail.strip_prefix("{%") {
            let Some(end) = find_close(body, "%}") else {
                out.push_str(tail);
                return out;
            };
            let tag_end = end + 4;
            out.push_str(&tail[..tag_end]);
            rest = &tail[tag_end..];

            if tag_name(&body[..end]) == "raw" {
                let raw_end = find_endraw(rest);
                out.push_str(&rest[..raw_end]);
                rest = &rest[raw_end..];
            }
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

fn rewrite_expression(inner: &str) -> Cow<'_, str> {
    let (lead, body) = match inner.as_bytes().first() {
        Some(b'-' | b'+') => inner.split_at(1),
        _ => ("", inner),
    };
    let (body, trail) = match body.as_bytes().last() {
        Some(b'-' | b'+') => body.split_at(body.len() - 1),
        _ => (body, ""),
    };

    let expr = body.trim();
    if expr.is_empty() || last_filter(expr) == Some("bind") {
        return Cow::Borrowed(inner);
    }

    let arg = bind_name(expr)
        .map(|name| format!("\"{}\"", name))
        .unwrap_or_default();
    Cow::Owned(format!("{} ({})|bind({}) {}", lead, expr, arg, trail))
}

/// Dotted variable path when `expr` is a bare path, possibly filtered
fn bind_name(expr: &str) -> Option<&str> {
    let bytes = expr.as_bytes();
    let mut pos = 0;

    loop {
        match bytes.get(pos) {
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' => pos += 1,
            _ => return None,
        }
        while bytes
            .get(pos)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            pos += 1;
        }
        if bytes.get(pos) == Some(&b'.') {
            pos += 1;
        } else {
            break;
        }
    }

    let (path, rest) = expr.split_at(pos);
    if is_literal(path) {
        return None;
    }
    let rest = rest.trim_start();
    (rest.is_empty() || rest.starts_with('|')).then_some(path)
}

fn is_literal(word: &str) -> bool {
    matches!(
        word,
        "true" | "false" | "none" | "True" | "False" | "None"
    )
}

/// Name of the last top-level filter applied in `expr`
fn last_filter(expr: &str) -> Option<&str> {
    let bytes = expr.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut last_pipe = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b'|' if depth == 0 => last_pipe = Some(i),
                _ => {}
            },
        }
        i += 1;
    }

    let filter = expr[last_pipe? + 1..].trim_start();
    let len = filter
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    (len > 0).then(|| &filter[..len])
}

/// Byte offset of `close` in `s`, skipping over string literals and
/// nested brackets
fn find_close(s: &str, close: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None if depth == 0 && bytes[i..].starts_with(close.as_bytes()) => return Some(i),
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Keyword of a `{% ... %}` tag body, without whitespace control markers
fn tag_name(body: &str) -> &str {
    body.trim_matches(|c: char| c == '-' || c == '+' || c.is_whitespace())
        .split_whitespace()
        .next()
        .unwrap_or("")
}

/// Offset of the `{% endraw %}` tag closing a raw block
fn find_endraw(s: &str) -> usize {
    let mut offset = 0;
    while let Some(found) = s[offset..].find("{%") {
        let start = offset + found;
        let body = &s[start + 2..];
        match body.find("%}") {
            Some(end) if tag_name(&body[..end]) == "endraw" => return start,
            Some(end) => offset = start + 2 + end + 2,
            None => break,
        }
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_path_gets_named_bind() {
        assert_eq!(
            derive_bind_names("WHERE id = {{request.project_id}}"),
            "WHERE id = {{ (request.project_id)|bind(\"request.project_id\") }}"
        );
    }

    #[test]
    fn test_filtered_path_keeps_name() {
        assert_eq!(
            derive_bind_names("{{ session.user_id | lower }}"),
            "{{ (session.user_id | lower)|bind(\"session.user_id\") }}"
        );
    }

    #[test]
    fn test_non_path_gets_unnamed_bind() {
        assert_eq!(
            derive_bind_names("{{ \"%s-%s\" | format(\"hi\", \"there\") }}"),
            "{{ (\"%s-%s\" | format(\"hi\", \"there\"))|bind() }}"
        );
        assert_eq!(
            derive_bind_names("{{ week(request.start_date) }}"),
            "{{ (week(request.start_date))|bind() }}"
        );
        assert_eq!(derive_bind_names("{{ a.b + 1 }}"), "{{ (a.b + 1)|bind() }}");
    }

    #[test]
    fn test_explicit_bind_untouched() {
        let source = "{{ x|bind('custom') }}";
        assert_eq!(derive_bind_names(source), source);
    }

    #[test]
    fn test_inclause_and_sqlsafe_are_wrapped() {
        assert_eq!(
            derive_bind_names("{{ request.days | inclause }}"),
            "{{ (request.days | inclause)|bind(\"request.days\") }}"
        );
        assert_eq!(
            derive_bind_names("{{etc.columns | sqlsafe}}"),
            "{{ (etc.columns | sqlsafe)|bind(\"etc.columns\") }}"
        );
    }

    #[test]
    fn test_whitespace_control_preserved() {
        assert_eq!(
            derive_bind_names("a {{- value -}} b"),
            "a {{- (value)|bind(\"value\") -}} b"
        );
    }

    #[test]
    fn test_strings_with_braces() {
        assert_eq!(
            derive_bind_names("{{ x ~ '}}' }}"),
            "{{ (x ~ '}}')|bind() }}"
        );
        assert_eq!(
            derive_bind_names("{{ x|default('a|bind') }}"),
            "{{ (x|default('a|bind'))|bind(\"x\") }}"
        );
    }

    #[test]
    fn test_comments_statements_and_raw_untouched() {
        let source = "{# {{ a }} #}{% if b %}{% raw %}{{ c }}{% endraw %}{% endif %}";
        assert_eq!(derive_bind_names(source), source);
    }

    #[test]
    fn test_nested_literals_keep_site_intact() {
        assert_eq!(
            derive_bind_names("{{ {'k': {'j': a}}['k']['j'] }} AND {{ b }}"),
            "{{ ({'k': {'j': a}}['k']['j'])|bind() }} AND {{ (b)|bind(\"b\") }}"
        );
        assert_eq!(
            derive_bind_names("{% set m = {'a': {'b': 1}} %}{{ m.a.b }}"),
            "{% set m = {'a': {'b': 1}} %}{{ (m.a.b)|bind(\"m.a.b\") }}"
        );
    }

    #[test]
    fn test_literals_are_not_names() {
        assert_eq!(derive_bind_names("{{ true }}"), "{{ (true)|bind() }}");
        assert_eq!(derive_bind_names("{{ None }}"), "{{ (None)|bind() }}");
        assert_eq!(
            derive_bind_names("{{ nonewhere }}"),
            "{{ (nonewhere)|bind(\"nonewhere\") }}"
        );
    }

    #[test]
    fn test_multiline_expression() {
        assert_eq!(
            derive_bind_names("{{ f(a,\n  b) }}"),
            "{{ (f(a,\n  b))|bind() }}"
        );
    }

    #[test]
    fn test_unterminated_passthrough() {
        assert_eq!(derive_bind_names("x {{ y"), "x {{ y");
        assert_eq!(derive_bind_names("{ plain }"), "{ plain }");
    }
}
