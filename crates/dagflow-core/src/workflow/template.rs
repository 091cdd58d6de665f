//! `{{ ... }}` template resolution over node configuration.
//!
//! Strings are the only values that change. A string that is exactly one
//! bare reference (`"{{ fetch }}"`) resolves to the stored value itself, so
//! lists, maps, and numbers survive. Any other string containing `{{` is
//! rendered: each placeholder is evaluated with the sandboxed expression
//! language, optionally piped through filters, and written out as text.
//!
//! Undefined references are errors; `default(...)` is the only way to
//! tolerate them.

use serde_json::{Map, Value};

use super::context::ExecutionContext;
use super::expression::{ExpressionError, SafeEvaluator, render};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

// ---------------------------------------------------------------------------
// TemplateError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    /// A placeholder referenced a result that does not exist.
    #[error("undefined template variable '{0}'")]
    Undefined(String),

    #[error("template syntax error: {0}")]
    Syntax(String),

    #[error("failed to evaluate template expression '{expression}': {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExpressionError,
    },
}

// ---------------------------------------------------------------------------
// TemplateResolver
// ---------------------------------------------------------------------------

/// Resolves placeholders against a results mapping.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    evaluator: SafeEvaluator,
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every placeholder in `value` using the context's results.
    pub fn resolve_with_context(
        &self,
        value: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, TemplateError> {
        self.resolve(value, &ctx.all_results())
    }

    /// Resolve `value`, recursing through mappings and sequences.
    /// Non-string scalars pass through unchanged.
    pub fn resolve(&self, value: &Value, variables: &Map<String, Value>) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => self.resolve_str(s, variables),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, variables))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve(item, variables)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve a single string.
    pub fn resolve_str(&self, template: &str, variables: &Map<String, Value>) -> Result<Value, TemplateError> {
        if !template.contains(OPEN) {
            return Ok(Value::String(template.to_string()));
        }

        if let Some(name) = bare_reference(template) {
            return variables
                .get(name)
                .cloned()
                .ok_or_else(|| TemplateError::Undefined(name.to_string()));
        }

        self.render(template, variables).map(Value::String)
    }

    /// Render a template to text, whatever its shape.
    pub fn render(&self, template: &str, variables: &Map<String, Value>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let body_start = start + OPEN.len();
            let Some(len) = find_close(&rest[body_start..]) else {
                return Err(TemplateError::Syntax(format!(
                    "unterminated '{{{{' in \"{template}\""
                )));
            };
            let body = &rest[body_start..body_start + len];
            let value = self.evaluate_placeholder(body, variables)?;
            out.push_str(&render(&value));
            rest = &rest[body_start + len + CLOSE.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn evaluate_placeholder(&self, body: &str, variables: &Map<String, Value>) -> Result<Value, TemplateError> {
        let mut segments = split_filters(body).into_iter();
        let expression = segments.next().unwrap_or_default().trim();
        if expression.is_empty() {
            return Err(TemplateError::Syntax("empty placeholder '{{ }}'".to_string()));
        }
        let filters: Vec<Filter> = segments
            .map(|segment| self.parse_filter(segment, variables))
            .collect::<Result<_, _>>()?;

        let mut value = match self.evaluator.evaluate(expression, variables) {
            Ok(v) => Some(v),
            Err(ExpressionError::UndefinedName(_) | ExpressionError::Key(_))
                if filters.iter().any(|f| matches!(f, Filter::Default(_))) =>
            {
                None
            }
            Err(ExpressionError::UndefinedName(name)) => return Err(TemplateError::Undefined(name)),
            Err(source) => {
                return Err(TemplateError::Expression {
                    expression: expression.to_string(),
                    source,
                });
            }
        };

        for filter in filters {
            value = match (filter, value) {
                (Filter::Default(fallback), None) => Some(fallback),
                (_, None) => None,
                (filter, Some(v)) => Some(filter.apply(v).map_err(|source| {
                    TemplateError::Expression {
                        expression: expression.to_string(),
                        source,
                    }
                })?),
            };
        }

        value.ok_or_else(|| TemplateError::Undefined(expression.to_string()))
    }

    fn parse_filter(&self, segment: &str, variables: &Map<String, Value>) -> Result<Filter, TemplateError> {
        let segment = segment.trim();
        let (name, arg) = match segment.find('(') {
            Some(open) => {
                let Some(inner) = segment[open + 1..].strip_suffix(')') else {
                    return Err(TemplateError::Syntax(format!(
                        "malformed filter '{segment}'"
                    )));
                };
                (segment[..open].trim(), Some(inner.trim()))
            }
            None => (segment, None),
        };

        let argument = |what: &str| -> Result<Value, TemplateError> {
            let text = arg.filter(|a| !a.is_empty()).ok_or_else(|| {
                TemplateError::Syntax(format!("filter '{name}' requires {what}"))
            })?;
            self.evaluator
                .evaluate(text, variables)
                .map_err(|source| TemplateError::Expression {
                    expression: text.to_string(),
                    source,
                })
        };

        let no_argument = |filter: Filter| match arg {
            Some(_) => Err(TemplateError::Syntax(format!(
                "filter '{name}' takes no arguments"
            ))),
            None => Ok(filter),
        };

        match name {
            "upper" => no_argument(Filter::Upper),
            "lower" => no_argument(Filter::Lower),
            "trim" => no_argument(Filter::Trim),
            "length" => no_argument(Filter::Length),
            "tojson" => no_argument(Filter::ToJson),
            "join" => match argument("a separator")? {
                Value::String(sep) => Ok(Filter::Join(sep)),
                other => Ok(Filter::Join(render(&other))),
            },
            "default" => Ok(Filter::Default(argument("a fallback value")?)),
            other => Err(TemplateError::Syntax(format!("unknown filter '{other}'"))),
        }
    }
}

/// Resolve with a default resolver.
pub fn resolve(value: &Value, ctx: &ExecutionContext) -> Result<Value, TemplateError> {
    TemplateResolver::new().resolve_with_context(value, ctx)
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Filter {
    Upper,
    Lower,
    Trim,
    Length,
    ToJson,
    Join(String),
    Default(Value),
}

impl Filter {
    fn apply(self, value: Value) -> Result<Value, ExpressionError> {
        match self {
            Filter::Upper => Ok(Value::String(render(&value).to_uppercase())),
            Filter::Lower => Ok(Value::String(render(&value).to_lowercase())),
            Filter::Trim => Ok(Value::String(render(&value).trim().to_string())),
            Filter::Length => match &value {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                other => Err(ExpressionError::Type(format!(
                    "length filter needs a string, list, or mapping, got {other}"
                ))),
            },
            Filter::ToJson => Ok(Value::String(value.to_string())),
            Filter::Join(sep) => match value {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(render).collect::<Vec<_>>().join(&sep),
                )),
                other => Ok(Value::String(render(&other))),
            },
            Filter::Default(_) => Ok(value),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanning helpers
// ---------------------------------------------------------------------------

/// `Some(name)` when the whole template is `{{ name }}` with a bare identifier.
fn bare_reference(template: &str) -> Option<&str> {
    let inner = template.strip_prefix(OPEN)?.strip_suffix(CLOSE)?.trim();
    let mut chars = inner.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    // `{{ True }}` and friends are literals, not references.
    if matches!(inner, "True" | "False" | "None" | "true" | "false" | "null") {
        return None;
    }
    Some(inner)
}

/// Byte offset of the closing `}}`, skipping quoted strings and braces
/// that belong to dict or set literals inside the expression.
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
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
                b'\'' | b'"' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split a placeholder body at top-level `|`, ignoring quotes and brackets.
fn split_filters(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '|' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Map<String, Value> {
        match json!({
            "fetch": {"status": 200, "items": [1, 2, 3]},
            "name": "  Ada ",
            "count": 3,
            "flag": true,
            "nothing": null,
            "tags": ["a", "b"],
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn resolve_str(template: &str) -> Result<Value, TemplateError> {
        TemplateResolver::new().resolve_str(template, &vars())
    }

    #[test]
    fn test_plain_string_unchanged() {
        assert_eq!(resolve_str("no templates here").unwrap(), json!("no templates here"));
    }

    #[test]
    fn test_bare_reference_preserves_native_value() {
        assert_eq!(
            resolve_str("{{ fetch }}").unwrap(),
            json!({"status": 200, "items": [1, 2, 3]})
        );
        assert_eq!(resolve_str("{{count}}").unwrap(), json!(3));
        assert_eq!(resolve_str("{{ nothing }}").unwrap(), json!(null));
    }

    #[test]
    fn test_path_expression_renders_to_text() {
        assert_eq!(resolve_str("{{ fetch.status }}").unwrap(), json!("200"));
        assert_eq!(resolve_str("{{ fetch['items'][0] }}").unwrap(), json!("1"));
    }

    #[test]
    fn test_mixed_text_rendering_rules() {
        assert_eq!(
            resolve_str("status={{ fetch.status }} ok={{ flag }} none={{ nothing }}").unwrap(),
            json!("status=200 ok=true none=null")
        );
        assert_eq!(
            resolve_str("items: {{ fetch.items }}").unwrap(),
            json!("items: [1,2,3]")
        );
    }

    #[test]
    fn test_expressions_inside_placeholders() {
        assert_eq!(resolve_str("{{ count * 2 }} items").unwrap(), json!("6 items"));
        assert_eq!(
            resolve_str("{{ 'many' if count > 1 else 'one' }}").unwrap(),
            json!("many")
        );
    }

    #[test]
    fn test_undefined_is_an_error() {
        assert_eq!(
            resolve_str("{{ missing }}").unwrap_err(),
            TemplateError::Undefined("missing".to_string())
        );
        assert_eq!(
            resolve_str("value: {{ missing.field }}").unwrap_err(),
            TemplateError::Undefined("missing".to_string())
        );
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert!(matches!(resolve_str("hello {{ name"), Err(TemplateError::Syntax(_))));
    }

    #[test]
    fn test_unsafe_expression_is_reported() {
        let err = resolve_str("{{ name.__class__ }}").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Expression {
                source: ExpressionError::Unsafe(_),
                ..
            }
        ));
    }

    #[test]
    fn test_filters() {
        assert_eq!(resolve_str("{{ name | trim | upper }}").unwrap(), json!("ADA"));
        assert_eq!(resolve_str("{{ tags | length }}").unwrap(), json!("2"));
        assert_eq!(resolve_str("{{ tags | join(', ') }}").unwrap(), json!("a, b"));
        assert_eq!(resolve_str("{{ name | trim | tojson }}").unwrap(), json!("\"Ada\""));
        assert_eq!(resolve_str("{{ missing | default('n/a') }}").unwrap(), json!("n/a"));
        assert_eq!(resolve_str("{{ fetch.nope | default(0) }}").unwrap(), json!("0"));
        assert_eq!(resolve_str("{{ count | default(0) }}").unwrap(), json!("3"));
    }

    #[test]
    fn test_pipe_inside_string_is_not_a_filter() {
        assert_eq!(resolve_str("{{ 'a|b' }}").unwrap(), json!("a|b"));
    }

    #[test]
    fn test_unknown_filter() {
        assert!(matches!(resolve_str("{{ name | shout }}"), Err(TemplateError::Syntax(_))));
    }

    #[test]
    fn test_nested_dict_literal_closes_correctly() {
        assert_eq!(resolve_str("{{ {'a': {'b': 1}}['a']['b'] }}").unwrap(), json!("1"));
    }

    #[test]
    fn test_recurses_through_collections() {
        let config = json!({
            "url": "https://x/{{ fetch.status }}",
            "payload": "{{ fetch }}",
            "list": ["{{ count }}", 5, null],
            "nested": {"flag": "{{ flag }}"},
        });
        let resolved = TemplateResolver::new().resolve(&config, &vars()).unwrap();
        assert_eq!(
            resolved,
            json!({
                "url": "https://x/200",
                "payload": {"status": 200, "items": [1, 2, 3]},
                "list": [3, 5, null],
                "nested": {"flag": true},
            })
        );
    }

    #[test]
    fn test_resolve_reads_context_results() {
        let ctx = ExecutionContext::new("wf", None);
        ctx.set_result("a", json!([1, 2]));
        assert_eq!(resolve(&json!("{{ a }}"), &ctx).unwrap(), json!([1, 2]));
    }
}
