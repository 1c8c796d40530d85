use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::FlowContext;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap();
}

/// Rendered in place of a placeholder whose path does not resolve.
pub const UNRESOLVED: &str = "undefined";

/// Replace every `{{ dotted.path }}` in `template` with the string form of the context value.
///
/// Paths that do not resolve render as `undefined`. There is no escape for literal braces.
pub fn interpolate(template: &str, ctx: &FlowContext) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match ctx.lookup(path) {
                Some(value) => display_value(value),
                None => UNRESOLVED.to_string(),
            }
        })
        .into_owned()
}

/// Placeholder paths referenced by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// String form of a context value as it appears inside an interpolated template.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> FlowContext {
        FlowContext::try_from(value).unwrap()
    }

    #[test]
    fn resolves_nested_path() {
        assert_eq!(interpolate("{{a.b}}", &ctx(json!({"a": {"b": "x"}}))), "x");
    }

    #[test]
    fn unresolved_path_renders_undefined() {
        assert_eq!(
            interpolate("{{a.c}}", &ctx(json!({"a": {"b": "x"}}))),
            "undefined"
        );
        assert_eq!(
            interpolate("{{a.b.c}}", &ctx(json!({"a": {"b": "x"}}))),
            "undefined"
        );
    }

    #[test]
    fn renders_every_occurrence_inside_json_body() {
        let context = ctx(json!({"email": "x@y.com", "age": 42, "opt_in": true}));
        let body = interpolate(
            r#"{"email":"{{email}}","again":"{{ email }}","age":{{age}},"optIn":{{opt_in}}}"#,
            &context,
        );
        assert_eq!(
            body,
            r#"{"email":"x@y.com","again":"x@y.com","age":42,"optIn":true}"#
        );
    }

    #[test]
    fn scalar_formatting() {
        assert_eq!(display_value(&json!(5.0)), "5");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&json!(null)), "null");
        assert_eq!(display_value(&json!({"k": [1, 2]})), r#"{"k":[1,2]}"#);
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        let context = ctx(json!({"a": 1}));
        assert_eq!(interpolate("plain {text}", &context), "plain {text}");
    }

    #[test]
    fn lists_placeholders() {
        assert_eq!(
            placeholders("{{ user.email }} and {{token}}"),
            vec!["user.email", "token"]
        );
    }
}
