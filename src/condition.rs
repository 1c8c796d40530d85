//! Edge conditions: a small predicate language over dotted context paths.
//!
//! Flow documents carry a condition either as an object
//! (`{"op": "equals", "path": "status", "value": "ok"}`) or as an expression string:
//!
//! - `status == "ok"` / `status === 'ok'`
//! - `status != "fail"` / `status !== 'fail'`
//! - `user.verified` (truthiness)
//!
//! The right-hand side of a comparison is a JSON literal; single-quoted strings and bare
//! words are read as strings.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::context::FlowContext;

lazy_static! {
    static ref PATH_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$-]*(?:\.[\w$-]+)*$").unwrap();
    static ref BARE_WORD_RE: Regex = Regex::new(r"^[A-Za-z_][\w.-]*$").unwrap();
}

const OPERATORS: [(&str, Op); 4] = [
    ("!==", Op::NotEquals),
    ("===", Op::Equals),
    ("!=", Op::NotEquals),
    ("==", Op::Equals),
];

#[derive(Debug, Clone, Copy)]
enum Op {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", try_from = "ConditionDoc")]
pub enum Condition {
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    Exists { path: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ConditionParseError(String);

impl Condition {
    pub fn equals(path: impl Into<String>, value: Value) -> Self {
        Condition::Equals {
            path: path.into(),
            value,
        }
    }

    pub fn not_equals(path: impl Into<String>, value: Value) -> Self {
        Condition::NotEquals {
            path: path.into(),
            value,
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Condition::Exists { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            Condition::Equals { path, .. }
            | Condition::NotEquals { path, .. }
            | Condition::Exists { path } => path,
        }
    }

    /// Parse an expression string such as `status == "ok"`.
    pub fn parse(expr: &str) -> Result<Self, ConditionParseError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ConditionParseError("empty condition".to_string()));
        }

        let Some((idx, token, op)) = find_operator(expr) else {
            check_path(expr)?;
            return Ok(Condition::exists(expr));
        };

        let path = expr[..idx].trim();
        check_path(path)?;
        let value = parse_literal(expr[idx + token.len()..].trim())?;
        Ok(match op {
            Op::Equals => Condition::equals(path, value),
            Op::NotEquals => Condition::not_equals(path, value),
        })
    }

    pub fn evaluate(&self, ctx: &FlowContext) -> bool {
        match self {
            Condition::Equals { path, value } => {
                values_equal(ctx.lookup(path).unwrap_or(&Value::Null), value)
            }
            Condition::NotEquals { path, value } => {
                !values_equal(ctx.lookup(path).unwrap_or(&Value::Null), value)
            }
            Condition::Exists { path } => ctx.lookup(path).is_some_and(is_truthy),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals { path, value } => write!(f, "{path} == {value}"),
            Condition::NotEquals { path, value } => write!(f, "{path} != {value}"),
            Condition::Exists { path } => f.write_str(path),
        }
    }
}

fn find_operator(expr: &str) -> Option<(usize, &'static str, Op)> {
    for (idx, _) in expr.char_indices() {
        let rest = &expr[idx..];
        if let Some((token, op)) = OPERATORS.iter().find(|(token, _)| rest.starts_with(token)) {
            return Some((idx, *token, *op));
        }
    }
    None
}

fn check_path(path: &str) -> Result<(), ConditionParseError> {
    if PATH_RE.is_match(path) {
        Ok(())
    } else {
        Err(ConditionParseError(format!("'{path}' is not a dotted path")))
    }
}

fn parse_literal(raw: &str) -> Result<Value, ConditionParseError> {
    if raw.is_empty() {
        return Err(ConditionParseError(
            "missing value after operator".to_string(),
        ));
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }
    if BARE_WORD_RE.is_match(raw) {
        return Ok(Value::String(raw.to_string()));
    }
    Err(ConditionParseError(format!("cannot read value '{raw}'")))
}

/// JSON equality, except numbers compare by numeric value (`5 == 5.0`).
///
/// Two integers compare exactly; `f64` is only used when either side is a float.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
                return x == y;
            }
            if !a.is_f64() && !b.is_f64() {
                return false;
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => left == right,
    }
}

/// `null`, `false`, `0` and `""` are falsy; everything else present is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConditionDoc {
    Expr(String),
    Tagged(TaggedCondition),
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum TaggedCondition {
    #[serde(alias = "eq")]
    Equals { path: String, value: Value },
    #[serde(alias = "neq", alias = "ne")]
    NotEquals { path: String, value: Value },
    #[serde(alias = "truthy")]
    Exists { path: String },
}

impl TryFrom<ConditionDoc> for Condition {
    type Error = ConditionParseError;

    fn try_from(doc: ConditionDoc) -> Result<Self, Self::Error> {
        match doc {
            ConditionDoc::Expr(expr) => Condition::parse(&expr),
            ConditionDoc::Tagged(TaggedCondition::Equals { path, value }) => {
                check_path(&path)?;
                Ok(Condition::Equals { path, value })
            }
            ConditionDoc::Tagged(TaggedCondition::NotEquals { path, value }) => {
                check_path(&path)?;
                Ok(Condition::NotEquals { path, value })
            }
            ConditionDoc::Tagged(TaggedCondition::Exists { path }) => {
                check_path(&path)?;
                Ok(Condition::Exists { path })
            }
        }
    }
}

/// Edge condition field: a blank string means "no condition".
pub(crate) fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
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
    fn parses_equality_forms() {
        assert_eq!(
            Condition::parse(r#"status == "ok""#).unwrap(),
            Condition::equals("status", json!("ok"))
        );
        assert_eq!(
            Condition::parse("status === 'ok'").unwrap(),
            Condition::equals("status", json!("ok"))
        );
        assert_eq!(
            Condition::parse("result.count==3").unwrap(),
            Condition::equals("result.count", json!(3))
        );
        assert_eq!(
            Condition::parse("plan == premium").unwrap(),
            Condition::equals("plan", json!("premium"))
        );
    }

    #[test]
    fn parses_inequality_and_existence() {
        assert_eq!(
            Condition::parse("flag != true").unwrap(),
            Condition::not_equals("flag", json!(true))
        );
        assert_eq!(
            Condition::parse("status !== 'fail'").unwrap(),
            Condition::not_equals("status", json!("fail"))
        );
        assert_eq!(
            Condition::parse("  user.verified ").unwrap(),
            Condition::exists("user.verified")
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(Condition::parse("").is_err());
        assert!(Condition::parse("status ==").is_err());
        assert!(Condition::parse("a b == 1").is_err());
        assert!(Condition::parse("status == {oops").is_err());
    }

    #[test]
    fn evaluates_against_context() {
        let context = ctx(json!({"status": "ok", "n": 5, "user": {"verified": false}}));
        assert!(Condition::equals("status", json!("ok")).evaluate(&context));
        assert!(!Condition::equals("status", json!("fail")).evaluate(&context));
        assert!(Condition::not_equals("status", json!("fail")).evaluate(&context));
        assert!(Condition::equals("n", json!(5.0)).evaluate(&context));
        assert!(Condition::exists("status").evaluate(&context));
        assert!(!Condition::exists("user.verified").evaluate(&context));
        assert!(!Condition::exists("missing").evaluate(&context));
    }

    #[test]
    fn large_integers_compare_exactly() {
        assert!(!values_equal(&json!(9007199254740993u64), &json!(9007199254740992u64)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(-1), &json!(u64::MAX)));
        assert!(values_equal(&json!(5), &json!(5.0)));
        let context = ctx(json!({"id": 9007199254740993u64}));
        assert!(!Condition::parse("id == 9007199254740992").unwrap().evaluate(&context));
        assert!(Condition::parse("id == 9007199254740993").unwrap().evaluate(&context));
    }

    #[test]
    fn missing_path_behaves_like_null() {
        let context = ctx(json!({}));
        assert!(Condition::equals("status", Value::Null).evaluate(&context));
        assert!(Condition::not_equals("status", json!("ok")).evaluate(&context));
    }

    #[test]
    fn deserializes_string_and_object_forms() {
        let from_str: Condition = serde_json::from_value(json!("status == \"ok\"")).unwrap();
        let from_obj: Condition =
            serde_json::from_value(json!({"op": "eq", "path": "status", "value": "ok"})).unwrap();
        assert_eq!(from_str, from_obj);
        assert_eq!(
            serde_json::to_value(&from_obj).unwrap(),
            json!({"op": "equals", "path": "status", "value": "ok"})
        );
    }

    #[test]
    fn truthiness_table() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("no"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }
}
