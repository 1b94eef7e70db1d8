//! Literal and record values.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// A dynamically typed value, used both for literals in expressions and for
/// the fields of a record.
///
/// Literals produced by the parser are never `Boolean`; the lexer has no
/// boolean syntax, so `Boolean` only appears on the record side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

/// Field name -> value mapping an expression is evaluated against.
/// Keys are expected to be lowercase, matching the lexer's field folding.
pub type Record = HashMap<String, Value>;

/// Numeric view of a value.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Value {
    /// Type a VALUE token: integer first, then float, then the raw text.
    pub fn from_literal(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
        Value::String(text.to_string())
    }

    /// Scalar JSON to a value; `null`, arrays and objects have no mapping.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Integer(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Value::Integer(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Boolean(_) | Value::String(_) => None,
        }
    }

    /// Plain text form used for string equality.
    pub(crate) fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Integer(i) => Cow::Owned(i.to_string()),
            Value::Float(f) => Cow::Owned(f.to_string()),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::String(s) => Cow::Borrowed(s.as_str()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
        }
    }
}

/// True when `text` lexes as a bare digit run.
fn is_digit_run(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit())
        && text.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Renders the value as expression source. Strings are single-quoted and
/// integral floats keep a `.0` so they lex back as floats. Numbers that are
/// not a bare digit run (negatives, `inf`, `NaN`) are quoted too; quoted
/// literals go back through numeric typing.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => format!("{:.1}", v),
            Value::Float(v) => v.to_string(),
            Value::Boolean(b) => return write!(f, "{}", b),
            Value::String(s) => return write!(f, "'{}'", s),
        };
        if is_digit_run(&number) {
            f.write_str(&number)
        } else {
            write!(f, "'{}'", number)
        }
    }
}

/// Lowercase every key so records line up with lexed field names.
pub fn normalize_record(record: Record) -> Record {
    record
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}
