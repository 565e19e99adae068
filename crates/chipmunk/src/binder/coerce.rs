//! Type coercion for bound values.
//!
//! Environment and remote sources only produce strings, so every kind except
//! `Any` accepts a textual form as well as its native JSON form.

use serde_json::{Number, Value};

/// Separator used when a list arrives as a single string.
const LIST_SEPARATOR: char = ',';

/// Declared type of a bindable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Bool,
    /// Comma-separated text or a JSON array; items coerced to the inner kind.
    List(Box<FieldKind>),
    /// Passed through unchanged.
    Any,
}

impl FieldKind {
    pub fn list_of(kind: FieldKind) -> Self {
        Self::List(Box::new(kind))
    }

    /// Value used when zero-value defaults are enabled.
    pub(crate) fn zero_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Bool => Value::Bool(false),
            Self::List(_) => Value::Array(Vec::new()),
            Self::Any => Value::Null,
        }
    }

    pub(crate) fn coerce(&self, value: Value) -> Result<Value, String> {
        match self {
            Self::Any => Ok(value),
            Self::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(number) => Ok(Value::String(number.to_string())),
                Value::Bool(flag) => Ok(Value::String(flag.to_string())),
                other => Err(mismatch("string", &other)),
            },
            Self::Integer => match value {
                Value::Number(number) if number.is_i64() || number.is_u64() => {
                    Ok(Value::Number(number))
                }
                Value::String(text) => parse_integer(text.trim()),
                other => Err(mismatch("integer", &other)),
            },
            Self::Float => match value {
                Value::Number(number) => number
                    .as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("expected float, got {number}")),
                Value::String(text) => parse_float(text.trim()),
                other => Err(mismatch("float", &other)),
            },
            Self::Bool => match value {
                Value::Bool(_) => Ok(value),
                Value::String(text) => parse_bool(text.trim()),
                Value::Number(number) => match number.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(format!("expected bool, got {number}")),
                },
                other => Err(mismatch("bool", &other)),
            },
            Self::List(item) => {
                let items = match value {
                    Value::Array(items) => items,
                    Value::String(text) => text
                        .split(LIST_SEPARATOR)
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                    other => return Err(mismatch("list", &other)),
                };
                items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, value)| {
                        item.coerce(value)
                            .map_err(|message| format!("item {idx}: {message}"))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }
}

fn mismatch(expected: &str, value: &Value) -> String {
    let actual = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    };
    format!("expected {expected}, got {actual}")
}

fn parse_integer(text: &str) -> Result<Value, String> {
    if let Ok(signed) = text.parse::<i64>() {
        return Ok(Value::from(signed));
    }
    text.parse::<u64>()
        .map(Value::from)
        .map_err(|_| format!("expected integer, got '{text}'"))
}

fn parse_float(text: &str) -> Result<Value, String> {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("expected float, got '{text}'"))
}

fn parse_bool(text: &str) -> Result<Value, String> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
        "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
        _ => Err(format!("expected bool, got '{text}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn strings_parse_into_scalars() {
        assert_eq!(FieldKind::Integer.coerce(json!(" 8080 ")), Ok(json!(8080)));
        assert_eq!(FieldKind::Float.coerce(json!("0.5")), Ok(json!(0.5)));
        assert_eq!(FieldKind::Bool.coerce(json!("Yes")), Ok(json!(true)));
        assert_eq!(FieldKind::String.coerce(json!(42)), Ok(json!("42")));
    }

    #[test]
    fn lists_split_text_and_coerce_items() {
        let kind = FieldKind::list_of(FieldKind::Integer);
        assert_eq!(kind.coerce(json!("1, 2,,3")), Ok(json!([1, 2, 3])));
        let err = kind.coerce(json!(["1", "x"])).unwrap_err();
        assert_eq!(err, "item 1: expected integer, got 'x'");
    }

    #[test]
    fn mismatches_name_both_types() {
        assert_eq!(
            FieldKind::Integer.coerce(json!(true)),
            Err("expected integer, got bool".to_string())
        );
        assert!(FieldKind::Integer.coerce(json!(1.5)).is_err());
        assert!(FieldKind::Float.coerce(json!("NaN")).is_err());
    }
}
