//! Conversions of arbitrary feature values into short display strings, plus
//! the handful of scripting-style value semantics (truthiness, number
//! rendering) that the rest of the crate relies on.

use serde_json::{Number, Value};

/// Rendered in place of `true`.
pub const TRUE_MARK: &str = "✓";

/// Rendered in place of `false`.
pub const FALSE_MARK: &str = "✗";

/// Rendered in place of a missing or `null` value.
pub const NULL_MARK: &str = "✕";

/// Formats `value` into a short human readable string suitable for a map
/// label.
///
/// | Input               | Output             |
/// |---------------------|--------------------|
/// | `true`              | `✓`                |
/// | `false`             | `✗`                |
/// | `0`                 | empty string       |
/// | any other number    | its decimal form   |
/// | array of length `L` | `[L]`              |
/// | `null`              | `✕`                |
/// | string              | the string itself  |
/// | object              | compact JSON       |
///
/// This function is total, it never panics regardless of input.
pub fn format_value(value: &Value) -> String {
  match value {
    Value::Bool(true) => TRUE_MARK.to_string(),
    Value::Bool(false) => FALSE_MARK.to_string(),
    Value::Number(_) if !is_truthy(value) => String::new(),
    Value::Number(n) => match (n.as_i64(), n.as_u64()) {
      (Some(i), _) => i.to_string(),
      (None, Some(u)) => u.to_string(),
      _ => format_number(number_to_f64(n)),
    },
    Value::Array(items) => format!("[{}]", items.len()),
    Value::Null => NULL_MARK.to_string(),
    Value::String(s) => s.clone(),
    Value::Object(_) => value.to_string(),
  }
}

/// Renders a number the way a scripting runtime would: integral values have
/// no fractional part and negative zero prints as `0`.
pub fn format_number(x: f64) -> String {
  if x.is_nan() {
    return "NaN".to_string();
  }

  if x.is_infinite() {
    return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
  }

  if x == 0.0 {
    return "0".to_string();
  }

  if x.fract() == 0.0 && x.abs() < 1e21 {
    format!("{:.0}", x)
  } else {
    format!("{}", x)
  }
}

/// True if `value` would be considered truthy in a boolean context.
///
/// `null`, `false`, `0`, and the empty string are falsy. Everything else,
/// including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => {
      let x = number_to_f64(n);
      x != 0.0 && !x.is_nan()
    }
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// Wraps a float into a JSON value, preferring an integer representation
/// when the float has no fractional part.
///
/// Non-finite floats cannot be represented in JSON and become `null`.
pub fn number_value(x: f64) -> Value {
  if x.fract() == 0.0 && x.abs() < 9_007_199_254_740_992.0 {
    // The cast also folds negative zero into zero.
    return Value::from(x as i64);
  }

  Number::from_f64(x).map_or(Value::Null, Value::Number)
}

/// String conversion following the usual scripting rules: `null` becomes
/// `"null"`, arrays join their elements with commas, and objects print as
/// `[object Object]`.
pub fn coerce_to_string(value: &Value) -> String {
  match value {
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => match n.as_i64() {
      Some(i) => i.to_string(),
      None => format_number(number_to_f64(n)),
    },
    Value::String(s) => s.clone(),
    Value::Array(items) => items
      .iter()
      .map(|x| if x.is_null() { String::new() } else { coerce_to_string(x) })
      .collect::<Vec<_>>()
      .join(","),
    Value::Object(_) => "[object Object]".to_string(),
  }
}

pub(crate) fn number_to_f64(n: &Number) -> f64 {
  n.as_f64().unwrap_or(f64::NAN)
}
