//! Builders for the per-feature display functions a map layer needs: the
//! text printed on a pin and the color of its marker.

use std::sync::Arc;

use serde_json::Value;

use crate::compile::compile_tuple;
use crate::schema::{ExprSpec, SchemaDocument};
use crate::value::{coerce_to_string, format_value, is_truthy};

/// A per-feature display function.
pub type DisplayFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

fn constant<S: Into<String>>(s: S) -> DisplayFn {
  let s = s.into();
  Arc::new(move |_: &Value| s.clone())
}

/// Builds the pin text function declared by `schema.marker_text`.
///
/// Literals are returned unchanged. Computed values are passed through
/// [`format_value`]. Without a usable declaration every feature gets an empty
/// label.
pub fn build_text_fn(schema: &SchemaDocument) -> DisplayFn {
  match &schema.marker_text {
    ExprSpec::Literal(s) => constant(s.as_str()),
    ExprSpec::Tuple(tuple) => {
      let f = compile_tuple(tuple);
      Arc::new(move |feature: &Value| format_value(&f(feature)))
    }
    ExprSpec::Absent | ExprSpec::Other(_) => constant(""),
  }
}

/// Builds the marker color function declared by `schema.marker_color`.
///
/// Literals are returned unchanged. Computed values are used as-is unless
/// they are falsy, in which case `fallback` is used instead. They are never
/// passed through [`format_value`]. Without a usable
/// declaration every feature gets `fallback`.
pub fn build_color_fn(schema: &SchemaDocument, fallback: &str) -> DisplayFn {
  match &schema.marker_color {
    ExprSpec::Literal(s) => constant(s.as_str()),
    ExprSpec::Tuple(tuple) => {
      let f = compile_tuple(tuple);
      let fallback = fallback.to_string();
      Arc::new(move |feature: &Value| match f(feature) {
        v if !is_truthy(&v) => fallback.clone(),
        Value::String(s) => s,
        v => coerce_to_string(&v),
      })
    }
    ExprSpec::Absent | ExprSpec::Other(_) => constant(fallback),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::schema::resolve;
  use serde_json::json;

  fn named(name: Value) -> Value {
    json!({"type": "Feature", "properties": {"name": name}})
  }

  #[test]
  fn text_from_get() {
    let f = build_text_fn(&resolve("{markerText: ['get', 'properties.name']}"));
    assert_eq!("Alpha", f(&named(json!("Alpha"))));
    assert_eq!("", f(&json!({"properties": {}})));
  }

  #[test]
  fn text_formats_computed_values() {
    let f = build_text_fn(&resolve("{markerText: ['get', 'properties.name']}"));
    assert_eq!("✓", f(&named(json!(true))));
    assert_eq!("[2]", f(&named(json!([1, 2]))));
    assert_eq!("✕", f(&named(Value::Null)));
    assert_eq!("", f(&named(json!(0))));
  }

  #[test]
  fn text_literal_is_constant() {
    let f = build_text_fn(&resolve("{markerText: 'P'}"));
    assert_eq!("P", f(&named(json!("Alpha"))));
  }

  #[test]
  fn text_absent_or_unsupported_is_empty() {
    assert_eq!("", build_text_fn(&resolve("{}"))(&named(json!("Alpha"))));
    assert_eq!("", build_text_fn(&resolve("{markerText: {a: 1}}"))(&named(json!("Alpha"))));
  }

  #[test]
  fn text_from_fn() {
    let f = build_text_fn(&resolve(
      r#"{markerText: ['fn', 'x', 'return x.properties.name.length']}"#,
    ));
    assert_eq!("5", f(&named(json!("Alpha"))));
    // Reading through a missing property fails and degrades to null.
    assert_eq!("✕", f(&json!({"properties": {}})));
  }

  #[test]
  fn text_unknown_opcode_is_empty() {
    let f = build_text_fn(&resolve("{markerText: ['concat', 'a', 'b']}"));
    assert_eq!("", f(&named(json!("Alpha"))));
  }

  #[test]
  fn color_from_get_uses_fallback_for_falsy() {
    let f = build_color_fn(&resolve("{markerColor: ['get', 'properties.flag']}"), "gray");
    assert_eq!("gray", f(&json!({"properties": {"flag": false}})));
    assert_eq!("gray", f(&json!({"properties": {}})));
    assert_eq!("gray", f(&json!({"properties": {"flag": 0}})));
    assert_eq!("red", f(&json!({"properties": {"flag": "red"}})));
  }

  #[test]
  fn color_results_are_not_formatted() {
    let f = build_color_fn(&resolve("{markerColor: ['get', 'properties.c']}"), "gray");
    assert_eq!("true", f(&json!({"properties": {"c": true}})));
    assert_eq!("red", f(&json!({"properties": {"c": ["red"]}})));
    assert_eq!("7", f(&json!({"properties": {"c": 7}})));
  }

  #[test]
  fn color_from_fn() {
    let f = build_color_fn(
      &resolve(r#"{markerColor: ["fn", "f", "return f.properties.stage === 'C' ? 'gold' : null"]}"#),
      "gray",
    );
    assert_eq!("gold", f(&json!({"properties": {"stage": "C"}})));
    assert_eq!("gray", f(&json!({"properties": {"stage": "S"}})));
  }

  #[test]
  fn color_literal_and_absent() {
    assert_eq!("blue", build_color_fn(&resolve("{markerColor: 'blue'}"), "gray")(&json!({})));
    assert_eq!("gray", build_color_fn(&resolve("{}"), "gray")(&json!({})));
    assert_eq!("gray", build_color_fn(&resolve("{markerColor: ''}"), "gray")(&json!({})));
  }

  #[test]
  fn accessors_are_shareable_across_threads() {
    let f = build_text_fn(&resolve("{markerText: ['get', 'properties.name']}"));
    let handles: Vec<_> = (0..4)
      .map(|i| {
        let f = Arc::clone(&f);
        std::thread::spawn(move || f(&named(json!(format!("n{}", i)))))
      })
      .collect();
    let labels: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(vec!["n0", "n1", "n2", "n3"], labels);
  }
}
