//! This module defines the user feature schema: the per-layer configuration
//! document which controls how features are labeled, colored, filtered, and
//! edited.
//!
//! Schemas are authored as JSON5 text. The loosely typed document is sorted
//! once, when it is parsed, into the types below so that downstream code can
//! match on explicit variants instead of probing the shape of the raw value.
//! Only text which is not valid JSON5 (or is `null`) is rejected; any other
//! document is kept, with unexpected shapes carried as opaque values.

use std::convert::TryFrom;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SchemaError;
use crate::value::{format_value, is_truthy};

/// Version assigned to documents which do not declare one.
pub const DEFAULT_VERSION: &str = "1";

/// The editor marker meaning "show raw JSON, no structured form".
pub const JSON_EDITOR: &str = "json";

/// A resolved schema document.
///
/// Documents are immutable once built; reloading a layer configuration
/// replaces the whole document.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaDocument {
  pub version: String,
  pub editor: Editor,

  /// Fields eligible for tree based filtering, or `None` if filtering is
  /// disabled.
  pub filter: Option<Vec<String>>,

  pub marker_text: ExprSpec,
  pub marker_color: ExprSpec,

  /// Every other key of the source document, passed through unchanged.
  pub extra: Map<String, Value>,
}

/// How features of a layer are edited.
#[derive(Clone, Debug, PartialEq)]
pub enum Editor {
  /// Features are edited as raw JSON. Holds the marker string, usually
  /// [`JSON_EDITOR`].
  Json(String),

  /// Features are edited through a form built from these fields.
  Fields(Vec<FieldDefinition>),

  /// Any other value. No fields can be looked up in it.
  Other(Value),
}

/// Binds a feature property to an editor widget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
  /// The property key this definition describes.
  pub field: String,

  pub view: View,

  /// Any other keys (labels, hints, ...) are kept as-is.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A widget description: `["input"]`, `["select", ["A", "B"]]`, ...
///
/// The first element names the widget kind; whatever follows are widget
/// specific arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct View {
  pub kind: String,
  pub args: Vec<Value>,
}

/// Declarative description of a per-feature value.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprSpec {
  /// The key is not present.
  Absent,

  /// A constant value.
  Literal(String),

  /// An `[opcode, ...args]` tuple to compile.
  Tuple(Vec<Value>),

  /// Any other shape, including falsy values. Treated like `Absent` but
  /// kept so that the document serializes back unchanged.
  Other(Value),
}

impl SchemaDocument {
  /// The document used whenever configuration text cannot be parsed: a
  /// structured editor with a single `name` input.
  pub fn default_document() -> Self {
    SchemaDocument {
      version: DEFAULT_VERSION.to_string(),
      editor: Editor::Fields(vec![FieldDefinition::new("name", View::new("input"))]),
      filter: None,
      marker_text: ExprSpec::Absent,
      marker_color: ExprSpec::Absent,
      extra: Map::new(),
    }
  }

  /// Returns the field definition named `field`, or `None` if there isn't
  /// one or the editor is in raw JSON mode.
  pub fn get_field(&self, field: &str) -> Option<&FieldDefinition> {
    self.editor.fields().iter().find(|f| f.field == field)
  }

  /// The names of all fields eligible for filtering.
  pub fn filter_keys(&self) -> &[String] {
    self.filter.as_deref().unwrap_or(&[])
  }

  /// Converts this document back into a JSON object.
  pub fn to_value(&self) -> Value {
    let mut map = Map::new();
    map.insert("version".into(), Value::String(self.version.clone()));
    map.insert("editor".into(), self.editor.to_value());

    if let Some(filter) = &self.filter {
      let keys = filter.iter().cloned().map(Value::String).collect();
      map.insert("filter".into(), Value::Array(keys));
    }

    if let Some(v) = self.marker_text.to_value() {
      map.insert("markerText".into(), v);
    }

    if let Some(v) = self.marker_color.to_value() {
      map.insert("markerColor".into(), v);
    }

    for (k, v) in &self.extra {
      map.insert(k.clone(), v.clone());
    }

    Value::Object(map)
  }

  /// Builds a document from an already parsed JSON value.
  ///
  /// Only `null` is rejected. Any other non-object value carries no keys and
  /// yields a document with every default applied.
  pub fn from_value(value: Value) -> Result<Self, SchemaError> {
    let mut map = match value {
      Value::Object(map) => map,
      Value::Null => return Err(SchemaError::NullDocument),
      other => {
        debug!(document = %other, "schema is not an object, ignoring its contents");
        Map::new()
      }
    };

    let version = parse_version(map.remove("version"));
    let editor = Editor::from(map.remove("editor").unwrap_or(Value::Null));

    // Non-array filters disable filtering but are otherwise passed through.
    let filter = match map.remove("filter") {
      Some(Value::Array(items)) => Some(
        items
          .into_iter()
          .filter_map(|x| match x {
            Value::String(s) => Some(s),
            _ => None,
          })
          .collect(),
      ),
      Some(other) => {
        map.insert("filter".into(), other);
        None
      }
      None => None,
    };

    let marker_text = ExprSpec::from(map.remove("markerText"));
    let marker_color = ExprSpec::from(map.remove("markerColor"));

    Ok(SchemaDocument {
      version,
      editor,
      filter,
      marker_text,
      marker_color,
      extra: map,
    })
  }
}

impl Default for SchemaDocument {
  fn default() -> Self {
    Self::default_document()
  }
}

impl FromStr for SchemaDocument {
  type Err = SchemaError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_schema(s)
  }
}

impl Serialize for SchemaDocument {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_value().serialize(serializer)
  }
}

/// Missing or falsy versions default to "1". Strings are kept as they are,
/// numbers in their textual form and anything else as compact JSON.
fn parse_version(value: Option<Value>) -> String {
  match value {
    Some(v) if is_truthy(&v) => match v {
      Value::String(s) => s,
      v @ Value::Number(_) => format_value(&v),
      other => other.to_string(),
    },
    _ => DEFAULT_VERSION.to_string(),
  }
}

impl Editor {
  /// The raw JSON editor.
  pub fn json() -> Self {
    Editor::Json(JSON_EDITOR.to_string())
  }

  pub fn is_json(&self) -> bool {
    matches!(self, Editor::Json(_))
  }

  /// The structured fields, empty unless this is [`Editor::Fields`].
  pub fn fields(&self) -> &[FieldDefinition] {
    match self {
      Editor::Fields(fields) => &fields[..],
      Editor::Json(_) | Editor::Other(_) => &[],
    }
  }

  fn to_value(&self) -> Value {
    match self {
      Editor::Json(marker) => Value::String(marker.clone()),
      Editor::Fields(fields) => Value::Array(
        fields
          .iter()
          .map(|f| serde_json::to_value(f).unwrap_or(Value::Null))
          .collect(),
      ),
      Editor::Other(v) => v.clone(),
    }
  }
}

impl From<Value> for Editor {
  /// Falsy values select the raw JSON editor and strings keep their marker.
  /// An array is read as a list of field definitions, skipping entries which
  /// are not one.
  fn from(value: Value) -> Self {
    match value {
      v if !is_truthy(&v) => Editor::json(),
      Value::String(marker) => Editor::Json(marker),
      Value::Array(items) => Editor::Fields(
        items
          .into_iter()
          .enumerate()
          .filter_map(|(i, item)| FieldDefinition::from_entry(i, item))
          .collect(),
      ),
      other => Editor::Other(other),
    }
  }
}

impl FieldDefinition {
  pub fn new<S: Into<String>>(field: S, view: View) -> Self {
    FieldDefinition {
      field: field.into(),
      view,
      extra: Map::new(),
    }
  }

  /// Parses the `index`-th entry of an editor list, or returns `None` if it
  /// is not a field definition.
  fn from_entry(index: usize, value: Value) -> Option<Self> {
    match serde_json::from_value(value) {
      Ok(def) => Some(def),
      Err(e) => {
        debug!(index, error = %e, "skipping malformed editor entry");
        None
      }
    }
  }
}

impl View {
  pub fn new<S: Into<String>>(kind: S) -> Self {
    View {
      kind: kind.into(),
      args: Vec::new(),
    }
  }

  /// Constructs a `select` view offering `options`.
  pub fn select<I: IntoIterator<Item = Value>>(options: I) -> Self {
    View {
      kind: "select".to_string(),
      args: vec![Value::Array(options.into_iter().collect())],
    }
  }

  /// True if this is a `select` widget.
  pub fn is_select(&self) -> bool {
    self.kind == "select"
  }
}

impl TryFrom<Vec<Value>> for View {
  type Error = String;

  fn try_from(mut items: Vec<Value>) -> Result<Self, Self::Error> {
    if items.is_empty() {
      return Err("view must name a widget kind".to_string());
    }

    match items.remove(0) {
      Value::String(kind) => Ok(View { kind, args: items }),
      other => Err(format!("view kind must be a string, found: {}", other)),
    }
  }
}

impl From<View> for Vec<Value> {
  fn from(view: View) -> Self {
    let mut items = Vec::with_capacity(view.args.len() + 1);
    items.push(Value::String(view.kind));
    items.extend(view.args);
    items
  }
}

impl ExprSpec {
  fn to_value(&self) -> Option<Value> {
    match self {
      ExprSpec::Absent => None,
      ExprSpec::Literal(s) => Some(Value::String(s.clone())),
      ExprSpec::Tuple(items) => Some(Value::Array(items.clone())),
      ExprSpec::Other(v) => Some(v.clone()),
    }
  }
}

impl From<Option<Value>> for ExprSpec {
  fn from(value: Option<Value>) -> Self {
    match value {
      None => ExprSpec::Absent,
      Some(Value::String(s)) if !s.is_empty() => ExprSpec::Literal(s),
      Some(Value::Array(items)) => ExprSpec::Tuple(items),
      Some(other) => ExprSpec::Other(other),
    }
  }
}

/// Parses JSON5 configuration text into a schema document.
pub fn parse_schema(code: &str) -> Result<SchemaDocument, SchemaError> {
  let value: Value = json5::from_str(code).map_err(|e| SchemaError::Parse(e.to_string()))?;
  SchemaDocument::from_value(value)
}

/// Parses JSON5 configuration text into a schema document, falling back to
/// [`SchemaDocument::default_document`] if the text is not valid JSON5 or is
/// `null`.
///
/// This never fails.
pub fn resolve(code: &str) -> SchemaDocument {
  parse_schema(code).unwrap_or_else(|e| {
    debug!(error = %e, "using default schema");
    SchemaDocument::default_document()
  })
}
