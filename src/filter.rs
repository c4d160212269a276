//! Derivation of the filter tree: a two level hierarchy listing, for every
//! filterable `select` field, the values a user may check.
//!
//! Every leaf is identified by a composite key built from its field name and
//! value (see [`tree_key`]). Alongside the tree, the builder produces a
//! mapping from composite keys back to `(field, value)` pairs and a flat list
//! of every key, both filled in during the same pass which builds the tree.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::SchemaError;
use crate::schema::SchemaDocument;
use crate::value::{format_number, number_to_f64};

#[cfg(test)]
mod test;

/// Joins the field and value parts of a composite key.
///
/// Filter fields and select options containing it are rejected when the tree
/// is built, so splitting a key at the first separator is unambiguous.
pub const TREE_KEY_SEPARATOR: char = '\u{1f}';

/// Builds the composite key for `value` of `field`.
pub fn tree_key(field: &str, value: &str) -> String {
  let mut key = String::with_capacity(field.len() + value.len() + 1);
  key.push_str(field);
  key.push(TREE_KEY_SEPARATOR);
  key.push_str(value);
  key
}

/// Splits a composite key into its field and value parts.
pub fn split_tree_key(key: &str) -> Option<(&str, &str)> {
  let i = key.find(TREE_KEY_SEPARATOR)?;
  Some((&key[..i], &key[i + TREE_KEY_SEPARATOR.len_utf8()..]))
}

/// A node of the filter tree.
///
/// Top level nodes describe a field: their key is the field name, their
/// value is `null` and they always carry a (possibly empty) list of
/// children. Leaves describe one selectable value of that field and have no
/// children list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterNode {
  pub title: String,
  pub key: String,
  pub field: String,
  pub value: Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub children: Option<Vec<FilterNode>>,
}

impl FilterNode {
  pub fn children(&self) -> &[FilterNode] {
    self.children.as_deref().unwrap_or(&[])
  }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTree {
  pub tree: Vec<FilterNode>,

  /// Composite key to `(field, value)`.
  pub tree_keys: BTreeMap<String, (String, Value)>,

  /// Every composite key in tree order.
  pub all_tree_keys: Vec<String>,
}

impl FilterTree {
  pub fn is_empty(&self) -> bool {
    self.tree.is_empty()
  }

  /// Resolves a composite key back into its field and value.
  pub fn lookup(&self, key: &str) -> Option<(&str, &Value)> {
    self
      .tree_keys
      .get(key)
      .map(|(field, value)| (field.as_str(), value))
  }

  /// The composite keys `feature` carries, limited to keys present in this
  /// tree.
  ///
  /// For every filterable field the feature property of the same name is
  /// read from `feature.properties`; array valued properties contribute one
  /// key per element.
  pub fn feature_keys(&self, feature: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    for node in &self.tree {
      let prop = match feature.get("properties").and_then(|p| p.get(&node.field)) {
        Some(prop) => prop,
        None => continue,
      };

      let values = match prop {
        Value::Array(items) => &items[..],
        other => std::slice::from_ref(other),
      };

      for v in values {
        if let Some(title) = scalar_title(v) {
          let key = tree_key(&node.field, &title);
          if self.tree_keys.contains_key(&key) {
            keys.push(key);
          }
        }
      }
    }
    keys
  }

  /// True if every key `feature` carries is in `checked`.
  ///
  /// Features which carry no keys always match.
  pub fn matches(&self, feature: &Value, checked: &HashSet<String>) -> bool {
    self
      .feature_keys(feature)
      .iter()
      .all(|key| checked.contains(key))
  }
}

/// Renders a select option as a node title. Only strings, numbers, and
/// booleans may be options.
fn scalar_title(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) if n.is_f64() => Some(format_number(number_to_f64(n))),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Builds the filter tree for `schema`.
///
/// Returns `Ok(None)` when the schema does not declare a `filter` list.
/// Filter entries naming a field which is not in the editor, or which is not
/// a `select`, are skipped. A `select` whose options are not an array of
/// distinct scalars is a configuration error.
pub fn build_filter_tree(schema: &SchemaDocument) -> Result<Option<FilterTree>, SchemaError> {
  let fields = match &schema.filter {
    Some(fields) => fields,
    None => return Ok(None),
  };

  let mut out = FilterTree::default();
  let mut seen = HashSet::new();

  for field in fields {
    let def = match schema.get_field(field) {
      Some(def) if def.view.is_select() => def,
      Some(def) => {
        debug!(%field, kind = %def.view.kind, "skipping non-select filter field");
        continue;
      }
      None => {
        debug!(%field, "skipping unknown filter field");
        continue;
      }
    };

    if !seen.insert(field.as_str()) {
      debug!(%field, "skipping repeated filter field");
      continue;
    }

    if field.contains(TREE_KEY_SEPARATOR) {
      return Err(SchemaError::field(
        field.as_str(),
        "filter fields may not contain the filter key separator",
      ));
    }

    let options = match def.view.args.first() {
      Some(Value::Array(options)) => options,
      _ => {
        return Err(SchemaError::field(
          field.as_str(),
          "select options must be an array",
        ))
      }
    };

    let mut children = Vec::with_capacity(options.len());
    for option in options {
      let title = scalar_title(option).ok_or_else(|| {
        SchemaError::field(field.as_str(), format!("invalid select option: {}", option))
      })?;

      if title.contains(TREE_KEY_SEPARATOR) {
        return Err(SchemaError::field(
          field.as_str(),
          "select options may not contain the filter key separator",
        ));
      }

      let key = tree_key(field, &title);
      if out.tree_keys.contains_key(&key) {
        return Err(SchemaError::field(
          field.as_str(),
          format!("duplicate select option: {}", title),
        ));
      }

      out.all_tree_keys.push(key.clone());
      out
        .tree_keys
        .insert(key.clone(), (field.clone(), option.clone()));

      children.push(FilterNode {
        title,
        key,
        field: field.clone(),
        value: option.clone(),
        children: None,
      });
    }

    out.tree.push(FilterNode {
      title: field.clone(),
      key: field.clone(),
      field: field.clone(),
      value: Value::Null,
      children: Some(children),
    });
  }

  Ok(Some(out))
}
