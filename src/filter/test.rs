use super::*;
use crate::schema::resolve;
use pretty_assertions::assert_eq;
use serde_json::json;

fn stage_schema() -> SchemaDocument {
  resolve(
    r#"{
      filter: ["stage"],
      editor: [
        { field: "name", view: ["input"] },
        { field: "stage", view: ["select", ["C", "S"]] },
      ],
    }"#,
  )
}

fn build(schema: &SchemaDocument) -> FilterTree {
  build_filter_tree(schema)
    .expect("failed to build tree")
    .expect("schema has no filter")
}

#[test]
fn tree_key_round_trip() {
  let key = tree_key("stage", "C");
  assert_eq!(Some(("stage", "C")), split_tree_key(&key));
  assert_eq!(None, split_tree_key("stage-C"));
}

#[test]
fn tree_keys_do_not_collide() {
  assert!(tree_key("a-b", "c") != tree_key("a", "b-c"));
}

#[test]
fn single_select_field() {
  let tree = build(&stage_schema());

  assert_eq!(1, tree.tree.len());
  let node = &tree.tree[0];
  assert_eq!("stage", node.title);
  assert_eq!("stage", node.key);
  assert_eq!("stage", node.field);
  assert_eq!(Value::Null, node.value);

  let keys: Vec<_> = node.children().iter().map(|c| c.key.clone()).collect();
  assert_eq!(vec![tree_key("stage", "C"), tree_key("stage", "S")], keys);
  assert_eq!(keys, tree.all_tree_keys);

  let child = &node.children()[1];
  assert_eq!("S", child.title);
  assert_eq!(json!("S"), child.value);
  assert_eq!("stage", child.field);
  assert_eq!(None, child.children);
}

#[test]
fn reverse_lookup() {
  let tree = build(&stage_schema());
  assert_eq!(Some(("stage", &json!("C"))), tree.lookup(&tree_key("stage", "C")));
  assert_eq!(None, tree.lookup(&tree_key("stage", "X")));
  assert_eq!(2, tree.tree_keys.len());
}

#[test]
fn no_filter_is_none() {
  let schema = resolve(r#"{editor: [{field: "stage", view: ["select", ["C"]]}]}"#);
  assert_eq!(Ok(None), build_filter_tree(&schema));

  let schema = resolve(r#"{filter: "stage"}"#);
  assert_eq!(Ok(None), build_filter_tree(&schema));
}

#[test]
fn missing_field_is_skipped() {
  let schema = resolve(r#"{filter: ["missingField"], editor: [{field: "a", view: ["input"]}]}"#);
  let tree = build(&schema);
  assert!(tree.is_empty());
  assert!(tree.all_tree_keys.is_empty());
}

#[test]
fn non_select_field_is_skipped() {
  let schema = resolve(r#"{filter: ["name", "stage"], editor: [{field: "name", view: ["input"]}, {field: "stage", view: ["select", ["C"]]}]}"#);
  let tree = build(&schema);
  assert_eq!(1, tree.tree.len());
  assert_eq!("stage", tree.tree[0].field);
}

#[test]
fn json_editor_yields_empty_tree() {
  let schema = resolve(r#"{filter: ["stage"], editor: "json"}"#);
  assert!(build(&schema).is_empty());
}

#[test]
fn nodes_follow_filter_order() {
  let schema = resolve(
    r#"{
      filter: ["b", "a", "b"],
      editor: [
        { field: "a", view: ["select", ["1"]] },
        { field: "b", view: ["select", ["2", "3"]] },
      ],
    }"#,
  );
  let tree = build(&schema);
  let fields: Vec<_> = tree.tree.iter().map(|n| n.field.as_str()).collect();
  assert_eq!(vec!["b", "a"], fields);
  assert_eq!(
    vec![tree_key("b", "2"), tree_key("b", "3"), tree_key("a", "1")],
    tree.all_tree_keys
  );
}

#[test]
fn scalar_options_are_accepted() {
  let schema = resolve(r#"{filter: ["n"], editor: [{field: "n", view: ["select", [1, true]]}]}"#);
  let tree = build(&schema);
  let titles: Vec<_> = tree.tree[0].children().iter().map(|c| c.title.as_str()).collect();
  assert_eq!(vec!["1", "true"], titles);
  assert_eq!(json!(true), tree.tree[0].children()[1].value);
}

#[test]
fn select_without_options_is_an_error() {
  let schema = resolve(r#"{filter: ["stage"], editor: [{field: "stage", view: ["select"]}]}"#);
  assert_eq!(
    Err(SchemaError::field("stage", "select options must be an array")),
    build_filter_tree(&schema)
  );

  let schema = resolve(r#"{filter: ["stage"], editor: [{field: "stage", view: ["select", "C"]}]}"#);
  assert!(build_filter_tree(&schema).is_err());
}

#[test]
fn invalid_options_are_errors() {
  let schema = resolve(r#"{filter: ["s"], editor: [{field: "s", view: ["select", [{}]]}]}"#);
  assert!(build_filter_tree(&schema).is_err());

  let schema = resolve(r#"{filter: ["s"], editor: [{field: "s", view: ["select", ["C", "C"]]}]}"#);
  assert!(matches!(
    build_filter_tree(&schema),
    Err(SchemaError::InvalidFieldDefinition { ref reason, .. }) if reason.contains("duplicate")
  ));

  let schema = resolve(r#"{filter: ["s"], editor: [{field: "s", view: ["select", ["a\u001fb"]]}]}"#);
  assert!(build_filter_tree(&schema).is_err());
}

#[test]
fn separator_in_filter_field_is_an_error() {
  let schema = resolve(r#"{filter: ["a\u001fb"], editor: [{field: "a\u001fb", view: ["select", ["x"]]}]}"#);
  assert_eq!(1, schema.editor.fields().len());
  assert!(matches!(
    build_filter_tree(&schema),
    Err(SchemaError::InvalidFieldDefinition { ref field, .. }) if field == "a\u{1f}b"
  ));
}

#[test]
fn empty_select_keeps_children_list() {
  let schema = resolve(r#"{filter: ["s"], editor: [{field: "s", view: ["select", []]}]}"#);
  let tree = build(&schema);
  assert_eq!(Some(Vec::new()), tree.tree[0].children);

  let value = serde_json::to_value(&tree).unwrap();
  assert_eq!(json!([]), value["tree"][0]["children"]);
}

#[test]
fn feature_keys_and_matching() {
  let tree = build(&stage_schema());
  let c = json!({"properties": {"stage": "C"}});
  let s = json!({"properties": {"stage": "S"}});
  let both = json!({"properties": {"stage": ["C", "S", "unknown"]}});
  let none = json!({"properties": {"name": "x"}});

  assert_eq!(vec![tree_key("stage", "C")], tree.feature_keys(&c));
  assert_eq!(
    vec![tree_key("stage", "C"), tree_key("stage", "S")],
    tree.feature_keys(&both)
  );

  let checked: HashSet<String> = vec![tree_key("stage", "C")].into_iter().collect();
  assert!(tree.matches(&c, &checked));
  assert!(!tree.matches(&s, &checked));
  assert!(!tree.matches(&both, &checked));
  assert!(tree.matches(&none, &checked));
}

#[test]
fn serializes_camel_case() {
  let tree = build(&stage_schema());
  let value = serde_json::to_value(&tree).unwrap();
  assert!(value.get("allTreeKeys").is_some());
  assert_eq!(
    json!(["stage", "C"]),
    value["treeKeys"][tree_key("stage", "C").as_str()]
  );
  assert!(value["tree"][0]["children"][0].get("children").is_none());
}
