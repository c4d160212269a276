use anyhow::{bail, Context, Result};
use layer_schema::{
  build_color_fn, build_filter_tree, build_text_fn, parse_schema, resolve, tree_key,
  FilterTree, SchemaDocument,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(
  name = "layer-schema",
  about = "Resolves a map layer schema and applies it to GeoJSON features"
)]
struct Opt {
  /// Marker color used when the schema does not produce one
  #[structopt(
    long,
    default_value = "gray",
    env = "LAYER_SCHEMA_FALLBACK_COLOR"
  )]
  fallback_color: String,

  /// Emit YAML instead of JSON
  #[structopt(long)]
  yaml: bool,

  /// Print the filter tree derived from the schema
  #[structopt(long)]
  tree: bool,

  /// Only list features whose filter values are all checked (field=value)
  #[structopt(long = "check", number_of_values = 1)]
  checked: Vec<String>,

  /// Fail instead of falling back to the default schema
  #[structopt(long)]
  strict: bool,

  /// Path to the layer schema (JSON5)
  schema: PathBuf,

  /// Path to the features (GeoJSON)
  features: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
  schema: &'a SchemaDocument,

  #[serde(skip_serializing_if = "Option::is_none")]
  filter_tree: Option<&'a FilterTree>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  features: Vec<FeatureRow>,
}

#[derive(Serialize)]
struct FeatureRow {
  index: usize,
  id: Value,
  text: String,
  color: String,
}

fn load_schema(opt: &Opt) -> Result<SchemaDocument> {
  let code = fs::read_to_string(&opt.schema)
    .with_context(|| format!("reading schema {}", opt.schema.display()))?;

  if opt.strict {
    parse_schema(&code).with_context(|| format!("parsing schema {}", opt.schema.display()))
  } else {
    Ok(resolve(&code))
  }
}

/// Accepts a FeatureCollection, a bare array of features, or a single
/// feature.
fn load_features(path: &Path) -> Result<Vec<Value>> {
  let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
  let value: Value = serde_json::from_reader(file)
    .with_context(|| format!("parsing features {}", path.display()))?;

  match value {
    Value::Object(mut map) => match map.remove("features") {
      Some(Value::Array(features)) => Ok(features),
      Some(_) => bail!("'features' must be an array"),
      None => Ok(vec![Value::Object(map)]),
    },
    Value::Array(features) => Ok(features),
    _ => bail!("expected a GeoJSON feature or feature collection"),
  }
}

/// Converts `field=value` arguments into composite filter keys.
fn checked_keys(args: &[String]) -> Result<HashSet<String>> {
  args
    .iter()
    .map(|arg| match arg.split_once('=') {
      Some((field, value)) => Ok(tree_key(field, value)),
      None => bail!("expected field=value, found: {}", arg),
    })
    .collect()
}

fn feature_id(feature: &Value) -> Value {
  feature
    .get("id")
    .or_else(|| feature.pointer("/properties/id"))
    .cloned()
    .unwrap_or(Value::Null)
}

fn run(opt: &Opt) -> Result<()> {
  let schema = load_schema(opt)?;

  let tree = if opt.tree || !opt.checked.is_empty() {
    build_filter_tree(&schema).context("building filter tree")?
  } else {
    None
  };
  let checked = checked_keys(&opt.checked)?;

  let mut rows = Vec::new();
  if let Some(path) = &opt.features {
    let text = build_text_fn(&schema);
    let color = build_color_fn(&schema, &opt.fallback_color);
    let features = load_features(path)?;
    info!(count = features.len(), "loaded features");

    for (index, feature) in features.iter().enumerate() {
      let selected = match (&tree, checked.is_empty()) {
        (Some(tree), false) => tree.matches(feature, &checked),
        _ => true,
      };
      if !selected {
        continue;
      }

      rows.push(FeatureRow {
        index,
        id: feature_id(feature),
        text: text(feature),
        color: color(feature),
      });
    }
  }

  let report = Report {
    schema: &schema,
    filter_tree: if opt.tree { tree.as_ref() } else { None },
    features: rows,
  };

  let out = if opt.yaml {
    serde_yaml::to_string(&report)?
  } else {
    serde_json::to_string_pretty(&report)?
  };
  println!("{}", out);

  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let opt = Opt::from_args();
  run(&opt)
}
