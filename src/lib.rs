//! Resolution of user feature schemas and the per-feature functions derived
//! from them.
//!
//! A schema is a small JSON5 document attached to a map layer. It declares
//! how features are edited, which fields may be used to filter the layer,
//! and how markers are labeled and colored:
//!
//! ```
//! use layer_schema::{build_color_fn, build_filter_tree, build_text_fn, resolve};
//! use serde_json::json;
//!
//! let schema = resolve(r#"{
//!   filter: ["stage"],
//!   editor: [{ field: "stage", view: ["select", ["C", "S"]] }],
//!   markerText: ["get", "properties.name"],
//!   markerColor: ["fn", "x", "return x.properties.stage === 'C' ? 'red' : null"],
//! }"#);
//!
//! let feature = json!({"properties": {"name": "Alpha", "stage": "C"}});
//! assert_eq!("Alpha", build_text_fn(&schema)(&feature));
//! assert_eq!("red", build_color_fn(&schema, "gray")(&feature));
//!
//! let tree = build_filter_tree(&schema).unwrap().unwrap();
//! assert_eq!(2, tree.all_tree_keys.len());
//! ```

pub mod accessor;
pub mod compile;
pub mod error;
pub mod expr;
pub mod filter;
pub mod path;
pub mod schema;
pub mod value;

pub use accessor::{build_color_fn, build_text_fn, DisplayFn};
pub use compile::{compile, Accessor};
pub use error::SchemaError;
pub use filter::{build_filter_tree, tree_key, FilterTree};
pub use schema::{parse_schema, resolve, SchemaDocument};
pub use value::format_value;
