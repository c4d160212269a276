//! Compilation of expression tuples such as `["get", "properties.name"]` or
//! `["fn", "x", "return x.id"]` into per-feature accessors.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::error::PathError;
use crate::expr::{ExprError, Function};
use crate::path::Path;

/// A compiled per-feature computation.
///
/// Accessors never fail: evaluation problems are logged and degrade to
/// `null`.
pub type Accessor = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
  #[error("invalid path for 'get': {0}")]
  Path(#[from] PathError),

  #[error("invalid body for 'fn': {0}")]
  Expr(#[from] ExprError),

  #[error("arguments to 'fn' must be strings, found: {0}")]
  NonStringArgument(String),
}

/// The recognized opcodes of an expression tuple.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
  /// Deep property lookup; yields `""` when the path does not resolve.
  Get(Path),

  /// Restricted function evaluated with the feature as first argument.
  Fn(Function),

  /// Any opcode that is not recognized; always yields `""`.
  Empty,
}

impl Expression {
  /// Builds an expression from an opcode and its arguments.
  pub fn new(op: &str, args: &[Value]) -> Result<Self, CompileError> {
    match op {
      "get" => match args.first() {
        // A missing path never resolves.
        None | Some(Value::Null) => Ok(Expression::Empty),
        Some(path) => Ok(Expression::Get(Path::from_value(path)?)),
      },

      "fn" => {
        let mut strings = args
          .iter()
          .map(|a| match a {
            Value::String(s) => Ok(s.clone()),
            other => Err(CompileError::NonStringArgument(other.to_string())),
          })
          .collect::<Result<Vec<_>, _>>()?;

        let body = strings.pop().unwrap_or_default();
        Ok(Expression::Fn(Function::new(strings, &body)?))
      }

      _ => Ok(Expression::Empty),
    }
  }

  /// Builds an expression from a tuple whose first element is the opcode.
  ///
  /// A tuple whose head is not a string is treated like an unknown opcode.
  pub fn from_tuple(tuple: &[Value]) -> Result<Self, CompileError> {
    match tuple.split_first() {
      Some((Value::String(op), args)) => Expression::new(op, args),
      _ => Ok(Expression::Empty),
    }
  }

  /// Evaluates this expression against `feature`.
  pub fn evaluate(&self, feature: &Value) -> Value {
    match self {
      Expression::Get(path) => path
        .lookup(feature)
        .map(Cow::into_owned)
        .unwrap_or_else(|| Value::String(String::new())),

      Expression::Fn(f) => f.call(feature).unwrap_or_else(|e| {
        warn!(op = "fn", error = %e, "expression evaluation failed");
        Value::Null
      }),

      Expression::Empty => Value::String(String::new()),
    }
  }
}

/// Compiles `op` and `args` into an accessor.
///
/// Compilation problems do not propagate: they are logged once and the
/// returned accessor yields `null` for every feature.
pub fn compile(op: &str, args: &[Value]) -> Accessor {
  into_accessor(op, Expression::new(op, args))
}

/// Like [`compile`] but takes the whole `[op, ...args]` tuple.
pub fn compile_tuple(tuple: &[Value]) -> Accessor {
  let op = tuple.first().and_then(Value::as_str).unwrap_or_default();
  into_accessor(op, Expression::from_tuple(tuple))
}

fn into_accessor(op: &str, expr: Result<Expression, CompileError>) -> Accessor {
  match expr {
    Ok(expr) => Arc::new(move |feature: &Value| expr.evaluate(feature)),
    Err(e) => {
      warn!(op, error = %e, "failed to compile expression");
      Arc::new(|_: &Value| Value::Null)
    }
  }
}
