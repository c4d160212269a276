//! Error types shared between the schema resolver and the filter tree
//! builder.

use thiserror::Error;

/// Reasons a schema document could not be built from configuration text, or
/// a filter tree could not be built from a schema.
///
/// Callers that go through [`resolve`] never observe the first two; they are
/// recovered locally by falling back to the default document. They are
/// surfaced by [`parse_schema`]. The filter tree builder reports a broken
/// `select` definition as `InvalidFieldDefinition`.
///
/// [`resolve`]: crate::schema::resolve
/// [`parse_schema`]: crate::schema::parse_schema
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
  #[error("schema text is not valid JSON5: {0}")]
  Parse(String),

  #[error("schema document is null")]
  NullDocument,

  #[error("invalid definition for field '{field}': {reason}")]
  InvalidFieldDefinition { field: String, reason: String },
}

impl SchemaError {
  pub(crate) fn field<F, R>(field: F, reason: R) -> Self
  where
    F: Into<String>,
    R: Into<String>,
  {
    SchemaError::InvalidFieldDefinition {
      field: field.into(),
      reason: reason.into(),
    }
  }
}

/// Errors produced while parsing a property path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
  #[error("unclosed '[' in path: {0}")]
  UnclosedBracket(String),

  #[error("unterminated quoted key in path: {0}")]
  UnterminatedQuote(String),

  #[error("expected ']' after quoted key in path: {0}")]
  ExpectedBracket(String),

  #[error("empty index in path: {0}")]
  EmptyIndex(String),

  #[error("path segments must be strings or integers, found: {0}")]
  InvalidSegment(String),
}
