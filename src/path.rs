//! Deep property paths such as `properties.tags[0]` or `a["b.c"]`.
//!
//! A path is a sequence of keys which are applied one after the other to a
//! JSON value. Keys are looked up as member names on objects and as indices
//! on arrays and strings, so `a.0` and `a[0]` are equivalent. `length` reads
//! the length of an array or string.

use std::borrow::Cow;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde_json::Value;

use crate::error::PathError;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Path {
  /// The unparsed path, if this path was built from a string.
  ///
  /// A literal member with this exact name takes precedence over the parsed
  /// segments, so `{"a.b": 1}` is reachable through the path `a.b`.
  raw: Option<String>,
  segments: Vec<String>,
}

impl Path {
  /// Parses a dotted/indexed path string.
  ///
  /// ```
  /// # use layer_schema::path::Path;
  /// let path = Path::parse("properties.tags[0]").unwrap();
  /// assert_eq!(path.segments(), &["properties", "tags", "0"]);
  /// ```
  pub fn parse(raw: &str) -> Result<Self, PathError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut after_bracket = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
      match c {
        '.' => {
          if !after_bracket {
            segments.push(std::mem::take(&mut current));
          }
          after_bracket = false;
        }

        '[' => {
          if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
          }

          let key = match chars.peek() {
            Some(&quote) if quote == '"' || quote == '\'' => {
              chars.next();
              let key = read_quoted(&mut chars, quote)
                .ok_or_else(|| PathError::UnterminatedQuote(raw.to_string()))?;
              if chars.next() != Some(']') {
                return Err(PathError::ExpectedBracket(raw.to_string()));
              }
              key
            }
            _ => {
              let mut key = String::new();
              loop {
                match chars.next() {
                  Some(']') => break,
                  Some(ch) => key.push(ch),
                  None => {
                    return Err(PathError::UnclosedBracket(raw.to_string()))
                  }
                }
              }
              let key = key.trim().to_string();
              if key.is_empty() {
                return Err(PathError::EmptyIndex(raw.to_string()));
              }
              key
            }
          };

          segments.push(key);
          after_bracket = true;
        }

        c => {
          after_bracket = false;
          current.push(c);
        }
      }
    }

    if !current.is_empty() || segments.is_empty() {
      segments.push(current);
    }

    Ok(Path {
      raw: Some(raw.to_string()),
      segments,
    })
  }

  /// Constructs a path from pre-split segments.
  pub fn from_segments<S, I>(segments: I) -> Self
  where
    S: Into<String>,
    I: IntoIterator<Item = S>,
  {
    Path {
      raw: None,
      segments: segments.into_iter().map(Into::into).collect(),
    }
  }

  /// Builds a path from a JSON value: either a path string, a single integer
  /// index, or an array of string/integer segments.
  pub fn from_value(value: &Value) -> Result<Self, PathError> {
    match value {
      Value::String(s) => Path::parse(s),
      Value::Number(n) if n.is_u64() => Ok(Path::from_segments(vec![n.to_string()])),
      Value::Array(items) => items
        .iter()
        .map(|item| match item {
          Value::String(s) => Ok(s.clone()),
          Value::Number(n) if n.is_u64() => Ok(n.to_string()),
          other => Err(PathError::InvalidSegment(other.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Path::from_segments),
      other => Err(PathError::InvalidSegment(other.to_string())),
    }
  }

  pub fn segments(&self) -> &[String] {
    &self.segments[..]
  }

  /// Follows this path from `root`.
  ///
  /// Returns `None` as soon as a segment cannot be resolved. Note that a
  /// present `null` is returned as `Some(&Value::Null)`.
  pub fn lookup<'a>(&self, root: &'a Value) -> Option<Cow<'a, Value>> {
    if let (Some(raw), Value::Object(map)) = (&self.raw, root) {
      if let Some(v) = map.get(raw) {
        return Some(Cow::Borrowed(v));
      }
    }

    self
      .segments
      .iter()
      .try_fold(Cow::Borrowed(root), |value, segment| match value {
        Cow::Borrowed(v) => step(v, segment),
        Cow::Owned(v) => step(&v, segment).map(|x| Cow::Owned(x.into_owned())),
      })
  }
}

impl Display for Path {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match &self.raw {
      Some(raw) => write!(f, "{}", raw),
      None => write!(f, "{}", self.segments.join(".")),
    }
  }
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<Cow<'a, Value>> {
  let index = || segment.parse::<usize>().ok();

  match value {
    Value::Object(map) => map.get(segment).map(Cow::Borrowed),
    Value::Array(items) if segment == "length" => Some(Cow::Owned(Value::from(items.len()))),
    Value::Array(items) => index().and_then(|i| items.get(i)).map(Cow::Borrowed),
    Value::String(s) if segment == "length" => {
      Some(Cow::Owned(Value::from(s.chars().count())))
    }
    Value::String(s) => index()
      .and_then(|i| s.chars().nth(i))
      .map(|c| Cow::Owned(Value::String(c.to_string()))),
    _ => None,
  }
}

/// Reads a quoted key up to (and consuming) the closing `quote`. Backslash
/// escapes the next character.
fn read_quoted<I>(chars: &mut I, quote: char) -> Option<String>
where
  I: Iterator<Item = char>,
{
  let mut key = String::new();
  loop {
    match chars.next()? {
      '\\' => key.push(chars.next()?),
      c if c == quote => return Some(key),
      c => key.push(c),
    }
  }
}
