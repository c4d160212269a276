//! A small, sandboxed expression language used for computed marker values.
//!
//! Schemas may declare a per-feature computation as
//! `["fn", "x", "return x.properties.stage === 'C' ? 'red' : 'blue'"]`: every
//! argument but the last names a parameter and the last one is the body. The
//! body is a single expression (optionally prefixed with `return` and
//! terminated by `;`) written in a restricted subset of the usual scripting
//! syntax:
//!
//! - literals: numbers, quoted strings, `true`, `false`, `null`, `undefined`
//! - parameter references (nothing else is in scope)
//! - member access `a.b`, computed access `a[b]`, and `.length`
//! - unary `!`, `-`, `+`
//! - binary `* / % + - < <= > >= == != === !==`
//! - logical `&&`, `||`, `??` and the conditional `c ? a : b`
//! - a fixed set of string/array methods, see [`Method`]
//!
//! Bodies are parsed once when the accessor is built. Anything outside the
//! grammar is rejected at that point rather than at evaluation time.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use crate::value::{coerce_to_string, format_number, is_truthy, number_to_f64, number_value};

/// Errors raised while parsing a function body.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
  #[error("unexpected character '{0}' at offset {1}")]
  UnexpectedChar(char, usize),

  #[error("unterminated string literal")]
  UnterminatedString,

  #[error("invalid number literal '{0}'")]
  InvalidNumber(String),

  #[error("unexpected token '{0}'")]
  UnexpectedToken(String),

  #[error("unexpected end of expression")]
  UnexpectedEnd,

  #[error("unknown identifier '{0}'")]
  UnknownIdentifier(String),

  #[error("invalid parameter name '{0}'")]
  InvalidParameter(String),

  #[error("unsupported construct: {0}")]
  Unsupported(String),
}

/// Errors raised while evaluating a parsed expression against a feature.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
  #[error("cannot read property '{0}' of null")]
  NullAccess(String),

  #[error("cannot call '{method}' on {found}")]
  NotCallable { method: &'static str, found: String },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
  Num(f64),
  Str(String),
  Ident(String),
  Punct(&'static str),
}

impl Token {
  fn describe(&self) -> String {
    match self {
      Token::Num(x) => format_number(*x),
      Token::Str(s) => format!("{:?}", s),
      Token::Ident(s) => s.clone(),
      Token::Punct(p) => p.to_string(),
    }
  }
}

/// Punctuators ordered so that longer operators match first.
const PUNCTUATORS: &[&str] = &[
  "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "<", ">", "+", "-",
  "*", "/", "%", "!", "(", ")", "[", "]", ".", ",", "?", ":", ";",
];

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
  let mut tokens = Vec::new();
  let mut offset = 0;

  while let Some(c) = src[offset..].chars().next() {
    let rest = &src[offset..];

    if c.is_whitespace() {
      offset += c.len_utf8();
      continue;
    }

    let starts_number = c.is_ascii_digit()
      || (c == '.' && rest[1..].starts_with(|d: char| d.is_ascii_digit()));

    let (token, len) = if starts_number {
      let len = rest
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '.'))
        .unwrap_or_else(|| rest.len());
      let text = &rest[..len];
      let x = text
        .parse::<f64>()
        .map_err(|_| ExprError::InvalidNumber(text.to_string()))?;
      (Token::Num(x), len)
    } else if c == '"' || c == '\'' {
      let (s, len) = lex_string(rest, c)?;
      (Token::Str(s), len)
    } else if c.is_alphabetic() || c == '_' || c == '$' {
      let len = rest
        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
        .unwrap_or_else(|| rest.len());
      (Token::Ident(rest[..len].to_string()), len)
    } else if let Some(&p) = PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) {
      (Token::Punct(p), p.len())
    } else {
      return Err(ExprError::UnexpectedChar(c, offset));
    };

    tokens.push(token);
    offset += len;
  }

  Ok(tokens)
}

/// Lexes a string literal at the start of `src`, which begins with the
/// opening `quote`. Returns the unescaped contents and the number of source
/// bytes consumed.
fn lex_string(src: &str, quote: char) -> Result<(String, usize), ExprError> {
  let mut out = String::new();
  let mut chars = src.char_indices().skip(1);

  while let Some((_, c)) = chars.next() {
    match c {
      '\\' => {
        let (_, e) = chars.next().ok_or(ExprError::UnterminatedString)?;
        out.push(match e {
          'n' => '\n',
          't' => '\t',
          'r' => '\r',
          '0' => '\0',
          other => other,
        });
      }
      c if c == quote => {
        let end = chars.next().map_or_else(|| src.len(), |(i, _)| i);
        return Ok((out, end));
      }
      c => out.push(c),
    }
  }

  Err(ExprError::UnterminatedString)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnaryOp {
  Not,
  Neg,
  Plus,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Lt,
  Le,
  Gt,
  Ge,
  LooseEq,
  LooseNe,
  StrictEq,
  StrictNe,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogicalOp {
  And,
  Or,
  Nullish,
}

/// The methods callable from an expression body.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Method {
  ToUpperCase,
  ToLowerCase,
  Trim,
  Includes,
  StartsWith,
  EndsWith,
  Join,
}

impl Method {
  fn lookup(name: &str) -> Option<Self> {
    use Method::*;
    let m = match name {
      "toUpperCase" => ToUpperCase,
      "toLowerCase" => ToLowerCase,
      "trim" => Trim,
      "includes" => Includes,
      "startsWith" => StartsWith,
      "endsWith" => EndsWith,
      "join" => Join,
      _ => return None,
    };
    Some(m)
  }

  fn name(self) -> &'static str {
    use Method::*;
    match self {
      ToUpperCase => "toUpperCase",
      ToLowerCase => "toLowerCase",
      Trim => "trim",
      Includes => "includes",
      StartsWith => "startsWith",
      EndsWith => "endsWith",
      Join => "join",
    }
  }
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
  Literal(Value),
  /// Reference to the n-th declared parameter.
  Param(usize),
  Member(Box<Expr>, String),
  Index(Box<Expr>, Box<Expr>),
  Call(Box<Expr>, Method, Vec<Expr>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  Logical(LogicalOp, Box<Expr>, Box<Expr>),
  Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Maximum nesting of sub-expressions in a function body.
pub const MAX_DEPTH: usize = 64;

struct Parser<'p> {
  tokens: Vec<Token>,
  pos: usize,
  params: &'p [String],
  depth: usize,
}

impl<'p> Parser<'p> {
  fn enter(&mut self) -> Result<(), ExprError> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(ExprError::Unsupported(
        "expression nested too deeply".to_string(),
      ));
    }
    Ok(())
  }

  fn leave(&mut self, n: usize) {
    self.depth -= n;
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn next(&mut self) -> Result<Token, ExprError> {
    let token = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    token.ok_or(ExprError::UnexpectedEnd)
  }

  fn eat(&mut self, punct: &str) -> bool {
    match self.peek() {
      Some(Token::Punct(p)) if *p == punct => {
        self.pos += 1;
        true
      }
      _ => false,
    }
  }

  fn expect(&mut self, punct: &str) -> Result<(), ExprError> {
    match self.next()? {
      Token::Punct(p) if p == punct => Ok(()),
      other => Err(ExprError::UnexpectedToken(other.describe())),
    }
  }

  /// body := "return"? expression? ";"?
  fn body(&mut self) -> Result<Expr, ExprError> {
    if let Some(Token::Ident(kw)) = self.peek() {
      if kw == "return" {
        self.pos += 1;
      }
    }

    let expr = match self.peek() {
      None | Some(Token::Punct(";")) => Expr::Literal(Value::Null),
      _ => self.conditional()?,
    };

    self.eat(";");
    match self.peek() {
      None => Ok(expr),
      Some(t) => Err(ExprError::UnexpectedToken(t.describe())),
    }
  }

  fn conditional(&mut self) -> Result<Expr, ExprError> {
    self.enter()?;
    let test = self.logical(0)?;
    if !self.eat("?") {
      self.leave(1);
      return Ok(test);
    }

    let then = self.conditional()?;
    self.expect(":")?;
    let otherwise = self.conditional()?;
    self.leave(1);
    Ok(Expr::Conditional(
      Box::new(test),
      Box::new(then),
      Box::new(otherwise),
    ))
  }

  /// Logical operators ordered from loosest to tightest binding.
  const LOGICAL: [(&'static str, LogicalOp); 3] = [
    ("??", LogicalOp::Nullish),
    ("||", LogicalOp::Or),
    ("&&", LogicalOp::And),
  ];

  fn logical(&mut self, level: usize) -> Result<Expr, ExprError> {
    if level == Self::LOGICAL.len() {
      return self.binary(0);
    }

    let (punct, op) = Self::LOGICAL[level];
    let mut lhs = self.logical(level + 1)?;
    let mut wraps = 0;
    while self.eat(punct) {
      self.enter()?;
      wraps += 1;
      let rhs = self.logical(level + 1)?;
      lhs = Expr::Logical(op, Box::new(lhs), Box::new(rhs));
    }
    self.leave(wraps);
    Ok(lhs)
  }

  /// Binary operator precedence levels, loosest first.
  const BINARY: [&'static [(&'static str, BinaryOp)]; 4] = [
    &[
      ("===", BinaryOp::StrictEq),
      ("!==", BinaryOp::StrictNe),
      ("==", BinaryOp::LooseEq),
      ("!=", BinaryOp::LooseNe),
    ],
    &[
      ("<=", BinaryOp::Le),
      (">=", BinaryOp::Ge),
      ("<", BinaryOp::Lt),
      (">", BinaryOp::Gt),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
      ("*", BinaryOp::Mul),
      ("/", BinaryOp::Div),
      ("%", BinaryOp::Rem),
    ],
  ];

  fn binary(&mut self, level: usize) -> Result<Expr, ExprError> {
    if level == Self::BINARY.len() {
      return self.unary();
    }

    let mut lhs = self.binary(level + 1)?;
    let mut wraps = 0;
    'outer: loop {
      for (punct, op) in Self::BINARY[level] {
        if self.eat(punct) {
          self.enter()?;
          wraps += 1;
          let rhs = self.binary(level + 1)?;
          lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
          continue 'outer;
        }
      }
      self.leave(wraps);
      return Ok(lhs);
    }
  }

  fn unary(&mut self) -> Result<Expr, ExprError> {
    let op = if self.eat("!") {
      UnaryOp::Not
    } else if self.eat("-") {
      UnaryOp::Neg
    } else if self.eat("+") {
      UnaryOp::Plus
    } else {
      return self.postfix();
    };

    self.enter()?;
    let operand = self.unary()?;
    self.leave(1);
    Ok(Expr::Unary(op, Box::new(operand)))
  }

  fn postfix(&mut self) -> Result<Expr, ExprError> {
    let mut expr = self.primary()?;
    let mut wraps = 0;
    loop {
      if self.eat(".") {
        self.enter()?;
        wraps += 1;
        let name = match self.next()? {
          Token::Ident(name) => name,
          other => return Err(ExprError::UnexpectedToken(other.describe())),
        };

        if self.eat("(") {
          let method = Method::lookup(&name)
            .ok_or_else(|| ExprError::Unsupported(format!("method '{}'", name)))?;
          let args = self.arguments()?;
          expr = Expr::Call(Box::new(expr), method, args);
        } else {
          expr = Expr::Member(Box::new(expr), name);
        }
      } else if self.eat("[") {
        self.enter()?;
        wraps += 1;
        let key = self.conditional()?;
        self.expect("]")?;
        expr = Expr::Index(Box::new(expr), Box::new(key));
      } else if let Some(Token::Punct("(")) = self.peek() {
        return Err(ExprError::Unsupported("function call".to_string()));
      } else {
        self.leave(wraps);
        return Ok(expr);
      }
    }
  }

  /// Parses a comma separated argument list; the opening paren has already
  /// been consumed.
  fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
    let mut args = Vec::new();
    if self.eat(")") {
      return Ok(args);
    }

    loop {
      args.push(self.conditional()?);
      if self.eat(")") {
        return Ok(args);
      }
      self.expect(",")?;
    }
  }

  fn primary(&mut self) -> Result<Expr, ExprError> {
    let expr = match self.next()? {
      Token::Num(x) => Expr::Literal(number_value(x)),
      Token::Str(s) => Expr::Literal(Value::String(s)),
      Token::Punct("(") => {
        let inner = self.conditional()?;
        self.expect(")")?;
        inner
      }
      Token::Ident(name) => match name.as_str() {
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        "null" | "undefined" => Expr::Literal(Value::Null),
        kw if is_keyword(kw) => {
          return Err(ExprError::Unsupported(format!("keyword '{}'", kw)))
        }
        _ => {
          // Later parameters shadow earlier ones with the same name.
          let index = self
            .params
            .iter()
            .rposition(|p| *p == name)
            .ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))?;
          Expr::Param(index)
        }
      },
      other => return Err(ExprError::UnexpectedToken(other.describe())),
    };
    Ok(expr)
  }
}

/// A compiled function: declared parameter names and a parsed body.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
  params: Vec<String>,
  body: Expr,
}

impl Function {
  /// Parses `body` with `params` in scope.
  pub fn new(params: Vec<String>, body: &str) -> Result<Self, ExprError> {
    for p in &params {
      if !is_identifier(p) || is_keyword(p) {
        return Err(ExprError::InvalidParameter(p.clone()));
      }
    }

    let tokens = tokenize(body)?;
    let body = Parser {
      tokens,
      pos: 0,
      params: &params,
      depth: 0,
    }
    .body()?;

    Ok(Function { params, body })
  }

  pub fn params(&self) -> &[String] {
    &self.params[..]
  }

  pub fn body(&self) -> &Expr {
    &self.body
  }

  /// Evaluates this function with `arg` bound to the first parameter. Any
  /// further parameters are bound to `null`.
  pub fn call(&self, arg: &Value) -> Result<Value, EvalError> {
    let null = Value::Null;
    let mut scope = vec![&null; self.params.len()];
    if let Some(first) = scope.first_mut() {
      *first = arg;
    }
    eval(&self.body, &scope)
  }
}

fn is_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
      chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    }
    _ => false,
  }
}

fn is_keyword(s: &str) -> bool {
  matches!(
    s,
    "return"
      | "true"
      | "false"
      | "null"
      | "undefined"
      | "if"
      | "else"
      | "for"
      | "while"
      | "do"
      | "function"
      | "new"
      | "var"
      | "let"
      | "const"
      | "this"
      | "typeof"
      | "delete"
      | "void"
  )
}

fn eval(expr: &Expr, scope: &[&Value]) -> Result<Value, EvalError> {
  match expr {
    Expr::Literal(v) => Ok(v.clone()),

    Expr::Param(i) => Ok(scope[*i].clone()),

    Expr::Member(target, name) => {
      let target = eval(target, scope)?;
      member(&target, name)
    }

    Expr::Index(target, key) => {
      let target = eval(target, scope)?;
      let key = eval(key, scope)?;
      member(&target, &coerce_to_string(&key))
    }

    Expr::Call(target, method, args) => {
      let target = eval(target, scope)?;
      let args = args
        .iter()
        .map(|a| eval(a, scope))
        .collect::<Result<Vec<_>, _>>()?;
      call(&target, *method, &args)
    }

    Expr::Unary(op, operand) => {
      let v = eval(operand, scope)?;
      Ok(match op {
        UnaryOp::Not => Value::Bool(!is_truthy(&v)),
        UnaryOp::Neg => number_value(-to_number(&v)),
        UnaryOp::Plus => number_value(to_number(&v)),
      })
    }

    Expr::Binary(op, lhs, rhs) => {
      let lhs = eval(lhs, scope)?;
      let rhs = eval(rhs, scope)?;
      Ok(binary(*op, &lhs, &rhs))
    }

    Expr::Logical(op, lhs, rhs) => {
      let lhs = eval(lhs, scope)?;
      let short_circuit = match op {
        LogicalOp::And => !is_truthy(&lhs),
        LogicalOp::Or => is_truthy(&lhs),
        LogicalOp::Nullish => !lhs.is_null(),
      };
      if short_circuit {
        Ok(lhs)
      } else {
        eval(rhs, scope)
      }
    }

    Expr::Conditional(test, then, otherwise) => {
      if is_truthy(&eval(test, scope)?) {
        eval(then, scope)
      } else {
        eval(otherwise, scope)
      }
    }
  }
}

/// Reads a named member of `target`.
///
/// Missing members evaluate to `null`; reading through `null` is an error.
fn member(target: &Value, name: &str) -> Result<Value, EvalError> {
  let v = match target {
    Value::Null => return Err(EvalError::NullAccess(name.to_string())),
    Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
    Value::Array(items) if name == "length" => Value::from(items.len()),
    Value::Array(items) => name
      .parse::<usize>()
      .ok()
      .and_then(|i| items.get(i))
      .cloned()
      .unwrap_or(Value::Null),
    Value::String(s) if name == "length" => Value::from(s.chars().count()),
    Value::String(s) => name
      .parse::<usize>()
      .ok()
      .and_then(|i| s.chars().nth(i))
      .map_or(Value::Null, |c| Value::String(c.to_string())),
    Value::Bool(_) | Value::Number(_) => Value::Null,
  };
  Ok(v)
}

fn call(target: &Value, method: Method, args: &[Value]) -> Result<Value, EvalError> {
  let arg = |i: usize| args.get(i).map_or_else(String::new, coerce_to_string);

  let v = match (target, method) {
    (Value::String(s), Method::ToUpperCase) => Value::String(s.to_uppercase()),
    (Value::String(s), Method::ToLowerCase) => Value::String(s.to_lowercase()),
    (Value::String(s), Method::Trim) => Value::String(s.trim().to_string()),
    (Value::String(s), Method::Includes) => Value::Bool(s.contains(arg(0).as_str())),
    (Value::String(s), Method::StartsWith) => Value::Bool(s.starts_with(arg(0).as_str())),
    (Value::String(s), Method::EndsWith) => Value::Bool(s.ends_with(arg(0).as_str())),
    (Value::Array(items), Method::Includes) => {
      let needle = args.first().unwrap_or(&Value::Null);
      Value::Bool(items.iter().any(|x| strict_equals(x, needle)))
    }
    (Value::Array(items), Method::Join) => {
      let sep = match args.first() {
        None | Some(Value::Null) => ",".to_string(),
        Some(v) => coerce_to_string(v),
      };
      Value::String(
        items
          .iter()
          .map(coerce_to_string)
          .collect::<Vec<_>>()
          .join(&sep),
      )
    }
    (Value::Null, m) => return Err(EvalError::NullAccess(m.name().to_string())),
    (other, m) => {
      return Err(EvalError::NotCallable {
        method: m.name(),
        found: type_name(other).to_string(),
      })
    }
  };
  Ok(v)
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
  use BinaryOp::*;

  match op {
    Add => {
      if is_stringy(lhs) || is_stringy(rhs) {
        Value::String(coerce_to_string(lhs) + &coerce_to_string(rhs))
      } else {
        number_value(to_number(lhs) + to_number(rhs))
      }
    }
    Sub => number_value(to_number(lhs) - to_number(rhs)),
    Mul => number_value(to_number(lhs) * to_number(rhs)),
    Div => number_value(to_number(lhs) / to_number(rhs)),
    Rem => number_value(to_number(lhs) % to_number(rhs)),
    Lt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Less)),
    Le => Value::Bool(matches!(compare(lhs, rhs), Some(Ordering::Less | Ordering::Equal))),
    Gt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Greater)),
    Ge => Value::Bool(matches!(
      compare(lhs, rhs),
      Some(Ordering::Greater | Ordering::Equal)
    )),
    StrictEq => Value::Bool(strict_equals(lhs, rhs)),
    StrictNe => Value::Bool(!strict_equals(lhs, rhs)),
    LooseEq => Value::Bool(loose_equals(lhs, rhs)),
    LooseNe => Value::Bool(!loose_equals(lhs, rhs)),
  }
}

/// Arrays and objects concatenate as strings under `+`.
fn is_stringy(v: &Value) -> bool {
  matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_))
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
  match (lhs, rhs) {
    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
    _ => to_number(lhs).partial_cmp(&to_number(rhs)),
  }
}

fn strict_equals(lhs: &Value, rhs: &Value) -> bool {
  match (lhs, rhs) {
    (Value::Number(a), Value::Number(b)) => number_to_f64(a) == number_to_f64(b),
    _ => lhs == rhs,
  }
}

fn loose_equals(lhs: &Value, rhs: &Value) -> bool {
  match (lhs, rhs) {
    (Value::Null, Value::Null) => true,
    (Value::Null, _) | (_, Value::Null) => false,
    (Value::String(_), Value::String(_)) => lhs == rhs,
    (Value::Number(_), _) | (_, Value::Number(_)) | (Value::Bool(_), _) | (_, Value::Bool(_)) => {
      to_number(lhs) == to_number(rhs)
    }
    _ => strict_equals(lhs, rhs),
  }
}

/// Numeric conversion following the usual scripting rules.
fn to_number(v: &Value) -> f64 {
  match v {
    Value::Null => 0.0,
    Value::Bool(b) => {
      if *b {
        1.0
      } else {
        0.0
      }
    }
    Value::Number(n) => number_to_f64(n),
    Value::String(s) => {
      let s = s.trim();
      if s.is_empty() {
        0.0
      } else {
        s.parse::<f64>().unwrap_or(f64::NAN)
      }
    }
    Value::Array(items) => match items.as_slice() {
      [] => 0.0,
      [only] => to_number(only),
      _ => f64::NAN,
    },
    Value::Object(_) => f64::NAN,
  }
}

fn type_name(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use proptest::prelude::*;
  use serde_json::json;

  fn run(body: &str, arg: Value) -> Result<Value, EvalError> {
    Function::new(vec!["x".to_string()], body)
      .expect("failed to parse")
      .call(&arg)
  }

  fn feature() -> Value {
    json!({
      "type": "Feature",
      "geometry": {"type": "Point", "coordinates": [102.0, 0.5]},
      "properties": {
        "name": "Alpha",
        "stage": "C",
        "count": 3,
        "tags": ["a", "b"],
        "done": false,
        "missing": null
      }
    })
  }

  #[test]
  fn tokenize_operators_longest_first() {
    let tokens = tokenize("a === b !== c <= d").unwrap();
    assert_eq!(
      vec![
        Token::Ident("a".into()),
        Token::Punct("==="),
        Token::Ident("b".into()),
        Token::Punct("!=="),
        Token::Ident("c".into()),
        Token::Punct("<="),
        Token::Ident("d".into()),
      ],
      tokens
    );
  }

  #[test]
  fn tokenize_numbers_and_strings() {
    let tokens = tokenize(r#"1.5 .25 'it\'s' "ü""#).unwrap();
    assert_eq!(
      vec![
        Token::Num(1.5),
        Token::Num(0.25),
        Token::Str("it's".into()),
        Token::Str("ü".into()),
      ],
      tokens
    );
  }

  #[test]
  fn tokenize_rejects_unknown_characters() {
    assert_eq!(Err(ExprError::UnexpectedChar('#', 2)), tokenize("a #"));
    assert_eq!(Err(ExprError::UnterminatedString), tokenize("'abc"));
    assert!(matches!(tokenize("1x"), Err(ExprError::InvalidNumber(_))));
  }

  #[test]
  fn return_prefix_and_semicolon_are_optional() {
    let f = feature();
    assert_eq!(Ok(json!("Alpha")), run("return x.properties.name;", f.clone()));
    assert_eq!(Ok(json!("Alpha")), run("x.properties.name", f));
  }

  #[test]
  fn empty_body_returns_null() {
    assert_eq!(Ok(Value::Null), run("", json!({})));
    assert_eq!(Ok(Value::Null), run("return;", json!({})));
  }

  #[test]
  fn conditional_on_stage() {
    let body = "return x.properties.stage === 'C' ? 'red' : 'blue'";
    assert_eq!(Ok(json!("red")), run(body, feature()));
    assert_eq!(
      Ok(json!("blue")),
      run(body, json!({"properties": {"stage": "S"}}))
    );
  }

  #[test]
  fn arithmetic_and_precedence() {
    assert_eq!(Ok(json!(7)), run("1 + 2 * 3", json!(null)));
    assert_eq!(Ok(json!(9)), run("(1 + 2) * 3", json!(null)));
    assert_eq!(Ok(json!(1)), run("7 % 3", json!(null)));
    assert_eq!(Ok(json!(2.5)), run("5 / 2", json!(null)));
    assert_eq!(Ok(json!(-4)), run("-x.properties.count - 1", feature()));
  }

  #[test]
  fn division_by_zero_is_null() {
    assert_eq!(Ok(Value::Null), run("1 / 0", json!(null)));
  }

  #[test]
  fn string_concatenation() {
    assert_eq!(
      Ok(json!("Alpha (3)")),
      run("x.properties.name + ' (' + x.properties.count + ')'", feature())
    );
    assert_eq!(Ok(json!("a,b!")), run("x.properties.tags + '!'", feature()));
  }

  #[test]
  fn logical_operators_return_operands() {
    let f = feature();
    assert_eq!(Ok(json!("n/a")), run("x.properties.done || 'n/a'", f.clone()));
    assert_eq!(Ok(json!(false)), run("x.properties.done && 'yes'", f.clone()));
    assert_eq!(Ok(json!("?")), run("x.properties.missing ?? '?'", f.clone()));
    assert_eq!(Ok(json!(false)), run("x.properties.done ?? '?'", f));
  }

  #[test]
  fn equality_semantics() {
    assert_eq!(Ok(json!(true)), run("'3' == 3", json!(null)));
    assert_eq!(Ok(json!(false)), run("'3' === 3", json!(null)));
    assert_eq!(Ok(json!(true)), run("3.0 === 3", json!(null)));
    assert_eq!(Ok(json!(true)), run("null == undefined", json!(null)));
    assert_eq!(Ok(json!(false)), run("0 == null", json!(null)));
    assert_eq!(Ok(json!(true)), run("1 == true", json!(null)));
  }

  #[test]
  fn relational_comparisons() {
    assert_eq!(Ok(json!(true)), run("x.properties.count >= 3", feature()));
    assert_eq!(Ok(json!(true)), run("'abc' < 'abd'", json!(null)));
    assert_eq!(Ok(json!(false)), run("'a' < 1", json!(null)));
  }

  #[test]
  fn member_and_index_access() {
    let f = feature();
    assert_eq!(Ok(json!("b")), run("x.properties.tags[1]", f.clone()));
    assert_eq!(Ok(json!(2)), run("x.properties.tags.length", f.clone()));
    assert_eq!(Ok(json!(5)), run("x['properties'].name.length", f.clone()));
    assert_eq!(Ok(json!(0.5)), run("x.geometry.coordinates[1]", f.clone()));
    assert_eq!(Ok(Value::Null), run("x.properties.nope", f));
  }

  #[test]
  fn reading_through_null_is_an_error() {
    assert_eq!(
      Err(EvalError::NullAccess("deep".into())),
      run("x.properties.nope.deep", feature())
    );
  }

  #[test]
  fn method_calls() {
    let f = feature();
    assert_eq!(Ok(json!("ALPHA")), run("x.properties.name.toUpperCase()", f.clone()));
    assert_eq!(Ok(json!(true)), run("x.properties.tags.includes('a')", f.clone()));
    assert_eq!(Ok(json!("a|b")), run("x.properties.tags.join('|')", f.clone()));
    assert_eq!(Ok(json!(true)), run("x.properties.name.startsWith('Al')", f.clone()));
    assert_eq!(
      Err(EvalError::NotCallable {
        method: "trim",
        found: "number".into()
      }),
      run("x.properties.count.trim()", f)
    );
  }

  #[test]
  fn unknown_identifiers_are_rejected() {
    assert_eq!(
      Err(ExprError::UnknownIdentifier("window".into())),
      Function::new(vec!["x".into()], "window.location")
    );
  }

  #[test]
  fn unsupported_constructs_are_rejected() {
    let params = vec!["x".to_string()];
    assert!(matches!(
      Function::new(params.clone(), "x.constructor('alert(1)')"),
      Err(ExprError::Unsupported(_))
    ));
    assert!(matches!(
      Function::new(params.clone(), "x()"),
      Err(ExprError::Unsupported(_))
    ));
    assert!(matches!(
      Function::new(params.clone(), "if (x) return 1"),
      Err(ExprError::Unsupported(_))
    ));
    assert!(matches!(
      Function::new(params, "x.properties.a = 1"),
      Err(ExprError::UnexpectedChar('=', _))
    ));
  }

  #[test]
  fn invalid_parameter_names() {
    assert_eq!(
      Err(ExprError::InvalidParameter("1x".into())),
      Function::new(vec!["1x".into()], "1")
    );
    assert_eq!(
      Err(ExprError::InvalidParameter("return".into())),
      Function::new(vec!["return".into()], "1")
    );
  }

  #[test]
  fn extra_parameters_are_null() {
    let f = Function::new(vec!["x".into(), "y".into()], "y ?? x").unwrap();
    assert_eq!(Ok(json!(1)), f.call(&json!(1)));
  }

  #[test]
  fn function_without_parameters() {
    let f = Function::new(vec![], "'constant'").unwrap();
    assert_eq!(Ok(json!("constant")), f.call(&json!({})));
  }

  #[test]
  fn deeply_nested_bodies_are_rejected() {
    let nested = |body: String| Function::new(vec!["x".to_string()], &body);
    let too_deep = ExprError::Unsupported("expression nested too deeply".to_string());

    assert_eq!(Err(too_deep.clone()), nested(format!("{}1", "!".repeat(200_000))));
    assert_eq!(
      Err(too_deep.clone()),
      nested(format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000)))
    );
    assert_eq!(Err(too_deep.clone()), nested(format!("{}1", "1 + ".repeat(100_000))));
    assert_eq!(Err(too_deep), nested(format!("x{}", ".a".repeat(100_000))));
  }

  #[test]
  fn moderate_nesting_is_accepted() {
    let f = Function::new(vec!["x".into()], &format!("{}true", "!".repeat(10))).unwrap();
    assert_eq!(Ok(json!(true)), f.call(&json!(null)));

    let body = format!("{}1{}", "(".repeat(10), ")".repeat(10));
    assert_eq!(Ok(json!(1)), run(&body, json!(null)));
  }

  proptest! {
    #[test]
    fn prop_parse_never_panics(s in ".*") {
      if let Ok(f) = Function::new(vec!["x".into()], &s) {
        let _ = f.call(&json!({"properties": {"a": 1}}));
      }
    }

    #[test]
    fn prop_integer_addition(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
      let body = format!("({}) + ({})", a, b);
      assert_eq!(Ok(json!(a + b)), run(&body, json!(null)));
    }
  }
}
