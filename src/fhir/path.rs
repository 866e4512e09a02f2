//! Minimal FHIRPath evaluator over JSON resources.
//!
//! Supports the subset the lens needs: member navigation with collection
//! flattening, a leading type name, `[n]` indexing, `where()`, `first()`,
//! `exists()`, equality (`=`, `==`, `!=`) against literals, and `and` / `or`.
//! A result is always an ordered collection; no match is an empty collection.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { offset: usize, ch: char },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unexpected {found} in expression")]
    UnexpectedToken { found: String },

    #[error("expression ended unexpectedly")]
    UnexpectedEnd,

    #[error("unsupported function {0}()")]
    UnknownFunction(String),
}

/// A parsed path expression, reusable across documents.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpression {
    root: Expr,
}

impl PathExpression {
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(PathError::UnexpectedToken {
                found: token.describe(),
            });
        }
        Ok(Self { root })
    }

    /// Evaluate against a resource, returning matches in document order.
    pub fn evaluate(&self, resource: &Value) -> Vec<Value> {
        eval(&self.root, &[Cow::Borrowed(resource)], true)
            .into_iter()
            .map(Cow::into_owned)
            .collect()
    }
}

/// Parse and evaluate in one go.
pub fn evaluate(resource: &Value, expression: &str) -> Result<Vec<Value>, PathError> {
    Ok(PathExpression::parse(expression)?.evaluate(resource))
}

// ──────────────────────────────────────────────
// Syntax tree
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(Vec<Step>),
    Literal(Value),
    Compare {
        left: Box<Expr>,
        negate: bool,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Member(String),
    Index(usize),
    Where(Box<Expr>),
    First,
    Exists,
}

// ──────────────────────────────────────────────
// Lexer
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    NotEq,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier {name:?}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Int(n) => format!("number {n}"),
            Token::Dot => "'.'".into(),
            Token::Comma => "','".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Eq => "'='".into(),
            Token::NotEq => "'!='".into(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, PathError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '=' => {
                if chars.peek().is_some_and(|(_, c)| *c == '=') {
                    chars.next();
                }
                Token::Eq
            }
            '!' if chars.peek().is_some_and(|(_, c)| *c == '=') => {
                chars.next();
                Token::NotEq
            }
            '\'' => Token::Str(read_string(&mut chars, offset)?),
            c if c.is_ascii_digit() => {
                let mut digits = String::from(c);
                while let Some((_, d)) = chars.peek().filter(|(_, d)| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                let n = digits
                    .parse()
                    .map_err(|_| PathError::UnexpectedChar { offset, ch: c })?;
                Token::Int(n)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::from(c);
                while let Some((_, d)) = chars
                    .peek()
                    .filter(|(_, d)| d.is_alphanumeric() || *d == '_')
                {
                    ident.push(*d);
                    chars.next();
                }
                Token::Ident(ident)
            }
            c => return Err(PathError::UnexpectedChar { offset, ch: c }),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn read_string(chars: &mut Peekable<CharIndices<'_>>, start: usize) -> Result<String, PathError> {
    let mut out = String::new();
    while let Some((_, ch)) = chars.next() {
        match ch {
            '\'' => return Ok(out),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(PathError::UnterminatedString(start))
}

// ──────────────────────────────────────────────
// Parser (precedence: or < and < equality < path)
// ──────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), PathError> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(other) => Err(PathError::UnexpectedToken {
                found: other.describe(),
            }),
            None => Err(PathError::UnexpectedEnd),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn expression(&mut self) -> Result<Expr, PathError> {
        let mut left = self.and_expr()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, PathError> {
        let mut left = self.equality()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, PathError> {
        let left = self.term()?;
        let negate = match self.peek() {
            Some(Token::Eq) => false,
            Some(Token::NotEq) => true,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.term()?;
        Ok(Expr::Compare {
            left: Box::new(left),
            negate,
            right: Box::new(right),
        })
    }

    fn term(&mut self) -> Result<Expr, PathError> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let value = Value::String(s.clone());
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Token::Int(n)) => {
                let value = Value::from(*n);
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Token::Ident(name)) if name == "true" || name == "false" => {
                let value = Value::Bool(name == "true");
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(_)) => self.path(),
            Some(other) => Err(PathError::UnexpectedToken {
                found: other.describe(),
            }),
            None => Err(PathError::UnexpectedEnd),
        }
    }

    fn path(&mut self) -> Result<Expr, PathError> {
        let mut steps = vec![self.invocation()?];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    steps.push(self.invocation()?);
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = match self.next() {
                        Some(Token::Int(n)) if n >= 0 => n as usize,
                        Some(other) => {
                            return Err(PathError::UnexpectedToken {
                                found: other.describe(),
                            })
                        }
                        None => return Err(PathError::UnexpectedEnd),
                    };
                    self.expect(Token::RBracket)?;
                    steps.push(Step::Index(index));
                }
                _ => return Ok(Expr::Path(steps)),
            }
        }
    }

    fn invocation(&mut self) -> Result<Step, PathError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(other) => {
                return Err(PathError::UnexpectedToken {
                    found: other.describe(),
                })
            }
            None => return Err(PathError::UnexpectedEnd),
        };

        if self.peek() != Some(&Token::LParen) {
            return Ok(Step::Member(name));
        }
        self.pos += 1;

        let step = match name.as_str() {
            "where" => Step::Where(Box::new(self.expression()?)),
            "first" => Step::First,
            "exists" => Step::Exists,
            _ => return Err(PathError::UnknownFunction(name)),
        };
        self.expect(Token::RParen)?;
        Ok(step)
    }
}

// ──────────────────────────────────────────────
// Evaluation
// ──────────────────────────────────────────────

type Collection<'a> = Vec<Cow<'a, Value>>;

fn eval<'a>(expr: &Expr, focus: &[Cow<'a, Value>], at_root: bool) -> Collection<'a> {
    match expr {
        Expr::Literal(value) => vec![Cow::Owned(value.clone())],
        Expr::Path(steps) => {
            let mut current: Collection<'a> = focus.to_vec();
            for (i, step) in steps.iter().enumerate() {
                current = apply_step(step, current, at_root && i == 0);
            }
            current
        }
        Expr::Compare {
            left,
            negate,
            right,
        } => {
            let left = eval(left, focus, false);
            let right = eval(right, focus, false);
            if left.is_empty() || right.is_empty() {
                return Vec::new();
            }
            let equal = left.len() == right.len()
                && left.iter().zip(&right).all(|(l, r)| values_equal(l, r));
            vec![Cow::Owned(Value::Bool(equal != *negate))]
        }
        Expr::And(l, r) => {
            let result = match (truth(&eval(l, focus, false)), truth(&eval(r, focus, false))) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            boolean(result)
        }
        Expr::Or(l, r) => {
            let result = match (truth(&eval(l, focus, false)), truth(&eval(r, focus, false))) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            };
            boolean(result)
        }
    }
}

fn apply_step<'a>(step: &Step, input: Collection<'a>, leading: bool) -> Collection<'a> {
    match step {
        // A leading capitalised name is a type filter on the root resource.
        Step::Member(name) if leading && name.starts_with(|c: char| c.is_ascii_uppercase()) => input
            .into_iter()
            .filter(|v| v.get("resourceType").and_then(Value::as_str) == Some(name.as_str()))
            .collect(),
        Step::Member(name) => {
            let mut out = Vec::new();
            for item in input {
                match item {
                    Cow::Borrowed(v) => {
                        if let Some(child) = v.get(name.as_str()) {
                            flatten_borrowed(child, &mut out);
                        }
                    }
                    Cow::Owned(v) => {
                        if let Some(child) = v.get(name.as_str()) {
                            flatten_owned(child.clone(), &mut out);
                        }
                    }
                }
            }
            out
        }
        Step::Index(n) => input.into_iter().nth(*n).into_iter().collect(),
        Step::First => input.into_iter().take(1).collect(),
        Step::Exists => vec![Cow::Owned(Value::Bool(!input.is_empty()))],
        Step::Where(criteria) => input
            .into_iter()
            .filter(|item| {
                let focus = [item.clone()];
                truth(&eval(criteria, &focus, false)) == Some(true)
            })
            .collect(),
    }
}

fn flatten_borrowed<'a>(value: &'a Value, out: &mut Collection<'a>) {
    match value {
        Value::Array(items) => out.extend(items.iter().map(Cow::Borrowed)),
        Value::Null => {}
        other => out.push(Cow::Borrowed(other)),
    }
}

fn flatten_owned(value: Value, out: &mut Collection<'_>) {
    match value {
        Value::Array(items) => out.extend(items.into_iter().map(Cow::Owned)),
        Value::Null => {}
        other => out.push(Cow::Owned(other)),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

/// Singleton boolean evaluation; empty and non-boolean collections are unknown.
fn truth(collection: &[Cow<'_, Value>]) -> Option<bool> {
    match collection {
        [single] => single.as_bool(),
        _ => None,
    }
}

fn boolean<'a>(value: Option<bool>) -> Collection<'a> {
    value
        .map(|b| vec![Cow::Owned(Value::Bool(b))])
        .unwrap_or_default()
}
