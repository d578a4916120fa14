//! Conditions over extracted values.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" or ")" | FIELD ( ("==" | "!=") LITERAL )?
//! LITERAL := 'text' | "text" | number | true | false
//! ```
//!
//! A bare field tests truthiness. String comparison ignores case and
//! surrounding whitespace. If any field the condition mentions is missing,
//! the whole condition is false.

use crate::schema::SchemaError;
use crate::value::{ExtractedValues, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A parsed condition together with its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Condition {
    source: String,
    expr: Expr,
}

/// Result of evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: bool,
    /// Fields referenced by the condition but absent from the values
    pub missing: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Truthy(String),
    Compare {
        field: String,
        negated: bool,
        literal: Literal,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        let tokens = tokenize(source).map_err(|reason| invalid(source, reason))?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or().map_err(|reason| invalid(source, reason))?;
        if let Some(token) = parser.peek() {
            return Err(invalid(source, format!("unexpected token {}", token)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every field name the condition mentions.
    pub fn fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.expr.collect_fields(&mut out);
        out
    }

    pub fn evaluate(&self, values: &ExtractedValues) -> Evaluation {
        let missing: BTreeSet<String> = self
            .fields()
            .into_iter()
            .filter(|f| !values.contains_key(f))
            .collect();
        if !missing.is_empty() {
            return Evaluation {
                result: false,
                missing,
            };
        }
        Evaluation {
            result: self.expr.eval(values),
            missing,
        }
    }
}

impl TryFrom<String> for Condition {
    type Error = SchemaError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::parse(&source)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.source
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(expression: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidCondition {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

impl Expr {
    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Truthy(field) | Expr::Compare { field, .. } => {
                out.insert(field.clone());
            }
            Expr::Not(inner) => inner.collect_fields(out),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
        }
    }

    fn eval(&self, values: &ExtractedValues) -> bool {
        match self {
            Expr::Truthy(field) => values
                .get(field)
                .map(|v| v.value().is_truthy())
                .unwrap_or(false),
            Expr::Compare {
                field,
                negated,
                literal,
            } => {
                let equal = values
                    .get(field)
                    .map(|v| literal.matches(v.value()))
                    .unwrap_or(false);
                equal != *negated
            }
            Expr::Not(inner) => !inner.eval(values),
            Expr::And(a, b) => a.eval(values) && b.eval(values),
            Expr::Or(a, b) => a.eval(values) || b.eval(values),
        }
    }
}

impl Literal {
    fn matches(&self, value: &FieldValue) -> bool {
        match (value, self) {
            (FieldValue::Bool(v), Literal::Bool(l)) => v == l,
            (FieldValue::Number(v), Literal::Number(l)) => (v - l).abs() < 1e-9,
            (value, literal) => {
                value.render().trim().to_lowercase() == literal.render().trim().to_lowercase()
            }
        }
    }

    fn render(&self) -> String {
        match self {
            Literal::Text(s) => s.clone(),
            Literal::Number(n) => FieldValue::Number(*n).render(),
            Literal::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Eq,
    Ne,
    Not,
    And,
    Or,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::Eq => f.write_str("'=='"),
            Token::Ne => f.write_str("'!='"),
            Token::Not => f.write_str("'!'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|offset| start + offset)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let number = raw
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", raw))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    if tokens.is_empty() {
        return Err("empty condition".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::Ident(field)) => {
                let negated = match self.peek() {
                    Some(Token::Eq) => false,
                    Some(Token::Ne) => true,
                    _ => return Ok(Expr::Truthy(field)),
                };
                self.advance();
                let literal = match self.advance() {
                    Some(Token::Str(s)) => Literal::Text(s),
                    Some(Token::Number(n)) => Literal::Number(n),
                    Some(Token::Ident(word)) if word == "true" => Literal::Bool(true),
                    Some(Token::Ident(word)) if word == "false" => Literal::Bool(false),
                    Some(other) => return Err(format!("expected a literal, found {}", other)),
                    None => return Err("expected a literal after comparison".to_string()),
                };
                Ok(Expr::Compare {
                    field,
                    negated,
                    literal,
                })
            }
            Some(other) => Err(format!("unexpected token {}", other)),
            None => Err("unexpected end of condition".to_string()),
        }
    }
}
