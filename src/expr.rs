//! Embedded expression language.
//!
//! Expressions are parsed at compile time into an [`Expr`] tree; the runtime
//! evaluates that tree against `serde_json::Value`s. Operator precedence, low
//! to high: `or`, `and`, comparison, additive, multiplicative, unary, postfix.

use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    IntDiv,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn binding_power(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::IntDiv | BinaryOp::Rem => 5,
        }
    }
}

const UNARY_POWER: u8 = 6;

/// Deepest tree the parser builds, counting nested operands and chained
/// operators and accessors.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset} in '{code}'")]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
    pub code: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    End,
}

const PUNCTUATION: &[&str] = &[
    "==", "!=", "<>", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "=", "!", "(",
    ")", "[", "]", ",", ".",
];

fn tokenize(code: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let chars: Vec<(usize, char)> = code.char_indices().collect();
    let error = |message: &str, offset: usize| ExprError {
        message: message.to_string(),
        offset,
        code: code.to_string(),
    };
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len()
                && (chars[i].1.is_ascii_digit()
                    || (chars[i].1 == '.'
                        && !is_float
                        && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit())))
            {
                if chars[i].1 == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = if is_float {
                Token::Float(text.parse().map_err(|_| error("invalid number", offset))?)
            } else {
                Token::Int(text.parse().map_err(|_| error("integer out of range", offset))?)
            };
            tokens.push((token, offset));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            tokens.push((Token::Ident(text), offset));
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            i += 1;
            let mut text = String::new();
            loop {
                let Some(&(_, next)) = chars.get(i) else {
                    return Err(error("unterminated string", offset));
                };
                i += 1;
                if next == quote {
                    if quote == '\'' && chars.get(i).is_some_and(|(_, n)| *n == '\'') {
                        text.push('\'');
                        i += 1;
                        continue;
                    }
                    break;
                }
                if next == '\\' && quote == '"' {
                    let Some(&(_, escaped)) = chars.get(i) else {
                        return Err(error("unterminated string", offset));
                    };
                    i += 1;
                    text.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        other => other,
                    });
                    continue;
                }
                text.push(next);
            }
            tokens.push((Token::Str(text), offset));
            continue;
        }
        let rest = &code[offset..];
        match PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            Some(p) => {
                tokens.push((Token::Punct(p), offset));
                i += p.chars().count();
            }
            None => return Err(error(&format!("unexpected character '{}'", c), offset)),
        }
    }
    tokens.push((Token::End, code.len()));
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct Parser<'a> {
    code: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

/// Parses one expression. A trailing `;` is tolerated.
pub fn parse(code: &str) -> Result<Expr, ExprError> {
    let trimmed = code.trim().trim_end_matches(';').trim_end();
    let mut parser = Parser {
        code: trimmed,
        tokens: tokenize(trimmed)?,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &Token::End {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.expression(0)?;
    if parser.peek() != &Token::End {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: &str) -> ExprError {
        ExprError {
            message: message.to_string(),
            offset: self.tokens[self.pos.min(self.tokens.len() - 1)].1,
            code: self.code.to_string(),
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExprError> {
        match self.peek() {
            Token::Punct(p) if *p == punct => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(&format!("expected '{}'", punct))),
        }
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        Some(match self.peek() {
            Token::Punct("*") => BinaryOp::Mul,
            Token::Punct("/") => BinaryOp::Div,
            Token::Punct("%") => BinaryOp::Rem,
            Token::Punct("+") => BinaryOp::Add,
            Token::Punct("-") => BinaryOp::Sub,
            Token::Punct("<") => BinaryOp::Lt,
            Token::Punct("<=") => BinaryOp::Le,
            Token::Punct(">") => BinaryOp::Gt,
            Token::Punct(">=") => BinaryOp::Ge,
            Token::Punct("=") | Token::Punct("==") => BinaryOp::Eq,
            Token::Punct("!=") | Token::Punct("<>") => BinaryOp::Ne,
            Token::Punct("&&") => BinaryOp::And,
            Token::Punct("||") => BinaryOp::Or,
            Token::Ident(word) => match word.as_str() {
                "div" => BinaryOp::IntDiv,
                "mod" => BinaryOp::Rem,
                "and" => BinaryOp::And,
                "or" => BinaryOp::Or,
                _ => return None,
            },
            _ => return None,
        })
    }

    fn deepen(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        Ok(())
    }

    fn expression(&mut self, min_power: u8) -> Result<Expr, ExprError> {
        let outer = self.depth;
        let result = self.binary(min_power);
        self.depth = outer;
        result
    }

    fn binary(&mut self, min_power: u8) -> Result<Expr, ExprError> {
        self.deepen()?;
        let mut left = self.prefix()?;
        while let Some(op) = self.binary_op() {
            let power = op.binding_power();
            if power <= min_power {
                break;
            }
            self.advance();
            self.deepen()?;
            let right = self.expression(power)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn prefix(&mut self) -> Result<Expr, ExprError> {
        let operand = match self.peek().clone() {
            Token::Punct("-") => {
                self.advance();
                let inner = self.expression(UNARY_POWER)?;
                return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
            }
            Token::Punct("!") => {
                self.advance();
                let inner = self.expression(UNARY_POWER)?;
                return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
            }
            Token::Ident(word) if word == "not" => {
                self.advance();
                let inner = self.expression(UNARY_POWER)?;
                return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
            }
            Token::Int(n) => {
                self.advance();
                Expr::Literal(Value::from(n))
            }
            Token::Float(f) => {
                self.advance();
                Expr::Literal(Value::from(f))
            }
            Token::Str(s) => {
                self.advance();
                Expr::Literal(Value::String(s))
            }
            Token::Ident(word) => {
                self.advance();
                match word.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" | "nil" => Expr::Literal(Value::Null),
                    _ => Expr::Ident(word),
                }
            }
            Token::Punct("(") => {
                self.advance();
                let inner = self.expression(0)?;
                self.expect(")")?;
                inner
            }
            Token::Punct("[") => {
                self.advance();
                let items = self.list("]")?;
                Expr::List(items)
            }
            _ => return Err(self.error("expected an operand")),
        };
        self.postfix(operand)
    }

    fn postfix(&mut self, mut expr: Expr) -> Result<Expr, ExprError> {
        loop {
            if matches!(self.peek(), Token::Punct(".") | Token::Punct("[") | Token::Punct("(")) {
                self.deepen()?;
            }
            match self.peek() {
                Token::Punct(".") => {
                    self.advance();
                    match self.advance() {
                        Token::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                        _ => return Err(self.error("expected a member name")),
                    }
                }
                Token::Punct("[") => {
                    self.advance();
                    let index = self.expression(0)?;
                    self.expect("]")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::Punct("(") => {
                    self.advance();
                    let args = self.list(")")?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma separated expressions up to `close`, which is consumed.
    fn list(&mut self, close: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if matches!(self.peek(), Token::Punct(p) if *p == close) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.expression(0)?);
            match self.peek() {
                Token::Punct(",") => {
                    self.advance();
                }
                Token::Punct(p) if *p == close => {
                    self.advance();
                    return Ok(items);
                }
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Root identifiers the expression reads. Member names are not included.
pub fn free_identifiers(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect(expr, &mut names);
    names
}

fn collect(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::List(items) => items.iter().for_each(|i| collect(i, names)),
        Expr::Ident(name) => {
            names.insert(name.clone());
        }
        Expr::Member(target, _) => collect(target, names),
        Expr::Index(target, index) => {
            collect(target, names);
            collect(index, names);
        }
        Expr::Call(callee, args) => {
            collect(callee, names);
            args.iter().for_each(|a| collect(a, names));
        }
        Expr::Unary(_, inner) => collect(inner, names),
        Expr::Binary(_, left, right) => {
            collect(left, names);
            collect(right, names);
        }
    }
}

/// Renders a value the way output statements write it.
pub fn to_output_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
