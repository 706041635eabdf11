//! Conditions of `{{if}}` blocks.
//!
//! ```text
//! pred    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | "(" or ")" | operand ( op operand )?
//! operand := param | "string" | number | true | false | nil
//! ```

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Bare `p`: the parameter is set (non-empty, non-zero, `Some`)
    Present(Operand),
    Not(Box<Predicate>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Parameter names the predicate reads, in source order
    pub fn params(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_params(&mut names);
        names
    }

    fn collect_params<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Present(operand) => operand.collect_param(out),
            Predicate::Not(inner) => inner.collect_params(out),
            Predicate::Compare { left, right, .. } => {
                left.collect_param(out);
                right.collect_param(out);
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_params(out);
                b.collect_params(out);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `name` or `name.field`, with or without a leading `@`
    Param { name: String, path: Vec<String> },
    Literal(Literal),
    Nil,
}

impl Operand {
    fn collect_param<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Operand::Param { name, .. } = self {
            out.push(name);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Op(CompareOp),
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

/// Parse the condition text of an `{{if}}` marker.
///
/// `offset` is the template offset of the marker and is what every error
/// reports.
pub fn parse_predicate(text: &str, offset: usize, declared: &[String]) -> Result<Predicate, TemplateError> {
    let tokens = tokenize(text, offset)?;
    if tokens.is_empty() {
        return Err(malformed(offset, "empty condition"));
    }
    let mut parser = PredicateParser {
        tokens,
        pos: 0,
        offset,
        declared,
    };
    let predicate = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(malformed(offset, format!("unexpected token in condition '{}'", text.trim())));
    }
    Ok(predicate)
}

fn malformed(offset: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Malformed {
        offset,
        message: message.into(),
    }
}

fn tokenize(text: &str, offset: usize) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<char> = text.chars().collect();
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
            '&' if next == Some('&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '>' | '<' => {
                let op = match (c, next == Some('=')) {
                    ('>', true) => CompareOp::Ge,
                    ('>', false) => CompareOp::Gt,
                    (_, true) => CompareOp::Le,
                    (_, false) => CompareOp::Lt,
                };
                tokens.push(Token::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(malformed(offset, "unterminated string in condition")),
                        Some('\\') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let token = if raw.contains('.') {
                    raw.parse().map(Token::Float).ok()
                } else {
                    raw.parse().map(Token::Int).ok()
                };
                tokens.push(token.ok_or_else(|| malformed(offset, format!("invalid number '{}'", raw)))?);
            }
            c if c == '@' || c == '_' || c.is_alphabetic() => {
                if c == '@' {
                    i += 1;
                }
                let start = i;
                while i < chars.len() && (chars[i] == '_' || chars[i] == '.' || chars[i].is_alphanumeric()) {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let path: Vec<String> = raw.split('.').map(str::to_string).collect();
                if path.iter().any(String::is_empty) {
                    return Err(malformed(offset, format!("invalid name '{}' in condition", raw)));
                }
                tokens.push(Token::Path(path));
            }
            other => return Err(malformed(offset, format!("unexpected character '{}' in condition", other))),
        }
    }
    Ok(tokens)
}

struct PredicateParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    offset: usize,
    declared: &'a [String],
}

impl PredicateParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Predicate, TemplateError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate, TemplateError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate, TemplateError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Predicate::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(malformed(self.offset, "missing ')' in condition")),
                }
            }
            _ => {
                let left = self.parse_operand()?;
                if let Some(Token::Op(op)) = self.peek() {
                    let op = *op;
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    if matches!(left, Operand::Nil) && matches!(right, Operand::Nil) {
                        return Err(malformed(self.offset, "comparing nil with nil"));
                    }
                    return Ok(Predicate::Compare { left, op, right });
                }
                match left {
                    Operand::Param { .. } => Ok(Predicate::Present(left)),
                    _ => Err(malformed(self.offset, "a condition needs a parameter")),
                }
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, TemplateError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(Operand::Literal(Literal::Str(value))),
            Some(Token::Int(value)) => Ok(Operand::Literal(Literal::Int(value))),
            Some(Token::Float(value)) => Ok(Operand::Literal(Literal::Float(value))),
            Some(Token::Path(path)) if path.len() == 1 && path[0] == "nil" => Ok(Operand::Nil),
            Some(Token::Path(path)) if path.len() == 1 && (path[0] == "true" || path[0] == "false") => {
                Ok(Operand::Literal(Literal::Bool(path[0] == "true")))
            }
            Some(Token::Path(mut path)) => {
                let name = path.remove(0);
                if !self.declared.iter().any(|declared| *declared == name) {
                    return Err(TemplateError::UnknownParameter {
                        name,
                        offset: self.offset,
                    });
                }
                Ok(Operand::Param { name, path })
            }
            _ => Err(malformed(self.offset, "expected a parameter or a literal in condition")),
        }
    }
}
