//! Arithmetic expression evaluator backing the `Calculator` tool.
//!
//! Supports numbers, `+ - * / // % **`, unary signs, parentheses and the
//! functions `abs`, `round`, `min`, `max`, `sum` and `pow`.


use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("{name}() expected {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Power,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::Power => write!(f, "**"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => tokens.push(Token::Number(read_number(&mut chars)?)),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '*' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '*').is_some() {
                    tokens.push(Token::Power);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '/').is_some() {
                    tokens.push(Token::DoubleSlash);
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '+' | '-' | '%' | '(' | ')' | ',' | '×' | '÷' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '×' => Token::Star,
                    '÷' => Token::Slash,
                    _ => Token::Comma,
                });
            }
            other => return Err(CalcError::UnexpectedChar(other, pos)),
        }
    }

    Ok(tokens)
}

fn read_number(chars: &mut Peekable<CharIndices<'_>>) -> Result<f64, CalcError> {
    let mut text = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' || c == '_' {
            if c != '_' {
                text.push(c);
            }
            chars.next();
        } else if (c == 'e' || c == 'E') && !text.is_empty() {
            text.push(c);
            chars.next();
            if let Some((_, sign)) = chars.next_if(|&(_, c)| c == '+' || c == '-') {
                text.push(sign);
            }
        } else {
            break;
        }
    }
    text.parse::<f64>()
        .map_err(|_| CalcError::InvalidNumber(text))
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
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CalcError> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent)) => {
                    op.clone()
                }
                _ => return Ok(value),
            };
            self.advance();
            let rhs = self.unary()?;
            value = match op {
                Token::Star => value * rhs,
                Token::Slash => checked_divisor(rhs).map(|d| value / d)?,
                Token::DoubleSlash => checked_divisor(rhs).map(|d| (value / d).floor())?,
                // Sign follows the divisor, as with floored modulo
                _ => checked_divisor(rhs).map(|d| value - d * (value / d).floor())?,
            };
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.advance();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.advance();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Err(CalcError::UnknownName(name));
                }
                self.advance();
                let args = self.arguments()?;
                call_function(&name, &args)
            }
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, CalcError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(CalcError::UnexpectedToken(token.to_string())),
                None => return Err(CalcError::UnexpectedEnd),
            }
        }
    }
}

fn checked_divisor(divisor: f64) -> Result<f64, CalcError> {
    if divisor == 0.0 {
        Err(CalcError::DivisionByZero)
    } else {
        Ok(divisor)
    }
}

fn arity(name: &str, expected: &'static str, got: usize) -> CalcError {
    CalcError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    match (name, args) {
        ("abs", [x]) => Ok(x.abs()),
        ("abs", _) => Err(arity(name, "1", args.len())),
        ("pow", [x, y]) => Ok(x.powf(*y)),
        ("pow", _) => Err(arity(name, "2", args.len())),
        ("round", [x]) => Ok(round_half_even(*x)),
        ("round", [x, digits]) => {
            let scale = 10f64.powi(digits.trunc() as i32);
            Ok(round_half_even(x * scale) / scale)
        }
        ("round", _) => Err(arity(name, "1 or 2", args.len())),
        ("min", [_, ..]) => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        ("max", [_, ..]) => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        ("min" | "max", []) => Err(arity(name, "at least 1", 0)),
        ("sum", _) => Ok(args.iter().sum()),
        _ => Err(CalcError::UnknownName(name.to_string())),
    }
}

/// Banker's rounding, matching how most calculators in scripting languages
/// round `.5` cases.
fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - x.signum()
    } else {
        rounded
    }
}

/// Evaluate an arithmetic expression.
#[inline]
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::UnexpectedToken(token.to_string()));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Render a result: integral values without a fractional part.
#[inline]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Tool entry point: `计算结果: <value>` or `计算错误: <message>`.
#[inline]
pub fn calculate(expression: &str) -> String {
    match evaluate(expression) {
        Ok(value) => format!("计算结果: {}", format_number(value)),
        Err(e) => format!("计算错误: {}", e),
    }
}
