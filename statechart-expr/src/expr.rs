//! Expression parsing and evaluation.
//!
//! The expression language covers guards and data expressions:
//!
//! - `field` - variable lookup (walks the scope chain)
//! - `field.nested` - nested field access on object values
//! - `a == b` - equality (strings, numbers, booleans, null)
//! - `a != b` - inequality
//! - `a > b`, `a >= b`, `a < b`, `a <= b` - numeric comparison
//! - `!expr` - logical NOT
//! - `expr && expr` - logical AND (higher precedence than OR)
//! - `expr || expr` - logical OR
//! - `(expr)` - grouping
//! - literals: `"text"`, `42`, `-1.5`, `true`, `false`, `null`
//!
//! Examples:
//! - `enabled` - true if the variable is truthy
//! - `amount > 100 && approved` - compound guard
//! - `order.status == "paid"` - nested comparison
//!
//! Evaluation is infallible: unbound variables read as null, and a numeric
//! comparison against a non-number is simply false.

use serde_json::Value;
use statechart_core::traits::is_truthy;
use statechart_core::{EvalError, ScopeId, Scopes};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A parsed expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A variable lookup, possibly descending into object fields.
    Path(Vec<String>),
    /// Comparison of two operands.
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// Logical AND.
    And(Box<Expr>, Box<Expr>),
    /// Logical OR.
    Or(Box<Expr>, Box<Expr>),
    /// Logical NOT.
    Not(Box<Expr>),
}

impl Expr {
    /// Parses an expression from a string.
    pub fn parse(s: &str) -> Result<Self, EvalError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EvalError::Syntax {
                expr: s.to_string(),
                reason: "empty expression".to_string(),
            });
        }

        let mut parser = Parser::new(trimmed);
        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(parser.error(format!(
                "unexpected trailing input at '{}'",
                &parser.input[parser.pos..]
            )));
        }
        Ok(expr)
    }

    /// Evaluates the expression against a scope.
    pub fn eval(&self, scopes: &Scopes, scope: ScopeId) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(segments) => {
                let mut current = match scopes.get(scope, &segments[0]) {
                    Some(v) => v.clone(),
                    None => return Value::Null,
                };
                for segment in &segments[1..] {
                    current = match current {
                        Value::Object(mut map) => {
                            map.remove(segment.as_str()).unwrap_or(Value::Null)
                        }
                        _ => return Value::Null,
                    };
                }
                current
            }
            Expr::Cmp(op, left, right) => {
                let l = left.eval(scopes, scope);
                let r = right.eval(scopes, scope);
                Value::Bool(compare(*op, &l, &r))
            }
            Expr::And(left, right) => Value::Bool(
                is_truthy(&left.eval(scopes, scope)) && is_truthy(&right.eval(scopes, scope)),
            ),
            Expr::Or(left, right) => Value::Bool(
                is_truthy(&left.eval(scopes, scope)) || is_truthy(&right.eval(scopes, scope)),
            ),
            Expr::Not(inner) => Value::Bool(!is_truthy(&inner.eval(scopes, scope))),
        }
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(a, b),
        CmpOp::Ne => !values_equal(a, b),
        CmpOp::Gt => numeric(a, b).map(|(a, b)| a > b).unwrap_or(false),
        CmpOp::Ge => numeric(a, b).map(|(a, b)| a >= b).unwrap_or(false),
        CmpOp::Lt => numeric(a, b).map(|(a, b)| a < b).unwrap_or(false),
        CmpOp::Le => numeric(a, b).map(|(a, b)| a <= b).unwrap_or(false),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .map(|(a, b)| (a - b).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn numeric(a: &Value, b: &Value) -> Option<(f64, f64)> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()),
        _ => None,
    }
}

/// Simple recursive descent parser.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, reason: String) -> EvalError {
        EvalError::Syntax {
            expr: self.input.to_string(),
            reason,
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();

        while self.peek_str("||") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();

        while self.peek_str("&&") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        self.skip_whitespace();

        // '!' here is NOT; '!=' only appears after an operand.
        if self.peek_char() == Some('!') && !self.peek_str("!=") {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_unary()?; // recursive to allow !!a
            return Ok(Expr::Not(Box::new(inner)));
        }

        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_operand()?;
        self.skip_whitespace();

        let op = if self.peek_str("==") {
            CmpOp::Eq
        } else if self.peek_str("!=") {
            CmpOp::Ne
        } else if self.peek_str(">=") {
            CmpOp::Ge
        } else if self.peek_str("<=") {
            CmpOp::Le
        } else if self.peek_char() == Some('>') {
            CmpOp::Gt
        } else if self.peek_char() == Some('<') {
            CmpOp::Lt
        } else {
            return Ok(left);
        };
        self.pos += match op {
            CmpOp::Gt | CmpOp::Lt => 1,
            _ => 2,
        };

        self.skip_whitespace();
        let right = self.parse_operand()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn parse_operand(&mut self) -> Result<Expr, EvalError> {
        self.skip_whitespace();

        match self.peek_char() {
            Some('(') => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.skip_whitespace();
                if self.peek_char() != Some(')') {
                    return Err(self.error("expected ')'".to_string()));
                }
                self.pos += 1;
                Ok(expr)
            }
            Some('"') => self.parse_string(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_path(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of expression".to_string())),
        }
    }

    fn parse_path(&mut self) -> Result<Expr, EvalError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let path = &self.input[start..self.pos];
        match path {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(self.error(format!("malformed path '{path}'")));
        }
        Ok(Expr::Path(segments))
    }

    fn parse_string(&mut self) -> Result<Expr, EvalError> {
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '"' {
                let s = &self.input[start..self.pos];
                self.pos += 1;
                return Ok(Expr::Literal(Value::String(s.to_string())));
            }
            if c == '\\' {
                self.pos += 2;
            } else {
                self.pos += c.len_utf8();
            }
        }
        Err(self.error("unterminated string".to_string()))
    }

    fn parse_number(&mut self) -> Result<Expr, EvalError> {
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek_char() == Some('.') {
            is_float = true;
            self.pos += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        let text = &self.input[start..self.pos];
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Expr::Literal(Value::from(n)));
            }
        }
        let n = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number '{text}'")))?;
        serde_json::Number::from_f64(n)
            .map(|n| Expr::Literal(Value::Number(n)))
            .ok_or_else(|| self.error(format!("invalid number '{text}'")))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}
