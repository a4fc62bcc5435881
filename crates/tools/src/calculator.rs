//! Calculator tool: evaluates arithmetic expressions.
//!
//! Supports `+ - * / % ^`, parentheses, unary minus and decimal numbers.
//! `^` binds tighter than unary minus and is right-associative, so
//! `-2 ^ 2 == -4` and `2 ^ 3 ^ 2 == 512`.

use agentry_core::error::ToolError;
use agentry_core::tool::Tool;
use async_trait::async_trait;
use serde_json::json;

pub struct CalculatorTool {
    name: String,
}

impl CalculatorTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new("calculator")
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, %, ^, parentheses, and decimal numbers."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string" },
                "result": { "type": "number" }
            },
            "required": ["expression", "result"]
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let expression = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::failed(&self.name, "missing 'expression' argument"))?;

        let value = evaluate(expression).map_err(|e| ToolError::failed(&self.name, e))?;
        if !value.is_finite() {
            return Err(ToolError::failed(&self.name, "result is not a finite number"));
        }

        // Whole numbers come back as integers so the model sees "5", not "5.0".
        let result = if value.fract() == 0.0 && value.abs() < 1e15 {
            json!(value as i64)
        } else {
            json!(value)
        };
        Ok(json!({ "expression": expression, "result": result }))
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = lex(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.sum()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(value),
        Some(tok) => Err(format!("unexpected {tok:?} at token {}", parser.pos)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn lex(input: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Tok::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Tok::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Tok::Close);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                let literal = &input[start..end];
                let n = literal
                    .parse()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Tok::Num(n));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

/// Deepest chain of unary signs, exponents or parentheses accepted.
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
    /// Open `unary` frames; every recursive path passes through one.
    depth: usize,
}

impl Parser<'_> {
    fn next_op(&self, ops: &[char]) -> Option<char> {
        match self.tokens.get(self.pos) {
            Some(Tok::Op(c)) if ops.contains(c) => Some(*c),
            _ => None,
        }
    }

    // sum = product (('+' | '-') product)*
    fn sum(&mut self) -> Result<f64, String> {
        let mut acc = self.product()?;
        while let Some(op) = self.next_op(&['+', '-']) {
            self.pos += 1;
            let rhs = self.product()?;
            if op == '+' {
                acc += rhs;
            } else {
                acc -= rhs;
            }
        }
        Ok(acc)
    }

    // product = unary (('*' | '/' | '%') unary)*
    fn product(&mut self) -> Result<f64, String> {
        let mut acc = self.unary()?;
        while let Some(op) = self.next_op(&['*', '/', '%']) {
            self.pos += 1;
            let rhs = self.unary()?;
            match op {
                '*' => acc *= rhs,
                _ if rhs == 0.0 => return Err("division by zero".into()),
                '/' => acc /= rhs,
                _ => acc %= rhs,
            }
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".into());
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // unary = ('-' | '+') unary | power
    fn signed(&mut self) -> Result<f64, String> {
        match self.next_op(&['-', '+']) {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(_) => {
                self.pos += 1;
                self.unary()
            }
            None => self.power(),
        }
    }

    // power = atom ('^' unary)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.next_op(&['^']).is_some() {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    // atom = NUMBER | '(' sum ')'
    fn atom(&mut self) -> Result<f64, String> {
        let tok = self.tokens.get(self.pos).copied();
        self.pos += 1;
        match tok {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Open) => {
                let inner = self.sum()?;
                match self.tokens.get(self.pos) {
                    Some(Tok::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err("expected ')'".into()),
                }
            }
            Some(other) => Err(format!("unexpected {other:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}
