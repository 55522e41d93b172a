//! Calculator tool
//!
//! Evaluates arithmetic expressions. Input is checked against a character
//! allow-list first, then parsed by a small recursive-descent evaluator:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | name | name '(' args ')' | '(' expr ')'
//! ```

use async_trait::async_trait;

use crate::core::{ToolDeclaration, ToolOutcome};
use crate::tools::registry::Tool;

const MAX_EXPRESSION_LEN: usize = 1024;

/// Tool for precise arithmetic
#[derive(Debug, Clone, Default)]
pub struct CalculatorTool;

impl CalculatorTool {
    /// Create a new calculator tool
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn declaration(&self) -> ToolDeclaration {
        declaration()
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let expression = arguments
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing required argument 'expression'".to_string())?;

        let value = evaluate(expression)?;
        Ok(serde_json::Value::String(format_number(value)))
    }
}

/// Declaration advertised to agents that may calculate
pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        "calculator",
        "Perform mathematical calculations. Use this for any math capability.",
        serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "expression": {
                    "type": "STRING",
                    "description": "The mathematical expression to evaluate (e.g., \"2 + 2\", \"sin(0.5) * 3\")"
                }
            },
            "required": ["expression"]
        }),
    )
}

/// Evaluate an expression to a finite number
pub fn evaluate(expression: &str) -> Result<f64, String> {
    if expression.trim().is_empty() {
        return Err("Expression is empty".to_string());
    }
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err("Expression is too long".to_string());
    }
    if !expression.chars().all(is_allowed) {
        return Err("Invalid characters in expression".to_string());
    }

    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;

    if let Some(token) = parser.peek() {
        return Err(format!("Unexpected '{}' in expression", token));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".to_string());
    }
    Ok(value)
}

/// Render integral values without a fractional part
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if value.fract() == 0.0 && magnitude < 1e15 {
        format!("{}", value as i64)
    } else if !(1e-6..1e21).contains(&magnitude) {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_digit()
        || c.is_ascii_lowercase()
        || c.is_whitespace()
        || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.' | '^' | '%' | ',' | 'M')
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Name(name) => write!(f, "{}", name),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent: 1e3, 2.5e-4
                if i < chars.len() && chars[i] == 'e' {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number '{}'", literal))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let name = name.strip_prefix("Math.").unwrap_or(&name).to_string();
                tokens.push(Token::Name(name));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(format!("Unexpected character '{}'", other)),
        }
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("Expected '{}' but found '{}'", expected, token)),
            None => Err(format!("Expected '{}' at end of expression", expected)),
        }
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/', '%']) {
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                '/' => {
                    if rhs == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    value / rhs
                }
                _ => {
                    if rhs == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    value % rhs
                }
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.eat_op(&['+', '-']) {
            Some('-') => Ok(-self.unary()?),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    call_function(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(format!("Unexpected '{}' in expression", token)),
            None => Err("Unexpected end of expression".to_string()),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(format!("Expected ',' or ')' but found '{}'", token)),
                None => return Err("Unclosed function call".to_string()),
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name.to_ascii_lowercase().as_str() {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => Err(format!("Unknown constant '{}'", name)),
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, String> {
    let unary = |f: fn(f64) -> f64| -> Result<f64, String> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(format!("{}() takes exactly one argument", name)),
        }
    };
    let binary = |f: fn(f64, f64) -> f64| -> Result<f64, String> {
        match args {
            [x, y] => Ok(f(*x, *y)),
            _ => Err(format!("{}() takes exactly two arguments", name)),
        }
    };

    match name {
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "sinh" => unary(f64::sinh),
        "cosh" => unary(f64::cosh),
        "tanh" => unary(f64::tanh),
        "sqrt" => unary(f64::sqrt),
        "cbrt" => unary(f64::cbrt),
        "abs" => unary(f64::abs),
        "ln" | "log" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "log2" => unary(f64::log2),
        "exp" => unary(f64::exp),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "trunc" => unary(f64::trunc),
        "sign" => unary(|x| if x == 0.0 { 0.0 } else { x.signum() }),
        // half-way values round toward +infinity
        "round" => unary(|x| (x + 0.5).floor()),
        "pow" => binary(f64::powf),
        "atan2" => binary(f64::atan2),
        "hypot" => binary(f64::hypot),
        "min" | "max" => {
            if args.is_empty() {
                return Err(format!("{}() needs at least one argument", name));
            }
            let fold: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
            Ok(args.iter().copied().fold(args[0], fold))
        }
        _ => Err(format!("Unknown function '{}'", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> String {
        format_number(evaluate(expr).unwrap())
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("2+2*10"), "22");
        assert_eq!(eval("(2+2)*10"), "40");
        assert_eq!(eval("10 - 4 - 3"), "3");
        assert_eq!(eval("2^3^2"), "512");
        assert_eq!(eval("-2^2"), "-4");
        assert_eq!(eval("2**-1"), "0.5");
        assert_eq!(eval("17 % 5"), "2");
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(eval("sqrt(16) + abs(-2)"), "6");
        assert_eq!(eval("Math.max(1, 7, 3)"), "7");
        assert_eq!(eval("round(2.5)"), "3");
        assert_eq!(eval("round(-2.5)"), "-2");
        assert!((evaluate("sin(pi / 2)").unwrap() - 1.0).abs() < 1e-12);
        assert!((evaluate("ln(e)").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_decimals_and_exponents() {
        assert_eq!(eval("0.1 + 0.2"), "0.30000000000000004");
        assert_eq!(eval("1.5e3"), "1500");
        assert_eq!(eval(".5 * 4"), "2");
    }

    #[test]
    fn test_rejects_disallowed_characters() {
        assert_eq!(
            evaluate("process.exit(1); 2 + 2 = 4"),
            Err("Invalid characters in expression".to_string())
        );
        assert!(evaluate("A+1").is_err());
        assert!(evaluate("\"quoted\"").is_err());
    }

    #[test]
    fn test_reports_malformed_expressions() {
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("foo(2)").is_err());
        assert!(evaluate("sqrt(1, 2)").is_err());
        assert!(evaluate("sqrt(-1)").is_err());
    }

    #[tokio::test]
    async fn test_tool_execute() {
        let tool = CalculatorTool::new();
        let outcome = tool
            .execute(&serde_json::json!({"expression": "2+2*10"}))
            .await;
        assert_eq!(outcome, Ok(serde_json::json!("22")));

        let missing = tool.execute(&serde_json::json!({})).await;
        assert!(missing.is_err());
    }
}
