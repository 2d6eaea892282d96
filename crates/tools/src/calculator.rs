//! Calculator tool — spots arithmetic in chat messages and evaluates it.
//!
//! Supports `+`, `-`, `*`, `/`, `%`, `^`, parentheses, decimals and unary
//! negation via a small recursive-descent parser.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolResult};
use std::iter::Peekable;
use std::str::Chars;

/// Phrases that mark a message as asking for a calculation.
const CUES: &[&str] = &["calculate", "compute", "what is", "what's", "how much is", "solve"];

/// Longest expression the tool will look at, in chars.
const MAX_EXPRESSION_LEN: usize = 256;

/// Deepest nesting of parentheses, negations and exponents the parser follows.
const MAX_DEPTH: usize = 64;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate arithmetic found in the message, e.g. 'what is (2 + 3) * 4?'"
    }

    fn detect(&self, message: &str) -> Option<serde_json::Value> {
        extract_expression(message).map(|expr| serde_json::json!({ "expression": expr }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        match evaluate(expr) {
            Ok(value) => Ok(ToolResult {
                success: true,
                output: format!("{expr} = {}", format_number(value)),
                data: Some(serde_json::json!({ "expression": expr, "result": value })),
            }),
            Err(e) => Ok(ToolResult {
                success: false,
                output: format!("Could not evaluate {expr}: {e}"),
                data: None,
            }),
        }
    }
}

/// Integers print without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn is_expression_char(c: char) -> bool {
    c.is_ascii_digit() || " .+-*/%^()".contains(c)
}

/// Find an arithmetic expression the user is asking about.
///
/// A message qualifies when it is nothing but an expression, or when it
/// carries a cue phrase ("what is", "calculate", ...) followed by one.
pub fn extract_expression(message: &str) -> Option<String> {
    let trimmed = message.trim().trim_end_matches(['?', '!', '.', '=']).trim();
    let whole_message = trimmed.chars().all(is_expression_char);
    let lower = message.to_lowercase();
    if !whole_message && !CUES.iter().any(|cue| lower.contains(cue)) {
        return None;
    }

    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in trimmed.chars() {
        if is_expression_char(c) {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    runs.push(current);

    runs.into_iter()
        .map(|run| run.trim().trim_end_matches('.').trim().to_string())
        .filter(|run| run.len() <= MAX_EXPRESSION_LEN)
        .filter(|run| {
            run.chars().any(|c| c.is_ascii_digit()) && run.chars().any(|c| "+-*/%^".contains(c))
        })
        .find(|run| evaluate(run).is_ok())
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected {0:?}")]
    UnexpectedToken(Token),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("expression is longer than 256 characters")]
    TooLong,
    #[error("expression nests deeper than 64 levels")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Number(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Chars<'_>> = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit() || **d == '.') {
                    literal.push(d);
                    chars.next();
                }
                let n = literal.parse().map_err(|_| CalcError::InvalidNumber(literal))?;
                tokens.push(Token::Number(n));
            }
            other => return Err(CalcError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    if expr.len() > MAX_EXPRESSION_LEN {
        return Err(CalcError::TooLong);
    }
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, depth: 0 };
    let value = parser.sum()?;
    if let Some(tok) = parser.peek() {
        return Err(CalcError::UnexpectedToken(tok));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.peek();
        self.pos += usize::from(tok.is_some());
        tok
    }

    /// Run `f` one nesting level deeper, refusing past `MAX_DEPTH`.
    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<f64, CalcError>,
    ) -> Result<f64, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let value = f(self);
        self.depth -= 1;
        value
    }

    // sum = product (('+' | '-') product)*
    fn sum(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.product()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.next();
            let rhs = self.product()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    // product = power (('*' | '/' | '%') power)*
    fn product(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.power()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.next();
            let rhs = self.power()?;
            acc = match op {
                '*' => acc * rhs,
                _ if rhs == 0.0 => return Err(CalcError::DivisionByZero),
                '/' => acc / rhs,
                _ => acc % rhs,
            };
        }
        Ok(acc)
    }

    // power = unary ('^' power)?   (right associative)
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.unary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            let exponent = self.nested(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // unary = '-' unary | atom
    fn unary(&mut self) -> Result<f64, CalcError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.next();
            return Ok(-self.nested(Self::unary)?);
        }
        self.atom()
    }

    // atom = NUMBER | '(' sum ')'
    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.nested(Self::sum)?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    Some(tok) => Err(CalcError::UnexpectedToken(tok)),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(tok) => Err(CalcError::UnexpectedToken(tok)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("((1 + 2) * (3 + 4))").unwrap(), 21.0);
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), 4.0);
    }

    #[test]
    fn modulo_and_division() {
        assert_eq!(evaluate("10 % 4").unwrap(), 2.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("1 % 0"), Err(CalcError::DivisionByZero));
    }

    #[test]
    fn malformed_expressions() {
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate(""), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert!(matches!(evaluate("1..2"), Err(CalcError::InvalidNumber(_))));
        assert_eq!(evaluate("2 $ 3"), Err(CalcError::UnexpectedChar('$')));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let nested = format!("{}1+1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&nested), Err(CalcError::TooDeep));
        assert_eq!(evaluate(&format!("{}1", "-".repeat(100))), Err(CalcError::TooDeep));

        let shallow = format!("{}1+1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&shallow).unwrap(), 2.0);
    }

    #[test]
    fn oversized_messages_are_ignored() {
        let message = format!("{}1+1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(extract_expression(&message).is_none());
        assert_eq!(evaluate(&message), Err(CalcError::TooLong));

        let long_sum = vec!["1"; 200].join("+");
        assert!(extract_expression(&format!("what is {long_sum}?")).is_none());
    }

    #[test]
    fn detects_expression_after_cue() {
        assert_eq!(extract_expression("Rin, what is 12 * (3 + 4)?").as_deref(), Some("12 * (3 + 4)"));
        assert_eq!(extract_expression("can you calculate 2^10 for me").as_deref(), Some("2^10"));
    }

    #[test]
    fn detects_bare_expression() {
        assert_eq!(extract_expression("15 / 3 =").as_deref(), Some("15 / 3"));
    }

    #[test]
    fn ignores_casual_numbers() {
        assert!(extract_expression("I have 2 cats and 1 dog").is_none());
        assert!(extract_expression("see you at 10-12 tomorrow").is_none());
        assert!(extract_expression("what is your favourite colour?").is_none());
    }

    #[tokio::test]
    async fn execute_reports_equation() {
        let result = CalculatorTool
            .execute(serde_json::json!({"expression": "10 / 4"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "10 / 4 = 2.5");
        assert_eq!(result.data.unwrap()["result"], 2.5);
    }

    #[tokio::test]
    async fn execute_formats_integers() {
        let result = CalculatorTool
            .execute(serde_json::json!({"expression": "6 * 7"}))
            .await
            .unwrap();
        assert_eq!(result.output, "6 * 7 = 42");
    }

    #[tokio::test]
    async fn execute_missing_expression() {
        let result = CalculatorTool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
