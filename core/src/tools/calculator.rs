//! Arithmetic evaluation tool.

use crate::tools::extract_string_arg;
use crate::traits::{ArgumentSchema, ParamSpec, Tool};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Supports + - * / % ^, parentheses, \
         the constants pi and e, and the functions sqrt, abs, sin, cos, tan, ln, \
         log, exp, round, floor and ceil."
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new(vec![
            ParamSpec::string("expression", "The mathematical expression to evaluate")
                .required(),
        ])
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let expression = extract_string_arg(&args, "expression")?;
        let value = evaluate(&expression)?;
        Ok(format_number(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num_str.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = num_str
                    .parse::<f64>()
                    .map_err(|_| anyhow!("invalid number '{}'", num_str))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c.to_ascii_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Caret);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => bail!("unexpected character '{}'", other),
        }
    }

    Ok(tokens)
}

/// Evaluates an arithmetic expression.
pub fn evaluate(input: &str) -> Result<f64> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        bail!("empty expression");
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != tokens.len() {
        bail!("unexpected tokens after expression");
    }
    if !value.is_finite() {
        bail!("result is not a finite number");
    }
    Ok(value)
}

/// Renders integral values without a fractional part and rounds away
/// floating-point noise past ten decimal places.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let rounded = (value * 1e10).round() / 1e10;
    format!("{}", rounded)
}

/// Nesting limit for parentheses, function calls and unary signs.
const MAX_DEPTH: usize = 128;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        self.pos += 1;
        self.tokens.get(self.pos - 1)
    }

    /// Addition and subtraction.
    fn expr(&mut self) -> Result<f64> {
        let mut left = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    left += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    left -= self.term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    /// Multiplication, division and modulo.
    fn term(&mut self) -> Result<f64> {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    left *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let right = self.unary()?;
                    if right == 0.0 {
                        bail!("division by zero");
                    }
                    left /= right;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let right = self.unary()?;
                    if right == 0.0 {
                        bail!("modulo by zero");
                    }
                    left %= right;
                }
                _ => return Ok(left),
            }
        }
    }

    fn unary(&mut self) -> Result<f64> {
        if self.depth >= MAX_DEPTH {
            bail!("expression nested too deeply");
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    /// Right-associative exponentiation; binds tighter than unary minus on
    /// its left, so `-2^2` is `-4`.
    fn power(&mut self) -> Result<f64> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64> {
        match self.advance().cloned() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect_rparen()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect_rparen()?;
                    apply_function(&name, arg)
                } else {
                    constant(&name)
                }
            }
            Some(_) => bail!("unexpected token"),
            None => bail!("unexpected end of expression"),
        }
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.advance() {
            Some(Token::RParen) => Ok(()),
            _ => bail!("missing closing parenthesis"),
        }
    }
}

fn constant(name: &str) -> Result<f64> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => bail!("unknown identifier '{}'", name),
    }
}

fn apply_function(name: &str, arg: f64) -> Result<f64> {
    let value = match name {
        "sqrt" => {
            if arg < 0.0 {
                bail!("square root of a negative number");
            }
            arg.sqrt()
        }
        "abs" => arg.abs(),
        "sin" => arg.sin(),
        "cos" => arg.cos(),
        "tan" => arg.tan(),
        "ln" | "log" if arg <= 0.0 => bail!("logarithm of a non-positive number"),
        "ln" => arg.ln(),
        "log" => arg.log10(),
        "exp" => arg.exp(),
        "round" => arg.round(),
        "floor" => arg.floor(),
        "ceil" => arg.ceil(),
        _ => bail!("unknown function '{}'", name),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eval_basic_addition() {
        assert_eq!(evaluate("2 + 3").unwrap(), 5.0);
    }

    #[test]
    fn eval_operator_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
    }

    #[test]
    fn eval_parentheses() {
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
    }

    #[test]
    fn eval_modulo() {
        assert_eq!(evaluate("10 % 3").unwrap(), 1.0);
    }

    #[test]
    fn eval_unary_minus() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
    }

    #[test]
    fn eval_power_is_right_associative() {
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0);
        assert_eq!(evaluate("2**10").unwrap(), 1024.0);
    }

    #[test]
    fn eval_functions_and_constants() {
        assert_eq!(evaluate("sqrt(16) + abs(-2)").unwrap(), 6.0);
        assert!((evaluate("cos(pi)").unwrap() + 1.0).abs() < 1e-12);
        assert!((evaluate("log(1000)").unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn eval_division_by_zero() {
        assert!(evaluate("1 / 0").is_err());
    }

    #[test]
    fn eval_rejects_garbage() {
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("2 $ 3").is_err());
        assert!(evaluate("foo(2)").is_err());
    }

    #[test]
    fn eval_rejects_deep_nesting_without_overflowing() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = evaluate(&deep).unwrap_err();
        assert_eq!(err.to_string(), "expression nested too deeply");

        let signs = format!("{}1", "-".repeat(10_000));
        assert!(evaluate(&signs).is_err());

        let calls = format!("{}1{}", "sqrt(".repeat(5_000), ")".repeat(5_000));
        assert!(evaluate(&calls).is_err());
    }

    #[test]
    fn eval_allows_moderate_nesting() {
        let nested = format!("{}2{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(evaluate(&nested).unwrap(), 2.0);
        assert_eq!(evaluate("--3").unwrap(), 3.0);
    }

    #[test]
    fn formats_integral_results_without_fraction() {
        assert_eq!(format_number(84.0), "84");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[tokio::test]
    async fn tool_evaluates_expression() {
        let out = CalculatorTool
            .execute(json!({"expression": "12*7"}))
            .await
            .unwrap();
        assert_eq!(out, "84");
    }
}
