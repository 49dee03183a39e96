//! A small arithmetic expression language evaluated elementwise over series.
//!
//! The only free variable is `x`, bound to each value of a series in turn.
//! Constants are `pi` and `e`; functions come from a fixed whitelist.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | 'x' | 'pi' | 'e' | name '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

use crate::compute::ComputationResult;
use crate::error::{AnemosError, Result};
use crate::series::Series;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Ident(usize, usize),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Comma,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];
        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                pos += 1;
                continue;
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut lookahead = pos + 1;
                    if lookahead < bytes.len() && (bytes[lookahead] == b'+' || bytes[lookahead] == b'-') {
                        lookahead += 1;
                    }
                    if lookahead < bytes.len() && bytes[lookahead].is_ascii_digit() {
                        pos = lookahead;
                        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let literal = &text[start..pos];
                let value = literal.parse::<f64>().map_err(|_| AnemosError::Expression {
                    position: start,
                    message: format!("invalid number `{}`", literal),
                })?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(start, pos)));
                continue;
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' if bytes.get(pos + 1) == Some(&b'*') => {
                pos += 1;
                Token::Caret
            }
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'^' => Token::Caret,
            b',' => Token::Comma,
            b'(' => Token::Open,
            b')' => Token::Close,
            _ => {
                return Err(AnemosError::Expression {
                    position: start,
                    message: format!("unexpected character `{}`", char::from(c)),
                })
            }
        };
        pos += 1;
        tokens.push((start, token));
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Floor,
    Ceil,
    Round,
    Sign,
    Min,
    Max,
    Pow,
    Atan2,
    Hypot,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let function = match name {
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "log10" => Self::Log10,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "sign" => Self::Sign,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            "atan2" => Self::Atan2,
            "hypot" => Self::Hypot,
            _ => return None,
        };
        Some(function)
    }

    fn arity(self) -> usize {
        match self {
            Self::Min | Self::Max | Self::Pow | Self::Atan2 | Self::Hypot => 2,
            _ => 1,
        }
    }

    fn call(self, args: &[f64]) -> f64 {
        let a = args[0];
        match self {
            Self::Abs => a.abs(),
            Self::Sqrt => a.sqrt(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log10 => a.log10(),
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            Self::Round => a.round(),
            Self::Sign => {
                if a == 0.0 || a.is_nan() {
                    a
                } else {
                    a.signum()
                }
            }
            Self::Min => propagate(a, args[1], f64::min),
            Self::Max => propagate(a, args[1], f64::max),
            Self::Pow => a.powf(args[1]),
            Self::Atan2 => a.atan2(args[1]),
            Self::Hypot => a.hypot(args[1]),
        }
    }
}

/// Missing values propagate through `min` and `max`.
fn propagate(a: f64, b: f64, f: fn(f64, f64) -> f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        f(a, b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Variable,
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

impl Node {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Variable => x,
            Self::Negate(inner) => -inner.eval(x),
            Self::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(x), rhs.eval(x));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    // Floored modulo: the result takes the divisor's sign.
                    BinaryOp::Rem => a - b * (a / b).floor(),
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Self::Call(function, args) => {
                let values: Vec<f64> = args.iter().map(|arg| arg.eval(x)).collect();
                function.call(&values)
            }
        }
    }
}

/// Maximum nesting of unary operators, parentheses and function calls.
pub const MAX_DEPTH: usize = 256;

/// Maximum tokens in one expression; bounds the height of operator chains.
pub const MAX_TOKENS: usize = 4096;

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.cursor).map(|&(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map_or(self.text.len(), |&(position, _)| position)
    }

    fn error(&self, message: impl Into<String>) -> AnemosError {
        AnemosError::Expression {
            position: self.position(),
            message: message.into(),
        }
    }

    fn eat(&mut self, expected: Token) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn expr(&mut self) -> Result<Node> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(node),
            };
            self.cursor += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Node> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(node),
            };
            self.cursor += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?));
        }
    }

    // Every recursive path of the grammar passes through here.
    fn unary(&mut self) -> Result<Node> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let node = self.unary_inner();
        self.depth -= 1;
        node
    }

    fn unary_inner(&mut self) -> Result<Node> {
        if self.eat(Token::Minus) {
            return Ok(Node::Negate(Box::new(self.unary()?)));
        }
        if self.eat(Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node> {
        let base = self.primary()?;
        if self.eat(Token::Caret) {
            let exponent = self.unary()?;
            return Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node> {
        let Some(token) = self.peek() else {
            return Err(self.error("unexpected end of expression"));
        };
        match token {
            Token::Number(value) => {
                self.cursor += 1;
                Ok(Node::Number(value))
            }
            Token::Open => {
                self.cursor += 1;
                let inner = self.expr()?;
                self.expect(Token::Close, "`)`")?;
                Ok(inner)
            }
            Token::Ident(start, end) => {
                let name = &self.text[start..end];
                self.cursor += 1;
                match name {
                    "x" => return Ok(Node::Variable),
                    "pi" => return Ok(Node::Number(std::f64::consts::PI)),
                    "e" => return Ok(Node::Number(std::f64::consts::E)),
                    _ => {}
                }
                let function = Function::lookup(name).ok_or_else(|| AnemosError::Expression {
                    position: start,
                    message: format!("unknown name `{}`", name),
                })?;
                self.expect(Token::Open, "`(` after function name")?;
                let mut args = vec![self.expr()?];
                while self.eat(Token::Comma) {
                    args.push(self.expr()?);
                }
                self.expect(Token::Close, "`)`")?;
                if args.len() != function.arity() {
                    return Err(AnemosError::Expression {
                        position: start,
                        message: format!(
                            "`{}` takes {} argument(s), got {}",
                            name,
                            function.arity(),
                            args.len()
                        ),
                    });
                }
                Ok(Node::Call(function, args))
            }
            _ => Err(self.error("expected a number, name or `(`")),
        }
    }
}

/// A parsed expression in `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Node,
}

impl Expression {
    /// Parses `text`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser {
            text,
            tokens: tokenize(text)?,
            cursor: 0,
            depth: 0,
        };
        if parser.tokens.len() > MAX_TOKENS {
            parser.cursor = MAX_TOKENS;
            return Err(parser.error(format!("expression longer than {} tokens", MAX_TOKENS)));
        }
        let root = parser.expr()?;
        if parser.peek().is_some() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { root })
    }

    /// Evaluates with `x` bound to `value`.
    pub fn evaluate(&self, value: f64) -> f64 {
        self.root.eval(value)
    }
}

/// Applies `expression` to the values of every series.
pub fn generic_expression(expression: &str, series: &[Series]) -> Result<ComputationResult> {
    let expression = Expression::parse(expression)?;
    let results = series
        .iter()
        .map(|s| s.with_values(s.values().iter().map(|&v| expression.evaluate(v)).collect()))
        .collect::<Result<Vec<_>>>()?;
    Ok(ComputationResult::Expression(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, x: f64) -> f64 {
        Expression::parse(text).unwrap().evaluate(x)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_eq!(eval("2 ** 3", 0.0), 8.0);
        assert_eq!(eval("-x ^ 2", 3.0), -9.0);
        assert_eq!(eval("2 * -x", 3.0), -6.0);
        assert_eq!(eval("1.5e2 + x", 1.0), 151.0);
    }

    #[test]
    fn test_functions_and_constants() {
        assert!((eval("sin(pi / 2)", 0.0) - 1.0).abs() < 1e-12);
        assert_eq!(eval("max(x, 10)", 3.0), 10.0);
        assert_eq!(eval("sqrt(x) + abs(-1)", 16.0), 5.0);
        assert!((eval("ln(e)", 0.0) - 1.0).abs() < 1e-12);
        assert_eq!(eval("-7 % 3", 0.0), 2.0);
        assert_eq!(eval("sign(x)", -4.0), -1.0);
    }

    #[test]
    fn test_missing_propagates() {
        assert!(eval("x * 2 + 1", f64::NAN).is_nan());
        assert!(eval("min(x, 1)", f64::NAN).is_nan());
    }

    #[test]
    fn test_parse_errors() {
        for (text, position) in [("x +", 3), ("foo(x)", 0), ("x $ 2", 2), ("pow(x)", 0), ("(x", 2), ("x x", 2)] {
            match Expression::parse(text) {
                Err(AnemosError::Expression { position: at, .. }) => {
                    assert_eq!(at, position, "{}", text)
                }
                other => panic!("{} parsed to {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_nesting_limit() {
        for text in [
            format!("{}x", "-".repeat(100_000)),
            "(".repeat(100_000),
            format!("{}x{}", "abs(".repeat(100_000), ")".repeat(100_000)),
        ] {
            assert!(matches!(
                Expression::parse(&text),
                Err(AnemosError::Expression { .. })
            ));
        }
        for text in [format!("{}x", "-".repeat(1_000)), "(".repeat(1_000)] {
            match Expression::parse(&text) {
                Err(AnemosError::Expression { message, .. }) => {
                    assert!(message.contains("nested too deeply"), "{}", message)
                }
                other => panic!("deep input parsed to {:?}", other.map(|_| ())),
            }
        }

        let chain = format!("{}x", "x+".repeat(100_000));
        assert!(matches!(
            Expression::parse(&chain),
            Err(AnemosError::Expression { .. })
        ));

        let nested = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&nested, 2.0), 2.0);
        assert_eq!(eval(&format!("{}x", "-".repeat(200)), 2.0), 2.0);
    }

    #[test]
    fn test_no_scope_access() {
        assert!(Expression::parse("__import__(x)").is_err());
        assert!(Expression::parse("y + 1").is_err());
    }
}
