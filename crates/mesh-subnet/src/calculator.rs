// crates/mesh-subnet/src/calculator.rs
//
// Arithmetic evaluator used by server-mode nodes.
//
// Grammar (spaces ignored):
//   expr    := term (('+' | '-') term)*
//   term    := factor (('*' | '/') factor)*
//   factor  := ('+' | '-') factor | primary
//   primary := number | '(' expr ')'
//   number  := digits ['.' digits] | '.' digits | digits '.'
//
// Integer literals and `+ - *` over them are exact. `/` and any decimal
// operand produce a float, and the final value is converted to f64 once.

use bigdecimal::{num_bigint::BigInt, BigDecimal, ToPrimitive, Zero};

/// Characters an expression may contain once spaces are removed.
const ALLOWED_CHARS: &str = "0123456789+-*/.()";

/// Deepest parenthesis/sign nesting accepted.
const MAX_DEPTH: usize = 256;

/// Evaluates expression text to a number or an error message.
pub trait Evaluator: Send {
    fn evaluate(&mut self, expression: &str) -> Result<f64, String>;
}

/// The default evaluator: `+ - * /`, unary signs and parentheses over
/// decimal numbers.
#[derive(Debug, Default)]
pub struct Calculator {
    operation_count: u64,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of expressions evaluated successfully.
    pub fn operation_count(&self) -> u64 {
        self.operation_count
    }

    /// Evaluate `expression`.
    pub fn calculate(&mut self, expression: &str) -> Result<f64, String> {
        let clean: Vec<u8> = expression.bytes().filter(|b| *b != b' ').collect();
        if !clean.iter().all(|b| ALLOWED_CHARS.as_bytes().contains(b)) {
            return Err("Invalid characters in expression".to_string());
        }

        let mut parser = Parser {
            input: &clean,
            pos: 0,
            depth: 0,
        };
        let value = parser.parse()?.to_f64();
        if !value.is_finite() {
            return Err("Result is not a finite number".to_string());
        }

        self.operation_count += 1;
        Ok(value)
    }
}

impl Evaluator for Calculator {
    fn evaluate(&mut self, expression: &str) -> Result<f64, String> {
        self.calculate(expression)
    }
}

/// Intermediate value: exact while only integers are involved.
#[derive(Debug, Clone)]
enum Number {
    Int(BigInt),
    Float(f64),
}

impl Number {
    fn to_f64(&self) -> f64 {
        match self {
            Number::Int(i) => i.to_f64().unwrap_or(f64::INFINITY),
            Number::Float(f) => *f,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Number::Int(i) => i.is_zero(),
            Number::Float(f) => *f == 0.0,
        }
    }

    fn neg(self) -> Self {
        match self {
            Number::Int(i) => Number::Int(-i),
            Number::Float(f) => Number::Float(-f),
        }
    }

    fn apply(self, op: u8, rhs: Number) -> Result<Number, String> {
        if op == b'/' {
            return self.div(rhs);
        }
        Ok(match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Number::Int(match op {
                b'+' => a + b,
                b'-' => a - b,
                _ => a * b,
            }),
            (a, b) => {
                let (a, b) = (a.to_f64(), b.to_f64());
                Number::Float(match op {
                    b'+' => a + b,
                    b'-' => a - b,
                    _ => a * b,
                })
            }
        })
    }

    fn div(self, rhs: Number) -> Result<Number, String> {
        if rhs.is_zero() {
            return Err("Division by zero".to_string());
        }
        Ok(match (self, rhs) {
            // True division of two integers, rounded once.
            (Number::Int(a), Number::Int(b)) => {
                let quotient = BigDecimal::new(a, 0) / BigDecimal::new(b, 0);
                Number::Float(quotient.to_f64().unwrap_or(f64::NAN))
            }
            (a, b) => Number::Float(a.to_f64() / b.to_f64()),
        })
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn parse(&mut self) -> Result<Number, String> {
        if self.input.is_empty() {
            return Err("Invalid expression: empty".to_string());
        }
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(c) => Err(self.unexpected(c)),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn unexpected(&self, c: u8) -> String {
        format!(
            "Invalid expression: unexpected '{}' at position {}",
            c as char, self.pos
        )
    }

    fn expr(&mut self) -> Result<Number, String> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = value.apply(op, rhs)?;
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Number, String> {
        let mut value = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            // `**` and `//` are not operators here.
            if let Some(next @ (b'*' | b'/')) = self.peek() {
                return Err(self.unexpected(next));
            }
            let rhs = self.factor()?;
            value = value.apply(op, rhs)?;
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<Number, String> {
        match self.peek() {
            Some(sign @ (b'+' | b'-')) => {
                self.pos += 1;
                let value = self.nested(Self::factor)?;
                Ok(if sign == b'-' { value.neg() } else { value })
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Number, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.nested(Self::expr)?;
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(c) => Err(self.unexpected(c)),
                    None => Err("Invalid expression: missing ')'".to_string()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(self.unexpected(c)),
            None => Err("Invalid expression: unexpected end of input".to_string()),
        }
    }

    fn nested(
        &mut self,
        rule: fn(&mut Self) -> Result<Number, String>,
    ) -> Result<Number, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("Invalid expression: nesting too deep".to_string());
        }
        let value = rule(self);
        self.depth -= 1;
        value
    }

    fn number(&mut self) -> Result<Number, String> {
        let start = self.pos;
        let mut digits = 0;
        let mut dots = 0;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => digits += 1,
                b'.' => dots += 1,
                _ => break,
            }
            self.pos += 1;
        }

        let raw = &self.input[start..self.pos];
        // Only ASCII digits and dots were consumed.
        let text = std::str::from_utf8(raw).unwrap_or_default();
        if digits == 0 || dots > 1 {
            return Err(format!("Invalid expression: bad number '{}'", text));
        }

        if dots == 1 {
            return text
                .parse::<f64>()
                .map(Number::Float)
                .map_err(|e| format!("Invalid expression: bad number '{}': {}", text, e));
        }
        // Integer literals may not carry leading zeros unless they are all zeros.
        if raw.len() > 1 && raw[0] == b'0' && raw.iter().any(|b| *b != b'0') {
            return Err(format!("Invalid expression: leading zeros in '{}'", text));
        }
        BigInt::parse_bytes(raw, 10)
            .map(Number::Int)
            .ok_or_else(|| format!("Invalid expression: bad number '{}'", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(expr: &str) -> Result<f64, String> {
        Calculator::new().calculate(expr)
    }

    #[test]
    fn basic_operations() {
        assert_eq!(calc("4 * 3").unwrap(), 12.0);
        assert_eq!(calc("15 + 27").unwrap(), 42.0);
        assert_eq!(calc("100 / 4").unwrap(), 25.0);
        assert_eq!(calc("10 - 15").unwrap(), -5.0);
        assert_eq!(calc("1+1").unwrap(), 2.0);
    }

    #[test]
    fn precedence_parentheses_and_signs() {
        assert_eq!(calc("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(calc("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(calc("8 / 4 / 2").unwrap(), 1.0);
        assert_eq!(calc("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(calc("-(3 - 5)").unwrap(), 2.0);
        assert_eq!(calc("2 * -3").unwrap(), -6.0);
        assert_eq!(calc("--4").unwrap(), 4.0);
        assert_eq!(calc("1.5 * 2").unwrap(), 3.0);
        assert_eq!(calc(".5 + 5.").unwrap(), 5.5);
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(calc("10 / 0").unwrap_err(), "Division by zero");
        assert_eq!(calc("1 / (2 - 2)").unwrap_err(), "Division by zero");
        assert_eq!(calc("0 / 0.0").unwrap_err(), "Division by zero");
    }

    #[test]
    fn invalid_characters() {
        for expr in ["4*x", "2^3", "1e5", "abs(1)", "1;2", "2 % 3"] {
            assert_eq!(
                calc(expr).unwrap_err(),
                "Invalid characters in expression",
                "{}",
                expr
            );
        }
    }

    #[test]
    fn malformed_expressions() {
        for expr in ["", "   ", "1 +", "(1 + 2", "1 + 2)", "()", "1..2", "1.2.3", ".", "2 ** 3", "7 // 2"] {
            let err = calc(expr).unwrap_err();
            assert!(err.starts_with("Invalid expression"), "{}: {}", expr, err);
        }
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let expr = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        assert_eq!(calc(&expr).unwrap_err(), "Invalid expression: nesting too deep");
        let expr = format!("{}1", "-".repeat(1000));
        assert!(calc(&expr).is_err());
    }

    #[test]
    fn overflow_is_not_finite() {
        let big = "9".repeat(400);
        assert_eq!(
            calc(&format!("{} * {}", big, big)).unwrap_err(),
            "Result is not a finite number"
        );
    }

    #[test]
    fn integer_arithmetic_is_exact() {
        assert_eq!(calc("9007199254740993 - 9007199254740992").unwrap(), 1.0);
        assert_eq!(calc("99999999999999999 * 10 - 999999999999999989").unwrap(), 1.0);

        let big = format!("1{}", "0".repeat(400));
        assert_eq!(calc(&format!("{} - {}", big, big)).unwrap(), 0.0);
        assert_eq!(calc(&format!("{} / {}", big, big)).unwrap(), 1.0);
        assert_eq!(calc(&format!("-{} / {}", big, big)).unwrap(), -1.0);
    }

    #[test]
    fn division_and_decimals_produce_floats() {
        assert_eq!(calc("7 / 2").unwrap(), 3.5);
        assert!((calc("1 / 3").unwrap() - 1.0 / 3.0).abs() < 1e-15);
        assert_eq!(calc("0.1 + 0.2").unwrap(), 0.1 + 0.2);
        assert_eq!(calc("3 * 0.5").unwrap(), 1.5);
    }

    #[test]
    fn leading_zeros_in_integers() {
        assert_eq!(
            calc("007").unwrap_err(),
            "Invalid expression: leading zeros in '007'"
        );
        assert!(calc("10 - 01").is_err());
        assert_eq!(calc("0").unwrap(), 0.0);
        assert_eq!(calc("00 + 1").unwrap(), 1.0);
        assert_eq!(calc("007.5").unwrap(), 7.5);
        assert_eq!(calc("0.25 * 4").unwrap(), 1.0);
    }

    #[test]
    fn operation_count_tracks_successes_only() {
        let mut calculator = Calculator::new();
        calculator.calculate("1 + 1").unwrap();
        calculator.calculate("1 / 0").unwrap_err();
        calculator.calculate("2 * 2").unwrap();
        assert_eq!(calculator.operation_count(), 2);
    }
}
