use std::fmt;

use crate::Value;

/// Comparison operators accepted in `<if test="…">`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    /// Parses an operator token, accepting the XML-escaped forms of `<` and `>`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" | "&lt;" => Some(Self::Lt),
            ">" | "&gt;" => Some(Self::Gt),
            "<=" | "&lt;=" => Some(Self::Le),
            ">=" | "&gt;=" => Some(Self::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    fn apply<T: PartialOrd>(&self, a: T, b: T) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Gt => a > b,
            Self::Le => a <= b,
            Self::Ge => a >= b,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluates `a <op> b` under loose coercion.
///
/// The order of the checks matters:
/// 1. two nulls are equal to each other and unordered;
/// 2. a null against a value is never equal (bound optionals holding nothing are already null);
/// 3. two text operands compare `==`/`!=` as text, orderings fall through to step 4;
/// 4. both operands are tried as `f64`, then as `f32`.
///
/// Anything else, booleans included, is `false`. Mismatched operands never error.
pub fn evaluate(op: Operator, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => return op == Operator::Eq,
        (Value::Null, _) | (_, Value::Null) => return op == Operator::Ne,
        (Value::Text(a), Value::Text(b)) if op.is_equality() => return op.apply(a, b),
        _ => {}
    }

    if let (Some(a), Some(b)) = (a.to_f64(), b.to_f64()) {
        return op.apply(a, b);
    }
    if let (Some(a), Some(b)) = (a.to_f32(), b.to_f32()) {
        return op.apply(a, b);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_nulls() {
        assert!(evaluate(Operator::Eq, &Value::Null, &Value::Null));
        assert!(!evaluate(Operator::Ne, &Value::Null, &Value::Null));
        assert!(!evaluate(Operator::Lt, &Value::Null, &Value::Null));

        assert!(!evaluate(Operator::Eq, &Value::Int(1), &Value::Null));
        assert!(evaluate(Operator::Ne, &Value::Null, &text("a")));
        assert!(!evaluate(Operator::Gt, &Value::Int(1), &Value::Null));
    }

    #[test]
    fn test_text() {
        assert!(evaluate(Operator::Eq, &text("a"), &text("a")));
        assert!(evaluate(Operator::Ne, &text("a"), &text("b")));
        // "10" == "10.0" compares as text, not numbers
        assert!(!evaluate(Operator::Eq, &text("10"), &text("10.0")));
    }

    #[test]
    fn test_text_ordering() {
        assert!(evaluate(Operator::Gt, &text("3"), &text("2")));
        assert!(evaluate(Operator::Gt, &text("20"), &text("18")));
        assert!(!evaluate(Operator::Gt, &text("10"), &text("18")));
        assert!(!evaluate(Operator::Lt, &text("a"), &text("b")));
    }

    #[test]
    fn test_numeric_coercion() {
        assert!(evaluate(Operator::Gt, &Value::Int(20), &text("18")));
        assert!(evaluate(Operator::Le, &text("1.5"), &Value::Float(1.5)));
        assert!(evaluate(Operator::Eq, &Value::Int(2), &Value::Float(2.0)));
        assert!(!evaluate(Operator::Lt, &Value::Int(3), &Value::Int(2)));
        assert!(evaluate(Operator::Ge, &Value::Int(-1), &text("-1")));
    }

    #[test]
    fn test_fallback_is_false() {
        assert!(!evaluate(Operator::Eq, &Value::Int(1), &text("one")));
        assert!(!evaluate(Operator::Eq, &Value::Bool(true), &Value::Bool(true)));
        assert!(!evaluate(Operator::Ne, &Value::Bool(true), &Value::Int(1)));
    }

    #[test]
    fn test_parse_operator() {
        assert_eq!(Operator::parse("&gt;="), Some(Operator::Ge));
        assert_eq!(Operator::parse("&lt;"), Some(Operator::Lt));
        assert_eq!(Operator::parse("="), None);
    }
}
