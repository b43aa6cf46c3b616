use std::fmt;

use log::trace;

use crate::core::nodes::{Document, Item, NodeId, NodeKind};
use crate::errors::{Location, NaclError, Result};
use crate::types::{Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitOr,
    BitAnd,
    ShiftLeft,
    ShiftRight,
    Concat,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
            Operator::BitOr => "|",
            Operator::BitAnd => "&",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            Operator::Concat => ".",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Binary operation with at least one lazy operand. Operations between two
/// native operands are folded by the parser and never become nodes.
#[derive(Debug)]
pub struct OperationNode {
    pub(crate) left: Item,
    pub(crate) right: Item,
    pub(crate) operator: Operator,
    pub(crate) location: Location,
}

impl Document {
    pub fn new_operation(&mut self, left: Item, right: Item, operator: Operator, location: Location) -> NodeId {
        self.alloc(NodeKind::Operation(OperationNode { left, right, operator, location }))
    }

    /// Interpolated strings and long sums nest to the left; the left spine is
    /// walked with a loop.
    pub(crate) fn resolve_operation(&mut self, id: NodeId) -> Result<Value> {
        let mut spine = Vec::new();
        let mut current = id;
        let first = loop {
            let (left, right, operator, location) = match &self.nodes[current].kind {
                NodeKind::Operation(node) => (node.left.clone(), node.right.clone(), node.operator, node.location.clone()),
                _ => return Err(self.not_a(current, "an operation")),
            };
            spine.push((right, operator, location));
            match left {
                Item::Node(next) if matches!(self.nodes[next].kind, NodeKind::Operation(_)) => current = next,
                left => break left,
            }
        };

        let mut value = self.resolve_item(&first)?;
        while let Some((right, operator, location)) = spine.pop() {
            let right = self.resolve_item(&right)?;
            value = apply(operator, value, right).map_err(|message| NaclError::evaluation(message, location))?;
        }
        Ok(value)
    }
}

/// Evaluates `left operator right` on native values.
///
/// Booleans count as 0 or 1, null as 0 and numeric strings as their number.
/// Integer results that overflow become floats.
pub fn apply(operator: Operator, left: Value, right: Value) -> std::result::Result<Value, String> {
    trace!("apply({:?} {} {:?})", left, operator, right);
    if operator == Operator::Concat {
        return Ok(Value::String(stringify(&left)? + &stringify(&right)?));
    }

    let (a, b) = match (to_operand(&left), to_operand(&right)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(format!(
                "Unsupported operand types: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            ));
        }
    };

    let number = match operator {
        Operator::Add => arithmetic(a, b, i64::checked_add, |x, y| x + y),
        Operator::Sub => arithmetic(a, b, i64::checked_sub, |x, y| x - y),
        Operator::Mul => arithmetic(a, b, i64::checked_mul, |x, y| x * y),
        Operator::Div => divide(a, b)?,
        Operator::Mod => {
            let divisor = b.truncate();
            if divisor == 0 {
                return Err("Modulo by zero".to_string());
            }
            Number::Int(a.truncate().wrapping_rem(divisor))
        }
        Operator::Pow => power(a, b),
        Operator::BitOr => Number::Int(a.truncate() | b.truncate()),
        Operator::BitAnd => Number::Int(a.truncate() & b.truncate()),
        Operator::ShiftLeft => shift(a, b, true)?,
        Operator::ShiftRight => shift(a, b, false)?,
        Operator::Concat => unreachable!("concatenation is handled above"),
    };
    Ok(Value::Number(number))
}

/// String form of a scalar, as used by concatenation and keys.
pub fn stringify(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Boolean(true) => Ok("1".to_string()),
        Value::Boolean(false) | Value::Null => Ok(String::new()),
        Value::Number(Number::Int(i)) => Ok(i.to_string()),
        Value::Number(Number::Float(f)) => Ok(format_float(*f)),
        Value::List(_) | Value::Map(_) => Err("Array to string conversion".to_string()),
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NAN".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{}INF", sign)
    } else {
        f.to_string()
    }
}

fn to_operand(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Boolean(b) => Some(Number::Int(*b as i64)),
        Value::Null => Some(Number::Int(0)),
        Value::String(s) => numeric_string(s),
        Value::List(_) | Value::Map(_) => None,
    }
}

fn numeric_string(text: &str) -> Option<Number> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::Int(i));
    }
    text.parse::<f64>().ok().map(Number::Float)
}

fn arithmetic(a: Number, b: Number, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Number {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int_op(x, y)
            .map(Number::Int)
            .unwrap_or_else(|| Number::Float(float_op(x as f64, y as f64))),
        _ => Number::Float(float_op(a.as_f64(), b.as_f64())),
    }
}

fn divide(a: Number, b: Number) -> std::result::Result<Number, String> {
    if b.as_f64() == 0.0 {
        return Err("Division by zero".to_string());
    }
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        if x.checked_rem(y) == Some(0) {
            if let Some(quotient) = x.checked_div(y) {
                return Ok(Number::Int(quotient));
            }
        }
    }
    Ok(Number::Float(a.as_f64() / b.as_f64()))
}

fn power(a: Number, b: Number) -> Number {
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        if let Some(result) = u32::try_from(y).ok().and_then(|e| x.checked_pow(e)) {
            return Number::Int(result);
        }
    }
    Number::Float(a.as_f64().powf(b.as_f64()))
}

fn shift(a: Number, b: Number, left: bool) -> std::result::Result<Number, String> {
    let amount = b.truncate();
    if amount < 0 {
        return Err("Bit shift by negative number".to_string());
    }
    let value = a.truncate();
    let result = match (left, amount >= 64) {
        (true, true) => 0,
        (true, false) => value.wrapping_shl(amount as u32),
        (false, true) => if value < 0 { -1 } else { 0 },
        (false, false) => value >> amount,
    };
    Ok(Number::Int(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::from(i)
    }

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(apply(Operator::Add, int(2), int(3)), Ok(int(5)));
        assert_eq!(apply(Operator::Div, int(8), int(2)), Ok(int(4)));
        assert_eq!(apply(Operator::Div, int(7), int(2)), Ok(Value::from(3.5)));
        assert_eq!(apply(Operator::Mod, int(7), int(3)), Ok(int(1)));
        assert_eq!(apply(Operator::Pow, int(2), int(10)), Ok(int(1024)));
        assert_eq!(apply(Operator::Pow, int(2), int(-1)), Ok(Value::from(0.5)));
        assert_eq!(apply(Operator::Div, int(i64::MIN), int(-1)), Ok(Value::from(-(i64::MIN as f64))));
        assert_eq!(apply(Operator::Mod, int(i64::MIN), int(-1)), Ok(int(0)));
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        assert_eq!(
            apply(Operator::Add, int(i64::MAX), int(1)),
            Ok(Value::from(i64::MAX as f64 + 1.0))
        );
    }

    #[test]
    fn test_scalars_coerce_to_numbers() {
        assert_eq!(apply(Operator::Add, Value::Boolean(true), int(1)), Ok(int(2)));
        assert_eq!(apply(Operator::Add, Value::Null, int(1)), Ok(int(1)));
        assert_eq!(apply(Operator::Mul, Value::from("4"), int(2)), Ok(int(8)));
        assert!(apply(Operator::Add, Value::from("abc"), int(1)).is_err());
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert_eq!(apply(Operator::BitOr, int(5), int(2)), Ok(int(7)));
        assert_eq!(apply(Operator::BitAnd, int(6), int(3)), Ok(int(2)));
        assert_eq!(apply(Operator::ShiftLeft, int(1), int(4)), Ok(int(16)));
        assert_eq!(apply(Operator::ShiftRight, int(-8), int(1)), Ok(int(-4)));
        assert!(apply(Operator::ShiftLeft, int(1), int(-1)).is_err());
    }

    #[test]
    fn test_division_by_zero_fails() {
        assert_eq!(apply(Operator::Div, int(1), int(0)), Err("Division by zero".to_string()));
        assert_eq!(apply(Operator::Mod, int(1), int(0)), Err("Modulo by zero".to_string()));
    }

    #[test]
    fn test_concat_stringifies_scalars() {
        assert_eq!(
            apply(Operator::Concat, Value::from("a"), Value::Boolean(true)),
            Ok(Value::from("a1"))
        );
        assert_eq!(apply(Operator::Concat, int(1), Value::from(0.5)), Ok(Value::from("10.5")));
        assert_eq!(apply(Operator::Concat, Value::Null, Value::from("x")), Ok(Value::from("x")));
        assert!(apply(Operator::Concat, Value::List(vec![]), Value::from("x")).is_err());
        assert_eq!(Operator::Concat.to_string(), ".");
    }
}
