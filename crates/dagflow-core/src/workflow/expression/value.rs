//! Value semantics for expressions over `serde_json::Value`.
//!
//! Truthiness, equality, ordering and arithmetic follow Python: `bool` is a
//! numeric type, `1 == 1.0`, `//` and `%` floor toward negative infinity.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::ExpressionError;
use super::ast::BinOp;

/// Upper bound on sequences an expression may build, counted in chars or items.
pub const MAX_SEQUENCE_LEN: usize = 100_000;

/// Reject a result of `len` chars or items before it is built.
pub fn ensure_len(len: usize, what: &str) -> Result<(), ExpressionError> {
    if len > MAX_SEQUENCE_LEN {
        return Err(ExpressionError::Value(format!(
            "{what} result exceeds {MAX_SEQUENCE_LEN} items"
        )));
    }
    Ok(())
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Python truthiness: `None`, `False`, zero, and empty containers are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_f64() {
            Some(f) => f != 0.0,
            None => true,
        },
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a value as template text.
///
/// Strings are emitted verbatim; everything else uses its compact JSON form.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a value to a mapping key. Containers are unhashable.
pub fn key_string(value: &Value) -> Result<String, ExpressionError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(ExpressionError::Type(format!(
            "unhashable type: '{}'",
            type_name(value)
        ))),
        other => Ok(render(other)),
    }
}

/// Items yielded by iterating a value: list elements, string characters,
/// or mapping keys.
pub fn iterate(value: &Value) -> Result<Vec<Value>, ExpressionError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Ok(map.keys().map(|k| Value::String(k.clone())).collect()),
        other => Err(ExpressionError::Type(format!(
            "'{}' object is not iterable",
            type_name(other)
        ))),
    }
}

/// Drop later duplicates, keeping first-occurrence order.
pub fn dedupe(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|seen| py_eq(seen, &item)) {
            out.push(item);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn from_value(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Num::Int(i))
                } else {
                    n.as_f64().map(Num::Float)
                }
            }
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Result<Value, ExpressionError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| ExpressionError::Value(format!("result {f} is not a finite number"))),
        }
    }
}

pub fn py_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (Num::from_value(a), Num::from_value(b)) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        };
    }
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| py_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| py_eq(v, other)))
        }
        _ => false,
    }
}

/// Ordering for `<`, `min`, `sorted`. Mixed kinds are a type error.
pub fn py_cmp(a: &Value, b: &Value) -> Result<Ordering, ExpressionError> {
    if let (Some(x), Some(y)) = (Num::from_value(a), Num::from_value(b)) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => Ok(x.cmp(&y)),
            _ => x.as_f64().partial_cmp(&y.as_f64()).ok_or_else(|| {
                ExpressionError::Value("cannot order NaN".to_string())
            }),
        };
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                if !py_eq(l, r) {
                    return py_cmp(l, r);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(ExpressionError::Type(format!(
            "ordering not supported between '{}' and '{}'",
            type_name(a),
            type_name(b)
        ))),
    }
}

/// `needle in haystack`.
pub fn contains(haystack: &Value, needle: &Value) -> Result<bool, ExpressionError> {
    match haystack {
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Err(ExpressionError::Type(format!(
                "'in <string>' requires string as left operand, not '{}'",
                type_name(other)
            ))),
        },
        Value::Array(items) => Ok(items.iter().any(|item| py_eq(item, needle))),
        Value::Object(map) => Ok(map.contains_key(&key_string(needle)?)),
        other => Err(ExpressionError::Type(format!(
            "argument of type '{}' is not iterable",
            type_name(other)
        ))),
    }
}

/// Apply an arithmetic operator.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    if let (Some(x), Some(y)) = (Num::from_value(left), Num::from_value(right)) {
        return numeric(op, x, y)?.into_value();
    }

    match (op, left, right) {
        (BinOp::Add, Value::String(a), Value::String(b)) => {
            ensure_len(a.chars().count() + b.chars().count(), "concatenation")?;
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::String(out))
        }
        (BinOp::Add, Value::Array(a), Value::Array(b)) => {
            ensure_len(a.len() + b.len(), "concatenation")?;
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        (BinOp::Mul, Value::String(_) | Value::Array(_), _) if repeat_count(right).is_some() => {
            repeat(left, repeat_count(right).unwrap_or(0))
        }
        (BinOp::Mul, _, Value::String(_) | Value::Array(_)) if repeat_count(left).is_some() => {
            repeat(right, repeat_count(left).unwrap_or(0))
        }
        _ => Err(ExpressionError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            type_name(left),
            type_name(right)
        ))),
    }
}

/// Integer operand of a sequence repetition; negative counts give an empty result.
fn repeat_count(value: &Value) -> Option<usize> {
    match value {
        Value::Bool(_) => None,
        other => match Num::from_value(other)? {
            Num::Int(i) => Some(usize::try_from(i).unwrap_or(0)),
            Num::Float(_) => None,
        },
    }
}

fn repeat(seq: &Value, times: usize) -> Result<Value, ExpressionError> {
    let unit = match seq {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        _ => 0,
    };
    ensure_len(unit.saturating_mul(times), "repetition")?;
    match seq {
        Value::String(s) => Ok(Value::String(s.repeat(times))),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn overflow(op: BinOp) -> ExpressionError {
    ExpressionError::Value(format!("integer overflow in '{}'", op.symbol()))
}

fn numeric(op: BinOp, x: Num, y: Num) -> Result<Num, ExpressionError> {
    use Num::{Float, Int};

    match (op, x, y) {
        (BinOp::Add, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(|| overflow(op)),
        (BinOp::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(|| overflow(op)),
        (BinOp::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(|| overflow(op)),
        (BinOp::Add, a, b) => Ok(Float(a.as_f64() + b.as_f64())),
        (BinOp::Sub, a, b) => Ok(Float(a.as_f64() - b.as_f64())),
        (BinOp::Mul, a, b) => Ok(Float(a.as_f64() * b.as_f64())),
        (BinOp::Div, a, b) => {
            if b.as_f64() == 0.0 {
                return Err(ExpressionError::ZeroDivision);
            }
            Ok(Float(a.as_f64() / b.as_f64()))
        }
        (BinOp::FloorDiv, Int(a), Int(b)) => {
            if b == 0 {
                return Err(ExpressionError::ZeroDivision);
            }
            let q = a.checked_div(b).ok_or_else(|| overflow(op))?;
            // Round toward negative infinity when signs differ.
            if (a % b != 0) && ((a < 0) != (b < 0)) {
                Ok(Int(q - 1))
            } else {
                Ok(Int(q))
            }
        }
        (BinOp::FloorDiv, a, b) => {
            if b.as_f64() == 0.0 {
                return Err(ExpressionError::ZeroDivision);
            }
            Ok(Float((a.as_f64() / b.as_f64()).floor()))
        }
        (BinOp::Mod, Int(a), Int(b)) => {
            if b == 0 {
                return Err(ExpressionError::ZeroDivision);
            }
            let r = a.checked_rem(b).ok_or_else(|| overflow(op))?;
            // Result takes the sign of the divisor.
            if r != 0 && ((r < 0) != (b < 0)) {
                Ok(Int(r + b))
            } else {
                Ok(Int(r))
            }
        }
        (BinOp::Mod, a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(ExpressionError::ZeroDivision);
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                Ok(Float(r + b))
            } else {
                Ok(Float(r))
            }
        }
        (BinOp::Pow, Int(a), Int(b)) if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| overflow(op))?;
            a.checked_pow(exp).map(Int).ok_or_else(|| overflow(op))
        }
        (BinOp::Pow, a, b) => {
            if a.as_f64() == 0.0 && b.as_f64() < 0.0 {
                return Err(ExpressionError::ZeroDivision);
            }
            Ok(Float(a.as_f64().powf(b.as_f64())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!truthy(&falsy), "{falsy} should be falsy");
        }
        for t in [json!(true), json!(-1), json!(0.5), json!("x"), json!([0]), json!({"a": null})] {
            assert!(truthy(&t), "{t} should be truthy");
        }
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert!(py_eq(&json!(1), &json!(1.0)));
        assert!(py_eq(&json!(true), &json!(1)));
        assert!(!py_eq(&json!("1"), &json!(1)));
        assert!(py_eq(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2}])));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(py_cmp(&json!(1), &json!(2.5)).unwrap(), Ordering::Less);
        assert_eq!(py_cmp(&json!("b"), &json!("a")).unwrap(), Ordering::Greater);
        assert_eq!(py_cmp(&json!([1, 2]), &json!([1, 2, 0])).unwrap(), Ordering::Less);
        assert!(matches!(py_cmp(&json!(1), &json!("a")), Err(ExpressionError::Type(_))));
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(binary(BinOp::FloorDiv, &json!(-7), &json!(2)).unwrap(), json!(-4));
        assert_eq!(binary(BinOp::Mod, &json!(-7), &json!(2)).unwrap(), json!(1));
        assert_eq!(binary(BinOp::Mod, &json!(7), &json!(-2)).unwrap(), json!(-1));
        assert_eq!(binary(BinOp::FloorDiv, &json!(7.5), &json!(2)).unwrap(), json!(3.0));
    }

    #[test]
    fn test_division_by_zero() {
        for op in [BinOp::Div, BinOp::FloorDiv, BinOp::Mod] {
            assert!(matches!(
                binary(op, &json!(1), &json!(0)),
                Err(ExpressionError::ZeroDivision)
            ));
        }
    }

    #[test]
    fn test_true_division_yields_float() {
        assert_eq!(binary(BinOp::Div, &json!(6), &json!(3)).unwrap(), json!(2.0));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert!(matches!(
            binary(BinOp::Pow, &json!(10), &json!(40)),
            Err(ExpressionError::Value(_))
        ));
    }

    #[test]
    fn test_sequence_concat_and_repeat() {
        assert_eq!(binary(BinOp::Add, &json!("ab"), &json!("c")).unwrap(), json!("abc"));
        assert_eq!(binary(BinOp::Add, &json!([1]), &json!([2])).unwrap(), json!([1, 2]));
        assert_eq!(binary(BinOp::Mul, &json!("ab"), &json!(2)).unwrap(), json!("abab"));
        assert_eq!(binary(BinOp::Mul, &json!(2), &json!([0])).unwrap(), json!([0, 0]));
        assert!(matches!(
            binary(BinOp::Mul, &json!("x"), &json!(1_000_000)),
            Err(ExpressionError::Value(_))
        ));
    }

    #[test]
    fn test_concatenation_is_capped() {
        let half = json!("a".repeat(60_000));
        assert!(matches!(
            binary(BinOp::Add, &half, &half),
            Err(ExpressionError::Value(_))
        ));
        let items = json!(vec![0; 60_000]);
        assert!(matches!(
            binary(BinOp::Add, &items, &items),
            Err(ExpressionError::Value(_))
        ));
        let small = json!("a".repeat(50_000));
        assert!(binary(BinOp::Add, &small, &small).is_ok());
    }

    #[test]
    fn test_mixed_operands_are_type_errors() {
        assert!(matches!(
            binary(BinOp::Add, &json!("a"), &json!(1)),
            Err(ExpressionError::Type(_))
        ));
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("plain")), "plain");
        assert_eq!(render(&json!(null)), "null");
        assert_eq!(render(&json!(true)), "true");
        assert_eq!(render(&json!(2.5)), "2.5");
        assert_eq!(render(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_contains() {
        assert!(contains(&json!("hello"), &json!("ell")).unwrap());
        assert!(contains(&json!(["a", "b"]), &json!("a")).unwrap());
        assert!(contains(&json!({"k": 1}), &json!("k")).unwrap());
        assert!(matches!(contains(&json!(5), &json!(1)), Err(ExpressionError::Type(_))));
    }
}
