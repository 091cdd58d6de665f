//! Tree-walking interpreter for validated expressions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::ExpressionError;
use super::ast::{CmpOp, Expr, LogicalOp, UnaryOp};
use super::builtins::{self, TYPE_NAMES};
use super::value::{self, Num, contains, py_cmp, py_eq, truthy, type_name};

/// A callable registered by the host, e.g. `has_result(id)`.
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, ExpressionError> + Send + Sync>;

pub struct Interpreter<'a> {
    variables: &'a Map<String, Value>,
    functions: &'a HashMap<String, HostFunction>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        variables: &'a Map<String, Value>,
        functions: &'a HashMap<String, HostFunction>,
    ) -> Self {
        Self {
            variables,
            functions,
        }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UndefinedName(name.clone())),
            Expr::List(items) | Expr::Tuple(items) => Ok(Value::Array(self.eval_all(items)?)),
            Expr::Set(items) => Ok(Value::Array(value::dedupe(self.eval_all(items)?))),
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    let key = value::key_string(&self.eval(k)?)?;
                    map.insert(key, self.eval(v)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Unary { op, operand } => unary(*op, self.eval(operand)?),
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                value::binary(*op, &l, &r)
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left)?;
                match (op, truthy(&l)) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
                    _ => self.eval(right),
                }
            }
            Expr::Compare { left, rest } => {
                let mut lhs = self.eval(left)?;
                for (op, right) in rest {
                    let rhs = self.eval(right)?;
                    if !compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::Attribute { value, attr } => attribute(&self.eval(value)?, attr),
            Expr::Subscript { value, index } => subscript(&self.eval(value)?, &self.eval(index)?),
            Expr::Slice {
                value,
                lower,
                upper,
                step,
            } => {
                let target = self.eval(value)?;
                let lower = self.eval_bound(lower.as_deref())?;
                let upper = self.eval_bound(upper.as_deref())?;
                let step = self.eval_bound(step.as_deref())?;
                slice(&target, lower, upper, step)
            }
            Expr::Call { func, args, kwargs } => self.call(func, args, kwargs),
            Expr::IfElse { test, body, orelse } => {
                if truthy(&self.eval(test)?) {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
        }
    }

    fn eval_all(&self, items: &[Expr]) -> Result<Vec<Value>, ExpressionError> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn eval_bound(&self, bound: Option<&Expr>) -> Result<Option<i64>, ExpressionError> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval(expr)? {
            Value::Null => Ok(None),
            v => match Num::from_value(&v) {
                Some(Num::Int(i)) => Ok(Some(i)),
                _ => Err(ExpressionError::Type(format!(
                    "slice indices must be integers or None, not '{}'",
                    type_name(&v)
                ))),
            },
        }
    }

    fn call(
        &self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, ExpressionError> {
        match func {
            Expr::Name(name) if name == "isinstance" && !self.functions.contains_key(name) => {
                self.isinstance(args, kwargs)
            }
            Expr::Name(name) => {
                let arg_values = self.eval_all(args)?;
                if let Some(host) = self.functions.get(name) {
                    if !kwargs.is_empty() {
                        return Err(ExpressionError::Type(format!(
                            "{name}() takes no keyword arguments"
                        )));
                    }
                    return host(&arg_values);
                }
                let kwarg_values = kwargs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.eval(v)?)))
                    .collect::<Result<Vec<_>, ExpressionError>>()?;
                builtins::call(name, arg_values, kwarg_values)
            }
            Expr::Attribute { value, attr } => {
                let receiver = self.eval(value)?;
                if !kwargs.is_empty() {
                    return Err(ExpressionError::Type(format!(
                        "{attr}() takes no keyword arguments"
                    )));
                }
                builtins::call_method(&receiver, attr, self.eval_all(args)?)
            }
            _ => Err(ExpressionError::Unsafe(
                "only named functions and methods may be called".to_string(),
            )),
        }
    }

    fn isinstance(&self, args: &[Expr], kwargs: &[(String, Expr)]) -> Result<Value, ExpressionError> {
        if args.len() != 2 || !kwargs.is_empty() {
            return Err(ExpressionError::Type(
                "isinstance() takes exactly 2 positional arguments".to_string(),
            ));
        }
        let subject = self.eval(&args[0])?;
        let type_name_of = |expr: &Expr| match expr {
            Expr::Name(n) if TYPE_NAMES.contains(&n.as_str()) => Ok(n.clone()),
            _ => Err(ExpressionError::Type(
                "isinstance() arg 2 must be a type or tuple of types".to_string(),
            )),
        };
        let types = match &args[1] {
            Expr::Tuple(items) => items
                .iter()
                .map(type_name_of)
                .collect::<Result<Vec<_>, _>>()?,
            single => vec![type_name_of(single)?],
        };
        builtins::isinstance(&subject, &types).map(Value::Bool)
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, ExpressionError> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!truthy(&operand)));
    }
    let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
    match (op, Num::from_value(&operand)) {
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::from).ok_or_else(|| {
            ExpressionError::Value("integer overflow in unary '-'".to_string())
        }),
        (UnaryOp::Neg, Some(Num::Float(f))) => Num::Float(-f).into_value(),
        (_, Some(n)) => n.into_value(),
        (_, None) => Err(ExpressionError::Type(format!(
            "bad operand type for unary {symbol}: '{}'",
            type_name(&operand)
        ))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    use std::cmp::Ordering::{Greater, Less};

    match op {
        CmpOp::Eq => Ok(py_eq(left, right)),
        CmpOp::NotEq => Ok(!py_eq(left, right)),
        CmpOp::Lt => Ok(py_cmp(left, right)? == Less),
        CmpOp::LtEq => Ok(py_cmp(left, right)? != Greater),
        CmpOp::Gt => Ok(py_cmp(left, right)? == Greater),
        CmpOp::GtEq => Ok(py_cmp(left, right)? != Less),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => Ok(!contains(right, left)?),
        CmpOp::Is => Ok(identical(left, right)),
        CmpOp::IsNot => Ok(!identical(left, right)),
    }
}

/// Identity for singletons; any other pair is never identical.
fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

fn attribute(receiver: &Value, attr: &str) -> Result<Value, ExpressionError> {
    match receiver {
        Value::Object(map) => map
            .get(attr)
            .cloned()
            .ok_or_else(|| ExpressionError::Key(attr.to_string())),
        other => Err(ExpressionError::Type(format!(
            "'{}' object has no attribute '{attr}'",
            type_name(other)
        ))),
    }
}

fn normalize_index(index: &Value, len: usize, kind: &str) -> Result<usize, ExpressionError> {
    let i = match Num::from_value(index) {
        Some(Num::Int(i)) if !index.is_boolean() => i,
        _ => {
            return Err(ExpressionError::Type(format!(
                "{kind} indices must be integers, not '{}'",
                type_name(index)
            )));
        }
    };
    let len = len as i64;
    let resolved = if i < 0 { i + len } else { i };
    if resolved < 0 || resolved >= len {
        return Err(ExpressionError::Index(format!("{kind} index {i} out of range")));
    }
    Ok(resolved as usize)
}

fn subscript(target: &Value, index: &Value) -> Result<Value, ExpressionError> {
    match target {
        Value::Array(items) => Ok(items[normalize_index(index, items.len(), "list")?].clone()),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), "string")?;
            Ok(Value::String(chars[i].to_string()))
        }
        Value::Object(map) => {
            let key = value::key_string(index)?;
            map.get(&key)
                .cloned()
                .ok_or(ExpressionError::Key(key))
        }
        other => Err(ExpressionError::Type(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of `len` items.
fn slice_positions(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, ExpressionError> {
    let len = len as i64;
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ExpressionError::Value("slice step cannot be zero".to_string()));
    }

    let mut out = Vec::new();
    if step > 0 {
        let clamp = |x: i64| {
            if x < 0 { x.saturating_add(len).max(0) } else { x.min(len) }
        };
        let mut i = lower.map_or(0, clamp);
        let stop = upper.map_or(len, clamp);
        while i < stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let clamp = |x: i64| {
            if x < 0 { x.saturating_add(len).max(-1) } else { x.min(len - 1) }
        };
        let mut i = lower.map_or(len - 1, clamp);
        let stop = upper.map_or(-1, clamp);
        while i > stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    Ok(out)
}

fn slice(
    target: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Value, ExpressionError> {
    match target {
        Value::Array(items) => {
            let positions = slice_positions(items.len(), lower, upper, step)?;
            Ok(Value::Array(
                positions.into_iter().map(|i| items[i].clone()).collect(),
            ))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let positions = slice_positions(chars.len(), lower, upper, step)?;
            Ok(Value::String(positions.into_iter().map(|i| chars[i]).collect()))
        }
        other => Err(ExpressionError::Type(format!(
            "'{}' object is not sliceable",
            type_name(other)
        ))),
    }
}
