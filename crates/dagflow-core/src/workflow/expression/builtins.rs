//! Safe built-in functions and methods.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::ExpressionError;
use super::ast::BinOp;
use super::value::{self, Num, py_cmp, py_eq, render, truthy, type_name};

/// Bare names that may be called.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "len",
    "min",
    "max",
    "sum",
    "abs",
    "round",
    "sorted",
    "all",
    "any",
    "str",
    "int",
    "float",
    "bool",
    "list",
    "dict",
    "set",
    "tuple",
    "isinstance",
];

/// Type names accepted as the second argument of `isinstance`.
pub const TYPE_NAMES: &[&str] = &["str", "int", "float", "bool", "list", "dict", "tuple", "set"];

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExpressionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExpressionError::Type(format!(
            "{name}() takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<(), ExpressionError> {
    if let Some((key, _)) = kwargs.first() {
        return Err(ExpressionError::Type(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        )));
    }
    Ok(())
}

/// Call a built-in other than `isinstance`, which the interpreter resolves
/// itself because its second argument names types rather than values.
pub fn call(
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, ExpressionError> {
    match name {
        "sorted" => return sorted(args, kwargs),
        "dict" => return dict(args, kwargs),
        _ => no_kwargs(name, &kwargs)?,
    }

    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(ExpressionError::Type(format!(
                        "object of type '{}' has no len()",
                        type_name(other)
                    )));
                }
            };
            Ok(Value::from(n))
        }
        "min" | "max" => extremum(name, args),
        "sum" => {
            arity(name, &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::from(0));
            for item in value::iterate(&args[0])? {
                if matches!(item, Value::String(_)) {
                    return Err(ExpressionError::Type(
                        "sum() can't sum strings".to_string(),
                    ));
                }
                total = value::binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match Num::from_value(&args[0]) {
                Some(Num::Int(i)) => i.checked_abs().map(Value::from).ok_or_else(|| {
                    ExpressionError::Value("integer overflow in abs()".to_string())
                }),
                Some(Num::Float(f)) => Num::Float(f.abs()).into_value(),
                None => Err(bad_operand(name, &args[0])),
            }
        }
        "round" => round(args),
        "all" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(value::iterate(&args[0])?.iter().all(truthy)))
        }
        "any" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(value::iterate(&args[0])?.iter().any(truthy)))
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::String(args.first().map(render).unwrap_or_default()))
        }
        "int" => {
            arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::from(0)), to_int)
        }
        "float" => {
            arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::from(0.0)), to_float)
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(truthy)))
        }
        "list" | "tuple" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => Ok(Value::Array(value::iterate(v)?)),
                None => Ok(Value::Array(Vec::new())),
            }
        }
        "set" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => Ok(Value::Array(value::dedupe(value::iterate(v)?))),
                None => Ok(Value::Array(Vec::new())),
            }
        }
        other => Err(ExpressionError::UndefinedName(other.to_string())),
    }
}

fn bad_operand(name: &str, value: &Value) -> ExpressionError {
    ExpressionError::Type(format!(
        "bad operand type for {name}(): '{}'",
        type_name(value)
    ))
}

fn extremum(name: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
    if args.is_empty() {
        return Err(ExpressionError::Type(format!(
            "{name}() expected at least 1 argument, got 0"
        )));
    }
    let items = if args.len() == 1 {
        value::iterate(&args[0])?
    } else {
        args
    };
    let wanted = if name == "min" {
        Ordering::Less
    } else {
        Ordering::Greater
    };

    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(ExpressionError::Value(format!(
            "{name}() arg is an empty sequence"
        )));
    };
    for item in iter {
        if py_cmp(&item, &best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn sorted(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ExpressionError> {
    arity("sorted", &args, 1, 1)?;
    let mut reverse = false;
    for (key, value) in &kwargs {
        match key.as_str() {
            "reverse" => reverse = truthy(value),
            other => {
                return Err(ExpressionError::Type(format!(
                    "sorted() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }

    let mut items = value::iterate(&args[0])?;
    let mut failure = None;
    items.sort_by(|a, b| match py_cmp(a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    if reverse {
        items.reverse();
    }
    Ok(Value::Array(items))
}

fn dict(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, ExpressionError> {
    arity("dict", &args, 0, 1)?;
    let mut out = Map::new();
    match args.into_iter().next() {
        None => {}
        Some(Value::Object(map)) => out = map,
        Some(Value::Array(pairs)) => {
            for (i, pair) in pairs.into_iter().enumerate() {
                match pair {
                    Value::Array(kv) if kv.len() == 2 => {
                        let mut kv = kv.into_iter();
                        let (Some(k), Some(v)) = (kv.next(), kv.next()) else {
                            continue;
                        };
                        out.insert(value::key_string(&k)?, v);
                    }
                    _ => {
                        return Err(ExpressionError::Value(format!(
                            "dictionary update sequence element #{i} is not a key/value pair"
                        )));
                    }
                }
            }
        }
        Some(other) => {
            return Err(ExpressionError::Type(format!(
                "'{}' object is not iterable",
                type_name(&other)
            )));
        }
    }
    for (key, value) in kwargs {
        out.insert(key, value);
    }
    Ok(Value::Object(out))
}

fn round(args: Vec<Value>) -> Result<Value, ExpressionError> {
    arity("round", &args, 1, 2)?;
    let number = Num::from_value(&args[0]).ok_or_else(|| {
        ExpressionError::Type(format!(
            "type '{}' doesn't define __round__",
            type_name(&args[0])
        ))
    })?;
    let digits = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(v) => match Num::from_value(v) {
            Some(Num::Int(d)) => Some(d),
            _ => {
                return Err(ExpressionError::Type(format!(
                    "'{}' object cannot be interpreted as an integer",
                    type_name(v)
                )));
            }
        },
    };

    match (number, digits) {
        (Num::Int(i), _) => Ok(Value::from(i)),
        (Num::Float(f), None) => float_to_int(f.round_ties_even()),
        (Num::Float(f), Some(d)) => {
            let d = i32::try_from(d.clamp(-308, 308)).unwrap_or(0);
            let factor = 10f64.powi(d);
            Num::Float((f * factor).round_ties_even() / factor).into_value()
        }
    }
}

fn float_to_int(f: f64) -> Result<Value, ExpressionError> {
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(ExpressionError::Value(format!(
            "cannot convert float {f} to integer"
        )));
    }
    Ok(Value::from(f as i64))
}

fn to_int(value: &Value) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| ExpressionError::Value(format!("invalid literal for int(): '{s}'"))),
        other => match Num::from_value(other) {
            Some(Num::Int(i)) => Ok(Value::from(i)),
            Some(Num::Float(f)) => float_to_int(f.trunc()),
            None => Err(ExpressionError::Type(format!(
                "int() argument must be a string or a number, not '{}'",
                type_name(other)
            ))),
        },
    }
}

fn to_float(value: &Value) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => {
            let f = s.trim().parse::<f64>().map_err(|_| {
                ExpressionError::Value(format!("could not convert string to float: '{s}'"))
            })?;
            Num::Float(f).into_value()
        }
        other => match Num::from_value(other) {
            Some(n) => Num::Float(n.as_f64()).into_value(),
            None => Err(ExpressionError::Type(format!(
                "float() argument must be a string or a number, not '{}'",
                type_name(other)
            ))),
        },
    }
}

/// `isinstance(value, T)` where `T` is one or more of [`TYPE_NAMES`].
///
/// Tuples and sets are represented as lists, so `list`, `tuple`, and `set`
/// all match arrays. `bool` values are also `int`, as in Python.
pub fn isinstance(value: &Value, types: &[String]) -> Result<bool, ExpressionError> {
    for ty in types {
        let matched = match ty.as_str() {
            "str" => value.is_string(),
            "int" => value.is_boolean() || value.is_i64() || value.is_u64(),
            "float" => value.is_f64(),
            "bool" => value.is_boolean(),
            "list" | "tuple" | "set" => value.is_array(),
            "dict" => value.is_object(),
            other => {
                return Err(ExpressionError::Type(format!(
                    "isinstance() arg 2 must be a type name, not '{other}'"
                )));
            }
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Call a whitelisted method on a receiver value.
pub fn call_method(
    receiver: &Value,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ExpressionError> {
    match receiver {
        Value::String(s) => string_method(s, method, args),
        Value::Object(map) => dict_method(map, method, args),
        Value::Array(items) => list_method(items, method, args),
        other => Err(no_attribute(other, method)),
    }
}

fn no_attribute(receiver: &Value, method: &str) -> ExpressionError {
    ExpressionError::Type(format!(
        "'{}' object has no method '{method}'",
        type_name(receiver)
    ))
}

fn str_arg<'a>(method: &str, value: &'a Value) -> Result<&'a str, ExpressionError> {
    value.as_str().ok_or_else(|| {
        ExpressionError::Type(format!(
            "{method}() argument must be str, not '{}'",
            type_name(value)
        ))
    })
}

fn string_method(s: &str, method: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
    let string = |v: String| -> Result<Value, ExpressionError> { Ok(Value::String(v)) };
    match method {
        "lower" => {
            arity(method, &args, 0, 0)?;
            string(s.to_lowercase())
        }
        "upper" => {
            arity(method, &args, 0, 0)?;
            string(s.to_uppercase())
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(method, &args, 0, 1)?;
            let chars: Option<Vec<char>> = match args.first() {
                None | Some(Value::Null) => None,
                Some(v) => Some(str_arg(method, v)?.chars().collect()),
            };
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match method {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            string(out.to_string())
        }
        "startswith" | "endswith" => {
            arity(method, &args, 1, 1)?;
            let candidates: Vec<&Value> = match &args[0] {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for candidate in candidates {
                let affix = str_arg(method, candidate)?;
                let hit = if method == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "split" => {
            arity(method, &args, 0, 2)?;
            let limit = match args.get(1) {
                None => None,
                Some(v) => match Num::from_value(v) {
                    Some(Num::Int(n)) if n >= 0 => Some(usize::try_from(n).unwrap_or(0)),
                    Some(Num::Int(_)) => None,
                    _ => return Err(bad_operand(method, v)),
                },
            };
            let parts: Vec<String> = match args.first() {
                None | Some(Value::Null) => split_whitespace(s, limit),
                Some(v) => {
                    let sep = str_arg(method, v)?;
                    if sep.is_empty() {
                        return Err(ExpressionError::Value("empty separator".to_string()));
                    }
                    match limit {
                        Some(n) => s.splitn(n + 1, sep).map(str::to_string).collect(),
                        None => s.split(sep).map(str::to_string).collect(),
                    }
                }
            };
            Ok(Value::Array(parts.into_iter().map(Value::String).collect()))
        }
        "replace" => {
            arity(method, &args, 2, 3)?;
            let old = str_arg(method, &args[0])?;
            let new = str_arg(method, &args[1])?;
            let limit = match args.get(2).and_then(|v| v.as_i64()) {
                Some(n) if n >= 0 => Some(usize::try_from(n).unwrap_or(0)),
                _ => None,
            };
            let found = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(old).count()
            };
            let hits = limit.map_or(found, |n| n.min(found));
            let projected = (s.chars().count() - hits * old.chars().count())
                .saturating_add(hits.saturating_mul(new.chars().count()));
            value::ensure_len(projected, "replace()")?;
            match limit {
                Some(n) => string(s.replacen(old, new, n)),
                None => string(s.replace(old, new)),
            }
        }
        "join" => {
            arity(method, &args, 1, 1)?;
            let mut parts = Vec::new();
            for item in value::iterate(&args[0])? {
                match item {
                    Value::String(part) => parts.push(part),
                    other => {
                        return Err(ExpressionError::Type(format!(
                            "join() expected str items, found '{}'",
                            type_name(&other)
                        )));
                    }
                }
            }
            let total = parts.iter().map(|p| p.chars().count()).sum::<usize>()
                + s.chars().count() * parts.len().saturating_sub(1);
            value::ensure_len(total, "join()")?;
            string(parts.join(s))
        }
        "find" => {
            arity(method, &args, 1, 1)?;
            let needle = str_arg(method, &args[0])?;
            let index = s
                .find(needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::from(index))
        }
        "count" => {
            arity(method, &args, 1, 1)?;
            let needle = str_arg(method, &args[0])?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::from(n))
        }
        _ => Err(no_attribute(&Value::String(String::new()), method)),
    }
}

fn split_whitespace(s: &str, limit: Option<usize>) -> Vec<String> {
    let Some(limit) = limit else {
        return s.split_whitespace().map(str::to_string).collect();
    };
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == limit {
            parts.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}

fn dict_method(
    map: &Map<String, Value>,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ExpressionError> {
    match method {
        "get" => {
            arity(method, &args, 1, 2)?;
            let key = value::key_string(&args[0])?;
            Ok(map
                .get(&key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::Null))
        }
        "keys" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            ))
        }
        "values" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Array(map.values().cloned().collect()))
        }
        "items" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        _ => Err(no_attribute(&Value::Object(Map::new()), method)),
    }
}

fn list_method(items: &[Value], method: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
    match method {
        "count" => {
            arity(method, &args, 1, 1)?;
            Ok(Value::from(
                items.iter().filter(|item| py_eq(item, &args[0])).count(),
            ))
        }
        "index" => {
            arity(method, &args, 1, 1)?;
            items
                .iter()
                .position(|item| py_eq(item, &args[0]))
                .map(Value::from)
                .ok_or_else(|| {
                    ExpressionError::Value(format!("{} is not in list", render(&args[0])))
                })
        }
        _ => Err(no_attribute(&Value::Array(Vec::new()), method)),
    }
}
