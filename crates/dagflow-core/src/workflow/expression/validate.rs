//! Static safety pass over a parsed expression.
//!
//! Runs before any evaluation. Rejects dunder names, attributes that lead
//! to interpreter internals, and calls to anything outside the allow-list.

use std::collections::HashSet;

use super::ExpressionError;
use super::ast::Expr;
use super::builtins::BUILTIN_FUNCTIONS;

/// Attributes that never resolve to data, whatever the receiver.
const DENIED_ATTRIBUTES: &[&str] = &[
    "__class__",
    "__bases__",
    "__base__",
    "__mro__",
    "__subclasses__",
    "__globals__",
    "__builtins__",
    "__code__",
    "__closure__",
    "__dict__",
    "__func__",
    "__self__",
    "__module__",
    "__import__",
    "__loader__",
    "__spec__",
    "__getattribute__",
    "__reduce__",
    "__reduce_ex__",
    "__init__",
    "__new__",
    "func_globals",
    "gi_frame",
    "gi_code",
    "cr_frame",
    "cr_code",
    "ag_frame",
    "f_globals",
    "f_locals",
    "f_builtins",
    "f_back",
    "tb_frame",
    "co_code",
    "mro",
    "format_map",
];

fn is_dunder(name: &str) -> bool {
    name.starts_with("__")
}

/// Walk `expr` and fail on the first construct outside the safe subset.
///
/// `host_functions` are names registered on the evaluator; they are callable
/// alongside the built-in allow-list.
pub fn check(expr: &Expr, host_functions: &HashSet<String>) -> Result<(), ExpressionError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Name(name) => {
            if is_dunder(name) {
                return Err(ExpressionError::Unsafe(format!(
                    "name '{name}' is not allowed"
                )));
            }
            Ok(())
        }
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => items
            .iter()
            .try_for_each(|item| check(item, host_functions)),
        Expr::Dict(entries) => entries.iter().try_for_each(|(k, v)| {
            check(k, host_functions)?;
            check(v, host_functions)
        }),
        Expr::Unary { operand, .. } => check(operand, host_functions),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            check(left, host_functions)?;
            check(right, host_functions)
        }
        Expr::Compare { left, rest } => {
            check(left, host_functions)?;
            rest.iter()
                .try_for_each(|(_, operand)| check(operand, host_functions))
        }
        Expr::Attribute { value, attr } => {
            check_attribute(attr)?;
            check(value, host_functions)
        }
        Expr::Subscript { value, index } => {
            check(value, host_functions)?;
            check(index, host_functions)
        }
        Expr::Slice {
            value,
            lower,
            upper,
            step,
        } => {
            check(value, host_functions)?;
            for part in [lower, upper, step].into_iter().flatten() {
                check(part, host_functions)?;
            }
            Ok(())
        }
        Expr::Call { func, args, kwargs } => {
            check_callee(func, host_functions)?;
            args.iter()
                .try_for_each(|arg| check(arg, host_functions))?;
            kwargs
                .iter()
                .try_for_each(|(_, arg)| check(arg, host_functions))
        }
        Expr::IfElse { test, body, orelse } => {
            check(test, host_functions)?;
            check(body, host_functions)?;
            check(orelse, host_functions)
        }
    }
}

fn check_attribute(attr: &str) -> Result<(), ExpressionError> {
    if is_dunder(attr) || DENIED_ATTRIBUTES.contains(&attr) {
        return Err(ExpressionError::Unsafe(format!(
            "attribute '{attr}' is not allowed"
        )));
    }
    Ok(())
}

fn check_callee(func: &Expr, host_functions: &HashSet<String>) -> Result<(), ExpressionError> {
    match func {
        Expr::Name(name) => {
            if BUILTIN_FUNCTIONS.contains(&name.as_str()) || host_functions.contains(name) {
                Ok(())
            } else {
                Err(ExpressionError::Unsafe(format!(
                    "call to '{name}' is not allowed"
                )))
            }
        }
        Expr::Attribute { value, attr } => {
            if attr.starts_with('_') {
                return Err(ExpressionError::Unsafe(format!(
                    "method '{attr}' is not allowed"
                )));
            }
            check_attribute(attr)?;
            check(value, host_functions)
        }
        _ => Err(ExpressionError::Unsafe(
            "only named functions and methods may be called".to_string(),
        )),
    }
}
