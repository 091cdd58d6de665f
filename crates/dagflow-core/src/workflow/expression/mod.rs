//! Sandboxed expression language for `when` guards and template bodies.
//!
//! A Python-flavoured subset: literals, names, comparisons, boolean and
//! arithmetic operators, attribute/subscript/slice access, collection
//! literals, the conditional expression, and calls to a fixed set of safe
//! built-ins and methods. Source text is lexed and parsed into an AST, then
//! checked by a validator before anything is evaluated; the interpreter can
//! only reach the caller's variables and the allow-listed callables.
//!
//! ```text
//! len(fetch.items) > 0 and fetch.status == 200
//! 'urgent' in tags or priority >= 3
//! user.get('name', 'anonymous').lower()
//! ```

mod ast;
mod builtins;
mod eval;
mod lexer;
mod parser;
mod validate;
mod value;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

pub use eval::HostFunction;
pub use value::{render, truthy};

use ast::Expr;
use eval::Interpreter;
use lexer::Lexer;
use parser::Parser;

/// Errors raised while parsing, validating, or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    /// The expression uses syntax or names outside the safe subset.
    #[error("unsafe expression: {0}")]
    Unsafe(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("value error: {0}")]
    Value(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("index error: {0}")]
    Index(String),

    #[error("key error: '{0}'")]
    Key(String),
}

/// Evaluates expressions against a variable mapping.
///
/// Cheap to clone; host functions are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct SafeEvaluator {
    functions: HashMap<String, HostFunction>,
}

impl fmt::Debug for SafeEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("SafeEvaluator")
            .field("functions", &names)
            .finish()
    }
}

impl SafeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host callable. Its name joins this evaluator's call
    /// allow-list and shadows a built-in of the same name.
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ExpressionError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    /// Parse and validate without evaluating.
    ///
    /// Used to reject a bad guard up front, before a run starts.
    pub fn check(&self, expression: &str) -> Result<(), ExpressionError> {
        self.compile(expression).map(|_| ())
    }

    fn compile(&self, expression: &str) -> Result<Expr, ExpressionError> {
        let tokens = Lexer::new(expression).tokenize()?;
        let expr = Parser::new(tokens).parse()?;
        let host: HashSet<String> = self.functions.keys().cloned().collect();
        validate::check(&expr, &host)?;
        Ok(expr)
    }

    /// Evaluate `expression` with `variables` as its only namespace.
    pub fn evaluate(
        &self,
        expression: &str,
        variables: &Map<String, Value>,
    ) -> Result<Value, ExpressionError> {
        let expr = self.compile(expression)?;
        Interpreter::new(variables, &self.functions).eval(&expr)
    }

    /// Evaluate and coerce with Python truthiness.
    pub fn evaluate_bool(
        &self,
        expression: &str,
        variables: &Map<String, Value>,
    ) -> Result<bool, ExpressionError> {
        self.evaluate(expression, variables).map(|v| truthy(&v))
    }
}

/// Evaluate with the default evaluator (no host functions).
pub fn evaluate(expression: &str, variables: &Map<String, Value>) -> Result<Value, ExpressionError> {
    SafeEvaluator::new().evaluate(expression, variables)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
