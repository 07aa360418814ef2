//! Sandboxed expression language used by the `function`, `filter` and
//! `conditional` nodes.
//!
//! Scope:
//! - Literals: integers, floats, single/double quoted strings, `true`,
//!   `false`, `null` (and `True`/`False`/`None`), `[..]` lists, `{..}` objects
//! - Access: variables, `a.b`, `a[0]`, `a["key"]`, negative list indices
//! - Operators: `+ - * / %`, `== != < <= > >=`, `in`, `&& || !`
//!   (`and or not`), unary `-`
//! - Calls into a closed list of pure functions (see [`Func`]); `filter`
//!   and `map` take a lambda `x => expr`
//! - Programs: `name = expr` assignments and bare expressions separated by
//!   `;` or newlines
//!
//! Expressions only ever see the variables bound by the caller. There is
//! no way to reach the host environment, the filesystem, or other code.
//! Evaluation runs under a step budget so runaway programs fail instead of
//! spinning. Building a value costs steps in proportion to its size, and
//! syntax trees and stored values have a bounded depth, so neither memory
//! nor stack can be exhausted from inside an expression.

mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

pub use eval::{truthy, DEFAULT_STEP_BUDGET, MAX_CONCAT_LEN, MAX_RANGE_LEN, MAX_VALUE_DEPTH};

/// Deepest syntax tree the parser builds and the evaluator walks.
pub const MAX_NESTING: usize = 128;

/// Variables visible to an expression or program.
pub type Vars = HashMap<String, Value>;

/// Errors from compiling or evaluating an expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{0}")]
    Eval(String),

    #[error("evaluation exceeded the step budget of {0}")]
    BudgetExceeded(u64),
}

impl ExprError {
    pub(crate) fn eval(message: impl Into<String>) -> Self {
        ExprError::Eval(message.into())
    }
}

/// Functions callable from expressions. Anything else is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Len,
    Min,
    Max,
    Sum,
    Sorted,
    Filter,
    Map,
    Enumerate,
    Range,
    Zip,
    Keys,
    Values,
    List,
    Dict,
    Str,
    Int,
    Float,
    Bool,
    Abs,
    Round,
    Lower,
    Upper,
    Log,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "len" => Func::Len,
            "min" => Func::Min,
            "max" => Func::Max,
            "sum" => Func::Sum,
            "sorted" | "sort" => Func::Sorted,
            "filter" => Func::Filter,
            "map" => Func::Map,
            "enumerate" => Func::Enumerate,
            "range" => Func::Range,
            "zip" => Func::Zip,
            "keys" => Func::Keys,
            "values" => Func::Values,
            "list" => Func::List,
            "dict" => Func::Dict,
            "str" => Func::Str,
            "int" => Func::Int,
            "float" => Func::Float,
            "bool" => Func::Bool,
            "abs" => Func::Abs,
            "round" => Func::Round,
            "lower" => Func::Lower,
            "upper" => Func::Upper,
            "log" | "print" => Func::Log,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Len => "len",
            Func::Min => "min",
            Func::Max => "max",
            Func::Sum => "sum",
            Func::Sorted => "sorted",
            Func::Filter => "filter",
            Func::Map => "map",
            Func::Enumerate => "enumerate",
            Func::Range => "range",
            Func::Zip => "zip",
            Func::Keys => "keys",
            Func::Values => "values",
            Func::List => "list",
            Func::Dict => "dict",
            Func::Str => "str",
            Func::Int => "int",
            Func::Float => "float",
            Func::Bool => "bool",
            Func::Abs => "abs",
            Func::Round => "round",
            Func::Lower => "lower",
            Func::Upper => "upper",
            Func::Log => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Var(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Call(Func, Vec<Arg>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Value(Expr),
    Lambda { param: String, body: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Assign(String, Expr),
    Expr(Expr),
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// A single compiled expression, reusable across inputs.
#[derive(Debug, Clone)]
pub struct Expression {
    expr: Expr,
    budget: u64,
}

impl Expression {
    /// Parse `source` once; evaluate it as many times as needed.
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        let tokens = lexer::tokenize(source, false)?;
        let expr = parser::parse_expression(tokens)?;
        Ok(Self {
            expr,
            budget: DEFAULT_STEP_BUDGET,
        })
    }

    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    /// Evaluate with `vars` bound.
    pub fn evaluate(&self, vars: &Vars) -> Result<Value, ExprError> {
        let mut scope = vars.clone();
        eval::Evaluator::new(self.budget).eval(&self.expr, &mut scope)
    }

    /// Evaluate and reduce the result to its truthiness.
    pub fn evaluate_bool(&self, vars: &Vars) -> Result<bool, ExprError> {
        self.evaluate(vars).map(|v| truthy(&v))
    }
}

/// A compiled sequence of statements.
#[derive(Debug, Clone)]
pub struct Program {
    stmts: Vec<Stmt>,
    budget: u64,
}

impl Program {
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        let tokens = lexer::tokenize(source, true)?;
        let stmts = parser::parse_program(tokens)?;
        Ok(Self {
            stmts,
            budget: DEFAULT_STEP_BUDGET,
        })
    }

    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    /// Run every statement in order and return the final variable set.
    pub fn run(&self, mut vars: Vars) -> Result<Vars, ExprError> {
        let mut evaluator = eval::Evaluator::new(self.budget);
        for stmt in &self.stmts {
            match stmt {
                Stmt::Assign(name, expr) => {
                    let value = evaluator.eval(expr, &mut vars)?;
                    evaluator.retain(&value)?;
                    vars.insert(name.clone(), value);
                }
                Stmt::Expr(expr) => {
                    evaluator.eval(expr, &mut vars)?;
                }
            }
        }
        Ok(vars)
    }
}
