//! Tree-walking evaluator over `serde_json::Value`.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};
use tracing::info;

use super::{Arg, BinaryOp, ExprError, Expr, Func, UnaryOp, Vars, MAX_NESTING};
use crate::template::render_value;

/// Evaluation steps allowed per expression or program run.
pub const DEFAULT_STEP_BUDGET: u64 = 1_000_000;

/// Longest list `range()` may produce.
pub const MAX_RANGE_LEN: usize = 100_000;

/// Longest string (in bytes) or list a concatenation may produce.
pub const MAX_CONCAT_LEN: usize = 1_000_000;

/// Deepest value a program may store in a variable.
pub const MAX_VALUE_DEPTH: usize = 128;

/// `null`, `false`, `0`, `""`, `[]` and `{}` are false; everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        let Value::Number(n) = value else {
            return None;
        };
        n.as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float))
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> Result<Value, ExprError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| ExprError::eval("arithmetic produced a non-finite number")),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn overflow() -> ExprError {
    ExprError::eval("integer overflow")
}

/// Rough allocation size of `value`: one per node plus one per 64 bytes of
/// string. Counting stops once `limit` is reached.
fn weight(value: &Value, limit: u64) -> u64 {
    let mut total = 0u64;
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        total += 1;
        match value {
            Value::String(s) => total += (s.len() / 64) as u64,
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.values()),
            _ => {}
        }
        if total >= limit {
            break;
        }
    }
    total
}

fn deeper_than(value: &Value, limit: usize) -> bool {
    let mut pending = vec![(value, 1usize)];
    while let Some((value, depth)) = pending.pop() {
        if depth > limit {
            return true;
        }
        match value {
            Value::Array(items) => pending.extend(items.iter().map(|v| (v, depth + 1))),
            Value::Object(map) => pending.extend(map.values().map(|v| (v, depth + 1))),
            _ => {}
        }
    }
    false
}

fn check_concat_len(len: usize) -> Result<(), ExprError> {
    if len > MAX_CONCAT_LEN {
        return Err(ExprError::eval(format!(
            "concatenation is limited to {MAX_CONCAT_LEN} bytes or items"
        )));
    }
    Ok(())
}

pub(crate) struct Evaluator {
    steps: u64,
    budget: u64,
    depth: usize,
}

impl Evaluator {
    pub(crate) fn new(budget: u64) -> Self {
        Self {
            steps: 0,
            budget,
            depth: 0,
        }
    }

    fn tick(&mut self) -> Result<(), ExprError> {
        self.charge(1)
    }

    fn charge(&mut self, steps: u64) -> Result<(), ExprError> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.budget {
            return Err(ExprError::BudgetExceeded(self.budget));
        }
        Ok(())
    }

    /// Charge for a freshly built value by its size, so copying large values
    /// around draws down the budget as fast as it allocates.
    fn charge_for(&mut self, value: &Value) -> Result<(), ExprError> {
        let remaining = self.budget.saturating_sub(self.steps);
        self.charge(weight(value, remaining.saturating_add(1)))
    }

    /// Accept `value` for storage in a program variable.
    pub(crate) fn retain(&mut self, value: &Value) -> Result<(), ExprError> {
        if deeper_than(value, MAX_VALUE_DEPTH) {
            return Err(ExprError::eval(format!(
                "values are limited to {MAX_VALUE_DEPTH} levels of nesting"
            )));
        }
        self.charge_for(value)
    }

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &mut Vars) -> Result<Value, ExprError> {
        self.tick()?;
        if self.depth >= MAX_NESTING {
            return Err(ExprError::eval(format!(
                "expression nested more than {MAX_NESTING} levels deep"
            )));
        }
        self.depth += 1;
        let result = self.eval_node(expr, scope);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, expr: &Expr, scope: &mut Vars) -> Result<Value, ExprError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::eval(format!("unknown variable '{name}'"))),
            Expr::Field(target, field) => {
                let target = self.eval(target, scope)?;
                field_of(&target, field)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                index_of(&target, &index)
            }
            Expr::Unary(UnaryOp::Not, operand) => {
                let value = self.eval(operand, scope)?;
                Ok(Value::Bool(!truthy(&value)))
            }
            Expr::Unary(UnaryOp::Neg, operand) => {
                let value = self.eval(operand, scope)?;
                match Num::of(&value) {
                    Some(Num::Int(i)) => i.checked_neg().map(Value::from).ok_or_else(overflow),
                    Some(Num::Float(f)) => Num::Float(-f).into_value(),
                    None => Err(ExprError::eval(format!("cannot negate {}", type_name(&value)))),
                }
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if !truthy(&self.eval(lhs, scope)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&self.eval(rhs, scope)?)))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if truthy(&self.eval(lhs, scope)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&self.eval(rhs, scope)?)))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                let value = binary(*op, lhs, rhs)?;
                if *op == BinaryOp::Add && matches!(value, Value::String(_) | Value::Array(_)) {
                    self.charge_for(&value)?;
                }
                Ok(value)
            }
            Expr::List(items) => {
                let value = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)?;
                self.charge_for(&value)?;
                Ok(value)
            }
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, scope)?);
                }
                let value = Value::Object(map);
                self.charge_for(&value)?;
                Ok(value)
            }
            Expr::Call(func, args) => self.call(*func, args, scope),
        }
    }

    fn call(&mut self, func: Func, args: &[Arg], scope: &mut Vars) -> Result<Value, ExprError> {
        if matches!(func, Func::Filter | Func::Map) {
            return self.call_with_lambda(func, args, scope);
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Value(expr) => values.push(self.eval(expr, scope)?),
                Arg::Lambda { .. } => {
                    return Err(ExprError::eval(format!(
                        "{}() does not take a lambda",
                        func.name()
                    )))
                }
            }
        }
        self.call_builtin(func, values)
    }

    fn call_with_lambda(
        &mut self,
        func: Func,
        args: &[Arg],
        scope: &mut Vars,
    ) -> Result<Value, ExprError> {
        let [Arg::Value(list), Arg::Lambda { param, body }] = args else {
            return Err(ExprError::eval(format!(
                "{}() expects a list and a lambda such as `x => x > 0`",
                func.name()
            )));
        };
        let items = match self.eval(list, scope)? {
            Value::Array(items) => items,
            other => {
                return Err(ExprError::eval(format!(
                    "{}() expects a list, found {}",
                    func.name(),
                    type_name(&other)
                )))
            }
        };

        // The lambda parameter shadows any variable of the same name.
        let shadowed = scope.remove(param);
        let result = self.apply_lambda(func, items, param, body, scope);
        match shadowed {
            Some(value) => {
                scope.insert(param.clone(), value);
            }
            None => {
                scope.remove(param);
            }
        }
        result
    }

    fn apply_lambda(
        &mut self,
        func: Func,
        items: Vec<Value>,
        param: &str,
        body: &Expr,
        scope: &mut Vars,
    ) -> Result<Value, ExprError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            scope.insert(param.to_owned(), item.clone());
            let value = self.eval(body, scope)?;
            if func == Func::Map {
                out.push(value);
            } else if truthy(&value) {
                out.push(item);
            }
        }
        let out = Value::Array(out);
        if func == Func::Map {
            self.charge_for(&out)?;
        }
        Ok(out)
    }

    fn call_builtin(&mut self, func: Func, mut args: Vec<Value>) -> Result<Value, ExprError> {
        let name = func.name();
        let given = args.len();
        let arity_error =
            |expected: &str| ExprError::eval(format!("{name}() takes {expected}, got {given}"));

        match func {
            Func::Len => {
                let [value] = args.as_slice() else {
                    return Err(arity_error("1 argument"));
                };
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => {
                        return Err(ExprError::eval(format!("len() of {}", type_name(other))))
                    }
                };
                Ok(Value::from(len))
            }
            Func::Min | Func::Max => {
                let items = match args.len() {
                    0 => return Err(arity_error("at least 1 argument")),
                    1 => match args.pop() {
                        Some(Value::Array(items)) => items,
                        Some(other) => vec![other],
                        None => Vec::new(),
                    },
                    _ => args,
                };
                let mut iter = items.into_iter();
                let mut best = iter
                    .next()
                    .ok_or_else(|| ExprError::eval(format!("{name}() of an empty list")))?;
                for item in iter {
                    let ordering = compare(&item, &best)?;
                    let better = if func == Func::Min {
                        ordering == Ordering::Less
                    } else {
                        ordering == Ordering::Greater
                    };
                    if better {
                        best = item;
                    }
                }
                Ok(best)
            }
            Func::Sum => {
                let [Value::Array(items)] = args.as_slice() else {
                    return Err(ExprError::eval("sum() takes a list of numbers"));
                };
                let mut total = Num::Int(0);
                for item in items {
                    self.tick()?;
                    let n = Num::of(item).ok_or_else(|| {
                        ExprError::eval(format!("sum() of a list containing {}", type_name(item)))
                    })?;
                    total = arith(BinaryOp::Add, total, n)?;
                }
                total.into_value()
            }
            Func::Sorted => {
                let [Value::Array(items)] = args.as_slice() else {
                    return Err(ExprError::eval("sorted() takes a list"));
                };
                let mut items = items.clone();
                let mut failure = None;
                items.sort_by(|a, b| {
                    compare(a, b).unwrap_or_else(|e| {
                        failure.get_or_insert(e);
                        Ordering::Equal
                    })
                });
                match failure {
                    Some(err) => Err(err),
                    None => Ok(Value::Array(items)),
                }
            }
            Func::Enumerate => {
                let [Value::Array(items)] = args.as_slice() else {
                    return Err(ExprError::eval("enumerate() takes a list"));
                };
                Ok(Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| Value::Array(vec![Value::from(i), item.clone()]))
                        .collect(),
                ))
            }
            Func::Range => {
                let ints = args
                    .iter()
                    .map(|v| match Num::of(v) {
                        Some(Num::Int(i)) => Ok(i),
                        _ => Err(ExprError::eval("range() takes integers")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, end, step) = match ints.as_slice() {
                    [end] => (0, *end, 1),
                    [start, end] => (*start, *end, 1),
                    [start, end, step] => (*start, *end, *step),
                    _ => return Err(arity_error("1 to 3 arguments")),
                };
                if step == 0 {
                    return Err(ExprError::eval("range() step must not be zero"));
                }
                let mut out = Vec::new();
                let mut i = start;
                while (step > 0 && i < end) || (step < 0 && i > end) {
                    if out.len() >= MAX_RANGE_LEN {
                        return Err(ExprError::eval(format!(
                            "range() is limited to {MAX_RANGE_LEN} items"
                        )));
                    }
                    self.tick()?;
                    out.push(Value::from(i));
                    match i.checked_add(step) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
                Ok(Value::Array(out))
            }
            Func::Zip => {
                if args.len() < 2 {
                    return Err(arity_error("at least 2 lists"));
                }
                let lists = args
                    .iter()
                    .map(|v| match v {
                        Value::Array(items) => Ok(items),
                        _ => Err(ExprError::eval("zip() takes lists")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let len = lists.iter().map(|l| l.len()).min().unwrap_or(0);
                let zipped = Value::Array(
                    (0..len)
                        .map(|i| Value::Array(lists.iter().map(|l| l[i].clone()).collect()))
                        .collect(),
                );
                self.charge_for(&zipped)?;
                Ok(zipped)
            }
            Func::Keys | Func::Values => {
                let [Value::Object(map)] = args.as_slice() else {
                    return Err(ExprError::eval(format!("{name}() takes an object")));
                };
                Ok(Value::Array(if func == Func::Keys {
                    map.keys().cloned().map(Value::String).collect()
                } else {
                    map.values().cloned().collect()
                }))
            }
            Func::List => match args.as_slice() {
                [] => Ok(Value::Array(Vec::new())),
                [Value::Array(items)] => Ok(Value::Array(items.clone())),
                [Value::Object(map)] => Ok(Value::Array(
                    map.keys().cloned().map(Value::String).collect(),
                )),
                [Value::String(s)] => Ok(Value::Array(
                    s.chars().map(|c| Value::String(c.to_string())).collect(),
                )),
                [other] => Err(ExprError::eval(format!("list() of {}", type_name(other)))),
                _ => Err(arity_error("at most 1 argument")),
            },
            Func::Dict => match args.as_slice() {
                [] => Ok(Value::Object(Map::new())),
                [Value::Object(map)] => Ok(Value::Object(map.clone())),
                [Value::Array(pairs)] => {
                    let mut map = Map::new();
                    for pair in pairs {
                        match pair.as_array().map(Vec::as_slice) {
                            Some([Value::String(k), v]) => {
                                map.insert(k.clone(), v.clone());
                            }
                            _ => {
                                return Err(ExprError::eval(
                                    "dict() expects [key, value] pairs with string keys",
                                ))
                            }
                        }
                    }
                    Ok(Value::Object(map))
                }
                [other] => Err(ExprError::eval(format!("dict() of {}", type_name(other)))),
                _ => Err(arity_error("at most 1 argument")),
            },
            Func::Str => {
                let [value] = args.as_slice() else {
                    return Err(arity_error("1 argument"));
                };
                Ok(Value::String(render_value(value)))
            }
            Func::Int => {
                let [value] = args.as_slice() else {
                    return Err(arity_error("1 argument"));
                };
                to_int(value).map(Value::from)
            }
            Func::Float => {
                let [value] = args.as_slice() else {
                    return Err(arity_error("1 argument"));
                };
                Num::Float(to_float(value)?).into_value()
            }
            Func::Bool => {
                let [value] = args.as_slice() else {
                    return Err(arity_error("1 argument"));
                };
                Ok(Value::Bool(truthy(value)))
            }
            Func::Abs => match args.as_slice() {
                [value] => match Num::of(value) {
                    Some(Num::Int(i)) => i.checked_abs().map(Value::from).ok_or_else(overflow),
                    Some(Num::Float(f)) => Num::Float(f.abs()).into_value(),
                    None => Err(ExprError::eval(format!("abs() of {}", type_name(value)))),
                },
                _ => Err(arity_error("1 argument")),
            },
            Func::Round => {
                let (value, digits) = match args.as_slice() {
                    [value] => (value, None),
                    [value, digits] => (value, Some(to_int(digits)?)),
                    _ => return Err(arity_error("1 or 2 arguments")),
                };
                let n = Num::of(value)
                    .ok_or_else(|| ExprError::eval(format!("round() of {}", type_name(value))))?;
                match (n, digits) {
                    (Num::Int(i), _) => Ok(Value::from(i)),
                    (Num::Float(f), None) => float_to_int(f.round()).map(Value::from),
                    (Num::Float(f), Some(d)) => {
                        let factor = 10f64.powi(d.clamp(0, 15) as i32);
                        Num::Float((f * factor).round() / factor).into_value()
                    }
                }
            }
            Func::Lower | Func::Upper => {
                let [Value::String(s)] = args.as_slice() else {
                    return Err(ExprError::eval(format!("{name}() takes a string")));
                };
                Ok(Value::String(if func == Func::Lower {
                    s.to_lowercase()
                } else {
                    s.to_uppercase()
                }))
            }
            Func::Log => {
                let line = args.iter().map(render_value).collect::<Vec<_>>().join(" ");
                info!(target: "workflow::function", "{line}");
                Ok(Value::Null)
            }
            Func::Filter | Func::Map => Err(ExprError::eval(format!(
                "{name}() expects a lambda argument"
            ))),
        }
    }
}

fn field_of(target: &Value, field: &str) -> Result<Value, ExprError> {
    match target {
        Value::Object(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
        other => Err(ExprError::eval(format!(
            "cannot read field '{field}' of {}",
            type_name(other)
        ))),
    }
}

fn index_of(target: &Value, index: &Value) -> Result<Value, ExprError> {
    match (target, index) {
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(_) | Value::String(_), _) => {
            let Some(Num::Int(i)) = Num::of(index) else {
                return Err(ExprError::eval("index must be an integer"));
            };
            let len = match target {
                Value::Array(items) => items.len(),
                Value::String(s) => s.chars().count(),
                _ => 0,
            };
            let resolved = if i < 0 { len as i64 + i } else { i };
            if resolved < 0 || resolved >= len as i64 {
                return Ok(Value::Null);
            }
            let at = resolved as usize;
            Ok(match target {
                Value::Array(items) => items[at].clone(),
                Value::String(s) => s
                    .chars()
                    .nth(at)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
        (other, index) => Err(ExprError::eval(format!(
            "cannot index {} with {}",
            type_name(other),
            type_name(index)
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::In => contains(&lhs, &rhs).map(Value::Bool),
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => {
                check_concat_len(a.len() + b.len())?;
                Ok(Value::String(a + &b))
            }
            (Value::Array(mut a), Value::Array(b)) => {
                check_concat_len(a.len() + b.len())?;
                a.extend(b);
                Ok(Value::Array(a))
            }
            (lhs, rhs) => numeric(op, &lhs, &rhs),
        },
        _ => numeric(op, &lhs, &rhs),
    }
}

fn numeric(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    match (Num::of(lhs), Num::of(rhs)) {
        (Some(a), Some(b)) => arith(op, a, b)?.into_value(),
        _ => Err(ExprError::eval(format!(
            "unsupported operand types for {op:?}: {} and {}",
            type_name(lhs),
            type_name(rhs)
        ))),
    }
}

fn arith(op: BinaryOp, a: Num, b: Num) -> Result<Num, ExprError> {
    if op == BinaryOp::Div {
        let divisor = b.as_f64();
        if divisor == 0.0 {
            return Err(ExprError::eval("division by zero"));
        }
        return Ok(Num::Float(a.as_f64() / divisor));
    }

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            let result = match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Sub => x.checked_sub(y),
                BinaryOp::Mul => x.checked_mul(y),
                BinaryOp::Rem => {
                    if y == 0 {
                        return Err(ExprError::eval("modulo by zero"));
                    }
                    // The result takes the sign of the divisor.
                    x.checked_rem(y)
                        .map(|r| if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
                }
                _ => return Err(ExprError::eval(format!("{op:?} is not arithmetic"))),
            };
            result.map(Num::Int).ok_or_else(overflow)
        }
        (a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let result = match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Rem => {
                    if y == 0.0 {
                        return Err(ExprError::eval("modulo by zero"));
                    }
                    x - y * (x / y).floor()
                }
                _ => return Err(ExprError::eval(format!("{op:?} is not arithmetic"))),
            };
            Ok(Num::Float(result))
        }
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(lhs), Num::of(rhs)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => false,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, ExprError> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Number(_), Value::Number(_)) => match (Num::of(lhs), Num::of(rhs)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| ExprError::eval("cannot compare non-finite numbers")),
            _ => Err(ExprError::eval("cannot compare numbers")),
        },
        _ => Err(ExprError::eval(format!(
            "cannot compare {} with {}",
            type_name(lhs),
            type_name(rhs)
        ))),
    }
}

fn contains(needle: &Value, haystack: &Value) -> Result<bool, ExprError> {
    match (needle, haystack) {
        (_, Value::Array(items)) => Ok(items.iter().any(|item| values_equal(needle, item))),
        (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
        (Value::String(key), Value::Object(map)) => Ok(map.contains_key(key)),
        _ => Err(ExprError::eval(format!(
            "'in' cannot look for {} in {}",
            type_name(needle),
            type_name(haystack)
        ))),
    }
}

fn float_to_int(f: f64) -> Result<i64, ExprError> {
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(ExprError::eval(format!("{f} does not fit in an integer")));
    }
    Ok(f.trunc() as i64)
}

fn to_int(value: &Value) -> Result<i64, ExprError> {
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(_) => match Num::of(value) {
            Some(Num::Int(i)) => Ok(i),
            Some(Num::Float(f)) => float_to_int(f),
            None => Err(ExprError::eval("invalid number")),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Ok(i),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| ExprError::eval(format!("invalid integer literal '{s}'")))
                    .and_then(float_to_int),
            }
        }
        other => Err(ExprError::eval(format!("int() of {}", type_name(other)))),
    }
}

fn to_float(value: &Value) -> Result<f64, ExprError> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(_) => Num::of(value)
            .map(Num::as_f64)
            .ok_or_else(|| ExprError::eval("invalid number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ExprError::eval(format!("invalid float literal '{s}'"))),
        other => Err(ExprError::eval(format!("float() of {}", type_name(other)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_emptiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy_value in [json!(true), json!(-1), json!("x"), json!([0]), json!({ "a": null })] {
            assert!(truthy(&truthy_value), "{truthy_value} should be truthy");
        }
    }

    #[test]
    fn int_and_float_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert_eq!(compare(&json!(2), &json!(1.5)).unwrap(), Ordering::Greater);
        assert!(compare(&json!("a"), &json!(1)).is_err());
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert!(arith(BinaryOp::Add, Num::Int(i64::MAX), Num::Int(1)).is_err());
        assert!(arith(BinaryOp::Div, Num::Int(1), Num::Int(0)).is_err());
    }

    #[test]
    fn evaluator_refuses_trees_deeper_than_the_nesting_limit() {
        let mut expr = Expr::Literal(json!(true));
        for _ in 0..MAX_NESTING {
            expr = Expr::Unary(UnaryOp::Not, Box::new(expr));
        }
        let err = Evaluator::new(DEFAULT_STEP_BUDGET)
            .eval(&expr, &mut Vars::new())
            .unwrap_err();
        assert!(matches!(err, ExprError::Eval(ref msg) if msg.contains("nested more than")));
    }

    #[test]
    fn weight_counts_nodes_and_long_strings() {
        assert_eq!(weight(&json!([1, { "a": 2 }]), u64::MAX), 4);
        assert_eq!(weight(&json!("x".repeat(640)), u64::MAX), 11);
        assert_eq!(weight(&json!([1, 2, 3, 4]), 2), 2);
    }

    #[test]
    fn depth_check_walks_without_recursing() {
        assert!(!deeper_than(&json!([[1]]), 3));
        assert!(deeper_than(&json!([[[1]]]), 3));
        assert!(deeper_than(&json!({ "a": { "b": [0] } }), 2));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(index_of(&json!([1, 2, 3]), &json!(-1)).unwrap(), json!(3));
        assert_eq!(index_of(&json!([1, 2, 3]), &json!(5)).unwrap(), Value::Null);
        assert!(index_of(&json!(1), &json!(0)).is_err());
    }
}
