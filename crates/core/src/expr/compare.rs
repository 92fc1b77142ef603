//! Comparison semantics: ordering operators, IS, BETWEEN and IN.

use super::{bool3, BinaryOp, Expr};
use crate::environment::Environment;
use crate::error::DBError;
use std::cmp::Ordering;
use stratadb_types::Value;

/// Ordering comparisons with three-valued logic: any Null operand is
/// Null, incomparable non-null operands are false.
pub fn cmp(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    if lhs.is_null() || rhs.is_null() {
        return Value::Null;
    }
    let holds = match op {
        BinaryOp::Eq => lhs.sql_eq(rhs) == Some(true),
        BinaryOp::Neq => lhs.sql_eq(rhs) == Some(false),
        BinaryOp::Lt => lhs.sql_cmp(rhs) == Some(Ordering::Less),
        BinaryOp::Gt => lhs.sql_cmp(rhs) == Some(Ordering::Greater),
        BinaryOp::Lte => matches!(lhs.sql_cmp(rhs), Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gte => matches!(lhs.sql_cmp(rhs), Some(Ordering::Greater | Ordering::Equal)),
        _ => unreachable!("not a comparison operator: {op}"),
    };
    Value::Boolean(holds)
}

/// Null-safe equality. Never returns Null.
pub fn is_op(lhs: &Value, rhs: &Value, negate: bool) -> Value {
    let eq = match (lhs.is_null(), rhs.is_null()) {
        (true, true) => true,
        (false, false) => lhs.sql_eq(rhs) == Some(true),
        _ => false,
    };
    Value::Boolean(eq != negate)
}

/// `x BETWEEN a AND b` is `a <= x AND x <= b`; any Null operand is Null.
pub fn between(x: &Value, low: &Value, high: &Value) -> Value {
    if x.is_null() || low.is_null() || high.is_null() {
        return Value::Null;
    }
    let ge_low = matches!(low.sql_cmp(x), Some(Ordering::Less | Ordering::Equal));
    let le_high = matches!(x.sql_cmp(high), Some(Ordering::Less | Ordering::Equal));
    Value::Boolean(ge_low && le_high)
}

/// `x IN (list)`. Null when `x` is Null or the list is empty; otherwise
/// true iff some member equals `x`, Null when no member matched but one
/// of them was Null.
pub fn in_list(x: &Value, rhs: &Expr, env: &Environment<'_>) -> Result<Value, DBError> {
    let members = match rhs {
        Expr::List(items) => Some(items),
        Expr::Parens(inner) => match inner.as_ref() {
            Expr::List(items) => Some(items),
            _ => None,
        },
        _ => None,
    };
    let items: Vec<Value> = match members {
        Some(items) => {
            let mut out = Vec::with_capacity(items.len());
            for e in items {
                out.push(e.eval(env)?);
            }
            out
        }
        None => vec![rhs.eval(env)?],
    };
    if x.is_null() || items.is_empty() {
        return Ok(Value::Null);
    }
    let mut saw_null = false;
    for item in &items {
        match x.sql_eq(item) {
            Some(true) => return Ok(Value::Boolean(true)),
            Some(false) => {}
            None => saw_null = true,
        }
    }
    Ok(if saw_null {
        Value::Null
    } else {
        Value::Boolean(false)
    })
}

/// Truthiness at the filter boundary: Null is treated as false. This is
/// the only place three-valued logic collapses.
pub fn filter_matches(v: &Value) -> bool {
    bool3(v) == Some(true)
}
