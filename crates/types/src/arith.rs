//! Value-level arithmetic with SQL semantics.
//!
//! Any Null operand yields Null, non-numeric operands yield Null, and a
//! numeric pair is promoted to the widest involved type before the
//! operation runs. Integral math is carried out in 64 bits and checked;
//! overflow surfaces as [`ValueError::Overflow`].

use crate::error::ValueError;
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
}

/// Apply an arithmetic or bitwise operator to two values.
pub fn apply(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    if !lhs.type_of().is_numeric() || !rhs.type_of().is_numeric() {
        return Ok(Value::Null);
    }

    match op {
        ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor => bitwise(op, lhs, rhs),
        _ if lhs.type_of() == ValueType::Double || rhs.type_of() == ValueType::Double => {
            double_arith(op, lhs.as_double()?, rhs.as_double()?)
        }
        _ => integral_arith(op, lhs.as_bigint()?, rhs.as_bigint()?),
    }
}

/// Bitwise operators require integral operands; anything else is Null.
/// Mixed widths promote to 64 bits before the operation.
fn bitwise(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
    if !lhs.type_of().is_integral() || !rhs.type_of().is_integral() {
        return Ok(Value::Null);
    }
    let (a, b) = (lhs.as_bigint()?, rhs.as_bigint()?);
    let v = match op {
        ArithOp::BitAnd => a & b,
        ArithOp::BitOr => a | b,
        ArithOp::BitXor => a ^ b,
        _ => unreachable!(),
    };
    Ok(Value::BigInt(v))
}

fn integral_arith(op: ArithOp, a: i64, b: i64) -> Result<Value, ValueError> {
    let overflow = || ValueError::Overflow(ValueType::BigInt);
    match op {
        ArithOp::Add => a.checked_add(b).map(Value::BigInt).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).map(Value::BigInt).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).map(Value::BigInt).ok_or_else(overflow),
        ArithOp::Div => {
            if b == 0 {
                return Err(ValueError::DivisionByZero);
            }
            a.checked_div(b).map(Value::BigInt).ok_or_else(overflow)
        }
        ArithOp::Rem => {
            if b == 0 {
                return Ok(Value::Null);
            }
            a.checked_rem(b).map(Value::BigInt).ok_or_else(overflow)
        }
        _ => unreachable!(),
    }
}

fn double_arith(op: ArithOp, a: f64, b: f64) -> Result<Value, ValueError> {
    let v = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        // IEEE semantics: +/-Inf or NaN on division by zero.
        ArithOp::Div => a / b,
        ArithOp::Rem => {
            if b == 0.0 {
                return Ok(Value::Null);
            }
            a % b
        }
        _ => unreachable!(),
    };
    Ok(Value::Double(v))
}

/// `||` concatenation: both operands Text, anything else Null.
pub fn concat(lhs: &Value, rhs: &Value) -> Value {
    match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Value::Text(out)
        }
        _ => Value::Null,
    }
}

/// Unary minus; Null on non-numerics, checked on integrals.
pub fn neg(v: &Value) -> Result<Value, ValueError> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or(ValueError::Overflow(ValueType::Integer)),
        Value::BigInt(i) => i
            .checked_neg()
            .map(Value::BigInt)
            .ok_or(ValueError::Overflow(ValueType::BigInt)),
        Value::Double(d) => Ok(Value::Double(-d)),
        _ => Ok(Value::Null),
    }
}
