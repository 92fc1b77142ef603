//! The scalar value model.
//!
//! Every datum flowing through the engine is a [`Value`]: a tagged sum over
//! a closed set of scalar types. Numeric types form a widening lattice
//! (`Integer` ⊂ `BigInt` ⊂ `Double`) used for arithmetic and comparison
//! promotion.

use crate::error::ValueError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::fmt;

/// The closed set of scalar types, in their canonical ordering.
///
/// The declaration order is load bearing: cross-type ordering of values
/// follows it, and the key encoding derives its tag bytes from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Null,
    Boolean,
    Integer,
    BigInt,
    Double,
    Text,
    Blob,
    Timestamp,
}

impl ValueType {
    /// Rank used for deterministic cross-type ordering. All numeric types
    /// share one rank so that mixed-type numeric data collates together.
    pub fn rank(self) -> u8 {
        match self {
            ValueType::Null => 0,
            ValueType::Boolean => 1,
            ValueType::Integer | ValueType::BigInt | ValueType::Double => 2,
            ValueType::Text => 3,
            ValueType::Blob => 4,
            ValueType::Timestamp => 5,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::BigInt | ValueType::Double)
    }

    pub fn is_integral(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::BigInt)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::BigInt => "bigint",
            ValueType::Double => "double precision",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// A single scalar datum.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    /// UTC instant with microsecond resolution. Constructed through
    /// [`Value::timestamp`] which truncates to the stored resolution.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Build a timestamp value truncated to microsecond resolution.
    pub fn timestamp(dt: DateTime<Utc>) -> Value {
        match DateTime::from_timestamp_micros(dt.timestamp_micros()) {
            Some(t) => Value::Timestamp(t),
            None => Value::Timestamp(dt),
        }
    }

    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::BigInt(_) => ValueType::BigInt,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Timestamp(_) => ValueType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            v => Err(ValueError::mismatch(ValueType::Boolean, v.type_of())),
        }
    }

    pub fn as_integer(&self) -> Result<i32, ValueError> {
        match self {
            Value::Integer(i) => Ok(*i),
            v => Err(ValueError::mismatch(ValueType::Integer, v.type_of())),
        }
    }

    /// Read any integral value widened to 64 bits.
    pub fn as_bigint(&self) -> Result<i64, ValueError> {
        match self {
            Value::Integer(i) => Ok(*i as i64),
            Value::BigInt(i) => Ok(*i),
            v => Err(ValueError::mismatch(ValueType::BigInt, v.type_of())),
        }
    }

    /// Read any numeric value widened to a double.
    pub fn as_double(&self) -> Result<f64, ValueError> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::BigInt(i) => Ok(*i as f64),
            Value::Double(d) => Ok(*d),
            v => Err(ValueError::mismatch(ValueType::Double, v.type_of())),
        }
    }

    pub fn as_text(&self) -> Result<&str, ValueError> {
        match self {
            Value::Text(s) => Ok(s),
            v => Err(ValueError::mismatch(ValueType::Text, v.type_of())),
        }
    }

    pub fn as_blob(&self) -> Result<&[u8], ValueError> {
        match self {
            Value::Blob(b) => Ok(b),
            v => Err(ValueError::mismatch(ValueType::Blob, v.type_of())),
        }
    }

    pub fn as_timestamp(&self) -> Result<DateTime<Utc>, ValueError> {
        match self {
            Value::Timestamp(t) => Ok(*t),
            v => Err(ValueError::mismatch(ValueType::Timestamp, v.type_of())),
        }
    }

    /// Truthiness used by boolean coercion: zero and empty are false,
    /// everything else is true. Null is not truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::BigInt(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::Timestamp(_) => true,
        }
    }

    /// SQL comparison. Returns `None` when either operand is Null
    /// (three-valued logic), or when the operands are not comparable
    /// (different non-numeric types).
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if self.type_of().is_numeric() && other.type_of().is_numeric() {
            return Some(numeric_cmp(self, other));
        }
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                Some(a.timestamp_micros().cmp(&b.timestamp_micros()))
            }
            _ => None,
        }
    }

    /// SQL equality. `None` when either operand is Null; `Some(false)`
    /// for incomparable types.
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match self.sql_cmp(other) {
            Some(ord) => Some(ord == Ordering::Equal),
            None => Some(false),
        }
    }

    /// Total order across all values, used for deterministic sorting and
    /// MIN/MAX tie-breaking. Types order by [`ValueType::rank`]; numerics
    /// of any width collate together, NaN below every other numeric.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let (ra, rb) = (self.type_of().rank(), other.type_of().rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                a.timestamp_micros().cmp(&b.timestamp_micros())
            }
            _ => numeric_cmp(self, other),
        }
    }

    /// Cast following SQL rules. Widening within the numeric lattice is
    /// lossless, narrowing fails when out of range, text parses, blob to
    /// text requires valid UTF-8, and casting to boolean uses truthiness.
    pub fn cast_as(&self, target: ValueType) -> Result<Value, ValueError> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        let from = self.type_of();
        if from == target {
            return Ok(self.clone());
        }
        let invalid = || ValueError::InvalidCast { from, to: target };

        match target {
            ValueType::Null => Err(invalid()),
            ValueType::Boolean => Ok(Value::Boolean(self.is_truthy())),
            ValueType::Integer => match self {
                Value::Boolean(b) => Ok(Value::Integer(*b as i32)),
                Value::BigInt(i) => i32::try_from(*i)
                    .map(Value::Integer)
                    .map_err(|_| ValueError::Overflow(ValueType::Integer)),
                Value::Double(d) => double_to_int(*d, i32::MIN as f64, i32::MAX as f64)
                    .map(|i| Value::Integer(i as i32))
                    .ok_or(ValueError::Overflow(ValueType::Integer)),
                Value::Text(s) => parse_integral(s)
                    .ok_or_else(invalid)
                    .and_then(|i| {
                        i32::try_from(i)
                            .map(Value::Integer)
                            .map_err(|_| ValueError::Overflow(ValueType::Integer))
                    }),
                _ => Err(invalid()),
            },
            ValueType::BigInt => match self {
                Value::Boolean(b) => Ok(Value::BigInt(*b as i64)),
                Value::Integer(i) => Ok(Value::BigInt(*i as i64)),
                Value::Double(d) => double_to_int(*d, i64::MIN as f64, i64::MAX as f64)
                    .map(Value::BigInt)
                    .ok_or(ValueError::Overflow(ValueType::BigInt)),
                Value::Text(s) => parse_integral(s).map(Value::BigInt).ok_or_else(invalid),
                _ => Err(invalid()),
            },
            ValueType::Double => match self {
                Value::Integer(i) => Ok(Value::Double(*i as f64)),
                Value::BigInt(i) => Ok(Value::Double(*i as f64)),
                Value::Text(s) => s.trim().parse::<f64>().map(Value::Double).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            ValueType::Text => match self {
                Value::Boolean(b) => Ok(Value::Text(b.to_string())),
                Value::Integer(i) => Ok(Value::Text(i.to_string())),
                Value::BigInt(i) => Ok(Value::Text(i.to_string())),
                Value::Double(d) => Ok(Value::Text(format_double(*d))),
                Value::Blob(b) => std::str::from_utf8(b)
                    .map(|s| Value::Text(s.to_owned()))
                    .map_err(|_| invalid()),
                Value::Timestamp(t) => Ok(Value::Text(t.to_rfc3339_opts(SecondsFormat::Micros, true))),
                _ => Err(invalid()),
            },
            ValueType::Blob => match self {
                Value::Text(s) => Ok(Value::Blob(s.clone().into_bytes())),
                _ => Err(invalid()),
            },
            ValueType::Timestamp => match self {
                Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|t| Value::timestamp(t.with_timezone(&Utc)))
                    .map_err(|_| invalid()),
                _ => Err(invalid()),
            },
        }
    }
}

/// Compare two numeric values mathematically, with NaN below everything.
/// Integral pairs compare exactly; a double operand compares through f64.
fn numeric_cmp(a: &Value, b: &Value) -> Ordering {
    fn nan(v: &Value) -> bool {
        matches!(v, Value::Double(d) if d.is_nan())
    }
    match (nan(a), nan(b)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    match (a, b) {
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            let (x, y) = (a.as_double().unwrap(), b.as_double().unwrap());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => a.as_bigint().unwrap().cmp(&b.as_bigint().unwrap()),
    }
}

/// Truncate a double toward zero into an integer, rejecting NaN and
/// out-of-range magnitudes.
fn double_to_int(d: f64, min: f64, max: f64) -> Option<i64> {
    if d.is_nan() {
        return None;
    }
    let t = d.trunc();
    if t < min || t > max {
        return None;
    }
    Some(t as i64)
}

fn parse_integral(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

/// Render a double so that whole values keep a trailing `.0`, matching
/// what users expect from a double-typed column.
pub(crate) fn format_double(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.1}")
    } else {
        format!("{d}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Double(d) => f.write_str(&format_double(*d)),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => write!(f, "x'{}'", hex::encode(b)),
            Value::Timestamp(t) => write!(f, "'{}'", t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

/// Structural equality used by expression trees and tests. Unlike
/// [`Value::sql_eq`] this is reflexive on Null and compares numerics
/// through the lattice so `Integer(1) == BigInt(1)`.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (a, b) if a.type_of().is_numeric() && b.type_of().is_numeric() => {
                numeric_cmp(a, b) == Ordering::Equal
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                a.timestamp_micros() == b.timestamp_micros()
            }
            _ => false,
        }
    }
}
