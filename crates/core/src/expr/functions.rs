//! Builtin scalar functions and the function registry.
//!
//! Functions live in packages; the bare package holds the general
//! builtins and `math` the numeric ones. The registry maps
//! `(package, name)` to a definition with an arity check, which is what
//! an external planner resolves call sites against.

use super::aggregate::AggregateFunc;
use super::{Expr, FunctionCall};
use crate::error::DBError;
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use std::fmt;
use stratadb_types::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunc {
    Lower,
    Upper,
    Trim,
    Ltrim,
    Rtrim,
    Len,
    Coalesce,
    Typeof,
    Now,
    Random,
    // math package
    Floor,
    Ceil,
    Abs,
    Sqrt,
    Acos,
    Asin,
    Atan,
    Atan2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Scalar(ScalarFunc),
    Aggregate(AggregateFunc),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// At least this many arguments.
    Variadic(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub package: &'static str,
    pub name: &'static str,
    pub arity: Arity,
    pub func: Function,
}

static REGISTRY: Lazy<Vec<FunctionDef>> = Lazy::new(|| {
    vec![
        def("", "lower", Arity::Exact(1), Function::Scalar(ScalarFunc::Lower)),
        def("", "upper", Arity::Exact(1), Function::Scalar(ScalarFunc::Upper)),
        def("", "trim", Arity::Exact(1), Function::Scalar(ScalarFunc::Trim)),
        def("", "ltrim", Arity::Exact(1), Function::Scalar(ScalarFunc::Ltrim)),
        def("", "rtrim", Arity::Exact(1), Function::Scalar(ScalarFunc::Rtrim)),
        def("", "len", Arity::Exact(1), Function::Scalar(ScalarFunc::Len)),
        def("", "coalesce", Arity::Variadic(1), Function::Scalar(ScalarFunc::Coalesce)),
        def("", "typeof", Arity::Exact(1), Function::Scalar(ScalarFunc::Typeof)),
        def("", "now", Arity::Exact(0), Function::Scalar(ScalarFunc::Now)),
        def("", "random", Arity::Exact(0), Function::Scalar(ScalarFunc::Random)),
        def("math", "floor", Arity::Exact(1), Function::Scalar(ScalarFunc::Floor)),
        def("math", "ceil", Arity::Exact(1), Function::Scalar(ScalarFunc::Ceil)),
        def("math", "abs", Arity::Exact(1), Function::Scalar(ScalarFunc::Abs)),
        def("math", "sqrt", Arity::Exact(1), Function::Scalar(ScalarFunc::Sqrt)),
        def("math", "acos", Arity::Exact(1), Function::Scalar(ScalarFunc::Acos)),
        def("math", "asin", Arity::Exact(1), Function::Scalar(ScalarFunc::Asin)),
        def("math", "atan", Arity::Exact(1), Function::Scalar(ScalarFunc::Atan)),
        def("math", "atan2", Arity::Exact(2), Function::Scalar(ScalarFunc::Atan2)),
        def("", "count", Arity::Exact(1), Function::Aggregate(AggregateFunc::Count)),
        def("", "min", Arity::Exact(1), Function::Aggregate(AggregateFunc::Min)),
        def("", "max", Arity::Exact(1), Function::Aggregate(AggregateFunc::Max)),
        def("", "sum", Arity::Exact(1), Function::Aggregate(AggregateFunc::Sum)),
        def("", "avg", Arity::Exact(1), Function::Aggregate(AggregateFunc::Avg)),
    ]
});

fn def(package: &'static str, name: &'static str, arity: Arity, func: Function) -> FunctionDef {
    FunctionDef {
        package,
        name,
        arity,
        func,
    }
}

pub fn lookup(package: &str, name: &str) -> Option<&'static FunctionDef> {
    let name = name.to_ascii_lowercase();
    REGISTRY
        .iter()
        .find(|d| d.package == package && d.name == name)
}

/// Resolve a call site into an expression, checking arity.
pub fn call(package: &str, name: &str, args: Vec<Expr>) -> Result<Expr, DBError> {
    let def = lookup(package, name).ok_or_else(|| {
        DBError::invalid_argument(if package.is_empty() {
            format!("unknown function `{name}`")
        } else {
            format!("unknown function `{package}.{name}`")
        })
    })?;
    let ok = match def.arity {
        Arity::Exact(n) => args.len() == n,
        Arity::Variadic(min) => args.len() >= min,
    };
    if !ok {
        return Err(DBError::invalid_argument(format!(
            "wrong number of arguments for `{name}`: got {}",
            args.len()
        )));
    }
    Ok(Expr::Call(FunctionCall { func: def.func, args }))
}

pub(crate) fn eval_scalar(f: ScalarFunc, args: &[Value]) -> Result<Value, DBError> {
    // Arity is enforced at call construction; a missing argument still
    // degrades to Null instead of panicking.
    let a0 = args.first().unwrap_or(&Value::Null);
    let a1 = args.get(1).unwrap_or(&Value::Null);
    let v = match f {
        ScalarFunc::Lower => text_fn(a0, |s| s.to_lowercase()),
        ScalarFunc::Upper => text_fn(a0, |s| s.to_uppercase()),
        ScalarFunc::Trim => text_fn(a0, |s| s.trim().to_owned()),
        ScalarFunc::Ltrim => text_fn(a0, |s| s.trim_start().to_owned()),
        ScalarFunc::Rtrim => text_fn(a0, |s| s.trim_end().to_owned()),
        ScalarFunc::Len => match a0 {
            Value::Text(s) => Value::BigInt(s.chars().count() as i64),
            Value::Blob(b) => Value::BigInt(b.len() as i64),
            _ => Value::Null,
        },
        ScalarFunc::Coalesce => args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null),
        ScalarFunc::Typeof => Value::Text(a0.type_of().to_string()),
        ScalarFunc::Now => Value::timestamp(Utc::now()),
        ScalarFunc::Random => Value::BigInt(rand::thread_rng().gen()),
        ScalarFunc::Floor => numeric_fn(a0, f64::floor)?,
        ScalarFunc::Ceil => numeric_fn(a0, f64::ceil)?,
        ScalarFunc::Abs => match a0 {
            Value::Integer(i) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or(stratadb_types::ValueError::Overflow(ValueType::Integer))?,
            Value::BigInt(i) => i
                .checked_abs()
                .map(Value::BigInt)
                .ok_or(stratadb_types::ValueError::Overflow(ValueType::BigInt))?,
            Value::Double(d) => Value::Double(d.abs()),
            _ => Value::Null,
        },
        ScalarFunc::Sqrt => double_fn(a0, f64::sqrt)?,
        ScalarFunc::Acos => double_fn(a0, f64::acos)?,
        ScalarFunc::Asin => double_fn(a0, f64::asin)?,
        ScalarFunc::Atan => double_fn(a0, f64::atan)?,
        ScalarFunc::Atan2 => {
            if a0.type_of().is_numeric() && a1.type_of().is_numeric() {
                Value::Double(a0.as_double()?.atan2(a1.as_double()?))
            } else {
                Value::Null
            }
        }
    };
    Ok(v)
}

fn text_fn(v: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match v {
        Value::Text(s) => Value::Text(f(s)),
        _ => Value::Null,
    }
}

/// Integer-preserving for floor/ceil on integral input, Null on
/// non-numeric input.
fn numeric_fn(v: &Value, f: impl FnOnce(f64) -> f64) -> Result<Value, DBError> {
    match v {
        Value::Integer(_) | Value::BigInt(_) => Ok(v.clone()),
        Value::Double(d) => Ok(Value::Double(f(*d))),
        _ => Ok(Value::Null),
    }
}

/// Promote any numeric input to a double before applying.
fn double_fn(v: &Value, f: impl FnOnce(f64) -> f64) -> Result<Value, DBError> {
    if v.type_of().is_numeric() {
        Ok(Value::Double(f(v.as_double()?)))
    } else {
        Ok(Value::Null)
    }
}

impl ScalarFunc {
    pub fn package(self) -> &'static str {
        match self {
            ScalarFunc::Floor
            | ScalarFunc::Ceil
            | ScalarFunc::Abs
            | ScalarFunc::Sqrt
            | ScalarFunc::Acos
            | ScalarFunc::Asin
            | ScalarFunc::Atan
            | ScalarFunc::Atan2 => "math",
            _ => "",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarFunc::Lower => "lower",
            ScalarFunc::Upper => "upper",
            ScalarFunc::Trim => "trim",
            ScalarFunc::Ltrim => "ltrim",
            ScalarFunc::Rtrim => "rtrim",
            ScalarFunc::Len => "len",
            ScalarFunc::Coalesce => "coalesce",
            ScalarFunc::Typeof => "typeof",
            ScalarFunc::Now => "now",
            ScalarFunc::Random => "random",
            ScalarFunc::Floor => "floor",
            ScalarFunc::Ceil => "ceil",
            ScalarFunc::Abs => "abs",
            ScalarFunc::Sqrt => "sqrt",
            ScalarFunc::Acos => "acos",
            ScalarFunc::Asin => "asin",
            ScalarFunc::Atan => "atan",
            ScalarFunc::Atan2 => "atan2",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Scalar(s) => {
                let pkg = s.package();
                if pkg.is_empty() {
                    f.write_str(s.name())
                } else {
                    write!(f, "{pkg}.{}", s.name())
                }
            }
            Function::Aggregate(a) => f.write_str(a.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(f: ScalarFunc, args: &[Value]) -> Value {
        eval_scalar(f, args).unwrap()
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(
            run(ScalarFunc::Lower, &[Value::Text("AbC".into())]),
            Value::Text("abc".into())
        );
        assert_eq!(
            run(ScalarFunc::Trim, &[Value::Text("  x ".into())]),
            Value::Text("x".into())
        );
        assert_eq!(run(ScalarFunc::Upper, &[Value::Integer(1)]), Value::Null);
    }

    #[test]
    fn test_len() {
        assert_eq!(
            run(ScalarFunc::Len, &[Value::Text("héllo".into())]),
            Value::BigInt(5)
        );
        assert_eq!(
            run(ScalarFunc::Len, &[Value::Blob(vec![1, 2])]),
            Value::BigInt(2)
        );
    }

    #[test]
    fn test_coalesce() {
        assert_eq!(
            run(
                ScalarFunc::Coalesce,
                &[Value::Null, Value::Integer(2), Value::Integer(3)]
            ),
            Value::Integer(2)
        );
        assert_eq!(run(ScalarFunc::Coalesce, &[Value::Null]), Value::Null);
    }

    #[test]
    fn test_math() {
        assert_eq!(run(ScalarFunc::Floor, &[Value::Double(1.7)]), Value::Double(1.0));
        assert_eq!(run(ScalarFunc::Floor, &[Value::Integer(3)]), Value::Integer(3));
        assert_eq!(run(ScalarFunc::Abs, &[Value::Integer(-3)]), Value::Integer(3));
        assert_eq!(run(ScalarFunc::Sqrt, &[Value::Double(4.0)]), Value::Double(2.0));
    }

    #[test]
    fn test_typeof() {
        assert_eq!(
            run(ScalarFunc::Typeof, &[Value::Text("x".into())]),
            Value::Text("text".into())
        );
    }

    #[test]
    fn test_registry() {
        assert!(lookup("", "LOWER").is_some());
        assert!(lookup("", "random").is_some());
        assert!(lookup("math", "random").is_none());
        assert!(lookup("math", "floor").is_some());
        assert!(lookup("", "floor").is_none());
        assert!(call("", "lower", vec![]).is_err());
        assert!(call("", "coalesce", vec![Expr::Wildcard]).is_ok());
        assert!(call("", "nope", vec![]).is_err());
    }
}
