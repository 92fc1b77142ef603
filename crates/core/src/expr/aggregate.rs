//! Aggregate functions and their accumulators.
//!
//! Each aggregate call in a query gets one [`Aggregator`] per group,
//! driven row by row by the aggregation operator and read back out with
//! [`Aggregator::finish`].

use super::{Expr, FunctionCall};
use crate::environment::Environment;
use crate::error::DBError;
use std::cmp::Ordering;
use stratadb_types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregateFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
        }
    }
}

/// SUM keeps integer arithmetic until a double shows up, then promotes.
/// Integer overflow also promotes rather than failing the statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SumState {
    Empty,
    Int(i64),
    Double(f64),
}

#[derive(Debug, Clone)]
pub enum Aggregator {
    Count { wildcard: bool, n: i64 },
    Min { cur: Option<Value> },
    Max { cur: Option<Value> },
    Sum { state: SumState },
    Avg { sum: f64, n: i64 },
}

impl Aggregator {
    /// Build the accumulator for one aggregate call site.
    pub fn new(call: &FunctionCall) -> Result<Aggregator, DBError> {
        let func = match call.func {
            super::Function::Aggregate(f) => f,
            super::Function::Scalar(_) => {
                return Err(DBError::invalid_argument(format!(
                    "`{call}` is not an aggregate"
                )))
            }
        };
        Ok(match func {
            AggregateFunc::Count => Aggregator::Count {
                wildcard: matches!(call.args.first(), Some(Expr::Wildcard)),
                n: 0,
            },
            AggregateFunc::Min => Aggregator::Min { cur: None },
            AggregateFunc::Max => Aggregator::Max { cur: None },
            AggregateFunc::Sum => Aggregator::Sum { state: SumState::Empty },
            AggregateFunc::Avg => Aggregator::Avg { sum: 0.0, n: 0 },
        })
    }

    /// Fold the current row in.
    pub fn aggregate(&mut self, call: &FunctionCall, env: &Environment<'_>) -> Result<(), DBError> {
        match self {
            Aggregator::Count { wildcard: true, n } => {
                *n += 1;
                return Ok(());
            }
            _ => {}
        }
        let arg = call
            .args
            .first()
            .ok_or_else(|| DBError::invalid_argument(format!("`{call}` needs an argument")))?;
        let v = arg.eval(env)?;
        match self {
            Aggregator::Count { n, .. } => {
                if !v.is_null() {
                    *n += 1;
                }
            }
            Aggregator::Min { cur } => {
                if !v.is_null() {
                    let better = match cur {
                        Some(m) => v.total_cmp(m) == Ordering::Less,
                        None => true,
                    };
                    if better {
                        *cur = Some(v);
                    }
                }
            }
            Aggregator::Max { cur } => {
                if !v.is_null() {
                    let better = match cur {
                        Some(m) => v.total_cmp(m) == Ordering::Greater,
                        None => true,
                    };
                    if better {
                        *cur = Some(v);
                    }
                }
            }
            Aggregator::Sum { state } => {
                if v.type_of().is_numeric() {
                    *state = match (*state, &v) {
                        (SumState::Empty, Value::Double(d)) => SumState::Double(*d),
                        (SumState::Empty, _) => SumState::Int(v.as_bigint()?),
                        (SumState::Int(acc), Value::Double(d)) => SumState::Double(acc as f64 + d),
                        (SumState::Int(acc), _) => match acc.checked_add(v.as_bigint()?) {
                            Some(sum) => SumState::Int(sum),
                            None => SumState::Double(acc as f64 + v.as_double()?),
                        },
                        (SumState::Double(acc), _) => SumState::Double(acc + v.as_double()?),
                    };
                }
            }
            Aggregator::Avg { sum, n } => {
                if v.type_of().is_numeric() {
                    *sum += v.as_double()?;
                    *n += 1;
                }
            }
            Aggregator::Count { .. } => unreachable!(),
        }
        Ok(())
    }

    /// The aggregate's value for the group.
    pub fn finish(&self) -> Value {
        match self {
            Aggregator::Count { n, .. } => Value::BigInt(*n),
            Aggregator::Min { cur } | Aggregator::Max { cur } => {
                cur.clone().unwrap_or(Value::Null)
            }
            Aggregator::Sum { state } => match state {
                SumState::Empty => Value::Null,
                SumState::Int(i) => Value::BigInt(*i),
                SumState::Double(d) => Value::Double(*d),
            },
            Aggregator::Avg { sum, n } => {
                if *n == 0 {
                    Value::Double(0.0)
                } else {
                    Value::Double(sum / *n as f64)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Function;

    fn call(func: AggregateFunc, arg: Expr) -> FunctionCall {
        FunctionCall {
            func: Function::Aggregate(func),
            args: vec![arg],
        }
    }

    fn feed(func: AggregateFunc, arg: Expr, values: &[Value]) -> Value {
        let c = call(func, arg);
        let mut agg = Aggregator::new(&c).unwrap();
        for v in values {
            let mut env = Environment::new();
            env.set_row([("a", v.clone())].into_iter().collect());
            agg.aggregate(&c, &env).unwrap();
        }
        agg.finish()
    }

    fn col() -> Expr {
        Expr::column("a")
    }

    #[test]
    fn test_count() {
        let vals = [Value::Integer(1), Value::Null, Value::Integer(3)];
        assert_eq!(feed(AggregateFunc::Count, Expr::Wildcard, &vals), Value::BigInt(3));
        assert_eq!(feed(AggregateFunc::Count, col(), &vals), Value::BigInt(2));
        assert_eq!(feed(AggregateFunc::Count, col(), &[]), Value::BigInt(0));
    }

    #[test]
    fn test_min_max_ignore_null_and_use_type_order() {
        let vals = [
            Value::Text("z".into()),
            Value::Null,
            Value::Integer(100),
            Value::Text("a".into()),
        ];
        // numerics order below text
        assert_eq!(feed(AggregateFunc::Min, col(), &vals), Value::Integer(100));
        assert_eq!(feed(AggregateFunc::Max, col(), &vals), Value::Text("z".into()));
        assert_eq!(feed(AggregateFunc::Min, col(), &[Value::Null]), Value::Null);
    }

    #[test]
    fn test_sum_stays_integer_until_double() {
        let ints = [Value::Integer(1), Value::BigInt(2)];
        assert_eq!(feed(AggregateFunc::Sum, col(), &ints), Value::BigInt(3));
        let mixed = [Value::Integer(1), Value::Double(0.5)];
        assert_eq!(feed(AggregateFunc::Sum, col(), &mixed), Value::Double(1.5));
        assert_eq!(feed(AggregateFunc::Sum, col(), &[]), Value::Null);
        // overflow promotes
        let big = [Value::BigInt(i64::MAX), Value::BigInt(1)];
        assert_eq!(
            feed(AggregateFunc::Sum, col(), &big),
            Value::Double(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn test_avg() {
        let vals = [Value::Integer(1), Value::Integer(2)];
        assert_eq!(feed(AggregateFunc::Avg, col(), &vals), Value::Double(1.5));
        assert_eq!(feed(AggregateFunc::Avg, col(), &[]), Value::Double(0.0));
    }
}
