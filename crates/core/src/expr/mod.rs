//! The expression tree and its evaluator.
//!
//! Expressions are a flat tagged enum evaluated against an
//! [`Environment`]. Three-valued logic is preserved everywhere except
//! the filter boundary, which is the stream layer's concern.

pub mod aggregate;
pub mod compare;
pub mod functions;
pub mod like;

use crate::environment::Environment;
use crate::error::{DBError, StorageError};
use stratadb_types::arith::{self, ArithOp};
use stratadb_types::{Row, Value, ValueType};

pub use aggregate::{AggregateFunc, Aggregator};
pub use functions::{Function, ScalarFunc};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Concat,
    Like,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// 1-based `?` placeholder.
    Positional(usize),
    /// `$name` placeholder.
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub func: Function,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Parens(Box<Expr>),
    Named { expr: Box<Expr>, alias: String },
    Wildcard,
    List(Vec<Expr>),
    /// A row constructor, as produced by `VALUES (..)`.
    RowExpr(Vec<(String, Expr)>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Between { expr: Box<Expr>, low: Box<Expr>, high: Box<Expr> },
    Cast { expr: Box<Expr>, to: ValueType },
    Call(FunctionCall),
    Parameter(Param),
    NextValueFor(String),
}

impl Expr {
    pub fn literal(v: Value) -> Expr {
        Expr::Literal(v)
    }

    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn alias(self, alias: impl Into<String>) -> Expr {
        Expr::Named {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Evaluate against an environment.
    pub fn eval(&self, env: &Environment<'_>) -> Result<Value, DBError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(name) => {
                let row = env
                    .current_row()
                    .ok_or_else(|| DBError::invalid_argument(format!("no row to resolve `{name}`")))?;
                Ok(row.get(name)?.clone())
            }
            Expr::Parens(e) => e.eval(env),
            Expr::Named { expr, .. } => expr.eval(env),
            Expr::Wildcard => Err(DBError::invalid_argument("`*` is only valid in a projection")),
            Expr::List(_) => Err(DBError::invalid_argument(
                "an expression list is only valid on the right side of IN",
            )),
            Expr::RowExpr(_) => Err(DBError::invalid_argument(
                "a row constructor is only valid in VALUES",
            )),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, env),
            Expr::Not(e) => {
                let v = e.eval(env)?;
                Ok(match bool3(&v) {
                    None => Value::Null,
                    Some(b) => Value::Boolean(!b),
                })
            }
            Expr::Neg(e) => {
                let v = e.eval(env)?;
                Ok(arith::neg(&v)?)
            }
            Expr::Between { expr, low, high } => {
                let x = expr.eval(env)?;
                let a = low.eval(env)?;
                let b = high.eval(env)?;
                Ok(compare::between(&x, &a, &b))
            }
            Expr::Cast { expr, to } => {
                let v = expr.eval(env)?;
                Ok(v.cast_as(*to)?)
            }
            Expr::Call(call) => call.eval(env),
            Expr::Parameter(p) => match p {
                Param::Positional(i) => env
                    .get_param_by_index(*i)
                    .cloned()
                    .ok_or_else(|| DBError::ParameterNotFound(format!("?{i}"))),
                Param::Named(name) => env
                    .get_param_by_name(name)
                    .cloned()
                    .ok_or_else(|| DBError::ParameterNotFound(format!("${name}"))),
            },
            Expr::NextValueFor(name) => {
                let tx = env
                    .get_tx()
                    .ok_or_else(|| DBError::invalid_argument("no transaction in scope"))?;
                if !tx.writable() {
                    return Err(StorageError::ReadOnly.into());
                }
                Ok(Value::BigInt(tx.next_value(name)?))
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        env: &Environment<'_>,
    ) -> Result<Value, DBError> {
        match op {
            BinaryOp::Add => Ok(arith::apply(ArithOp::Add, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::Sub => Ok(arith::apply(ArithOp::Sub, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::Mul => Ok(arith::apply(ArithOp::Mul, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::Div => Ok(arith::apply(ArithOp::Div, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::Rem => Ok(arith::apply(ArithOp::Rem, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::BitAnd => Ok(arith::apply(ArithOp::BitAnd, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::BitOr => Ok(arith::apply(ArithOp::BitOr, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::BitXor => Ok(arith::apply(ArithOp::BitXor, &lhs.eval(env)?, &rhs.eval(env)?)?),
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                Ok(compare::cmp(op, &lhs.eval(env)?, &rhs.eval(env)?))
            }
            BinaryOp::And => {
                // Short-circuit: false AND x is false without touching x.
                match bool3(&lhs.eval(env)?) {
                    Some(false) => Ok(Value::Boolean(false)),
                    l => Ok(match (l, bool3(&rhs.eval(env)?)) {
                        (_, Some(false)) => Value::Boolean(false),
                        (Some(true), Some(true)) => Value::Boolean(true),
                        _ => Value::Null,
                    }),
                }
            }
            BinaryOp::Or => match bool3(&lhs.eval(env)?) {
                Some(true) => Ok(Value::Boolean(true)),
                l => Ok(match (l, bool3(&rhs.eval(env)?)) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                }),
            },
            BinaryOp::Concat => Ok(arith::concat(&lhs.eval(env)?, &rhs.eval(env)?)),
            BinaryOp::Like => {
                let v = lhs.eval(env)?;
                let p = rhs.eval(env)?;
                Ok(like::eval(&v, &p))
            }
            BinaryOp::In | BinaryOp::NotIn => {
                let x = lhs.eval(env)?;
                let r = compare::in_list(&x, rhs, env)?;
                Ok(if op == BinaryOp::NotIn {
                    match bool3(&r) {
                        None => Value::Null,
                        Some(b) => Value::Boolean(!b),
                    }
                } else {
                    r
                })
            }
            BinaryOp::Is => Ok(compare::is_op(&lhs.eval(env)?, &rhs.eval(env)?, false)),
            BinaryOp::IsNot => Ok(compare::is_op(&lhs.eval(env)?, &rhs.eval(env)?, true)),
        }
    }

    /// Evaluate a row constructor into a row.
    pub fn eval_row(&self, env: &Environment<'_>) -> Result<Row, DBError> {
        match self {
            Expr::RowExpr(pairs) => {
                let mut row = Row::new();
                for (name, e) in pairs {
                    row.push(name.clone(), e.eval(env)?);
                }
                Ok(row)
            }
            Expr::Parens(e) | Expr::Named { expr: e, .. } => e.eval_row(env),
            _ => Err(DBError::invalid_argument(format!(
                "expected a row constructor, got `{self}`"
            ))),
        }
    }

    /// The column name this expression produces in a projection.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Named { alias, .. } => alias.clone(),
            Expr::Column(name) => name.clone(),
            other => other.to_string(),
        }
    }

    /// Pre-order structural walk. The visitor returns `false` to stop;
    /// `walk` reports whether the walk ran to completion.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr) -> bool) -> bool {
        if !visit(self) {
            return false;
        }
        match self {
            Expr::Literal(_)
            | Expr::Column(_)
            | Expr::Wildcard
            | Expr::Parameter(_)
            | Expr::NextValueFor(_) => true,
            Expr::Parens(e) | Expr::Named { expr: e, .. } | Expr::Not(e) | Expr::Neg(e) => {
                e.walk(visit)
            }
            Expr::Cast { expr, .. } => expr.walk(visit),
            Expr::List(items) => items.iter().all(|e| e.walk(visit)),
            Expr::RowExpr(pairs) => pairs.iter().all(|(_, e)| e.walk(visit)),
            Expr::Binary { lhs, rhs, .. } => lhs.walk(visit) && rhs.walk(visit),
            Expr::Between { expr, low, high } => {
                expr.walk(visit) && low.walk(visit) && high.walk(visit)
            }
            Expr::Call(call) => call.args.iter().all(|e| e.walk(visit)),
        }
    }

    /// True when the tree contains an aggregate function call.
    pub fn has_aggregate(&self) -> bool {
        !self.walk(&mut |e| {
            !matches!(
                e,
                Expr::Call(FunctionCall {
                    func: Function::Aggregate(_),
                    ..
                })
            )
        })
    }
}

impl FunctionCall {
    fn eval(&self, env: &Environment<'_>) -> Result<Value, DBError> {
        match &self.func {
            Function::Scalar(f) => {
                let mut args = Vec::with_capacity(self.args.len());
                for a in &self.args {
                    args.push(a.eval(env)?);
                }
                functions::eval_scalar(*f, &args)
            }
            // An aggregate evaluated as a plain expression reads the
            // column the aggregation operator emitted under its name.
            Function::Aggregate(_) => {
                let name = self.to_string();
                let row = env
                    .current_row()
                    .ok_or_else(|| DBError::invalid_argument(format!("no row to resolve `{name}`")))?;
                Ok(row.get(&name)?.clone())
            }
        }
    }
}

/// Three-valued truthiness: Null is unknown, everything else coerces.
pub(crate) fn bool3(v: &Value) -> Option<bool> {
    if v.is_null() {
        None
    } else {
        Some(v.is_truthy())
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "||",
            BinaryOp::Like => "LIKE",
            BinaryOp::In => "IN",
            BinaryOp::NotIn => "NOT IN",
            BinaryOp::Is => "IS",
            BinaryOp::IsNot => "IS NOT",
        };
        f.write_str(s)
    }
}

/// SQL-ish rendering, used for diagnostics and for naming projected
/// columns.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Column(name) => f.write_str(name),
            Expr::Parens(e) => write!(f, "({e})"),
            Expr::Named { expr, alias } => write!(f, "{expr} AS {alias}"),
            Expr::Wildcard => f.write_str("*"),
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Expr::RowExpr(pairs) => {
                write!(f, "(")?;
                for (i, (name, e)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {e}")?;
                }
                write!(f, ")")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::Neg(e) => write!(f, "-{e}"),
            Expr::Between { expr, low, high } => write!(f, "{expr} BETWEEN {low} AND {high}"),
            Expr::Cast { expr, to } => write!(f, "CAST({expr} AS {to})"),
            Expr::Call(call) => write!(f, "{call}"),
            Expr::Parameter(Param::Positional(_)) => f.write_str("?"),
            Expr::Parameter(Param::Named(name)) => write!(f, "${name}"),
            Expr::NextValueFor(name) => write!(f, "NEXT VALUE FOR {name}"),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}
