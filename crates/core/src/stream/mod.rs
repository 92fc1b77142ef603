//! The streaming operator pipeline.
//!
//! A [`Stream`] is a chain of operators driven source-to-sink: each
//! operator pulls from the one before it and pushes rows into the yield
//! callback. Early termination is signalled by the `StreamClosed`
//! sentinel, raised by `Take` and swallowed by [`Stream::execute`];
//! every other error propagates unchanged.

mod aggregate;
mod scan;
mod sort;

use crate::environment::Environment;
use crate::error::DBError;
use crate::expr::compare::filter_matches;
use crate::expr::{Expr, FunctionCall};
use crate::table::ScanRange;
use itertools::Itertools;
use std::fmt;
use stratadb_types::{Row, Value};

/// The yield callback rows are pushed into.
pub type YieldFn<'f> = &'f mut dyn for<'e> FnMut(&Environment<'e>) -> Result<(), DBError>;

#[derive(Debug, Clone)]
pub enum Operator {
    /// Source: iterate a table's store in key order.
    SeqScan {
        table: String,
        range: Option<ScanRange>,
        reverse: bool,
    },
    /// Source: drive row lookups through an index, bounds on the
    /// indexed values.
    IndexScan {
        index: String,
        min: Option<Vec<Value>>,
        max: Option<Vec<Value>>,
        reverse: bool,
    },
    /// Source: one row per row-constructor expression.
    Emit(Vec<Expr>),
    Filter(Expr),
    Project(Vec<Expr>),
    /// Yield the first `n` rows, then close the stream.
    Take(Expr),
    /// Drop the first `n` rows.
    Skip(Expr),
    /// External sort through a transient store.
    TempTreeSort { expr: Expr, desc: bool },
    /// Tags each row with its group key; consumed by `HashAggregate`.
    GroupBy(Expr),
    /// One output row per group, one column per aggregate call.
    HashAggregate(Vec<FunctionCall>),
    /// Source: each child stream in order.
    Concat(Vec<Stream>),
}

impl Operator {
    pub fn seq_scan(table: impl Into<String>) -> Operator {
        Operator::SeqScan {
            table: table.into(),
            range: None,
            reverse: false,
        }
    }

    pub fn seq_scan_reverse(table: impl Into<String>) -> Operator {
        Operator::SeqScan {
            table: table.into(),
            range: None,
            reverse: true,
        }
    }

    pub fn sort(expr: Expr) -> Operator {
        Operator::TempTreeSort { expr, desc: false }
    }

    pub fn sort_desc(expr: Expr) -> Operator {
        Operator::TempTreeSort { expr, desc: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
    ops: Vec<Operator>,
}

impl Stream {
    pub fn new(source: Operator) -> Stream {
        Stream { ops: vec![source] }
    }

    /// Append an operator at the sink end.
    pub fn pipe(mut self, op: Operator) -> Stream {
        self.ops.push(op);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drive the pipeline. `StreamClosed` raised inside propagates to
    /// the caller; use [`Stream::execute`] to swallow it.
    pub fn iterate(&self, env: &Environment<'_>, f: YieldFn<'_>) -> Result<(), DBError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        self.run(self.ops.len() - 1, env, f)
    }

    /// Drive the pipeline to completion, treating `StreamClosed` as
    /// normal termination.
    pub fn execute(&self, env: &Environment<'_>, f: YieldFn<'_>) -> Result<(), DBError> {
        match self.iterate(env, f) {
            Err(e) if e.is_stream_closed() => Ok(()),
            other => other,
        }
    }

    /// Run the operator at `idx`, pulling its input from `idx - 1`.
    fn run(&self, idx: usize, env: &Environment<'_>, f: YieldFn<'_>) -> Result<(), DBError> {
        match &self.ops[idx] {
            Operator::SeqScan { table, range, reverse } => {
                scan::seq_scan(table, range.as_ref(), *reverse, env, f)
            }
            Operator::IndexScan {
                index,
                min,
                max,
                reverse,
            } => scan::index_scan(index, min.as_deref(), max.as_deref(), *reverse, env, f),
            Operator::Emit(exprs) => {
                for e in exprs {
                    let row = e.eval_row(env)?;
                    let mut out = Environment::child(env);
                    out.set_row(row);
                    f(&out)?;
                }
                Ok(())
            }
            Operator::Filter(predicate) => self.below(idx, env, &mut |e: &Environment<'_>| {
                let v = predicate.eval(e)?;
                if filter_matches(&v) {
                    f(e)
                } else {
                    Ok(())
                }
            }),
            Operator::Project(exprs) => self.below(idx, env, &mut |e: &Environment<'_>| {
                let row = project_row(exprs, e)?;
                let mut out = Environment::child(e);
                out.set_row(row);
                f(&out)
            }),
            Operator::Take(n) => {
                let n = eval_count(n, env)?;
                let mut yielded: i64 = 0;
                self.below(idx, env, &mut |e: &Environment<'_>| {
                    if yielded >= n {
                        return Err(DBError::StreamClosed);
                    }
                    yielded += 1;
                    f(e)?;
                    if yielded >= n {
                        return Err(DBError::StreamClosed);
                    }
                    Ok(())
                })
            }
            Operator::Skip(n) => {
                let n = eval_count(n, env)?;
                let mut skipped: i64 = 0;
                self.below(idx, env, &mut |e: &Environment<'_>| {
                    if skipped < n {
                        skipped += 1;
                        return Ok(());
                    }
                    f(e)
                })
            }
            Operator::TempTreeSort { expr, desc } => sort::sort(self, idx, expr, *desc, env, f),
            Operator::GroupBy(key_expr) => self.below(idx, env, &mut |e: &Environment<'_>| {
                let key = key_expr.eval(e)?;
                let mut out = Environment::child(e);
                out.set_var(aggregate::GROUP_VAR, key);
                f(&out)
            }),
            Operator::HashAggregate(calls) => aggregate::hash_aggregate(self, idx, calls, env, f),
            Operator::Concat(streams) => {
                for s in streams {
                    s.iterate(env, &mut *f)?;
                }
                Ok(())
            }
        }
    }

    /// Pull from the operator below `idx`. The first operator of a
    /// pipeline without a source runs once against the input
    /// environment, which is how expression-only pipelines work.
    fn below(&self, idx: usize, env: &Environment<'_>, f: YieldFn<'_>) -> Result<(), DBError> {
        if idx == 0 {
            f(env)
        } else {
            self.run(idx - 1, env, f)
        }
    }

    /// The expression the pipeline groups by, if any.
    pub(crate) fn group_expr_below(&self, idx: usize) -> Option<&Expr> {
        self.ops[..idx].iter().rev().find_map(|op| match op {
            Operator::GroupBy(e) => Some(e),
            _ => None,
        })
    }
}

/// Build the projected row: wildcards expand the incoming row in order,
/// every other expression contributes one column named by its alias or
/// its rendered form.
fn project_row(exprs: &[Expr], env: &Environment<'_>) -> Result<Row, DBError> {
    let mut out = Row::new();
    for e in exprs {
        match strip_named(e) {
            Expr::Wildcard => {
                let row = env.current_row().ok_or_else(|| {
                    DBError::invalid_argument("`*` with no row in scope")
                })?;
                for (name, value) in row.iter() {
                    out.push(name.to_owned(), value.clone());
                }
            }
            _ => {
                let v = e.eval(env)?;
                out.push(e.output_name(), v);
            }
        }
    }
    Ok(out)
}

fn strip_named(e: &Expr) -> &Expr {
    match e {
        Expr::Named { expr, .. } => strip_named(expr),
        Expr::Parens(inner) => strip_named(inner),
        other => other,
    }
}

/// Evaluate a Take/Skip count once against the input environment: a
/// non-negative integer.
fn eval_count(e: &Expr, env: &Environment<'_>) -> Result<i64, DBError> {
    let v = e.eval(env)?;
    let n = match v {
        Value::Integer(_) | Value::BigInt(_) => v.as_bigint()?,
        other => {
            return Err(DBError::invalid_argument(format!(
                "expected an integer count, got {other}"
            )))
        }
    };
    if n < 0 {
        return Err(DBError::invalid_argument(format!("negative count {n}")));
    }
    Ok(n)
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::SeqScan { table, reverse, .. } => {
                write!(f, "scan({table}{})", if *reverse { ", reverse" } else { "" })
            }
            Operator::IndexScan { index, reverse, .. } => {
                write!(f, "indexScan({index}{})", if *reverse { ", reverse" } else { "" })
            }
            Operator::Emit(exprs) => write!(f, "emit({})", exprs.iter().join(", ")),
            Operator::Filter(e) => write!(f, "filter({e})"),
            Operator::Project(exprs) => write!(f, "project({})", exprs.iter().join(", ")),
            Operator::Take(e) => write!(f, "take({e})"),
            Operator::Skip(e) => write!(f, "skip({e})"),
            Operator::TempTreeSort { expr, desc } => {
                write!(f, "tempTreeSort({expr}{})", if *desc { ", desc" } else { "" })
            }
            Operator::GroupBy(e) => write!(f, "groupBy({e})"),
            Operator::HashAggregate(calls) => {
                write!(f, "hashAggregate({})", calls.iter().join(", "))
            }
            Operator::Concat(streams) => {
                write!(f, "concat({})", streams.iter().join("; "))
            }
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ops.iter().join(" | "))
    }
}
