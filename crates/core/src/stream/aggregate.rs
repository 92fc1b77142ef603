//! Hash aggregation.
//!
//! `GroupBy` tags each row with its group key; `HashAggregate` consumes
//! the whole input, keeps one accumulator per aggregate call per group,
//! and emits one row per group. Groups are keyed by the encoded group
//! value, which also makes emission order deterministic. Without a
//! `GroupBy` below, the whole input forms a single group and zero input
//! rows still produce one output row.

use super::{Stream, YieldFn};
use crate::environment::Environment;
use crate::error::DBError;
use crate::expr::{Aggregator, FunctionCall};
use std::collections::BTreeMap;
use stratadb_types::{key, Row, Value};

/// Variable carrying the group key from `GroupBy` to `HashAggregate`.
pub(super) const GROUP_VAR: &str = "__group";

pub(super) fn hash_aggregate(
    stream: &Stream,
    idx: usize,
    calls: &[FunctionCall],
    env: &Environment<'_>,
    f: YieldFn<'_>,
) -> Result<(), DBError> {
    let group_expr = stream.group_expr_below(idx);
    let group_name = group_expr.map(|e| e.output_name());

    let mut groups: BTreeMap<Vec<u8>, (Value, Vec<Aggregator>)> = BTreeMap::new();

    stream.below(idx, env, &mut |e: &Environment<'_>| {
        let group_value = match e.get_var(GROUP_VAR) {
            Some(v) => v.clone(),
            None => Value::Null,
        };
        let group_key = key::encode(std::slice::from_ref(&group_value));
        if !groups.contains_key(&group_key) {
            let aggs = calls
                .iter()
                .map(Aggregator::new)
                .collect::<Result<Vec<_>, _>>()?;
            groups.insert(group_key.clone(), (group_value, aggs));
        }
        if let Some((_, aggs)) = groups.get_mut(&group_key) {
            for (agg, call) in aggs.iter_mut().zip(calls) {
                agg.aggregate(call, e)?;
            }
        }
        Ok(())
    })?;

    // A global aggregation over zero rows still emits one row.
    if groups.is_empty() && group_expr.is_none() {
        let aggs = calls
            .iter()
            .map(Aggregator::new)
            .collect::<Result<Vec<_>, _>>()?;
        groups.insert(Vec::new(), (Value::Null, aggs));
    }

    for (_, (group_value, aggs)) in &groups {
        let mut row = Row::new();
        if let Some(name) = &group_name {
            row.push(name.clone(), group_value.clone());
        }
        for (agg, call) in aggs.iter().zip(calls) {
            row.push(call.to_string(), agg.finish());
        }
        let mut out = Environment::child(env);
        out.set_row(row);
        f(&out)?;
    }
    Ok(())
}
