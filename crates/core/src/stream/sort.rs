//! External sort.
//!
//! The input is drained into a transient ordered store keyed by
//! `(sort value, table tag, row key, input counter)`. The counter keeps
//! the sort stable on full ties; the table tag and row key keep rows
//! from the same scan in key order within a tie. Replay is always
//! ascending: a descending sort inverts the sort-value bytes instead,
//! so the tie-breaking suffix preserves input order in both directions.
//! The store itself is released on scope exit whether or not the replay
//! finished.

use super::{Stream, YieldFn};
use crate::environment::Environment;
use crate::error::DBError;
use crate::expr::Expr;
use stratadb_types::{encoding, key};

pub(super) fn sort(
    stream: &Stream,
    idx: usize,
    expr: &Expr,
    desc: bool,
    env: &Environment<'_>,
    f: YieldFn<'_>,
) -> Result<(), DBError> {
    let tx = env
        .get_tx()
        .ok_or_else(|| DBError::invalid_argument("no transaction in scope"))?;
    let mut tmp = tx.transient_store()?;
    let mut counter: u64 = 0;

    stream.below(idx, env, &mut |e: &Environment<'_>| {
        let sort_value = expr.eval(e)?;
        let row = e
            .current_row()
            .ok_or_else(|| DBError::invalid_argument("sort with no row in scope"))?;

        let mut k = key::encode(std::slice::from_ref(&sort_value));
        if desc {
            // The value encoding is prefix-free, so complementing its
            // bytes reverses the value order without touching the
            // suffix ordering.
            for b in &mut k {
                *b = !*b;
            }
        }
        match row.source() {
            Some(src) => {
                push_chunk(&mut k, src.table.as_bytes());
                push_chunk(&mut k, &src.key);
            }
            None => {
                push_chunk(&mut k, &[]);
                push_chunk(&mut k, &[]);
            }
        }
        k.extend_from_slice(&counter.to_be_bytes());
        counter += 1;

        let mut buf = Vec::new();
        encoding::encode_row(row, &mut buf);
        tmp.put(k, buf);
        Ok(())
    })?;

    for (_, raw) in tmp.iter(false) {
        let row = encoding::decode_row(raw)?;
        let mut out = Environment::child(env);
        out.set_row(row);
        f(&out)?;
    }
    Ok(())
}

fn push_chunk(buf: &mut Vec<u8>, chunk: &[u8]) {
    buf.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
    buf.extend_from_slice(chunk);
}
