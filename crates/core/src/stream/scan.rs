//! Source operators reading from table and index stores.

use super::YieldFn;
use crate::environment::Environment;
use crate::error::DBError;
use crate::index::Index;
use crate::table::ScanRange;
use stratadb_types::Value;

pub(super) fn seq_scan(
    table: &str,
    range: Option<&ScanRange>,
    reverse: bool,
    env: &Environment<'_>,
    f: YieldFn<'_>,
) -> Result<(), DBError> {
    let tx = env
        .get_tx()
        .ok_or_else(|| DBError::invalid_argument("no transaction in scope"))?;
    let table = tx.table(table)?;
    table.scan(range, reverse, &mut |_, row| {
        let mut out = Environment::child(env);
        out.set_row(row);
        f(&out)
    })
}

pub(super) fn index_scan(
    index: &str,
    min: Option<&[Value]>,
    max: Option<&[Value]>,
    reverse: bool,
    env: &Environment<'_>,
    f: YieldFn<'_>,
) -> Result<(), DBError> {
    let tx = env
        .get_tx()
        .ok_or_else(|| DBError::invalid_argument("no transaction in scope"))?;
    let info = tx.get_index(index)?;
    let table = tx.table(&info.table)?;
    let idx = Index::new(tx, info);
    idx.iterate(min, max, reverse, &mut |row_key| {
        let row = table.get(row_key)?;
        let mut out = Environment::child(env);
        out.set_row(row);
        f(&out)
    })
}
