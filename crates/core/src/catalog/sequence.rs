//! Runtime sequence state.
//!
//! Values handed out during a transaction are leases over the persisted
//! current value; the lease is written back to the sequence store at
//! commit and simply forgotten on rollback.

use super::entity::SequenceInfo;
use crate::error::{CatalogError, DBError};
use stratadb_types::{Row, Value};

/// Compute the value following `current` under the sequence's bounds.
///
/// `current` of `None` means the sequence has never fired and yields
/// `start`. Exceeding a bound wraps when `cycle` is set and fails with
/// `SequenceExhausted` otherwise.
pub(crate) fn next_value(info: &SequenceInfo, current: Option<i64>) -> Result<i64, DBError> {
    let current = match current {
        None => return Ok(info.start),
        Some(c) => c,
    };
    let next = current.checked_add(info.increment);
    let out_of_bounds = match next {
        None => true,
        Some(n) => n > info.max || n < info.min,
    };
    if !out_of_bounds {
        return Ok(next.unwrap_or(info.start));
    }
    if !info.cycle {
        return Err(CatalogError::SequenceExhausted(info.name.clone()).into());
    }
    // Wrap to the far bound, the way `CYCLE` restarts.
    Ok(if info.increment > 0 { info.min } else { info.max })
}

/// The row persisted in the sequence store: `{name, value}`.
pub(crate) fn state_row(name: &str, value: i64) -> Row {
    let mut row = Row::new();
    row.push("name", Value::Text(name.to_owned()));
    row.push("value", Value::BigInt(value));
    row
}

pub(crate) fn state_from_row(row: &Row) -> Result<i64, DBError> {
    Ok(row.get("value")?.as_bigint()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(start: i64, increment: i64, min: i64, max: i64, cycle: bool) -> SequenceInfo {
        SequenceInfo {
            name: "s".into(),
            start,
            increment,
            min,
            max,
            cache: 1,
            cycle,
            owner: None,
        }
    }

    #[test]
    fn test_first_value_is_start() {
        assert_eq!(next_value(&seq(5, 1, 1, 10, false), None).unwrap(), 5);
    }

    #[test]
    fn test_increments() {
        let s = seq(1, 3, 1, 10, false);
        assert_eq!(next_value(&s, Some(1)).unwrap(), 4);
        assert_eq!(next_value(&s, Some(4)).unwrap(), 7);
    }

    #[test]
    fn test_exhaustion() {
        let s = seq(1, 3, 1, 10, false);
        assert!(next_value(&s, Some(9)).is_err());
    }

    #[test]
    fn test_cycle_wraps() {
        let s = seq(1, 3, 1, 10, true);
        assert_eq!(next_value(&s, Some(9)).unwrap(), 1);
        let s = seq(-1, -3, -10, -1, true);
        assert_eq!(next_value(&s, Some(-9)).unwrap(), -1);
    }

    #[test]
    fn test_descending() {
        let s = seq(-1, -1, -10, -1, false);
        assert_eq!(next_value(&s, None).unwrap(), -1);
        assert_eq!(next_value(&s, Some(-1)).unwrap(), -2);
        assert!(next_value(&s, Some(-10)).is_err());
    }

    #[test]
    fn test_state_row_roundtrip() {
        let row = state_row("s", 42);
        assert_eq!(state_from_row(&row).unwrap(), 42);
    }
}
