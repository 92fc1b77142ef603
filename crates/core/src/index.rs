//! Secondary indexes.
//!
//! An index store maps encoded key-path values to the owning row's key.
//! Unique indexes store the encoded values alone and reject duplicates;
//! non-unique indexes append the row key so entries stay distinct. An
//! entry with a Null component never participates in uniqueness, so
//! multiple Null rows are allowed under a unique index.

use crate::catalog::IndexInfo;
use crate::error::{ConstraintViolation, DBError};
use crate::storage::{IterOptions, Store, Transaction};
use std::sync::Arc;
use stratadb_types::{key, Value};

pub struct Index<'tx> {
    tx: &'tx Transaction,
    info: Arc<IndexInfo>,
}

impl<'tx> Index<'tx> {
    pub fn new(tx: &'tx Transaction, info: Arc<IndexInfo>) -> Index<'tx> {
        Index { tx, info }
    }

    pub fn info(&self) -> &Arc<IndexInfo> {
        &self.info
    }

    fn store(&self) -> Result<Store<'tx>, DBError> {
        self.tx.get_store(&self.info.store_name)
    }

    /// Add an entry for a row.
    pub fn set(&self, values: &[Value], row_key: &[u8]) -> Result<(), DBError> {
        let store = self.store()?;
        if self.info.unique && values.iter().all(|v| !v.is_null()) {
            let k = key::encode(values);
            match store.get(&k) {
                Ok(existing) => {
                    if existing != row_key {
                        return Err(ConstraintViolation::Unique(self.info.name.clone()).into());
                    }
                    Ok(())
                }
                Err(e) if e.is_key_not_found() => store.put(&k, row_key),
                Err(e) => Err(e),
            }
        } else {
            let mut k = key::encode(values);
            k.extend_from_slice(row_key);
            store.put(&k, row_key)
        }
    }

    /// Remove a row's entry. Entries that are already gone are not an
    /// error.
    pub fn delete(&self, values: &[Value], row_key: &[u8]) -> Result<(), DBError> {
        let store = self.store()?;
        let k = if self.info.unique && values.iter().all(|v| !v.is_null()) {
            key::encode(values)
        } else {
            let mut k = key::encode(values);
            k.extend_from_slice(row_key);
            k
        };
        match store.delete(&k) {
            Ok(()) => Ok(()),
            Err(e) if e.is_key_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Visit row keys in index order, optionally bounded by inclusive
    /// value tuples.
    pub fn iterate(
        &self,
        min: Option<&[Value]>,
        max: Option<&[Value]>,
        reverse: bool,
        f: &mut dyn FnMut(&[u8]) -> Result<(), DBError>,
    ) -> Result<(), DBError> {
        let store = self.store()?;
        let lower = min.map(key::encode);
        let upper = max.map(key::encode).map(prefix_successor);

        let mut it = store.iterator(IterOptions { reverse })?;
        if reverse {
            // The exclusive upper bound needs a seek just below it.
            match &upper {
                Some(u) => {
                    it.seek(Some(u));
                    if it.key() == Some(u.as_slice()) {
                        it.next();
                    }
                }
                None => it.seek(None),
            }
        } else {
            it.seek(lower.as_deref());
        }

        while let Some((k, v)) = it.entry() {
            let in_range = if reverse {
                lower.as_deref().map_or(true, |l| k >= l)
            } else {
                upper.as_deref().map_or(true, |u| k < u)
            };
            if !in_range {
                break;
            }
            f(v)?;
            it.next();
        }
        it.err()
    }

    /// Rebuild from a full scan of the owning table.
    pub fn rebuild(&self) -> Result<(), DBError> {
        self.store()?.truncate()?;
        let table = self.tx.table(&self.info.table)?;
        let paths = self.info.paths.clone();
        table.scan(None, false, &mut |row_key, row| {
            let values: Vec<Value> = paths
                .iter()
                .map(|p| row.get(&p.column).cloned().unwrap_or(Value::Null))
                .collect();
            self.set(&values, row_key)
        })
    }

    pub fn truncate(&self) -> Result<(), DBError> {
        self.store()?.truncate()
    }
}

/// Smallest byte string strictly greater than every string prefixed by
/// `prefix`. Used as an exclusive upper bound for inclusive value
/// ranges.
fn prefix_successor(mut prefix: Vec<u8>) -> Vec<u8> {
    while let Some(&last) = prefix.last() {
        if last == 0xff {
            prefix.pop();
            continue;
        }
        let i = prefix.len() - 1;
        prefix[i] = last + 1;
        return prefix;
    }
    // All 0xff; encoded tuples never reach this, tag bytes are small.
    vec![0xff; 32]
}
