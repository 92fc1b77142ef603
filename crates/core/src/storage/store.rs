//! Stores and their cursors.
//!
//! A [`Store`] is a named ordered byte-keyed namespace borrowed from a
//! transaction. Reads merge the transaction's write overlay over the
//! begin snapshot; iteration runs the same merge lazily in either
//! direction.

use super::transaction::Transaction;
use super::StoreData;
use crate::error::{DBError, StorageError};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct IterOptions {
    pub reverse: bool,
}

pub struct Store<'tx> {
    tx: &'tx Transaction,
    name: String,
}

impl<'tx> Store<'tx> {
    pub(crate) fn new(tx: &'tx Transaction, name: &str) -> Store<'tx> {
        Store {
            tx,
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a key-value pair. Empty keys and values are rejected.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DBError> {
        if key.is_empty() {
            return Err(DBError::invalid_argument("empty key"));
        }
        if value.is_empty() {
            return Err(DBError::invalid_argument("empty value"));
        }
        self.tx.require_writable()?;
        let mut inner = self.tx.inner.lock();
        self.tx.check_active_locked(&mut inner)?;
        self.exists_locked(&inner)?;
        let ov = inner.stores.entry(self.name.clone()).or_default();
        ov.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, DBError> {
        let mut inner = self.tx.inner.lock();
        self.tx.check_active_locked(&mut inner)?;
        self.exists_locked(&inner)?;
        if let Some(ov) = inner.stores.get(&self.name) {
            if let Some(w) = ov.writes.get(key) {
                return match w {
                    Some(v) => Ok(v.clone()),
                    None => Err(StorageError::KeyNotFound.into()),
                };
            }
            if ov.created || ov.truncated {
                return Err(StorageError::KeyNotFound.into());
            }
        }
        self.tx
            .base_store(&self.name)
            .and_then(|d| d.entries.get(key).cloned())
            .ok_or_else(|| StorageError::KeyNotFound.into())
    }

    /// Remove a key, failing with `KeyNotFound` when it is absent.
    pub fn delete(&self, key: &[u8]) -> Result<(), DBError> {
        self.tx.require_writable()?;
        self.get(key)?;
        let mut inner = self.tx.inner.lock();
        self.tx.check_active_locked(&mut inner)?;
        let ov = inner.stores.entry(self.name.clone()).or_default();
        ov.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// Remove every entry. The sequence counter is untouched.
    pub fn truncate(&self) -> Result<(), DBError> {
        self.tx.require_writable()?;
        let mut inner = self.tx.inner.lock();
        self.tx.check_active_locked(&mut inner)?;
        self.exists_locked(&inner)?;
        let ov = inner.stores.entry(self.name.clone()).or_default();
        ov.truncated = true;
        ov.writes.clear();
        Ok(())
    }

    /// Next value of the store's monotonic counter. The bump commits or
    /// rolls back with the transaction.
    pub fn next_sequence(&self) -> Result<u64, DBError> {
        self.tx.require_writable()?;
        let mut inner = self.tx.inner.lock();
        self.tx.check_active_locked(&mut inner)?;
        self.exists_locked(&inner)?;
        let base = self.tx.base_store(&self.name).map(|d| d.seq).unwrap_or(0);
        let ov = inner.stores.entry(self.name.clone()).or_default();
        let next = ov.seq.unwrap_or(base) + 1;
        ov.seq = Some(next);
        Ok(next)
    }

    /// Open a cursor. The cursor sees the store as of this call: the
    /// begin snapshot merged with the writes buffered so far.
    pub fn iterator(&self, opts: IterOptions) -> Result<StoreIter<'tx>, DBError> {
        let mut inner = self.tx.inner.lock();
        self.tx.check_active_locked(&mut inner)?;
        self.exists_locked(&inner)?;
        let (overlay, base) = match inner.stores.get(&self.name) {
            Some(ov) => {
                let base = if ov.created || ov.truncated {
                    None
                } else {
                    self.tx.base_store(&self.name)
                };
                (ov.writes.clone(), base)
            }
            None => (BTreeMap::new(), self.tx.base_store(&self.name)),
        };
        Ok(StoreIter {
            tx: self.tx,
            base,
            overlay,
            reverse: opts.reverse,
            current: None,
            err: None,
        })
    }

    fn exists_locked(&self, inner: &super::transaction::TxInner) -> Result<(), DBError> {
        let exists = match inner.stores.get(&self.name) {
            Some(ov) if ov.created => true,
            Some(ov) if ov.dropped => false,
            _ => self.tx.base_store(&self.name).is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(StorageError::StoreNotFound(self.name.clone()).into())
        }
    }
}

/// A cursor over the merged view of a store.
///
/// Usage: `seek` to position, then read `key`/`value` while `valid`,
/// advancing with `next`. Cancellation of the owning transaction
/// surfaces through [`StoreIter::err`] on the following `next`.
pub struct StoreIter<'tx> {
    tx: &'tx Transaction,
    base: Option<Arc<StoreData>>,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    reverse: bool,
    current: Option<(Vec<u8>, Vec<u8>)>,
    err: Option<DBError>,
}

impl StoreIter<'_> {
    /// Position at the first key `>= pivot` (`<= pivot` when reverse).
    /// `None` positions at the first (or last) key.
    pub fn seek(&mut self, pivot: Option<&[u8]>) {
        if self.err.is_some() {
            return;
        }
        let bound = match pivot {
            Some(p) => Bound::Included(p.to_vec()),
            None => Bound::Unbounded,
        };
        self.current = self.find(bound);
    }

    pub fn valid(&self) -> bool {
        self.current.is_some() && self.err.is_none()
    }

    /// Advance past the current entry. No-op when the cursor is not
    /// positioned.
    pub fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        if let Err(e) = self.tx.check_active() {
            self.err = Some(e);
            return;
        }
        self.current = self.find(Bound::Excluded(key));
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    pub fn entry(&self) -> Option<(&[u8], &[u8])> {
        self.current.as_ref().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// The sticky error, if any. Draining the cursor without checking
    /// this cannot distinguish exhaustion from cancellation.
    pub fn err(&mut self) -> Result<(), DBError> {
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn close(self) {}

    /// Next live entry from `bound` in iteration direction, skipping
    /// overlay tombstones. The overlay wins on key collisions.
    fn find(&self, bound: Bound<Vec<u8>>) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut bound = bound;
        loop {
            let base_next = self.base.as_ref().and_then(|d| self.edge(&d.entries, &bound));
            let over_next = self.edge_overlay(&bound);

            let (key, value) = match (base_next, over_next) {
                (None, None) => return None,
                (Some((k, v)), None) => (k, Some(v)),
                (None, Some((k, v))) => (k, v),
                (Some((bk, bv)), Some((ok, ov))) => {
                    let overlay_wins = if bk == ok {
                        true
                    } else if self.reverse {
                        ok > bk
                    } else {
                        ok < bk
                    };
                    if overlay_wins {
                        (ok, ov)
                    } else {
                        (bk, Some(bv))
                    }
                }
            };
            match value {
                Some(v) => return Some((key, v)),
                // Tombstone: step over it and keep looking.
                None => bound = Bound::Excluded(key),
            }
        }
    }

    fn edge(&self, map: &BTreeMap<Vec<u8>, Vec<u8>>, bound: &Bound<Vec<u8>>) -> Option<(Vec<u8>, Vec<u8>)> {
        let item = if self.reverse {
            map.range((Bound::Unbounded, bound.clone())).next_back()
        } else {
            map.range((bound.clone(), Bound::Unbounded)).next()
        };
        item.map(|(k, v)| (k.clone(), v.clone()))
    }

    fn edge_overlay(&self, bound: &Bound<Vec<u8>>) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        let item = if self.reverse {
            self.overlay.range((Bound::Unbounded, bound.clone())).next_back()
        } else {
            self.overlay.range((bound.clone(), Bound::Unbounded)).next()
        };
        item.map(|(k, v)| (k.clone(), v.clone()))
    }
}
