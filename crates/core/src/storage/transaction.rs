//! Transactions.
//!
//! A transaction captures the committed snapshot current at begin and
//! buffers every effect (store writes, store creation and destruction,
//! sequence bumps, DDL journal entries) until commit folds them into a
//! new snapshot in one step. Rollback simply discards the buffers, which
//! makes it byte-exact by construction.

use super::{CommitSet, EngineInner, Snapshot, StoreCommit};
use crate::cancel::CancelHandle;
use crate::catalog::{self, Catalog, DdlJournal};
use crate::error::{DBError, StorageError};
use crate::storage::Store;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Options for [`crate::storage::Engine::begin`].
#[derive(Debug, Clone)]
pub struct TxOptions {
    pub writable: bool,
    pub cancel: CancelHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxStatus {
    Active,
    Committed,
    RolledBack,
    /// Terminal, rollback-only: the cancellation handle tripped.
    Cancelled,
}

#[derive(Debug, Default)]
pub(crate) struct StoreOverlay {
    pub(crate) writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    pub(crate) truncated: bool,
    pub(crate) created: bool,
    pub(crate) dropped: bool,
    pub(crate) seq: Option<u64>,
}

pub(crate) struct TxInner {
    pub(crate) status: TxStatus,
    pub(crate) stores: BTreeMap<String, StoreOverlay>,
    pub(crate) ddl: DdlJournal,
    /// Held by writable transactions from begin to finish; releasing it
    /// lets the next writer in.
    writer_guard: Option<ArcMutexGuard<RawMutex, ()>>,
    finished: bool,
}

pub struct Transaction {
    pub(crate) engine: Arc<EngineInner>,
    pub(crate) snapshot: Arc<Snapshot>,
    catalog_snapshot: Arc<Catalog>,
    writable: bool,
    cancel: CancelHandle,
    pub(crate) inner: Mutex<TxInner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn begin(engine: Arc<EngineInner>, opts: TxOptions) -> Result<Transaction, DBError> {
        // Writer gate first: at most one writable transaction at a time,
        // and the snapshot must be taken after the previous writer is out.
        let writer_guard = if opts.writable {
            Some(engine.writer.lock_arc())
        } else {
            None
        };
        // Hold the committed read lock across both reads: commit swaps
        // storage and catalog under the matching write lock, so the pair
        // captured here is always consistent.
        let (snapshot, catalog_snapshot) = {
            let committed = engine.committed.read();
            (committed.clone(), engine.catalog.read().clone())
        };
        engine.active_txs.fetch_add(1, Ordering::AcqRel);
        Ok(Transaction {
            engine,
            snapshot,
            catalog_snapshot,
            writable: opts.writable,
            cancel: opts.cancel,
            inner: Mutex::new(TxInner {
                status: TxStatus::Active,
                stores: BTreeMap::new(),
                ddl: DdlJournal::default(),
                writer_guard,
                finished: false,
            }),
        })
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Poll cancellation and the state machine. Called before every
    /// store and iterator operation.
    pub(crate) fn check_active(&self) -> Result<(), DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)
    }

    pub(crate) fn check_active_locked(&self, inner: &mut TxInner) -> Result<(), DBError> {
        match inner.status {
            TxStatus::Active => {
                if self.cancel.is_tripped() {
                    inner.status = TxStatus::Cancelled;
                    return Err(StorageError::Cancelled.into());
                }
                Ok(())
            }
            TxStatus::Cancelled => Err(StorageError::Cancelled.into()),
            _ => Err(StorageError::Discarded.into()),
        }
    }

    pub(crate) fn require_writable(&self) -> Result<(), DBError> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly.into())
        }
    }

    fn store_exists(&self, inner: &TxInner, name: &str) -> bool {
        match inner.stores.get(name) {
            Some(ov) if ov.created => true,
            Some(ov) if ov.dropped => false,
            _ => self.snapshot.stores.contains_key(name),
        }
    }

    pub fn create_store(&self, name: &str) -> Result<(), DBError> {
        self.require_writable()?;
        if name.is_empty() {
            return Err(DBError::invalid_argument("empty store name"));
        }
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        if self.store_exists(&inner, name) {
            return Err(StorageError::StoreAlreadyExists(name.to_owned()).into());
        }
        let ov = inner.stores.entry(name.to_owned()).or_default();
        ov.created = true;
        ov.truncated = false;
        ov.writes.clear();
        ov.seq = None;
        Ok(())
    }

    pub fn get_store(&self, name: &str) -> Result<Store<'_>, DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        if !self.store_exists(&inner, name) {
            return Err(StorageError::StoreNotFound(name.to_owned()).into());
        }
        Ok(Store::new(self, name))
    }

    pub fn drop_store(&self, name: &str) -> Result<(), DBError> {
        self.require_writable()?;
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        if !self.store_exists(&inner, name) {
            return Err(StorageError::StoreNotFound(name.to_owned()).into());
        }
        let in_base = self.snapshot.stores.contains_key(name);
        let ov = inner.stores.entry(name.to_owned()).or_default();
        ov.writes.clear();
        ov.truncated = false;
        ov.created = false;
        ov.seq = None;
        // A store created inside this transaction just evaporates.
        ov.dropped = in_base;
        Ok(())
    }

    pub fn list_stores(&self, prefix: &str) -> Result<Vec<String>, DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        let mut names: Vec<String> = self
            .snapshot
            .stores
            .keys()
            .filter(|n| n.starts_with(prefix) && self.store_exists(&inner, n))
            .cloned()
            .collect();
        for (name, ov) in &inner.stores {
            if ov.created && name.starts_with(prefix) && !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Commit buffered effects atomically. Fails with `ReadOnly` on a
    /// read-only transaction, `Cancelled` once the handle has tripped,
    /// and `Discarded` after any terminal state.
    pub fn commit(&self) -> Result<(), DBError> {
        let mut inner = self.inner.lock();
        match inner.status {
            TxStatus::Active => {}
            TxStatus::Cancelled => return Err(StorageError::Cancelled.into()),
            _ => return Err(StorageError::Discarded.into()),
        }
        if !self.writable {
            return Err(StorageError::ReadOnly.into());
        }
        if self.cancel.is_tripped() {
            inner.status = TxStatus::Cancelled;
            return Err(StorageError::Cancelled.into());
        }

        // Persist sequence leases taken during this transaction into the
        // reserved sequence store so they commit with everything else.
        catalog::flush_sequence_leases(&mut inner)?;

        let set = build_commit_set(&inner);

        // Publish: durability first so a failed disk write aborts the
        // commit, then the in-memory snapshot and the catalog under the
        // same write lock so readers always see a matching pair.
        {
            let mut committed = self.engine.committed.write();
            if let Some(d) = &self.engine.durability {
                d.apply(&set)?;
            }
            *committed = Arc::new(committed.apply(&set));
            if !inner.ddl.is_empty() {
                let next = self.catalog_snapshot.apply_journal(&inner.ddl);
                *self.engine.catalog.write() = Arc::new(next);
            }
        }

        inner.status = TxStatus::Committed;
        self.finish(&mut inner);
        Ok(())
    }

    /// Roll back. Returns `Cancelled` when the transaction was cancelled
    /// (the buffers are discarded either way) and `Discarded` after
    /// commit or a prior rollback.
    pub fn rollback(&self) -> Result<(), DBError> {
        let mut inner = self.inner.lock();
        match inner.status {
            TxStatus::Active => {
                inner.status = TxStatus::RolledBack;
                self.finish(&mut inner);
                Ok(())
            }
            TxStatus::Cancelled => {
                self.finish(&mut inner);
                Err(StorageError::Cancelled.into())
            }
            _ => Err(StorageError::Discarded.into()),
        }
    }

    fn finish(&self, inner: &mut TxInner) {
        if inner.finished {
            return;
        }
        inner.finished = true;
        inner.stores.clear();
        inner.ddl = DdlJournal::default();
        inner.writer_guard = None;
        self.engine.active_txs.fetch_sub(1, Ordering::AcqRel);
    }

    /// The catalog as this transaction sees it: its begin snapshot,
    /// without the in-flight DDL journal.
    pub(crate) fn catalog_base(&self) -> Arc<Catalog> {
        self.catalog_snapshot.clone()
    }

    /// A spill store from the owning engine, for sort and aggregation.
    pub fn transient_store(&self) -> Result<super::TransientStore, DBError> {
        self.check_active()?;
        Ok(super::TransientStore::default())
    }

    pub(crate) fn base_store(&self, name: &str) -> Option<Arc<super::StoreData>> {
        self.snapshot.stores.get(name).cloned()
    }
}

fn build_commit_set(inner: &TxInner) -> CommitSet {
    let mut set = CommitSet::default();
    for (name, ov) in &inner.stores {
        if ov.dropped {
            set.dropped.push(name.clone());
            if !ov.created {
                continue;
            }
        }
        if !ov.created && !ov.truncated && ov.writes.is_empty() && ov.seq.is_none() {
            continue;
        }
        set.stores.push(StoreCommit {
            name: name.clone(),
            created: ov.created,
            truncated: ov.truncated,
            writes: ov.writes.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            seq: ov.seq,
        });
    }
    set
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if !inner.finished {
            if inner.status == TxStatus::Active {
                inner.status = TxStatus::RolledBack;
            }
            self.finish(&mut inner);
        }
    }
}
