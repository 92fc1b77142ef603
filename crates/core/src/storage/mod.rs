//! The transactional ordered key-value storage layer.
//!
//! An [`Engine`] owns a set of named, ordered byte-keyed stores. The
//! committed state lives in immutable in-memory snapshots; a transaction
//! captures the snapshot current at begin and buffers its own writes in an
//! overlay, which commit folds into a fresh snapshot published to later
//! transactions. On-disk engines mirror every commit into sled and reload
//! the snapshot at open.

mod durability;
mod store;
mod transaction;

pub use store::{IterOptions, Store, StoreIter};
pub use transaction::{Transaction, TxOptions};

pub(crate) use transaction::TxInner;

use crate::cancel::CancelHandle;
use crate::catalog::Catalog;
use crate::error::{DBError, StorageError};
use durability::Durability;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Directory of the backing store. Ignored for in-memory engines.
    pub path: Option<PathBuf>,
    /// An in-memory engine is always opened fresh.
    pub in_memory: bool,
    /// Tuning hint forwarded to the backing store.
    pub cache_capacity: Option<u64>,
    /// Tuning hint forwarded to the backing store.
    pub flush_every_ms: Option<u64>,
}

impl Config {
    pub fn in_memory() -> Config {
        Config {
            in_memory: true,
            ..Config::default()
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Config {
        Config {
            path: Some(path.into()),
            ..Config::default()
        }
    }
}

/// The committed contents of one store.
#[derive(Debug, Default, Clone)]
pub(crate) struct StoreData {
    pub(crate) entries: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) seq: u64,
}

/// An immutable view of every committed store. Cheap to share: readers
/// clone the `Arc`, commit builds a replacement.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub(crate) stores: BTreeMap<String, Arc<StoreData>>,
}

/// One store's worth of buffered effects, in commit form.
#[derive(Debug)]
pub(crate) struct StoreCommit {
    pub(crate) name: String,
    pub(crate) created: bool,
    pub(crate) truncated: bool,
    pub(crate) writes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    pub(crate) seq: Option<u64>,
}

#[derive(Debug, Default)]
pub(crate) struct CommitSet {
    pub(crate) dropped: Vec<String>,
    pub(crate) stores: Vec<StoreCommit>,
}

impl Snapshot {
    /// Fold a commit set into a new snapshot. Untouched stores share
    /// their data with the previous snapshot.
    pub(crate) fn apply(&self, set: &CommitSet) -> Snapshot {
        let mut stores = self.stores.clone();
        for name in &set.dropped {
            stores.remove(name);
        }
        for sc in &set.stores {
            let mut data = if sc.created || sc.truncated {
                StoreData::default()
            } else {
                stores.get(&sc.name).map(|d| (**d).clone()).unwrap_or_default()
            };
            if sc.truncated {
                // truncation clears entries but not the sequence counter
                if let Some(base) = stores.get(&sc.name) {
                    data.seq = base.seq;
                }
            }
            for (k, v) in &sc.writes {
                match v {
                    Some(v) => {
                        data.entries.insert(k.clone(), v.clone());
                    }
                    None => {
                        data.entries.remove(k);
                    }
                }
            }
            if let Some(seq) = sc.seq {
                data.seq = seq;
            }
            stores.insert(sc.name.clone(), Arc::new(data));
        }
        Snapshot { stores }
    }
}

pub(crate) struct EngineInner {
    pub(crate) committed: RwLock<Arc<Snapshot>>,
    /// The published catalog image. Swapped together with `committed`
    /// under its write lock so transactions always capture a matching
    /// pair.
    pub(crate) catalog: RwLock<Arc<Catalog>>,
    /// Gate guaranteeing at most one writable transaction at a time.
    pub(crate) writer: Arc<Mutex<()>>,
    pub(crate) durability: Option<Durability>,
    pub(crate) active_txs: AtomicUsize,
    pub(crate) closed: AtomicBool,
}

/// The process-wide storage engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// Open an engine. In-memory engines start empty; on-disk engines
    /// reload the committed snapshot from the backing sled store.
    pub fn open(config: Config) -> Result<Engine, DBError> {
        let (durability, snapshot) = if config.in_memory {
            (None, Snapshot::default())
        } else {
            let path = config
                .path
                .clone()
                .ok_or_else(|| DBError::invalid_argument("an on-disk engine needs a path"))?;
            let (d, snapshot) = Durability::open(&path, &config)?;
            log::debug!(
                "opened engine at {} with {} stores",
                path.display(),
                snapshot.stores.len()
            );
            (Some(d), snapshot)
        };

        Ok(Engine {
            inner: Arc::new(EngineInner {
                committed: RwLock::new(Arc::new(snapshot)),
                catalog: RwLock::new(Arc::new(Catalog::default())),
                writer: Arc::new(Mutex::new(())),
                durability,
                active_txs: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Begin a transaction. Writable transactions serialize on the
    /// engine-wide writer gate; readers capture the committed snapshot
    /// current at this point and never block.
    pub fn begin(&self, opts: TxOptions) -> Result<Transaction, DBError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed.into());
        }
        if opts.cancel.is_tripped() {
            return Err(StorageError::Cancelled.into());
        }
        Transaction::begin(self.inner.clone(), opts)
    }

    pub fn begin_read(&self) -> Result<Transaction, DBError> {
        self.begin(TxOptions::default())
    }

    pub fn begin_write(&self) -> Result<Transaction, DBError> {
        self.begin(TxOptions {
            writable: true,
            ..TxOptions::default()
        })
    }

    /// A private ordered store for spill work (external sort, grouping).
    /// Dropping the value releases it, whether or not it was drained.
    pub fn transient_store(&self) -> Result<TransientStore, DBError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed.into());
        }
        Ok(TransientStore::default())
    }

    /// Wait for active transactions to finish, then release resources.
    /// Idempotent: later calls are no-ops.
    pub fn close(&self) -> Result<(), DBError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        while self.inner.active_txs.load(Ordering::Acquire) != 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        if let Some(d) = &self.inner.durability {
            d.flush()?;
        }
        log::debug!("engine closed");
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.committed.read().clone()
    }
}

impl Default for TxOptions {
    fn default() -> TxOptions {
        TxOptions {
            writable: false,
            cancel: CancelHandle::new(),
        }
    }
}

/// A throwaway ordered store handed out by the engine for operator spill.
/// Not transactional and never persisted; cleanup is its `Drop`.
#[derive(Debug, Default)]
pub struct TransientStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl TransientStore {
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order, descending when `reverse`.
    pub fn iter(&self, reverse: bool) -> Box<dyn Iterator<Item = (&[u8], &[u8])> + '_> {
        let it = self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()));
        if reverse {
            Box::new(it.rev())
        } else {
            Box::new(it)
        }
    }
}
