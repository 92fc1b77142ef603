//! sled-backed persistence for on-disk engines.
//!
//! Each store maps to one sled tree named after it. Sequence counters
//! live in a reserved meta tree. Commits are written through tree by
//! tree and flushed once at the end; at open the whole committed state
//! is reloaded into the in-memory snapshot.

use super::{CommitSet, Config, Snapshot, StoreData};
use crate::error::DBError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Reserved tree holding `store name -> sequence counter`.
const META_TREE: &str = "__strata_meta";
/// sled's own default tree, never used by the engine.
const SLED_DEFAULT_TREE: &[u8] = b"__sled__default";

pub(crate) struct Durability {
    db: sled::Db,
}

impl Durability {
    pub(crate) fn open(path: &Path, config: &Config) -> Result<(Durability, Snapshot), DBError> {
        let mut sled_config = sled::Config::default()
            .path(path)
            .flush_every_ms(Some(config.flush_every_ms.unwrap_or(50)));
        if let Some(cache) = config.cache_capacity {
            sled_config = sled_config.cache_capacity(cache);
        }
        let db = sled_config.open()?;

        let meta = db.open_tree(META_TREE)?;
        let mut stores = BTreeMap::new();
        for name in db.tree_names() {
            if name.as_ref() == SLED_DEFAULT_TREE || name.as_ref() == META_TREE.as_bytes() {
                continue;
            }
            let store_name = String::from_utf8(name.to_vec())
                .map_err(|_| crate::error::StorageError::Corruption("bad store name".into()))?;
            let tree = db.open_tree(&name)?;
            let mut entries = BTreeMap::new();
            for kv in tree.iter() {
                let (k, v) = kv?;
                entries.insert(k.to_vec(), v.to_vec());
            }
            let seq = match meta.get(&name)? {
                Some(raw) => decode_seq(&raw)?,
                None => 0,
            };
            stores.insert(store_name, Arc::new(StoreData { entries, seq }));
        }

        Ok((Durability { db }, Snapshot { stores }))
    }

    /// Mirror one committed transaction into sled.
    pub(crate) fn apply(&self, set: &CommitSet) -> Result<(), DBError> {
        let meta = self.db.open_tree(META_TREE)?;
        for name in &set.dropped {
            self.db.drop_tree(name.as_bytes())?;
            meta.remove(name.as_bytes())?;
        }
        for sc in &set.stores {
            let tree = self.db.open_tree(sc.name.as_bytes())?;
            if sc.truncated {
                tree.clear()?;
            }
            let mut batch = sled::Batch::default();
            for (k, v) in &sc.writes {
                match v {
                    Some(v) => batch.insert(k.as_slice(), v.as_slice()),
                    None => batch.remove(k.as_slice()),
                }
            }
            tree.apply_batch(batch)?;
            if let Some(seq) = sc.seq {
                meta.insert(sc.name.as_bytes(), &seq.to_be_bytes())?;
            }
        }
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn flush(&self) -> Result<(), DBError> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_seq(raw: &[u8]) -> Result<u64, DBError> {
    let arr: [u8; 8] = raw
        .try_into()
        .map_err(|_| crate::error::StorageError::Corruption("bad sequence counter".into()))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreCommit;
    use tempfile::TempDir;

    #[test]
    fn test_reload_after_reopen() {
        let dir = TempDir::new().unwrap();
        let config = Config::at(dir.path());
        {
            let (d, _) = Durability::open(dir.path(), &config).unwrap();
            d.apply(&CommitSet {
                dropped: vec![],
                stores: vec![StoreCommit {
                    name: "t1".into(),
                    created: true,
                    truncated: false,
                    writes: vec![(b"k".to_vec(), Some(b"v".to_vec()))],
                    seq: Some(3),
                }],
            })
            .unwrap();
        }
        let (_, snapshot) = Durability::open(dir.path(), &config).unwrap();
        let data = snapshot.stores.get("t1").unwrap();
        assert_eq!(data.entries.get(b"k".as_slice()), Some(&b"v".to_vec()));
        assert_eq!(data.seq, 3);
    }

    #[test]
    fn test_drop_store() {
        let dir = TempDir::new().unwrap();
        let config = Config::at(dir.path());
        let (d, _) = Durability::open(dir.path(), &config).unwrap();
        d.apply(&CommitSet {
            dropped: vec![],
            stores: vec![StoreCommit {
                name: "gone".into(),
                created: true,
                truncated: false,
                writes: vec![(b"a".to_vec(), Some(b"1".to_vec()))],
                seq: None,
            }],
        })
        .unwrap();
        d.apply(&CommitSet {
            dropped: vec!["gone".into()],
            stores: vec![],
        })
        .unwrap();
        drop(d);
        let (_, snapshot) = Durability::open(dir.path(), &config).unwrap();
        assert!(snapshot.stores.get("gone").is_none());
    }
}
