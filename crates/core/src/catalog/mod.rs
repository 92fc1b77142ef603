//! The schema catalog.
//!
//! DDL state is persisted as rows in the reserved `__catalog` store and
//! cached in memory. Every transaction captures the cache snapshot
//! current at begin; DDL executed inside the transaction is journalled
//! and only published (as a fresh immutable snapshot) when the
//! transaction commits, so rolled-back DDL never leaks.

pub mod entity;
pub(crate) mod sequence;

pub use entity::{CatalogEntry, ColumnConstraint, IndexInfo, IndexPath, PrimaryKey, SequenceInfo, TableInfo};

use crate::error::{CatalogError, DBError};
use crate::storage::Transaction;
use crate::storage::TxInner;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stratadb_types::{encoding, key, Row, Value};

/// Store holding one row per schema object. Always present, read-only
/// for user statements, scannable for introspection.
pub const CATALOG_STORE: &str = "__catalog";
/// Store holding the current value of every fired sequence.
pub const SEQUENCE_STORE: &str = "__sequence";

/// In-memory image of the persisted catalog. Immutable once built;
/// commit publishes a replacement.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tables: HashMap<String, Arc<TableInfo>>,
    indexes: HashMap<String, Arc<IndexInfo>>,
    sequences: HashMap<String, Arc<SequenceInfo>>,
}

impl Catalog {
    pub fn get_table(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.tables.get(name).cloned()
    }

    pub fn get_index(&self, name: &str) -> Option<Arc<IndexInfo>> {
        self.indexes.get(name).cloned()
    }

    pub fn get_sequence(&self, name: &str) -> Option<Arc<SequenceInfo>> {
        self.sequences.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Indexes owned by `table`, in name order.
    pub fn table_indexes(&self, table: &str) -> Vec<Arc<IndexInfo>> {
        let mut out: Vec<_> = self
            .indexes
            .values()
            .filter(|i| i.table == table)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Fold a transaction's DDL journal into a new catalog image.
    pub(crate) fn apply_journal(&self, j: &DdlJournal) -> Catalog {
        let mut next = self.clone();
        for name in &j.dropped_indexes {
            next.indexes.remove(name);
        }
        for name in &j.dropped_sequences {
            next.sequences.remove(name);
        }
        for name in &j.dropped_tables {
            next.tables.remove(name);
        }
        for (name, t) in &j.added_tables {
            next.tables.insert(name.clone(), t.clone());
        }
        for (name, i) in &j.added_indexes {
            next.indexes.insert(name.clone(), i.clone());
        }
        for (name, s) in &j.added_sequences {
            next.sequences.insert(name.clone(), s.clone());
        }
        next
    }
}

/// Per-transaction DDL buffer. Applied to the shared catalog on commit,
/// dropped wholesale on rollback.
#[derive(Debug, Default)]
pub struct DdlJournal {
    pub(crate) added_tables: HashMap<String, Arc<TableInfo>>,
    pub(crate) dropped_tables: HashSet<String>,
    pub(crate) added_indexes: HashMap<String, Arc<IndexInfo>>,
    pub(crate) dropped_indexes: HashSet<String>,
    pub(crate) added_sequences: HashMap<String, Arc<SequenceInfo>>,
    pub(crate) dropped_sequences: HashSet<String>,
    /// Sequence values handed out in this transaction, persisted to the
    /// sequence store at commit.
    pub(crate) seq_leases: HashMap<String, i64>,
}

impl DdlJournal {
    pub(crate) fn is_empty(&self) -> bool {
        self.added_tables.is_empty()
            && self.dropped_tables.is_empty()
            && self.added_indexes.is_empty()
            && self.dropped_indexes.is_empty()
            && self.added_sequences.is_empty()
            && self.dropped_sequences.is_empty()
    }
}

fn entry_key(kind: &str, name: &str) -> Vec<u8> {
    key::encode(&[Value::Text(kind.to_owned()), Value::Text(name.to_owned())])
}

fn seq_state_key(name: &str) -> Vec<u8> {
    key::encode(&[Value::Text(name.to_owned())])
}

fn reserved(name: &str) -> bool {
    name.starts_with("__")
}

fn check_name(name: &str) -> Result<(), DBError> {
    if name.is_empty() {
        return Err(DBError::invalid_argument("empty object name"));
    }
    if reserved(name) {
        return Err(DBError::invalid_argument(format!(
            "`{name}`: the `__` prefix is reserved for internal objects"
        )));
    }
    Ok(())
}

impl Transaction {
    // --- lookups --------------------------------------------------------

    pub fn get_table(&self, name: &str) -> Result<Arc<TableInfo>, DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        if let Some(t) = inner.ddl.added_tables.get(name) {
            return Ok(t.clone());
        }
        if inner.ddl.dropped_tables.contains(name) {
            return Err(CatalogError::TableNotFound(name.to_owned()).into());
        }
        self.catalog_base()
            .get_table(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_owned()).into())
    }

    pub fn get_index(&self, name: &str) -> Result<Arc<IndexInfo>, DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        if let Some(i) = inner.ddl.added_indexes.get(name) {
            return Ok(i.clone());
        }
        if inner.ddl.dropped_indexes.contains(name) {
            return Err(CatalogError::IndexNotFound(name.to_owned()).into());
        }
        self.catalog_base()
            .get_index(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_owned()).into())
    }

    pub fn get_sequence(&self, name: &str) -> Result<Arc<SequenceInfo>, DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        if let Some(s) = inner.ddl.added_sequences.get(name) {
            return Ok(s.clone());
        }
        if inner.ddl.dropped_sequences.contains(name) {
            return Err(CatalogError::SequenceNotFound(name.to_owned()).into());
        }
        self.catalog_base()
            .get_sequence(name)
            .ok_or_else(|| CatalogError::SequenceNotFound(name.to_owned()).into())
    }

    /// Indexes owned by `table` as this transaction sees them.
    pub fn table_indexes(&self, table: &str) -> Result<Vec<Arc<IndexInfo>>, DBError> {
        let mut inner = self.inner.lock();
        self.check_active_locked(&mut inner)?;
        let mut out: Vec<Arc<IndexInfo>> = self
            .catalog_base()
            .table_indexes(table)
            .into_iter()
            .filter(|i| !inner.ddl.dropped_indexes.contains(&i.name))
            .collect();
        for i in inner.ddl.added_indexes.values() {
            if i.table == table {
                out.push(i.clone());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out.dedup_by(|a, b| a.name == b.name);
        Ok(out)
    }

    // --- DDL ------------------------------------------------------------

    /// Create a table: assign its backing store, persist the catalog
    /// row, create the store, and journal the cache update. A table
    /// without a primary key also gets its generated-key sequence.
    pub fn create_table(&self, mut info: TableInfo) -> Result<Arc<TableInfo>, DBError> {
        self.require_writable()?;
        check_name(&info.name)?;
        if self.get_table(&info.name).is_ok() {
            return Err(CatalogError::TableAlreadyExists(info.name).into());
        }
        if let Some(pk) = &info.primary_key {
            for col in &pk.columns {
                if info.get_column(col).is_none() {
                    return Err(DBError::invalid_argument(format!(
                        "primary key column `{col}` is not declared on `{}`",
                        info.name
                    )));
                }
            }
        }

        info.store_name = self.generate_store_name("t")?;
        if info.primary_key.is_none() {
            let seq_name = format!("{}_docid", info.name);
            let mut seq = SequenceInfo::new(&seq_name);
            seq.owner = Some(info.name.clone());
            self.persist_sequence(seq)?;
            info.docid_seq = Some(seq_name);
        }

        let info = Arc::new(info);
        let entry = CatalogEntry::Table((*info).clone());
        self.put_catalog_row("table", &info.name, &entry)?;
        self.create_store(&info.store_name)?;
        log::debug!("created table `{}` in store `{}`", info.name, info.store_name);

        {
            let mut inner = self.inner.lock();
            inner.ddl.dropped_tables.remove(&info.name);
            inner.ddl.added_tables.insert(info.name.clone(), info.clone());
        }

        // Column-level UNIQUE is backed by an owned unique index.
        for col in info.columns.iter().filter(|c| c.unique) {
            self.create_index(IndexInfo {
                name: format!("{}_{}_unique", info.name, col.name),
                table: info.name.clone(),
                paths: vec![IndexPath {
                    column: col.name.clone(),
                    ty: col.ty.unwrap_or(stratadb_types::ValueType::Text),
                }],
                unique: true,
                store_name: String::new(),
            })?;
        }
        Ok(info)
    }

    /// Drop a table together with its indexes, its generated-key
    /// sequence and its backing store.
    pub fn drop_table(&self, name: &str) -> Result<(), DBError> {
        self.require_writable()?;
        let info = self.get_table(name)?;
        if info.read_only {
            return Err(CatalogError::ReadOnlyTable(name.to_owned()).into());
        }
        for idx in self.table_indexes(name)? {
            self.remove_index_entry(&idx)?;
        }
        if let Some(seq) = &info.docid_seq {
            self.remove_sequence_entry(seq)?;
        }
        self.delete_catalog_row("table", name)?;
        self.drop_store(&info.store_name)?;
        log::debug!("dropped table `{name}`");

        let mut inner = self.inner.lock();
        inner.ddl.added_tables.remove(name);
        inner.ddl.dropped_tables.insert(name.to_owned());
        Ok(())
    }

    /// Create an index and build its contents from the owning table.
    /// Index paths take their type from the table's column constraints;
    /// untyped columns are rejected here rather than silently dropped.
    pub fn create_index(&self, mut info: IndexInfo) -> Result<Arc<IndexInfo>, DBError> {
        self.require_writable()?;
        check_name(&info.name)?;
        if self.get_index(&info.name).is_ok() {
            return Err(CatalogError::IndexAlreadyExists(info.name).into());
        }
        let table = self.get_table(&info.table)?;
        if info.paths.is_empty() {
            return Err(DBError::invalid_argument(format!(
                "index `{}` has no key paths",
                info.name
            )));
        }
        for path in &mut info.paths {
            let col = table.get_column(&path.column).ok_or_else(|| {
                DBError::invalid_argument(format!(
                    "index `{}` refers to unknown column `{}`",
                    info.name, path.column
                ))
            })?;
            path.ty = col.ty.ok_or_else(|| {
                DBError::invalid_argument(format!(
                    "index `{}` refers to untyped column `{}`",
                    info.name, path.column
                ))
            })?;
        }

        info.store_name = self.generate_store_name("i")?;
        let info = Arc::new(info);
        let entry = CatalogEntry::Index((*info).clone());
        self.put_catalog_row("index", &info.name, &entry)?;
        self.create_store(&info.store_name)?;
        {
            let mut inner = self.inner.lock();
            inner.ddl.dropped_indexes.remove(&info.name);
            inner.ddl.added_indexes.insert(info.name.clone(), info.clone());
        }
        crate::index::Index::new(self, info.clone()).rebuild()?;
        log::debug!("created index `{}` on `{}`", info.name, info.table);
        Ok(info)
    }

    pub fn drop_index(&self, name: &str) -> Result<(), DBError> {
        self.require_writable()?;
        let info = self.get_index(name)?;
        self.remove_index_entry(&info)
    }

    /// Rebuild an index from a full scan of its table.
    pub fn reindex(&self, name: &str) -> Result<(), DBError> {
        self.require_writable()?;
        let info = self.get_index(name)?;
        crate::index::Index::new(self, info).rebuild()
    }

    pub fn create_sequence(&self, info: SequenceInfo) -> Result<Arc<SequenceInfo>, DBError> {
        self.require_writable()?;
        check_name(&info.name)?;
        self.persist_sequence(info)
    }

    pub fn drop_sequence(&self, name: &str) -> Result<(), DBError> {
        self.require_writable()?;
        let info = self.get_sequence(name)?;
        if let Some(owner) = &info.owner {
            return Err(DBError::invalid_argument(format!(
                "sequence `{name}` is owned by table `{owner}`"
            )));
        }
        self.remove_sequence_entry(name)
    }

    /// Read and advance a sequence. The new value is leased to this
    /// transaction and persisted with its commit.
    pub fn next_value(&self, name: &str) -> Result<i64, DBError> {
        self.require_writable()?;
        let info = self.get_sequence(name)?;
        let lease = {
            let mut inner = self.inner.lock();
            self.check_active_locked(&mut inner)?;
            inner.ddl.seq_leases.get(name).copied()
        };
        let current = match lease {
            Some(v) => Some(v),
            None => {
                let store = self.get_store(SEQUENCE_STORE)?;
                match store.get(&seq_state_key(name)) {
                    Ok(raw) => Some(sequence::state_from_row(&encoding::decode_row(&raw)?)?),
                    Err(e) if e.is_key_not_found() => None,
                    Err(e) => return Err(e),
                }
            }
        };
        let next = sequence::next_value(&info, current)?;
        let mut inner = self.inner.lock();
        inner.ddl.seq_leases.insert(name.to_owned(), next);
        Ok(next)
    }

    // --- plumbing -------------------------------------------------------

    fn persist_sequence(&self, info: SequenceInfo) -> Result<Arc<SequenceInfo>, DBError> {
        if info.increment == 0 {
            return Err(DBError::invalid_argument("sequence increment cannot be zero"));
        }
        if info.min > info.max || info.start < info.min || info.start > info.max {
            return Err(DBError::invalid_argument(format!(
                "sequence `{}` has inconsistent bounds",
                info.name
            )));
        }
        if self.get_sequence(&info.name).is_ok() {
            return Err(CatalogError::SequenceAlreadyExists(info.name).into());
        }
        let info = Arc::new(info);
        let entry = CatalogEntry::Sequence((*info).clone());
        self.put_catalog_row("sequence", &info.name, &entry)?;
        let mut inner = self.inner.lock();
        inner.ddl.dropped_sequences.remove(&info.name);
        inner.ddl.added_sequences.insert(info.name.clone(), info.clone());
        Ok(info)
    }

    fn remove_index_entry(&self, info: &IndexInfo) -> Result<(), DBError> {
        self.delete_catalog_row("index", &info.name)?;
        self.drop_store(&info.store_name)?;
        let mut inner = self.inner.lock();
        inner.ddl.added_indexes.remove(&info.name);
        inner.ddl.dropped_indexes.insert(info.name.clone());
        Ok(())
    }

    fn remove_sequence_entry(&self, name: &str) -> Result<(), DBError> {
        self.delete_catalog_row("sequence", name)?;
        let store = self.get_store(SEQUENCE_STORE)?;
        match store.delete(&seq_state_key(name)) {
            Ok(()) => {}
            Err(e) if e.is_key_not_found() => {}
            Err(e) => return Err(e),
        }
        let mut inner = self.inner.lock();
        inner.ddl.added_sequences.remove(name);
        inner.ddl.seq_leases.remove(name);
        inner.ddl.dropped_sequences.insert(name.to_owned());
        Ok(())
    }

    fn put_catalog_row(&self, kind: &str, name: &str, entry: &CatalogEntry) -> Result<(), DBError> {
        let mut buf = Vec::new();
        encoding::encode_row(&entry.to_row(), &mut buf);
        self.get_store(CATALOG_STORE)?.put(&entry_key(kind, name), &buf)
    }

    fn delete_catalog_row(&self, kind: &str, name: &str) -> Result<(), DBError> {
        self.get_store(CATALOG_STORE)?.delete(&entry_key(kind, name))
    }

    fn generate_store_name(&self, prefix: &str) -> Result<String, DBError> {
        let n = self.get_store(CATALOG_STORE)?.next_sequence()?;
        Ok(format!("{prefix}{n}"))
    }
}

/// Write leased sequence values into the sequence store's overlay so
/// they commit with the rest of the transaction. Runs under the
/// transaction lock, straight against the overlay.
pub(crate) fn flush_sequence_leases(inner: &mut TxInner) -> Result<(), DBError> {
    if inner.ddl.seq_leases.is_empty() {
        return Ok(());
    }
    let mut leases: Vec<_> = inner
        .ddl
        .seq_leases
        .iter()
        .map(|(n, v)| (n.clone(), *v))
        .collect();
    leases.sort();
    let ov = inner.stores.entry(SEQUENCE_STORE.to_owned()).or_default();
    for (name, value) in leases {
        let mut buf = Vec::new();
        encoding::encode_row(&sequence::state_row(&name, value), &mut buf);
        ov.writes.insert(seq_state_key(&name), Some(buf));
    }
    Ok(())
}

/// First-open bootstrap: create the reserved stores and their catalog
/// rows. Returns whether anything had to be created.
pub(crate) fn bootstrap(tx: &Transaction) -> Result<bool, DBError> {
    if tx.get_store(CATALOG_STORE).is_ok() {
        return Ok(false);
    }
    log::info!("bootstrapping catalog");
    tx.create_store(CATALOG_STORE)?;
    tx.create_store(SEQUENCE_STORE)?;

    let catalog_table = TableInfo {
        name: CATALOG_STORE.to_owned(),
        columns: vec![
            ColumnConstraint::new("type", stratadb_types::ValueType::Text).not_null(),
            ColumnConstraint::new("name", stratadb_types::ValueType::Text).not_null(),
            ColumnConstraint::new("store_name", stratadb_types::ValueType::Text),
            ColumnConstraint::new("sql", stratadb_types::ValueType::Text),
            ColumnConstraint::new("definition", stratadb_types::ValueType::Blob),
        ],
        primary_key: None,
        checks: Vec::new(),
        store_name: CATALOG_STORE.to_owned(),
        docid_seq: None,
        read_only: true,
    };
    let sequence_table = TableInfo {
        name: SEQUENCE_STORE.to_owned(),
        columns: vec![
            ColumnConstraint::new("name", stratadb_types::ValueType::Text).not_null(),
            ColumnConstraint::new("value", stratadb_types::ValueType::BigInt),
        ],
        primary_key: None,
        checks: Vec::new(),
        store_name: SEQUENCE_STORE.to_owned(),
        docid_seq: None,
        read_only: true,
    };

    for info in [catalog_table, sequence_table] {
        let info = Arc::new(info);
        let entry = CatalogEntry::Table((*info).clone());
        tx.put_catalog_row("table", &info.name, &entry)?;
        let mut inner = tx.inner.lock();
        inner.ddl.added_tables.insert(info.name.clone(), info.clone());
    }
    Ok(true)
}

/// Rebuild the in-memory catalog from the persisted catalog store,
/// re-deriving index path types from the owning tables' constraints.
pub(crate) fn load(catalog_rows: impl Iterator<Item = Row>) -> Result<Catalog, DBError> {
    let mut catalog = Catalog::default();
    let mut pending_indexes = Vec::new();
    for row in catalog_rows {
        match CatalogEntry::from_row(&row)? {
            CatalogEntry::Table(t) => {
                catalog.tables.insert(t.name.clone(), Arc::new(t));
            }
            CatalogEntry::Index(i) => pending_indexes.push(i),
            CatalogEntry::Sequence(s) => {
                catalog.sequences.insert(s.name.clone(), Arc::new(s));
            }
        }
    }
    for mut idx in pending_indexes {
        let table = catalog.tables.get(&idx.table).ok_or_else(|| {
            crate::error::StorageError::Corruption(format!(
                "index `{}` refers to missing table `{}`",
                idx.name, idx.table
            ))
        })?;
        for path in &mut idx.paths {
            if let Some(col) = table.get_column(&path.column) {
                if let Some(ty) = col.ty {
                    path.ty = ty;
                }
            }
        }
        catalog.indexes.insert(idx.name.clone(), Arc::new(idx));
    }
    log::debug!(
        "catalog loaded: {} tables, {} indexes, {} sequences",
        catalog.tables.len(),
        catalog.indexes.len(),
        catalog.sequences.len()
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::error::{CatalogError, DBError};
    use crate::ResultTest;
    use stratadb_types::ValueType;

    fn users_table() -> TableInfo {
        TableInfo::new("users")
            .column(ColumnConstraint::new("id", ValueType::BigInt))
            .column(ColumnConstraint::new("name", ValueType::Text))
            .primary_key(["id"])
    }

    #[test]
    fn test_create_and_get_table() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        let created = tx.create_table(users_table())?;
        assert!(created.store_name.starts_with('t'));
        assert_eq!(tx.get_table("users")?.name, "users");
        assert!(matches!(
            tx.create_table(users_table()),
            Err(DBError::Catalog(CatalogError::TableAlreadyExists(_)))
        ));
        tx.commit()?;

        let tx = db.begin(true)?;
        assert!(tx.get_table("users").is_ok());
        Ok(())
    }

    #[test]
    fn test_rolled_back_ddl_never_published() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        tx.create_table(users_table())?;
        tx.rollback()?;

        let tx = db.begin(true)?;
        assert!(matches!(
            tx.get_table("users"),
            Err(DBError::Catalog(CatalogError::TableNotFound(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_reserved_names_rejected() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        assert!(matches!(
            tx.create_table(TableInfo::new("__mine")),
            Err(DBError::InvalidArgument(_))
        ));
        assert!(matches!(
            tx.create_sequence(SequenceInfo::new("__seq")),
            Err(DBError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_catalog_table_is_read_only_and_visible() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        let info = tx.get_table(CATALOG_STORE)?;
        assert!(info.read_only);
        let table = tx.table(CATALOG_STORE)?;
        assert!(matches!(
            table.insert(stratadb_types::Row::new()),
            Err(DBError::Catalog(CatalogError::ReadOnlyTable(_)))
        ));
        assert!(matches!(
            tx.drop_table(CATALOG_STORE),
            Err(DBError::Catalog(CatalogError::ReadOnlyTable(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_drop_table_removes_indexes_and_store() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        let info = tx.create_table(users_table())?;
        tx.create_index(IndexInfo {
            name: "users_name".into(),
            table: "users".into(),
            paths: vec![IndexPath {
                column: "name".into(),
                ty: ValueType::Text,
            }],
            unique: false,
            store_name: String::new(),
        })?;
        let store_name = info.store_name.clone();
        tx.drop_table("users")?;
        assert!(tx.get_table("users").is_err());
        assert!(tx.get_index("users_name").is_err());
        assert!(tx.get_store(&store_name).is_err());
        Ok(())
    }

    #[test]
    fn test_index_on_untyped_column_rejected() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("a", ValueType::Integer))
                .column(ColumnConstraint::untyped("b")),
        )?;
        let err = tx
            .create_index(IndexInfo {
                name: "t_b".into(),
                table: "t".into(),
                paths: vec![IndexPath {
                    column: "b".into(),
                    ty: ValueType::Text,
                }],
                unique: false,
                store_name: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, DBError::InvalidArgument(_)));
        Ok(())
    }

    #[test]
    fn test_sequence_lifecycle() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        let mut info = SequenceInfo::new("counter");
        info.start = 10;
        info.increment = 5;
        info.min = 1;
        info.max = 100;
        tx.create_sequence(info)?;
        assert_eq!(tx.next_value("counter")?, 10);
        assert_eq!(tx.next_value("counter")?, 15);
        tx.commit()?;

        // the lease persisted with the commit
        let tx = db.begin(false)?;
        assert_eq!(tx.next_value("counter")?, 20);
        tx.rollback()?;

        // and the rolled-back lease did not
        let tx = db.begin(false)?;
        assert_eq!(tx.next_value("counter")?, 20);
        tx.commit()?;

        let tx = db.begin(false)?;
        tx.drop_sequence("counter")?;
        assert!(matches!(
            tx.next_value("counter"),
            Err(DBError::Catalog(CatalogError::SequenceNotFound(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_docid_sequence_owned_by_table() -> ResultTest<()> {
        let db = Database::open_in_memory()?;
        let tx = db.begin(false)?;
        tx.create_table(TableInfo::new("logs").column(ColumnConstraint::new("msg", ValueType::Text)))?;
        let seq = tx.get_sequence("logs_docid")?;
        assert_eq!(seq.owner.as_deref(), Some("logs"));
        assert!(matches!(
            tx.drop_sequence("logs_docid"),
            Err(DBError::InvalidArgument(_))
        ));
        tx.drop_table("logs")?;
        assert!(tx.get_sequence("logs_docid").is_err());
        Ok(())
    }

    #[test]
    fn test_reload_after_reopen() -> ResultTest<()> {
        let dir = tempfile::TempDir::new()?;
        {
            let db = Database::open(crate::storage::Config::at(dir.path()))?;
            let tx = db.begin(false)?;
            tx.create_table(users_table())?;
            tx.create_sequence(SequenceInfo::new("ids"))?;
            tx.commit()?;
            db.close()?;
        }
        let db = Database::open(crate::storage::Config::at(dir.path()))?;
        let tx = db.begin(true)?;
        let t = tx.get_table("users")?;
        assert_eq!(t.columns.len(), 2);
        assert!(t.primary_key.is_some());
        assert!(tx.get_sequence("ids").is_ok());
        Ok(())
    }
}
