//! The table layer: typed rows over a store.
//!
//! A [`Table`] encodes rows into its backing store, derives row keys
//! from the primary key or the generated-key sequence, enforces column
//! constraints in order (declared type, DEFAULT, NOT NULL, PRIMARY KEY,
//! CHECK, unique indexes) and keeps every owning index in step with the
//! data.

use crate::catalog::TableInfo;
use crate::environment::Environment;
use crate::error::{CatalogError, ConstraintViolation, DBError};
use crate::expr::compare::filter_matches;
use crate::index::Index;
use crate::storage::{IterOptions, Store, Transaction};
use std::sync::Arc;
use stratadb_types::{encoding, key, Row, Value};

/// Inclusive bounds on encoded row keys, expressed as value tuples.
#[derive(Debug, Clone, Default)]
pub struct ScanRange {
    pub min: Option<Vec<Value>>,
    pub max: Option<Vec<Value>>,
}

pub struct Table<'tx> {
    tx: &'tx Transaction,
    info: Arc<TableInfo>,
}

impl Transaction {
    pub fn table(&self, name: &str) -> Result<Table<'_>, DBError> {
        Ok(Table {
            tx: self,
            info: self.get_table(name)?,
        })
    }
}

impl<'tx> Table<'tx> {
    pub fn info(&self) -> &Arc<TableInfo> {
        &self.info
    }

    fn store(&self) -> Result<Store<'tx>, DBError> {
        self.tx.get_store(&self.info.store_name)
    }

    fn require_mutable(&self) -> Result<(), DBError> {
        if self.info.read_only {
            return Err(CatalogError::ReadOnlyTable(self.info.name.clone()).into());
        }
        Ok(())
    }

    /// Insert a row, returning its key and the stored form.
    pub fn insert(&self, row: Row) -> Result<(Vec<u8>, Row), DBError> {
        self.require_mutable()?;
        let row = self.normalize(row)?;
        self.run_checks(&row)?;
        let row_key = self.derive_key(&row)?;

        let store = self.store()?;
        if self.info.primary_key.is_some() {
            match store.get(&row_key) {
                Ok(_) => {
                    return Err(ConstraintViolation::PrimaryKey(self.info.name.clone()).into());
                }
                Err(e) if e.is_key_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let mut buf = Vec::new();
        encoding::encode_row(&row, &mut buf);
        store.put(&row_key, &buf)?;

        for idx in self.tx.table_indexes(&self.info.name)? {
            let index = Index::new(self.tx, idx);
            let values = self.index_values(index.info(), &row);
            index.set(&values, &row_key)?;
        }

        let stored = row.with_source(&self.info.name, &row_key);
        Ok((row_key, stored))
    }

    pub fn get(&self, row_key: &[u8]) -> Result<Row, DBError> {
        let raw = self.store()?.get(row_key)?;
        Ok(encoding::decode_row(&raw)?.with_source(&self.info.name, row_key))
    }

    pub fn delete(&self, row_key: &[u8]) -> Result<(), DBError> {
        self.require_mutable()?;
        let row = self.get(row_key)?;
        for idx in self.tx.table_indexes(&self.info.name)? {
            let index = Index::new(self.tx, idx);
            let values = self.index_values(index.info(), &row);
            index.delete(&values, row_key)?;
        }
        self.store()?.delete(row_key)
    }

    /// Replace the row at `row_key`. The primary key may not change.
    pub fn replace(&self, row_key: &[u8], row: Row) -> Result<Row, DBError> {
        self.require_mutable()?;
        let old = self.get(row_key)?;
        let row = self.normalize(row)?;
        self.run_checks(&row)?;
        if self.info.primary_key.is_some() {
            let new_key = self.derive_key(&row)?;
            if new_key != row_key {
                return Err(DBError::invalid_argument(format!(
                    "cannot change the primary key of a row in `{}`",
                    self.info.name
                )));
            }
        }

        for idx in self.tx.table_indexes(&self.info.name)? {
            let index = Index::new(self.tx, idx);
            let old_values = self.index_values(index.info(), &old);
            index.delete(&old_values, row_key)?;
            let new_values = self.index_values(index.info(), &row);
            index.set(&new_values, row_key)?;
        }

        let mut buf = Vec::new();
        encoding::encode_row(&row, &mut buf);
        self.store()?.put(row_key, &buf)?;
        Ok(row.with_source(&self.info.name, row_key))
    }

    /// Remove every row and every index entry.
    pub fn truncate(&self) -> Result<(), DBError> {
        self.require_mutable()?;
        self.store()?.truncate()?;
        for idx in self.tx.table_indexes(&self.info.name)? {
            Index::new(self.tx, idx).truncate()?;
        }
        Ok(())
    }

    /// Visit rows in key order. `range` bounds are inclusive tuples of
    /// key values.
    pub fn scan(
        &self,
        range: Option<&ScanRange>,
        reverse: bool,
        f: &mut dyn FnMut(&[u8], Row) -> Result<(), DBError>,
    ) -> Result<(), DBError> {
        let store = self.store()?;
        let lower = range.and_then(|r| r.min.as_ref()).map(|v| key::encode(v));
        let upper = range.and_then(|r| r.max.as_ref()).map(|v| key::encode(v));

        let mut it = store.iterator(IterOptions { reverse })?;
        if reverse {
            it.seek(upper.as_deref());
        } else {
            it.seek(lower.as_deref());
        }
        while let Some((k, raw)) = it.entry() {
            let in_range = if reverse {
                lower.as_deref().map_or(true, |l| k >= l)
            } else {
                upper.as_deref().map_or(true, |u| k <= u)
            };
            if !in_range {
                break;
            }
            let row = encoding::decode_row(raw)?.with_source(&self.info.name, k);
            f(k, row)?;
            it.next();
        }
        it.err()
    }

    /// Apply the declared column constraints: reject unknown columns,
    /// coerce to declared types, materialize defaults, enforce NOT NULL.
    /// The result carries the declared columns in declaration order.
    fn normalize(&self, row: Row) -> Result<Row, DBError> {
        if self.info.columns.is_empty() {
            return Ok(row);
        }
        for (name, _) in row.iter() {
            if self.info.get_column(name).is_none() {
                return Err(DBError::invalid_argument(format!(
                    "unknown column `{name}` in table `{}`",
                    self.info.name
                )));
            }
        }
        let mut out = Row::new();
        for c in &self.info.columns {
            let mut v = match row.get(&c.name) {
                Ok(v) => v.clone(),
                Err(_) => match &c.default {
                    Some(d) => {
                        let env = Environment::with_tx(self.tx);
                        d.eval(&env)?
                    }
                    None => Value::Null,
                },
            };
            if !v.is_null() {
                if let Some(ty) = c.ty {
                    v = v.cast_as(ty)?;
                }
            }
            if v.is_null() && c.not_null {
                return Err(ConstraintViolation::NotNull(c.name.clone()).into());
            }
            out.push(c.name.clone(), v);
        }
        Ok(out)
    }

    fn run_checks(&self, row: &Row) -> Result<(), DBError> {
        if self.info.checks.is_empty() {
            return Ok(());
        }
        let mut env = Environment::with_tx(self.tx);
        env.set_row(row.clone());
        for check in &self.info.checks {
            let v = check.eval(&env)?;
            // Null passes: an unknown check is not a violation.
            if !v.is_null() && !filter_matches(&v) {
                return Err(ConstraintViolation::Check(check.to_string()).into());
            }
        }
        Ok(())
    }

    /// The row key: encoded primary-key values, or the next generated
    /// key for tables without one.
    fn derive_key(&self, row: &Row) -> Result<Vec<u8>, DBError> {
        match &self.info.primary_key {
            Some(pk) => {
                let mut values = Vec::with_capacity(pk.columns.len());
                for col in &pk.columns {
                    let v = row.get(col).cloned().unwrap_or(Value::Null);
                    if v.is_null() {
                        return Err(ConstraintViolation::NotNull(col.clone()).into());
                    }
                    values.push(v);
                }
                Ok(key::encode(&values))
            }
            None => {
                let seq = self.info.docid_seq.as_deref().ok_or_else(|| {
                    crate::error::StorageError::Corruption(format!(
                        "table `{}` has neither a primary key nor a key sequence",
                        self.info.name
                    ))
                })?;
                let id = self.tx.next_value(seq)?;
                Ok(key::encode(&[Value::BigInt(id)]))
            }
        }
    }

    fn index_values(&self, idx: &crate::catalog::IndexInfo, row: &Row) -> Vec<Value> {
        idx.paths
            .iter()
            .map(|p| row.get(&p.column).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnConstraint, IndexInfo, IndexPath, TableInfo};
    use crate::database::Database;
    use crate::error::ConstraintViolation;
    use crate::expr::{BinaryOp, Expr};
    use crate::ResultTest;
    use stratadb_types::ValueType;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_insert_get_with_primary_key() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("id", ValueType::BigInt))
                .column(ColumnConstraint::new("name", ValueType::Text))
                .primary_key(["id"]),
        )?;
        let table = tx.table("t")?;
        let (key, stored) = table.insert(row(&[("id", Value::BigInt(1)), ("name", Value::Text("a".into()))]))?;
        assert_eq!(stored.get("name")?, &Value::Text("a".into()));
        let fetched = table.get(&key)?;
        assert_eq!(fetched.get("id")?, &Value::BigInt(1));
        assert_eq!(fetched.source().unwrap().table, "t");

        // duplicate primary key
        let err = table
            .insert(row(&[("id", Value::BigInt(1)), ("name", Value::Text("b".into()))]))
            .unwrap_err();
        assert!(matches!(err, DBError::Constraint(ConstraintViolation::PrimaryKey(_))));
        Ok(())
    }

    #[test]
    fn test_docid_keys_are_sequential() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(TableInfo::new("t").column(ColumnConstraint::new("v", ValueType::Integer)))?;
        let table = tx.table("t")?;
        let (k1, _) = table.insert(row(&[("v", Value::Integer(1))]))?;
        let (k2, _) = table.insert(row(&[("v", Value::Integer(2))]))?;
        assert!(k1 < k2);
        Ok(())
    }

    #[test]
    fn test_type_coercion_and_rejection() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(TableInfo::new("t").column(ColumnConstraint::new("n", ValueType::BigInt)))?;
        let table = tx.table("t")?;
        let (_, stored) = table.insert(row(&[("n", Value::Integer(7))]))?;
        assert!(matches!(stored.get("n")?, Value::BigInt(7)));
        assert!(table.insert(row(&[("n", Value::Text("abc".into()))])).is_err());
        assert!(matches!(
            table.insert(row(&[("missing", Value::Integer(1))])),
            Err(DBError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_not_null_and_default() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("a", ValueType::Integer).not_null())
                .column(
                    ColumnConstraint::new("b", ValueType::Text)
                        .default_expr(Expr::Literal(Value::Text("dflt".into()))),
                ),
        )?;
        let table = tx.table("t")?;
        let (_, stored) = table.insert(row(&[("a", Value::Integer(1))]))?;
        assert_eq!(stored.get("b")?, &Value::Text("dflt".into()));
        assert!(matches!(
            table.insert(row(&[("b", Value::Text("x".into()))])),
            Err(DBError::Constraint(ConstraintViolation::NotNull(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_check_constraint() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("a", ValueType::Integer))
                .check(Expr::binary(
                    BinaryOp::Gt,
                    Expr::column("a"),
                    Expr::Literal(Value::Integer(0)),
                )),
        )?;
        let table = tx.table("t")?;
        assert!(table.insert(row(&[("a", Value::Integer(5))])).is_ok());
        assert!(matches!(
            table.insert(row(&[("a", Value::Integer(-5))])),
            Err(DBError::Constraint(ConstraintViolation::Check(_)))
        ));
        // a Null check result is not a violation
        assert!(table.insert(row(&[])).is_ok());
        Ok(())
    }

    #[test]
    fn test_unique_column_enforced() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t").column(ColumnConstraint::new("email", ValueType::Text).unique()),
        )?;
        let table = tx.table("t")?;
        table.insert(row(&[("email", Value::Text("a@x".into()))]))?;
        assert!(matches!(
            table.insert(row(&[("email", Value::Text("a@x".into()))])),
            Err(DBError::Constraint(ConstraintViolation::Unique(_)))
        ));
        // multiple NULLs are fine under a unique index
        table.insert(row(&[]))?;
        table.insert(row(&[]))?;
        Ok(())
    }

    #[test]
    fn test_delete_and_replace_maintain_indexes() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("id", ValueType::BigInt))
                .column(ColumnConstraint::new("tag", ValueType::Text))
                .primary_key(["id"]),
        )?;
        tx.create_index(IndexInfo {
            name: "t_tag".into(),
            table: "t".into(),
            paths: vec![IndexPath {
                column: "tag".into(),
                ty: ValueType::Text,
            }],
            unique: false,
            store_name: String::new(),
        })?;
        let table = tx.table("t")?;
        let (k1, _) = table.insert(row(&[("id", Value::BigInt(1)), ("tag", Value::Text("x".into()))]))?;
        let (k2, _) = table.insert(row(&[("id", Value::BigInt(2)), ("tag", Value::Text("y".into()))]))?;

        table.replace(&k1, row(&[("id", Value::BigInt(1)), ("tag", Value::Text("z".into()))]))?;
        table.delete(&k2)?;

        let idx_info = tx.get_index("t_tag")?;
        let idx = crate::index::Index::new(&tx, idx_info);
        let mut tags = Vec::new();
        idx.iterate(None, None, false, &mut |row_key| {
            tags.push(table.get(row_key)?.get("tag")?.clone());
            Ok(())
        })?;
        assert_eq!(tags, vec![Value::Text("z".into())]);

        // the primary key cannot change through replace
        assert!(table
            .replace(&k1, row(&[("id", Value::BigInt(9)), ("tag", Value::Text("w".into()))]))
            .is_err());
        Ok(())
    }

    #[test]
    fn test_scan_range_and_direction() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("id", ValueType::BigInt))
                .primary_key(["id"]),
        )?;
        let table = tx.table("t")?;
        for i in 1..=5 {
            table.insert(row(&[("id", Value::BigInt(i))]))?;
        }

        let mut ids = Vec::new();
        table.scan(None, true, &mut |_, r| {
            ids.push(r.get("id")?.as_bigint()?);
            Ok(())
        })?;
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);

        let range = ScanRange {
            min: Some(vec![Value::BigInt(2)]),
            max: Some(vec![Value::BigInt(4)]),
        };
        let mut ids = Vec::new();
        table.scan(Some(&range), false, &mut |_, r| {
            ids.push(r.get("id")?.as_bigint()?);
            Ok(())
        })?;
        assert_eq!(ids, vec![2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_reindex_rebuilds() -> ResultTest<()> {
        let db = setup();
        let tx = db.begin(false)?;
        tx.create_table(
            TableInfo::new("t")
                .column(ColumnConstraint::new("id", ValueType::BigInt))
                .column(ColumnConstraint::new("v", ValueType::Integer))
                .primary_key(["id"]),
        )?;
        let table = tx.table("t")?;
        for i in 1..=3 {
            table.insert(row(&[("id", Value::BigInt(i)), ("v", Value::Integer(i as i32 * 10))]))?;
        }
        tx.create_index(IndexInfo {
            name: "t_v".into(),
            table: "t".into(),
            paths: vec![IndexPath {
                column: "v".into(),
                ty: ValueType::Integer,
            }],
            unique: false,
            store_name: String::new(),
        })?;
        tx.reindex("t_v")?;

        let idx = crate::index::Index::new(&tx, tx.get_index("t_v")?);
        let mut n = 0;
        idx.iterate(None, None, false, &mut |_| {
            n += 1;
            Ok(())
        })?;
        assert_eq!(n, 3);
        Ok(())
    }
}
