//! The embedded database surface.
//!
//! [`Database`] wires the storage engine and the catalog together:
//! open bootstraps and loads the catalog, `begin` hands out
//! transactions, and the query helpers drive operator pipelines with
//! user parameters, in a transaction of the caller's or in autocommit.

use crate::cancel::CancelHandle;
use crate::catalog::{self, CATALOG_STORE};
use crate::environment::{Environment, Params};
use crate::error::DBError;
use crate::storage::{Config, Engine, IterOptions, Transaction, TxOptions};
use crate::stream::Stream;
use std::sync::Arc;
use stratadb_types::{encoding, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// The engine's native isolation: snapshot reads, one writer.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub read_only: bool,
    pub isolation: IsolationLevel,
    pub cancel: CancelHandle,
}

pub struct Database {
    engine: Engine,
}

impl Database {
    /// Open a database: open the engine, bootstrap the reserved stores
    /// on first use and load the catalog cache.
    pub fn open(config: Config) -> Result<Database, DBError> {
        let engine = Engine::open(config)?;
        let db = Database { engine };
        {
            let tx = db.engine.begin_write()?;
            if catalog::bootstrap(&tx)? {
                tx.commit()?;
            } else {
                tx.rollback()?;
            }
        }
        db.reload_catalog()?;
        Ok(db)
    }

    /// In-memory database, always fresh.
    pub fn open_in_memory() -> Result<Database, DBError> {
        Database::open(Config::in_memory())
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn begin(&self, read_only: bool) -> Result<Transaction, DBError> {
        self.begin_with(SessionOptions {
            read_only,
            ..SessionOptions::default()
        })
    }

    /// Begin with explicit options. Isolation levels other than the
    /// default are rejected.
    pub fn begin_with(&self, opts: SessionOptions) -> Result<Transaction, DBError> {
        if opts.isolation != IsolationLevel::Default {
            return Err(DBError::IsolationUnsupported);
        }
        self.engine.begin(TxOptions {
            writable: !opts.read_only,
            cancel: opts.cancel,
        })
    }

    /// Run `f` in a writable transaction, committing on success and
    /// rolling back on error.
    pub fn with_write_tx<R>(&self, f: impl FnOnce(&Transaction) -> Result<R, DBError>) -> Result<R, DBError> {
        let tx = self.begin(false)?;
        match f(&tx) {
            Ok(r) => {
                tx.commit()?;
                Ok(r)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    /// Prepare a pipeline for repeated execution with different
    /// parameters.
    pub fn prepare(&self, stream: Stream) -> Prepared {
        Prepared { stream }
    }

    /// Run a query pipeline in a fresh read-only transaction.
    pub fn query(&self, stream: &Stream, params: Params) -> Result<QueryResult, DBError> {
        let tx = self.begin(true)?;
        let result = self.query_in(&tx, stream, params);
        let _ = tx.rollback();
        result
    }

    /// Run a query pipeline inside the caller's transaction.
    ///
    /// A `KeyNotFound` escaping a user query flattens into an empty
    /// result; every other error surfaces verbatim.
    pub fn query_in(
        &self,
        tx: &Transaction,
        stream: &Stream,
        params: Params,
    ) -> Result<QueryResult, DBError> {
        let env = Environment::root(self, tx, params);
        let mut rows: Vec<Row> = Vec::new();
        let outcome = stream.execute(&env, &mut |e: &Environment<'_>| {
            if let Some(row) = e.current_row() {
                rows.push(row.clone_owned());
            }
            Ok(())
        });
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_key_not_found() => rows.clear(),
            Err(e) => return Err(e),
        }
        let columns = rows
            .first()
            .map(|r| r.column_names().map(str::to_owned).collect())
            .unwrap_or_default();
        Ok(QueryResult { columns, rows })
    }

    /// Run a side-effecting pipeline in autocommit: a writable
    /// transaction that commits when the pipeline completes and rolls
    /// back when it fails.
    pub fn exec(&self, stream: &Stream, params: Params) -> Result<(), DBError> {
        self.with_write_tx(|tx| {
            let env = Environment::root(self, tx, params);
            stream.execute(&env, &mut |_: &Environment<'_>| Ok(()))
        })
    }

    /// Tables visible to a fresh transaction, reserved ones included.
    pub fn table_names(&self) -> Vec<String> {
        self.engine.inner.catalog.read().table_names()
    }

    pub fn close(&self) -> Result<(), DBError> {
        self.engine.close()
    }

    /// Rebuild the in-memory catalog from the persisted catalog store.
    fn reload_catalog(&self) -> Result<(), DBError> {
        let tx = self.engine.begin_read()?;
        let store = tx.get_store(CATALOG_STORE)?;
        let mut it = store.iterator(IterOptions::default())?;
        it.seek(None);
        let mut rows = Vec::new();
        while let Some((_, raw)) = it.entry() {
            rows.push(encoding::decode_row(raw)?);
            it.next();
        }
        it.err()?;
        let loaded = catalog::load(rows.into_iter())?;
        *self.engine.inner.catalog.write() = Arc::new(loaded);
        tx.rollback()
    }
}

pub struct Prepared {
    stream: Stream,
}

impl Prepared {
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn query(&self, db: &Database, params: Params) -> Result<QueryResult, DBError> {
        db.query(&self.stream, params)
    }

    pub fn query_in(
        &self,
        db: &Database,
        tx: &Transaction,
        params: Params,
    ) -> Result<QueryResult, DBError> {
        db.query_in(tx, &self.stream, params)
    }

    pub fn exec(&self, db: &Database, params: Params) -> Result<(), DBError> {
        db.exec(&self.stream, params)
    }
}

/// A fully drained result set.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl QueryResult {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_stream(self) -> RowStream {
        RowStream {
            columns: self.columns,
            rows: self.rows.into_iter(),
        }
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Pull-style row stream, the shape driver adapters consume.
pub struct RowStream {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

impl RowStream {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// `None` is end of stream.
    pub fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    pub fn close(self) {}
}
