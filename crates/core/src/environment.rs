//! Evaluation environments.
//!
//! An [`Environment`] is one stack frame of expression evaluation: the
//! current row, local variable bindings, user parameters, and handles to
//! the transaction and database. Frames link to their enclosing frame;
//! lookups walk outward, which is what gives subqueries access to the
//! outer row and parameters.

use crate::database::Database;
use crate::storage::Transaction;
use stratadb_types::{Row, Value};

/// User-supplied statement parameters.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Params {
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Params {
        Params {
            positional: values.into_iter().collect(),
            ..Params::default()
        }
    }

    pub fn named(values: impl IntoIterator<Item = (String, Value)>) -> Params {
        Params {
            named: values.into_iter().collect(),
            ..Params::default()
        }
    }
}

#[derive(Default)]
pub struct Environment<'a> {
    row: Option<Row>,
    vars: Row,
    params: Params,
    tx: Option<&'a Transaction>,
    db: Option<&'a Database>,
    outer: Option<&'a Environment<'a>>,
}

impl<'a> Environment<'a> {
    pub fn new() -> Environment<'a> {
        Environment::default()
    }

    /// The root frame of a statement execution.
    pub fn root(db: &'a Database, tx: &'a Transaction, params: Params) -> Environment<'a> {
        Environment {
            params,
            tx: Some(tx),
            db: Some(db),
            ..Environment::default()
        }
    }

    /// A child frame enclosing `outer`, as created by each operator and
    /// by subquery evaluation.
    pub fn child(outer: &'a Environment<'a>) -> Environment<'a> {
        Environment {
            outer: Some(outer),
            ..Environment::default()
        }
    }

    /// A frame carrying only a transaction handle, used for expression
    /// evaluation outside a statement (defaults, check constraints).
    pub fn with_tx(tx: &'a Transaction) -> Environment<'a> {
        Environment {
            tx: Some(tx),
            ..Environment::default()
        }
    }

    /// A frame carrying only user parameters.
    pub fn with_params(params: Params) -> Environment<'a> {
        Environment {
            params,
            ..Environment::default()
        }
    }

    pub fn set_row(&mut self, row: Row) {
        self.row = Some(row);
    }

    pub fn take_row(&mut self) -> Option<Row> {
        self.row.take()
    }

    /// The row closest to this frame, walking outward.
    pub fn current_row(&self) -> Option<&Row> {
        match &self.row {
            Some(r) => Some(r),
            None => self.outer.and_then(|o| o.current_row()),
        }
    }

    /// Local variables first, then the enclosing frames.
    pub fn get_var(&self, name: &str) -> Option<&Value> {
        match self.vars.get(name) {
            Ok(v) => Some(v),
            Err(_) => self.outer.and_then(|o| o.get_var(name)),
        }
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.vars.set(name, value);
    }

    /// 1-based positional parameter lookup, walking outward.
    pub fn get_param_by_index(&self, index: usize) -> Option<&Value> {
        if index >= 1 {
            if let Some(v) = self.params.positional.get(index - 1) {
                return Some(v);
            }
        }
        self.outer.and_then(|o| o.get_param_by_index(index))
    }

    pub fn get_param_by_name(&self, name: &str) -> Option<&Value> {
        let local = self
            .params
            .named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v);
        match local {
            Some(v) => Some(v),
            None => self.outer.and_then(|o| o.get_param_by_name(name)),
        }
    }

    pub fn get_tx(&self) -> Option<&'a Transaction> {
        match self.tx {
            Some(tx) => Some(tx),
            None => self.outer.and_then(|o| o.get_tx()),
        }
    }

    pub fn get_db(&self) -> Option<&'a Database> {
        match self.db {
            Some(db) => Some(db),
            None => self.outer.and_then(|o| o.get_db()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_walks_outward() {
        let mut outer = Environment::new();
        outer.set_row([("a", Value::Integer(1))].into_iter().collect());
        let inner = Environment::child(&outer);
        assert_eq!(inner.current_row().unwrap().get("a").unwrap(), &Value::Integer(1));

        let mut shadowing = Environment::child(&outer);
        shadowing.set_row([("a", Value::Integer(2))].into_iter().collect());
        assert_eq!(
            shadowing.current_row().unwrap().get("a").unwrap(),
            &Value::Integer(2)
        );
    }

    #[test]
    fn test_vars_shadow_outer() {
        let mut outer = Environment::new();
        outer.set_var("g", Value::Integer(1));
        let mut inner = Environment::child(&outer);
        assert_eq!(inner.get_var("g"), Some(&Value::Integer(1)));
        inner.set_var("g", Value::Integer(2));
        assert_eq!(inner.get_var("g"), Some(&Value::Integer(2)));
        assert_eq!(outer.get_var("g"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_params_walk_outward() {
        let mut outer = Environment::new();
        outer.params = Params::positional([Value::Text("x".into())]);
        let inner = Environment::child(&outer);
        assert_eq!(inner.get_param_by_index(1), Some(&Value::Text("x".into())));
        assert_eq!(inner.get_param_by_index(2), None);
        assert_eq!(inner.get_param_by_index(0), None);
    }
}
