//! Rows: ordered column → value mappings.
//!
//! A [`Row`] is both the read view of a stored record and the growable
//! scratch buffer used by projection and aggregation. Column names are
//! looked up from the back so that on duplicate names the last occurrence
//! wins.

use crate::error::ValueError;
use crate::value::Value;
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub value: Value,
}

/// Provenance of a row decoded from a table store, carried so that
/// downstream operators (sort, delete) can refer back to the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSource {
    pub table: String,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: SmallVec<[Column; 8]>,
    source: Option<RowSource>,
}

impl Row {
    pub fn new() -> Row {
        Row::default()
    }

    pub fn with_source(mut self, table: &str, key: &[u8]) -> Row {
        self.source = Some(RowSource {
            table: table.to_owned(),
            key: key.to_owned(),
        });
        self
    }

    pub fn source(&self) -> Option<&RowSource> {
        self.source.as_ref()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a column by name; the last occurrence wins.
    pub fn get(&self, column: &str) -> Result<&Value, ValueError> {
        self.columns
            .iter()
            .rev()
            .find(|c| c.name == column)
            .map(|c| &c.value)
            .ok_or_else(|| ValueError::ColumnNotFound(column.to_owned()))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    /// Append a column, keeping any existing one with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push(Column {
            name: name.into(),
            value,
        });
    }

    /// Replace the value of `name`, appending when absent.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.columns.iter_mut().rev().find(|c| c.name == name) {
            Some(col) => col.value = value,
            None => self.push(name, value),
        }
    }

    /// Visit columns in declared order.
    pub fn iterate(
        &self,
        f: &mut dyn FnMut(&str, &Value) -> Result<(), ValueError>,
    ) -> Result<(), ValueError> {
        for c in &self.columns {
            f(&c.name, &c.value)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|c| (c.name.as_str(), &c.value))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Owned copy detached from any backing storage.
    pub fn clone_owned(&self) -> Row {
        self.clone()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Row {
        let mut row = Row::new();
        for (name, value) in iter {
            row.push(name, value);
        }
        row
    }
}

impl<'a> FromIterator<(&'a str, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (&'a str, Value)>>(iter: T) -> Row {
        iter.into_iter().map(|(n, v)| (n.to_owned(), v)).collect()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", c.name, c.value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_last_wins() {
        let mut row = Row::new();
        row.push("a", Value::Integer(1));
        row.push("b", Value::Integer(2));
        row.push("a", Value::Integer(3));
        assert_eq!(row.get("a").unwrap(), &Value::Integer(3));
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_get_missing() {
        let row: Row = [("a", Value::Integer(1))].into_iter().collect();
        assert_eq!(
            row.get("missing"),
            Err(ValueError::ColumnNotFound("missing".into()))
        );
    }

    #[test]
    fn test_set_replaces() {
        let mut row: Row = [("a", Value::Integer(1))].into_iter().collect();
        row.set("a", Value::Integer(9));
        row.set("b", Value::Boolean(true));
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("a").unwrap(), &Value::Integer(9));
    }

    #[test]
    fn test_iterate_declared_order() {
        let row: Row = [
            ("z", Value::Integer(1)),
            ("a", Value::Integer(2)),
            ("m", Value::Integer(3)),
        ]
        .into_iter()
        .collect();
        let mut names = Vec::new();
        row.iterate(&mut |name, _| {
            names.push(name.to_owned());
            Ok(())
        })
        .unwrap();
        assert_eq!(names, ["z", "a", "m"]);
    }
}
