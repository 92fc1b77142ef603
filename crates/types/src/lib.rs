//! Value, row and encoding model for StrataDB.
//!
//! This crate is deliberately free of any storage or execution concern:
//! it defines what a scalar value is, how values compare, how rows are
//! shaped, and the two byte encodings the engine persists (the
//! order-preserving key form and the self-describing record form).

pub mod arith;
pub mod encoding;
pub mod error;
pub mod key;
pub mod row;
pub mod value;

pub use error::ValueError;
pub use row::{Column, Row, RowSource};
pub use value::{Value, ValueType};
