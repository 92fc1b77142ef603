use crate::value::ValueType;
use thiserror::Error;

/// Errors produced by the value and row layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("column `{0}` not found")]
    ColumnNotFound(String),
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: ValueType, got: ValueType },
    #[error("{0} value out of range")]
    Overflow(ValueType),
    #[error("division by zero")]
    DivisionByZero,
    #[error("cannot cast {from} as {to}")]
    InvalidCast { from: ValueType, to: ValueType },
    #[error("corrupted encoding: {0}")]
    Corruption(String),
}

impl ValueError {
    pub(crate) fn mismatch(expected: ValueType, got: ValueType) -> Self {
        Self::TypeMismatch { expected, got }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}
