use thiserror::Error;

use crate::path::Path;
use crate::value::Value;

/// What went wrong while evaluating a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("unbound variable `{0}`")]
    UnboundVariable(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("arity mismatch: expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("sensor `{0}` unavailable")]
    SensorUnavailable(String),
    #[error("neighbor value read outside of a neighbor fold")]
    UnalignedRead,
}

impl ErrorKind {
    /// Stable short name, used as a metric label.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::UnboundVariable(_) => "unbound_variable",
            ErrorKind::TypeMismatch { .. } => "type_mismatch",
            ErrorKind::ArityMismatch { .. } => "arity_mismatch",
            ErrorKind::SensorUnavailable(_) => "sensor_unavailable",
            ErrorKind::UnalignedRead => "unaligned_read",
        }
    }

    pub(crate) fn mismatch(expected: &'static str, found: &Value) -> Self {
        ErrorKind::TypeMismatch { expected, found: found.type_name() }
    }
}

/// An [`ErrorKind`] located at the path where evaluation stopped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {path}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub path: Path,
}

impl EvalError {
    pub fn new(kind: ErrorKind, path: Path) -> Self { Self { kind, path } }
}
