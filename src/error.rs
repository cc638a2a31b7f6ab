use std::fmt;

use crate::trace::TraceId;

/// Errors surfaced by replay and analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A trace event names a variable or field that cannot be resolved.
    UnresolvedReference {
        id: TraceId,
        name: String,
        field: Option<String>,
    },
    /// A pointer-state graph failed its consistency check.
    InvariantViolation { reason: String, dump: String },
    /// The formula encoded from a pointer-state graph is unsatisfiable.
    Contradiction { dump: String },
    /// The solver exceeded its recursion cap.
    SolverLimit { depth: usize },
    /// The trace header does not declare one or two fields.
    InvalidHeader { fields: Vec<String> },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnresolvedReference { id, name, field: None } => {
                write!(f, "event {}: unresolved reference to '{}'", id, name)
            }
            Error::UnresolvedReference {
                id,
                name,
                field: Some(field),
            } => {
                write!(f, "event {}: unresolved reference to '{}->{}'", id, name, field)
            }
            Error::InvariantViolation { reason, dump } => {
                write!(f, "invariant violation: {}\n{}", reason, dump)
            }
            Error::Contradiction { dump } => {
                write!(f, "model contradiction: formula is unsatisfiable\n{}", dump)
            }
            Error::SolverLimit { depth } => {
                write!(f, "solver recursion exceeded depth {}", depth)
            }
            Error::InvalidHeader { fields } => {
                write!(f, "header must declare one or two fields, got {:?}", fields)
            }
        }
    }
}

impl std::error::Error for Error {}
