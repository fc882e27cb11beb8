//! Error types shared by the whole crate.

use thiserror::Error;

/// Everything that can abort model construction or a search run.
///
/// Reaching a label marked as error is *not* represented here: it is a regular
/// search outcome and is reported through the search results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("solver could not decide {context}")]
    SolverIndeterminate { context: String },

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("malformed encoded record at line {line}: {reason}")]
    Encoding { line: usize, reason: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("'{0}' is not a declared state variable")]
    UndeclaredVariable(String),

    #[error("constructor labels cannot be combined with explicit initial values")]
    ConstructorWithInit,

    #[error("cannot unroll depth {0}, iterations start at depth 1")]
    InvalidDepth(usize),

    #[error("unknown transition label: {0}")]
    UnknownLabel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn indeterminate(context: impl Into<String>) -> Self {
        Error::SolverIndeterminate {
            context: context.into(),
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            line,
            reason: reason.into(),
        }
    }
}
