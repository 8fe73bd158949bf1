//! Error types for the reconciliation engine

use thiserror::Error;

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Store error
    #[error("Store error: {0}")]
    Store(expense_core::Error),

    /// Rejected before any state mutation; retry with corrected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing user, group, expense or debt row; no partial mutation performed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate-resource conflict, raised by external collaborators
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal invariant violation (conservation, incremental/full
    /// divergence); fatal to the operation, nothing is committed
    #[error("Reconciliation inconsistency: {0}")]
    ReconciliationInconsistency(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<expense_core::Error> for Error {
    fn from(err: expense_core::Error) -> Self {
        // Missing-row errors surface as NotFound per the engine taxonomy
        match err {
            expense_core::Error::ExpenseNotFound(id) => {
                Error::NotFound(format!("Expense not found: {}", id))
            }
            expense_core::Error::GroupNotFound(id) => {
                Error::NotFound(format!("Group not found: {}", id))
            }
            other => Error::Store(other),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
