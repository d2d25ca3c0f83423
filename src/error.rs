use thiserror::Error;

/// Errors raised while building datasets, binding filters or managing cohorts.
///
/// Every variant is recoverable: the operation that produced it left the
/// cohort or list untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CohortError {
    /// A filter names a column the dataset does not have.
    #[error("Unknown column {0} specified in cohort filter")]
    UnknownColumn(String),

    /// Operand arity or shape does not fit the filter method.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Operand or column type does not fit the filter method.
    #[error("Type mismatch on column '{column}': expected {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Row {row} out of range [0, {len})")]
    RowOutOfRange { row: usize, len: usize },

    #[error("A cohort named '{0}' already exists")]
    DuplicateName(String),

    #[error("No cohort named '{0}'")]
    NotFound(String),

    /// The requested order is not a permutation of the current cohorts.
    #[error("Invalid cohort order: {0}")]
    InvalidOrder(String),

    /// Columns of unequal length, mixed value types, or bad label designation.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),
}

pub type Result<T> = std::result::Result<T, CohortError>;
