//! The closed error taxonomy, re-exported from the modules that raise each
//! kind. Every variant that can point at an input row carries its [`LineId`].
//!
//! [`LineId`]: crate::model::transaction::LineId

pub use crate::engine::{AcquiredLotsExhaustedError, EngineError};
pub use crate::imports::ImportError;
pub use crate::methods::UnknownMethodError;
pub use crate::model::balance::BalanceUnderflowError;
pub use crate::model::config::{ConfigurationError, UnknownReferenceError};
pub use crate::model::entry_set::OrderingError;
pub use crate::model::transaction::{
    InconsistentAmountError, MalformedInputError, TransactionError,
};
pub use crate::transform::TransformError;

use thiserror::Error;

/// Umbrella over every failure the library can produce, for callers that
/// drive the whole pipeline through one `Result` type.
#[derive(Debug, Error)]
pub enum TaxError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),

    #[error(transparent)]
    UnknownReference(#[from] UnknownReferenceError),

    #[error(transparent)]
    InconsistentAmount(#[from] InconsistentAmountError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    LotsExhausted(#[from] AcquiredLotsExhaustedError),

    #[error(transparent)]
    BalanceUnderflow(#[from] BalanceUnderflowError),

    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethodError),

    #[error(transparent)]
    Import(#[from] ImportError),

    /// An internal cross-check failed; the asset's results are unusable.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransactionError> for TaxError {
    fn from(value: TransactionError) -> Self {
        match value {
            TransactionError::Malformed(err) => Self::MalformedInput(err),
            TransactionError::Inconsistent(err) => Self::InconsistentAmount(err),
            TransactionError::UnknownReference(err) => Self::UnknownReference(err),
        }
    }
}

impl From<TransformError> for TaxError {
    fn from(value: TransformError) -> Self {
        match value {
            TransformError::Ordering(err) => Self::Ordering(err),
            TransformError::Transaction(err) => err.into(),
        }
    }
}

impl From<EngineError> for TaxError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::LotsExhausted(err) => Self::LotsExhausted(err),
            EngineError::BalanceUnderflow(err) => Self::BalanceUnderflow(err),
            incongruence @ EngineError::Incongruence { .. } => {
                Self::Internal(incongruence.to_string())
            }
        }
    }
}
