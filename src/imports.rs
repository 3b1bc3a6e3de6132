//! File front end: CSV transaction tables and the RON configuration.
//!
//! This layer owns cell-to-value conversion and dense line-id assignment;
//! everything downstream works on validated, typed transactions.

use crate::model::transaction::{MalformedInputError, TransactionError};
use thiserror::Error;

pub mod tables;

pub use tables::{read_tables, TablePaths};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Malformed(#[from] MalformedInputError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
