//! Input transformer: runs once between parsing and engine invocation.
//!
//! Crypto-fee acquisitions are expanded into the acquisition plus a synthetic
//! fee-only disposal, inter-account transfers into synthetic move-typed
//! disposals on the sending account, and the resulting stream is partitioned
//! into sealed per-asset entry sets.

use crate::model::config::Configuration;
use crate::model::entry_set::{EntrySet, OrderingError};
use crate::model::input_data::InputData;
use crate::model::transaction::{
    Acquisition, Disposal, DisposalInput, Entry as _, LineId, Transaction, TransactionError,
    TransactionType, Transfer,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Split the mixed transaction stream into per-asset sealed entry sets,
/// synthesizing the disposals that fees imply.
///
/// Synthetic disposals receive fresh line ids past the end of the parsed
/// range, assigned in source order: at equal timestamps they sort right
/// after the transaction they were derived from.
pub fn transform(
    configuration: &Configuration,
    transactions: Vec<Transaction>,
) -> Result<Vec<InputData>, TransformError> {
    let mut next_line = transactions
        .iter()
        .map(|transaction| transaction.line().0 + 1)
        .max()
        .unwrap_or(0);

    let mut partitions: BTreeMap<String, Partition> = BTreeMap::new();

    for transaction in transactions {
        let partition = partitions
            .entry(transaction.asset().to_owned())
            .or_insert_with(|| Partition::new(transaction.asset()));

        match transaction {
            Transaction::Acquisition(acquisition) => {
                if !acquisition.crypto_fee().is_zero() {
                    let synthetic = fee_disposal(configuration, &acquisition, LineId(next_line))?;
                    next_line += 1;
                    partition.disposals.insert(synthetic)?;
                }
                partition.acquisitions.insert(acquisition)?;
            }
            Transaction::Disposal(disposal) => {
                partition.disposals.insert(disposal)?;
            }
            Transaction::Transfer(transfer) => {
                let synthetic = move_disposal(configuration, &transfer, LineId(next_line))?;
                next_line += 1;
                partition.disposals.insert(synthetic)?;
                partition.transfers.insert(transfer)?;
            }
        }
    }

    Ok(partitions
        .into_values()
        .map(|partition| {
            debug!(
                "{}: {} acquisitions, {} disposals, {} transfers",
                partition.acquisitions.asset(),
                partition.acquisitions.len(),
                partition.disposals.len(),
                partition.transfers.len(),
            );
            InputData::new(
                partition.acquisitions,
                partition.disposals,
                partition.transfers,
            )
        })
        .collect())
}

struct Partition {
    acquisitions: EntrySet<Acquisition>,
    disposals: EntrySet<Disposal>,
    transfers: EntrySet<Transfer>,
}

impl Partition {
    fn new(asset: &str) -> Self {
        Self {
            acquisitions: EntrySet::new(asset),
            disposals: EntrySet::new(asset),
            transfers: EntrySet::new(asset),
        }
    }
}

/// The crypto fee of an acquisition is crypto leaving the user's hands: a
/// fee-only disposal at the acquisition's own spot price and account.
fn fee_disposal(
    configuration: &Configuration,
    acquisition: &Acquisition,
    line: LineId,
) -> Result<Disposal, TransactionError> {
    Disposal::synthetic(
        configuration,
        TransactionType::Fee,
        DisposalInput {
            timestamp: acquisition.timestamp(),
            asset: acquisition.asset().to_owned(),
            exchange: acquisition.exchange().to_owned(),
            holder: acquisition.holder().to_owned(),
            spot_price: acquisition.spot_price(),
            crypto_fee: acquisition.crypto_fee(),
            line,
            notes: Some(format!("crypto fee of line {}", acquisition.line())),
            ..Default::default()
        },
    )
}

/// The fee of a transfer is the only taxable part of the move; the principal
/// keeps its cost basis and never re-enters as a new lot.
fn move_disposal(
    configuration: &Configuration,
    transfer: &Transfer,
    line: LineId,
) -> Result<Disposal, TransactionError> {
    Disposal::synthetic(
        configuration,
        TransactionType::Move,
        DisposalInput {
            timestamp: transfer.timestamp(),
            asset: transfer.asset().to_owned(),
            exchange: transfer.from_exchange().to_owned(),
            holder: transfer.from_holder().to_owned(),
            spot_price: transfer.spot_price(),
            crypto_fee: transfer.crypto_fee(),
            line,
            notes: Some(format!("transfer fee of line {}", transfer.line())),
            ..Default::default()
        },
    )
}
