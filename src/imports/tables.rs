use super::ImportError;
use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::config::{Configuration, HeaderMap, Table};
use crate::model::transaction::{
    Acquisition, AcquisitionInput, Disposal, DisposalInput, LineId, MalformedInputError,
    Transaction, TransactionType, Transfer, TransferInput,
};
use chrono::{DateTime, Utc};
use csv::StringRecord;
use std::io::Read;
use std::{fs::File, path::PathBuf};
use tracing::debug;

/// The three CSV tables of one run, in line-id assignment order.
#[derive(Clone, Debug)]
pub struct TablePaths {
    pub acquisitions: PathBuf,
    pub disposals: PathBuf,
    pub transfers: PathBuf,
}

/// Read all three tables, assigning dense line ids in file order:
/// acquisitions first, then disposals, then transfers.
pub fn read_tables(
    configuration: &Configuration,
    paths: &TablePaths,
) -> Result<Vec<Transaction>, ImportError> {
    let mut transactions = Vec::new();
    let mut next_line = 1;

    read_table(
        configuration,
        File::open(&paths.acquisitions)?,
        Table::Acquisitions,
        &mut next_line,
        &mut transactions,
    )?;
    read_table(
        configuration,
        File::open(&paths.disposals)?,
        Table::Disposals,
        &mut next_line,
        &mut transactions,
    )?;
    read_table(
        configuration,
        File::open(&paths.transfers)?,
        Table::Transfers,
        &mut next_line,
        &mut transactions,
    )?;

    debug!("imported {} transactions", transactions.len());
    Ok(transactions)
}

/// Read one table from any reader. The file's own header row is skipped; the
/// configuration's column map is the authority on layout.
pub fn read_table<R: Read>(
    configuration: &Configuration,
    reader: R,
    table: Table,
    next_line: &mut u32,
    into: &mut Vec<Transaction>,
) -> Result<(), ImportError> {
    let header = configuration.header(table);
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    for record in csv_reader.records() {
        let record = record?;
        let line = LineId(*next_line);
        *next_line += 1;

        let transaction = match table {
            Table::Acquisitions => Transaction::Acquisition(parse_acquisition(
                configuration,
                header,
                &record,
                line,
            )?),
            Table::Disposals => {
                Transaction::Disposal(parse_disposal(configuration, header, &record, line)?)
            }
            Table::Transfers => {
                Transaction::Transfer(parse_transfer(configuration, header, &record, line)?)
            }
        };
        into.push(transaction);
    }

    Ok(())
}

fn parse_acquisition(
    configuration: &Configuration,
    header: &HeaderMap,
    record: &StringRecord,
    line: LineId,
) -> Result<Acquisition, ImportError> {
    let input = AcquisitionInput {
        timestamp: required_timestamp(record, header, line)?,
        asset: required_cell(record, header, "asset", line)?.to_owned(),
        exchange: required_cell(record, header, "exchange", line)?.to_owned(),
        holder: required_cell(record, header, "holder", line)?.to_owned(),
        transaction_type: Some(required_type(record, header, line)?),
        spot_price: required_fiat(record, header, "spot_price", line)?,
        crypto_in: required_crypto(record, header, "crypto_in", line)?,
        crypto_fee: optional_crypto(record, header, "crypto_fee", line)?,
        fiat_in_no_fee: optional_fiat(record, header, "fiat_in_no_fee", line)?,
        fiat_in_with_fee: optional_fiat(record, header, "fiat_in_with_fee", line)?,
        fiat_fee: optional_fiat(record, header, "fiat_fee", line)?,
        line,
        unique_id: optional_cell(record, header, "unique_id").map(str::to_owned),
        notes: optional_cell(record, header, "notes").map(str::to_owned),
    };

    Ok(Acquisition::new(configuration, input)?)
}

fn parse_disposal(
    configuration: &Configuration,
    header: &HeaderMap,
    record: &StringRecord,
    line: LineId,
) -> Result<Disposal, ImportError> {
    let input = DisposalInput {
        timestamp: required_timestamp(record, header, line)?,
        asset: required_cell(record, header, "asset", line)?.to_owned(),
        exchange: required_cell(record, header, "exchange", line)?.to_owned(),
        holder: required_cell(record, header, "holder", line)?.to_owned(),
        transaction_type: Some(required_type(record, header, line)?),
        spot_price: required_fiat(record, header, "spot_price", line)?,
        crypto_out_no_fee: required_crypto(record, header, "crypto_out_no_fee", line)?,
        crypto_fee: required_crypto(record, header, "crypto_fee", line)?,
        crypto_out_with_fee: optional_crypto(record, header, "crypto_out_with_fee", line)?,
        fiat_out_no_fee: optional_fiat(record, header, "fiat_out_no_fee", line)?,
        fiat_fee: optional_fiat(record, header, "fiat_fee", line)?,
        line,
        unique_id: optional_cell(record, header, "unique_id").map(str::to_owned),
        notes: optional_cell(record, header, "notes").map(str::to_owned),
    };

    Ok(Disposal::new(configuration, input)?)
}

fn parse_transfer(
    configuration: &Configuration,
    header: &HeaderMap,
    record: &StringRecord,
    line: LineId,
) -> Result<Transfer, ImportError> {
    let input = TransferInput {
        timestamp: required_timestamp(record, header, line)?,
        asset: required_cell(record, header, "asset", line)?.to_owned(),
        from_exchange: required_cell(record, header, "from_exchange", line)?.to_owned(),
        from_holder: required_cell(record, header, "from_holder", line)?.to_owned(),
        to_exchange: required_cell(record, header, "to_exchange", line)?.to_owned(),
        to_holder: required_cell(record, header, "to_holder", line)?.to_owned(),
        spot_price: optional_fiat(record, header, "spot_price", line)?,
        crypto_sent: required_crypto(record, header, "crypto_sent", line)?,
        crypto_received: required_crypto(record, header, "crypto_received", line)?,
        line,
        unique_id: optional_cell(record, header, "unique_id").map(str::to_owned),
        notes: optional_cell(record, header, "notes").map(str::to_owned),
    };

    Ok(Transfer::new(configuration, input)?)
}

/// A mapped cell with content, if the column is mapped and non-empty.
fn optional_cell<'r>(
    record: &'r StringRecord,
    header: &HeaderMap,
    field: &str,
) -> Option<&'r str> {
    let column = *header.get(field)?;
    let cell = record.get(column)?.trim();
    (!cell.is_empty()).then_some(cell)
}

fn required_cell<'r>(
    record: &'r StringRecord,
    header: &HeaderMap,
    field: &str,
    line: LineId,
) -> Result<&'r str, MalformedInputError> {
    optional_cell(record, header, field).ok_or_else(|| MalformedInputError::MissingCell {
        line,
        field: field.to_owned(),
    })
}

fn required_timestamp(
    record: &StringRecord,
    header: &HeaderMap,
    line: LineId,
) -> Result<DateTime<Utc>, MalformedInputError> {
    let cell = required_cell(record, header, "timestamp", line)?;
    DateTime::parse_from_rfc3339(cell)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| MalformedInputError::BadTimestamp {
            line,
            value: cell.to_owned(),
        })
}

fn required_type(
    record: &StringRecord,
    header: &HeaderMap,
    line: LineId,
) -> Result<TransactionType, MalformedInputError> {
    let cell = required_cell(record, header, "transaction_type", line)?;
    cell.parse()
        .map_err(|_| MalformedInputError::UnknownTransactionType {
            line,
            value: cell.to_owned(),
        })
}

fn required_crypto(
    record: &StringRecord,
    header: &HeaderMap,
    field: &'static str,
    line: LineId,
) -> Result<CryptoAmount, MalformedInputError> {
    required_cell(record, header, field, line)?
        .parse()
        .map_err(|_| MalformedInputError::NonNumericCell {
            line,
            field: field.to_owned(),
        })
}

fn optional_crypto(
    record: &StringRecord,
    header: &HeaderMap,
    field: &'static str,
    line: LineId,
) -> Result<Option<CryptoAmount>, MalformedInputError> {
    optional_cell(record, header, field)
        .map(|cell| {
            cell.parse()
                .map_err(|_| MalformedInputError::NonNumericCell {
                    line,
                    field: field.to_owned(),
                })
        })
        .transpose()
}

fn required_fiat(
    record: &StringRecord,
    header: &HeaderMap,
    field: &'static str,
    line: LineId,
) -> Result<FiatAmount, MalformedInputError> {
    required_cell(record, header, field, line)?
        .parse()
        .map_err(|_| MalformedInputError::NonNumericCell {
            line,
            field: field.to_owned(),
        })
}

fn optional_fiat(
    record: &StringRecord,
    header: &HeaderMap,
    field: &'static str,
    line: LineId,
) -> Result<Option<FiatAmount>, MalformedInputError> {
    optional_cell(record, header, field)
        .map(|cell| {
            cell.parse()
                .map_err(|_| MalformedInputError::NonNumericCell {
                    line,
                    field: field.to_owned(),
                })
        })
        .transpose()
}
