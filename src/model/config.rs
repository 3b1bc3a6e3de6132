use crate::model::amount::FiatAmount;
use crate::model::transaction::LineId;
use chrono::NaiveDate;
use ron::de::SpannedError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Unable to deserialize")]
    Deserialize(#[from] SpannedError),

    #[error("The `{table}` header is missing mandatory field `{field}`")]
    MissingField { table: Table, field: &'static str },

    #[error("The `{table}` header maps two fields to column {column}")]
    DuplicateColumn { table: Table, column: usize },

    #[error("The `{0}` set is empty")]
    EmptySet(&'static str),

    #[error("Time window is inverted: {from} > {to}")]
    InvertedWindow { from: NaiveDate, to: NaiveDate },

    #[error("Long-term holding period must be positive, got {0}")]
    NonPositiveHoldingPeriod(i64),
}

/// Reference to an asset, exchange, or holder that the configuration does not
/// know about.
#[derive(Debug, Error)]
#[error("Line {line}: unknown {kind} `{value}`")]
pub struct UnknownReferenceError {
    pub kind: ReferenceKind,
    pub value: String,
    pub line: LineId,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReferenceKind {
    Asset,
    Exchange,
    Holder,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Asset => "asset",
            Self::Exchange => "exchange",
            Self::Holder => "holder",
        })
    }
}

/// Which of the three input tables a header map belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Table {
    Acquisitions,
    Disposals,
    Transfers,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Acquisitions => "acquisitions",
            Self::Disposals => "disposals",
            Self::Transfers => "transfers",
        })
    }
}

pub(crate) const ACQUISITION_FIELDS: &[&str] = &[
    "timestamp",
    "asset",
    "exchange",
    "holder",
    "transaction_type",
    "spot_price",
    "crypto_in",
];

pub(crate) const DISPOSAL_FIELDS: &[&str] = &[
    "timestamp",
    "asset",
    "exchange",
    "holder",
    "transaction_type",
    "spot_price",
    "crypto_out_no_fee",
    "crypto_fee",
];

pub(crate) const TRANSFER_FIELDS: &[&str] = &[
    "timestamp",
    "asset",
    "from_exchange",
    "from_holder",
    "to_exchange",
    "to_holder",
    "crypto_sent",
    "crypto_received",
];

/// Field-name to column-index mapping for one input table.
pub type HeaderMap = BTreeMap<String, usize>;

/// Immutable run descriptor: accepted assets, exchanges and holders, the
/// column layout of the three input tables, the reporting window, and the
/// country parameters (fiat currency and long-term holding period).
///
/// Constructed once, before any transaction; read-only afterwards.
#[derive(Clone, Debug)]
pub struct Configuration {
    assets: BTreeSet<String>,
    exchanges: BTreeSet<String>,
    holders: BTreeSet<String>,
    acquisition_header: HeaderMap,
    disposal_header: HeaderMap,
    transfer_header: HeaderMap,
    from_date: NaiveDate,
    to_date: NaiveDate,
    accounting_method: String,
    fiat_currency: String,
    long_term_period_days: i64,
    fiat_tolerance: FiatAmount,
}

/// On-disk mirror of [`Configuration`], prior to validation.
#[derive(Debug, Deserialize)]
pub(crate) struct RawConfiguration {
    pub(crate) assets: BTreeSet<String>,
    pub(crate) exchanges: BTreeSet<String>,
    pub(crate) holders: BTreeSet<String>,
    pub(crate) acquisition_header: HeaderMap,
    pub(crate) disposal_header: HeaderMap,
    pub(crate) transfer_header: HeaderMap,
    pub(crate) from_date: NaiveDate,
    pub(crate) to_date: NaiveDate,
    pub(crate) accounting_method: String,
    pub(crate) fiat_currency: String,
    pub(crate) long_term_period_days: i64,

    /// Largest accepted gap between a user-supplied fiat field and its
    /// derivation. Zero (the default) demands exact agreement.
    #[serde(default)]
    pub(crate) fiat_tolerance: FiatAmount,
}

impl Configuration {
    /// Validate a raw configuration into the immutable run descriptor.
    pub fn new(raw: RawConfiguration) -> Result<Self, ConfigurationError> {
        if raw.assets.is_empty() {
            return Err(ConfigurationError::EmptySet("assets"));
        }
        if raw.exchanges.is_empty() {
            return Err(ConfigurationError::EmptySet("exchanges"));
        }
        if raw.holders.is_empty() {
            return Err(ConfigurationError::EmptySet("holders"));
        }
        if raw.from_date > raw.to_date {
            return Err(ConfigurationError::InvertedWindow {
                from: raw.from_date,
                to: raw.to_date,
            });
        }
        if raw.long_term_period_days <= 0 {
            return Err(ConfigurationError::NonPositiveHoldingPeriod(
                raw.long_term_period_days,
            ));
        }

        check_header(Table::Acquisitions, &raw.acquisition_header, ACQUISITION_FIELDS)?;
        check_header(Table::Disposals, &raw.disposal_header, DISPOSAL_FIELDS)?;
        check_header(Table::Transfers, &raw.transfer_header, TRANSFER_FIELDS)?;

        Ok(Self {
            assets: raw.assets,
            exchanges: raw.exchanges,
            holders: raw.holders,
            acquisition_header: raw.acquisition_header,
            disposal_header: raw.disposal_header,
            transfer_header: raw.transfer_header,
            from_date: raw.from_date,
            to_date: raw.to_date,
            accounting_method: raw.accounting_method,
            fiat_currency: raw.fiat_currency,
            long_term_period_days: raw.long_term_period_days,
            fiat_tolerance: raw.fiat_tolerance,
        })
    }

    /// Read and validate a RON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let contents = fs::read_to_string(path)?;
        let raw: RawConfiguration = ron::from_str(&contents)?;
        Self::new(raw)
    }

    pub fn is_known_asset(&self, value: &str) -> bool {
        self.assets.contains(value)
    }

    pub fn is_known_exchange(&self, value: &str) -> bool {
        self.exchanges.contains(value)
    }

    pub fn is_known_holder(&self, value: &str) -> bool {
        self.holders.contains(value)
    }

    pub fn check_asset(&self, value: &str, line: LineId) -> Result<(), UnknownReferenceError> {
        check_reference(ReferenceKind::Asset, &self.assets, value, line)
    }

    pub fn check_exchange(&self, value: &str, line: LineId) -> Result<(), UnknownReferenceError> {
        check_reference(ReferenceKind::Exchange, &self.exchanges, value, line)
    }

    pub fn check_holder(&self, value: &str, line: LineId) -> Result<(), UnknownReferenceError> {
        check_reference(ReferenceKind::Holder, &self.holders, value, line)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(String::as_str)
    }

    pub fn header(&self, table: Table) -> &HeaderMap {
        match table {
            Table::Acquisitions => &self.acquisition_header,
            Table::Disposals => &self.disposal_header,
            Table::Transfers => &self.transfer_header,
        }
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from_date
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to_date
    }

    pub fn accounting_method(&self) -> &str {
        &self.accounting_method
    }

    pub fn fiat_currency(&self) -> &str {
        &self.fiat_currency
    }

    /// Minimum whole-day holding period for a gain to classify as long-term.
    /// The boundary is inclusive: exactly this many days is long-term.
    pub fn long_term_period_days(&self) -> i64 {
        self.long_term_period_days
    }

    pub fn fiat_tolerance(&self) -> FiatAmount {
        self.fiat_tolerance
    }
}

fn check_header(
    table: Table,
    header: &HeaderMap,
    mandatory: &[&'static str],
) -> Result<(), ConfigurationError> {
    for field in mandatory {
        if !header.contains_key(*field) {
            return Err(ConfigurationError::MissingField { table, field });
        }
    }

    let mut seen = BTreeSet::new();
    for column in header.values() {
        if !seen.insert(*column) {
            return Err(ConfigurationError::DuplicateColumn {
                table,
                column: *column,
            });
        }
    }

    Ok(())
}

fn check_reference(
    kind: ReferenceKind,
    set: &BTreeSet<String>,
    value: &str,
    line: LineId,
) -> Result<(), UnknownReferenceError> {
    if set.contains(value) {
        Ok(())
    } else {
        Err(UnknownReferenceError {
            kind,
            value: value.to_owned(),
            line,
        })
    }
}

/// Test fixture shared by the module tests: one asset, two exchanges, one
/// holder, identity header maps.
#[cfg(test)]
pub(crate) fn test_configuration() -> Configuration {
    fn header(fields: &[&str]) -> HeaderMap {
        fields
            .iter()
            .enumerate()
            .map(|(index, field)| ((*field).to_owned(), index))
            .collect()
    }

    Configuration::new(RawConfiguration {
        assets: ["BTC", "ETH"].map(String::from).into(),
        exchanges: ["Coinbase", "Kraken", "Ledger"].map(String::from).into(),
        holders: ["Alice", "Bob"].map(String::from).into(),
        acquisition_header: header(ACQUISITION_FIELDS),
        disposal_header: header(DISPOSAL_FIELDS),
        transfer_header: header(TRANSFER_FIELDS),
        from_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
        to_date: NaiveDate::from_ymd_opt(2022, 12, 31).unwrap(),
        accounting_method: "fifo".to_owned(),
        fiat_currency: "USD".to_owned(),
        long_term_period_days: 365,
        fiat_tolerance: FiatAmount::ZERO,
    })
    .unwrap()
}
