use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::transaction::LineId;
use crate::util::year_ext::GetYear;
use chrono::{DateTime, Datelike as _, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::slice::Iter;

/// Holding-period classification of one gain/loss fraction.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CapitalGainType {
    Long,
    Short,
    /// Acquisition-only income events have no holding period.
    None,
}

impl std::fmt::Display for CapitalGainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
            Self::None => "NONE",
        })
    }
}

/// Which sealed entry set a taxable event lives in, and where.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum TaxableEventRef {
    Acquisition(usize),
    Disposal(usize),
}

/// One pairing of a taxable-event fraction with an acquired-lot fraction.
///
/// `lot` is the index of the acquired lot in the asset's acquisitions entry
/// set; it is absent for acquisition-only income events (mining, interest,
/// ...), which realize income without consuming any lot. The event's
/// timestamp and line are copied in so the record orders and reports without
/// a lookup.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GainLoss {
    pub event: TaxableEventRef,
    pub event_timestamp: DateTime<Utc>,
    pub event_line: LineId,
    pub lot: Option<usize>,
    pub crypto_amount: CryptoAmount,
    pub fiat_cost_basis: FiatAmount,
    pub fiat_proceeds: FiatAmount,
    pub fiat_gain_loss: FiatAmount,
    pub capital_gain_type: CapitalGainType,
    /// Share of the taxable event's amount this record covers, in percent.
    pub taxable_event_fraction_percent: Decimal,
    /// Share of the acquired lot's amount this record consumes, in percent.
    pub acquired_lot_fraction_percent: Decimal,
}

impl GetYear for GainLoss {
    fn get_year(&self) -> i32 {
        self.event_timestamp.year()
    }
}

/// Append-only list of gain/loss records, ordered by
/// `(event timestamp, event line, emission sequence)`.
#[derive(Clone, Debug, Default)]
pub struct GainLossSet {
    records: Vec<GainLoss>,
}

impl GainLossSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine emits records in event order; a violation here is an
    /// engine bug, not an input error.
    pub(crate) fn push(&mut self, record: GainLoss) {
        if let Some(last) = self.records.last() {
            debug_assert!(
                (last.event_timestamp, last.event_line)
                    <= (record.event_timestamp, record.event_line),
                "gain/loss emitted out of order",
            );
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, GainLoss> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a GainLossSet {
    type Item = &'a GainLoss;
    type IntoIter = Iter<'a, GainLoss>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
