//! Worksheet rendering: turns a [`ComputedData`] into CSV text.
//!
//! Reports apply the configured reporting window; the underlying artifact
//! keeps the full history. Fiat columns round to 2 places, crypto columns to
//! 8, both with banker's rounding; the engine itself never rounds.

use crate::model::computed_data::ComputedData;
use crate::model::transaction::Entry as _;
use std::fmt::{self, Display};

const FIAT_DECIMALS: u32 = 2;
const CRYPTO_DECIMALS: u32 = 8;

/// Per-fraction gain/loss detail worksheet.
#[derive(Debug)]
pub struct GainLossWorksheet<'a> {
    computed: &'a ComputedData,
}

impl<'a> GainLossWorksheet<'a> {
    pub fn new(computed: &'a ComputedData) -> Self {
        Self { computed }
    }
}

impl Display for GainLossWorksheet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Write the CSV header
        writeln!(
            f,
            concat!(
                // Columns A-E
                r#""Event Date","Event Line","Event Type","Gain Type","Crypto Amount","#,
                // Columns F-H
                r#""Proceeds","Cost Basis","Gain/Loss","#,
                // Columns I-L
                r#""Event Fraction %","Lot Fraction %","Lot Line","Lot Date""#,
            )
        )?;

        for record in self.computed.gain_losses_in_window() {
            let event_type = match self.computed.disposal(record) {
                Some(disposal) => disposal.transaction_type(),
                None => self
                    .computed
                    .income_acquisition(record)
                    .expect("record references either set")
                    .transaction_type(),
            };
            let (lot_line, lot_date) = match self.computed.lot(record) {
                Some(lot) => (
                    lot.line().to_string(),
                    lot.timestamp().format("%F %T %Z").to_string(),
                ),
                None => (String::new(), String::new()),
            };

            writeln!(
                f,
                concat!(
                    r#""{event_date}","{event_line}","{event_type}","{gain_type}","{crypto}","#,
                    r#""{proceeds}","{cost_basis}","{gain_loss}","#,
                    r#""{event_fraction}","{lot_fraction}","{lot_line}","{lot_date}""#,
                ),
                event_date = record.event_timestamp.format("%F %T %Z"),
                event_line = record.event_line,
                event_type = event_type,
                gain_type = record.capital_gain_type,
                crypto = record.crypto_amount.round_dp(CRYPTO_DECIMALS),
                proceeds = record.fiat_proceeds.round_dp(FIAT_DECIMALS),
                cost_basis = record.fiat_cost_basis.round_dp(FIAT_DECIMALS),
                gain_loss = record.fiat_gain_loss.round_dp(FIAT_DECIMALS),
                event_fraction = record.taxable_event_fraction_percent.round_dp(4),
                lot_fraction = record.acquired_lot_fraction_percent.round_dp(4),
                lot_line = lot_line,
                lot_date = lot_date,
            )?;
        }

        Ok(())
    }
}

/// Final balances per account.
#[derive(Debug)]
pub struct BalanceWorksheet<'a> {
    computed: &'a ComputedData,
}

impl<'a> BalanceWorksheet<'a> {
    pub fn new(computed: &'a ComputedData) -> Self {
        Self { computed }
    }
}

impl Display for BalanceWorksheet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            r#""Exchange","Holder","Acquired","Sent","Received","Final Balance""#
        )?;

        for balance in self.computed.balances() {
            writeln!(
                f,
                r#""{exchange}","{holder}","{acquired}","{sent}","{received}","{final_balance}""#,
                exchange = balance.exchange,
                holder = balance.holder,
                acquired = balance.acquired_balance.round_dp(CRYPTO_DECIMALS),
                sent = balance.sent_balance.round_dp(CRYPTO_DECIMALS),
                received = balance.received_balance.round_dp(CRYPTO_DECIMALS),
                final_balance = balance.final_balance.round_dp(CRYPTO_DECIMALS),
            )?;
        }

        Ok(())
    }
}

/// Yearly totals by capital-gain type, plus asset-level aggregates.
#[derive(Debug)]
pub struct YearlySummaryWorksheet<'a> {
    computed: &'a ComputedData,
}

impl<'a> YearlySummaryWorksheet<'a> {
    pub fn new(computed: &'a ComputedData) -> Self {
        Self { computed }
    }
}

impl Display for YearlySummaryWorksheet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            r#""Year","Gain Type","Crypto Amount","Proceeds","Cost Basis","Gain/Loss""#
        )?;

        for entry in self.computed.yearly_summary_in_window() {
            writeln!(
                f,
                r#""{year}","{gain_type}","{crypto}","{proceeds}","{cost_basis}","{gain_loss}""#,
                year = entry.year,
                gain_type = entry.capital_gain_type,
                crypto = entry.crypto_amount.round_dp(CRYPTO_DECIMALS),
                proceeds = entry.fiat_amount.round_dp(FIAT_DECIMALS),
                cost_basis = entry.fiat_cost_basis.round_dp(FIAT_DECIMALS),
                gain_loss = entry.fiat_gain_loss.round_dp(FIAT_DECIMALS),
            )?;
        }

        writeln!(f)?;
        writeln!(
            f,
            r#""Total Acquired","{}""#,
            self.computed.total_crypto_acquired().round_dp(CRYPTO_DECIMALS),
        )?;
        writeln!(
            f,
            r#""Total Disposed","{}""#,
            self.computed.total_crypto_disposed().round_dp(CRYPTO_DECIMALS),
        )?;
        writeln!(
            f,
            r#""Average Acquisition Price","{}""#,
            self.computed
                .average_acquisition_price()
                .round_dp(FIAT_DECIMALS),
        )?;

        Ok(())
    }
}
