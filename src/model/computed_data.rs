use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::balance::{self, BalanceSet, YearlyGainLoss};
use crate::model::entry_set::EntrySet;
use crate::model::gain_loss::{GainLoss, GainLossSet, TaxableEventRef};
use crate::model::input_data::InputData;
use crate::model::transaction::{Acquisition, Disposal, Transfer};
use chrono::NaiveDate;

/// The per-asset result artifact handed to report generators.
///
/// Everything inside is computed over the full, unfiltered transaction
/// history (cost basis must see lots acquired before the reporting window);
/// the `*_in_window` accessors apply the configured `[from_date, to_date]`
/// filter for presentation.
#[derive(Debug)]
pub struct ComputedData {
    input: InputData,
    gain_losses: GainLossSet,
    balances: BalanceSet,
    yearly: Vec<YearlyGainLoss>,
    total_crypto_acquired: CryptoAmount,
    total_crypto_disposed: CryptoAmount,
    average_acquisition_price: FiatAmount,
    from_date: NaiveDate,
    to_date: NaiveDate,
}

impl ComputedData {
    pub(crate) fn assemble(
        input: InputData,
        gain_losses: GainLossSet,
        balances: BalanceSet,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Self {
        let total_crypto_acquired = input
            .acquisitions()
            .iter()
            .map(Acquisition::crypto_in)
            .sum();
        let total_crypto_disposed = input
            .disposals()
            .iter()
            .map(Disposal::crypto_out_with_fee)
            .sum();

        let total_value: FiatAmount = input
            .acquisitions()
            .iter()
            .map(|lot| lot.crypto_in() * lot.spot_price())
            .sum();
        let average_acquisition_price = if total_crypto_acquired == CryptoAmount::ZERO {
            FiatAmount::ZERO
        } else {
            total_value / total_crypto_acquired
        };

        let yearly = balance::yearly_summary(&gain_losses);

        Self {
            input,
            gain_losses,
            balances,
            yearly,
            total_crypto_acquired,
            total_crypto_disposed,
            average_acquisition_price,
            from_date,
            to_date,
        }
    }

    pub fn asset(&self) -> &str {
        self.input.asset()
    }

    pub fn acquisitions(&self) -> &EntrySet<Acquisition> {
        self.input.acquisitions()
    }

    pub fn disposals(&self) -> &EntrySet<Disposal> {
        self.input.disposals()
    }

    pub fn transfers(&self) -> &EntrySet<Transfer> {
        self.input.transfers()
    }

    /// Every gain/loss record, unfiltered.
    pub fn gain_losses(&self) -> &GainLossSet {
        &self.gain_losses
    }

    /// Gain/loss records whose taxable event falls inside the reporting
    /// window.
    pub fn gain_losses_in_window(&self) -> impl Iterator<Item = &GainLoss> {
        self.gain_losses.iter().filter(|record| {
            let date = record.event_timestamp.date_naive();
            self.from_date <= date && date <= self.to_date
        })
    }

    /// Yearly totals over the full history, newest year first.
    pub fn yearly_summary(&self) -> &[YearlyGainLoss] {
        &self.yearly
    }

    /// Yearly totals restricted to the reporting window.
    pub fn yearly_summary_in_window(&self) -> Vec<YearlyGainLoss> {
        balance::yearly_summary(self.gain_losses_in_window())
    }

    /// Balances as of the end of the reporting window.
    pub fn balances(&self) -> &BalanceSet {
        &self.balances
    }

    pub fn total_crypto_acquired(&self) -> CryptoAmount {
        self.total_crypto_acquired
    }

    pub fn total_crypto_disposed(&self) -> CryptoAmount {
        self.total_crypto_disposed
    }

    /// Volume-weighted average acquisition price across all lots.
    pub fn average_acquisition_price(&self) -> FiatAmount {
        self.average_acquisition_price
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from_date
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to_date
    }

    /// Resolve a record's acquired lot, if it has one.
    pub fn lot(&self, record: &GainLoss) -> Option<&Acquisition> {
        record.lot.map(|index| &self.input.acquisitions()[index])
    }

    /// Resolve the disposal behind a record, if its taxable event is one.
    pub fn disposal(&self, record: &GainLoss) -> Option<&Disposal> {
        match record.event {
            TaxableEventRef::Disposal(index) => Some(&self.input.disposals()[index]),
            TaxableEventRef::Acquisition(_) => None,
        }
    }

    /// Resolve the income-typed acquisition behind a record, if its taxable
    /// event is one.
    pub fn income_acquisition(&self, record: &GainLoss) -> Option<&Acquisition> {
        match record.event {
            TaxableEventRef::Acquisition(index) => Some(&self.input.acquisitions()[index]),
            TaxableEventRef::Disposal(_) => None,
        }
    }
}
