//! The pairing engine: turns one asset's sealed entry sets into an ordered
//! gain/loss list, derived balances, and the final [`ComputedData`] artifact.

use crate::methods::{AccountingMethod, CandidateState, EventContext, LotCandidates};
use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::balance::{BalanceSet, BalanceUnderflowError};
use crate::model::computed_data::ComputedData;
use crate::model::config::Configuration;
use crate::model::gain_loss::{CapitalGainType, GainLoss, GainLossSet, TaxableEventRef};
use crate::model::input_data::InputData;
use crate::model::transaction::{Entry as _, LineId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
mod prop_tests;

/// A disposal needs more crypto than every acquired lot up to its instant
/// can supply.
#[derive(Debug, Error)]
#[error("Line {line}: acquired lots exhausted with {needed} still unpaired")]
pub struct AcquiredLotsExhaustedError {
    pub line: LineId,
    pub needed: CryptoAmount,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    LotsExhausted(#[from] AcquiredLotsExhaustedError),

    #[error(transparent)]
    BalanceUnderflow(#[from] BalanceUnderflowError),

    #[error("{asset}: {quantity} incongruence: {computed} != {verified}")]
    Incongruence {
        asset: String,
        quantity: &'static str,
        computed: String,
        verified: String,
    },
}

/// One entry of the merged taxable-event sequence.
struct EventView {
    event: TaxableEventRef,
    timestamp: DateTime<Utc>,
    line: LineId,
    spot_price: FiatAmount,
    crypto_amount: CryptoAmount,
    fiat_amount: FiatAmount,
    /// Acquisition-only income events pair with no lot.
    income: bool,
}

/// Compute one asset's taxes: pair every taxable event with acquired-lot
/// fractions under `method`, derive balances, and assemble the result.
///
/// Pure with respect to its inputs; two calls on the same data produce
/// identical output.
pub fn compute_tax(
    configuration: &Configuration,
    method: &dyn AccountingMethod,
    input: InputData,
) -> Result<ComputedData, EngineError> {
    let events = taxable_events(&input);
    debug!("{}: {} taxable events", input.asset(), events.len());

    let gain_losses = pair_events(configuration, method, &input, &events)?;
    debug!("{}: {} gain/loss records", input.asset(), gain_losses.len());

    if method.name() == "fifo" {
        verify_fifo_aggregates(&input, &gain_losses)?;
    }

    let balances = BalanceSet::derive(&input, configuration.to_date())?;

    Ok(ComputedData::assemble(
        input,
        gain_losses,
        balances,
        configuration.from_date(),
        configuration.to_date(),
    ))
}

/// Merge the disposals entry set with the taxable acquisitions, ordered by
/// `(timestamp, line)`.
fn taxable_events(input: &InputData) -> Vec<EventView> {
    let mut events: Vec<EventView> = Vec::new();

    for (index, acquisition) in input.acquisitions().iter().enumerate() {
        if !acquisition.is_taxable() {
            continue;
        }
        events.push(EventView {
            event: TaxableEventRef::Acquisition(index),
            timestamp: acquisition.timestamp(),
            line: acquisition.line(),
            spot_price: acquisition.spot_price(),
            crypto_amount: acquisition.crypto_taxable_amount(),
            fiat_amount: acquisition.fiat_taxable_amount(),
            income: true,
        });
    }

    for (index, disposal) in input.disposals().iter().enumerate() {
        if !disposal.is_taxable() {
            continue;
        }
        events.push(EventView {
            event: TaxableEventRef::Disposal(index),
            timestamp: disposal.timestamp(),
            line: disposal.line(),
            spot_price: disposal.spot_price(),
            crypto_amount: disposal.crypto_taxable_amount(),
            fiat_amount: disposal.fiat_taxable_amount(),
            income: false,
        });
    }

    events.sort_by_key(|event| (event.timestamp, event.line));
    events
}

fn pair_events(
    configuration: &Configuration,
    method: &dyn AccountingMethod,
    input: &InputData,
    events: &[EventView],
) -> Result<GainLossSet, AcquiredLotsExhaustedError> {
    let hundred = Decimal::ONE_HUNDRED;
    let mut gain_losses = GainLossSet::new();
    let mut state = CandidateState::new(input.acquisitions());

    for event in events {
        if event.income {
            // Income realizes at the spot value of the acquired crypto; no
            // lot is consumed and no holding period exists.
            gain_losses.push(GainLoss {
                event: event.event,
                event_timestamp: event.timestamp,
                event_line: event.line,
                lot: None,
                crypto_amount: event.crypto_amount,
                fiat_cost_basis: FiatAmount::ZERO,
                fiat_proceeds: event.fiat_amount,
                fiat_gain_loss: event.fiat_amount,
                capital_gain_type: CapitalGainType::None,
                taxable_event_fraction_percent: hundred,
                acquired_lot_fraction_percent: hundred,
            });
            continue;
        }

        let mut need = event.crypto_amount;
        while need > CryptoAmount::ZERO {
            let mut candidates = LotCandidates::new(input.acquisitions(), &mut state, event.timestamp);
            let context = EventContext {
                timestamp: event.timestamp,
                spot_price: event.spot_price,
                line: event.line,
            };

            let Some(found) =
                method.seek_non_exhausted_acquired_lot(&mut candidates, context, need)
            else {
                return Err(AcquiredLotsExhaustedError {
                    line: event.line,
                    needed: need,
                });
            };

            let take = need.min(found.amount);
            let lot = &input.acquisitions()[found.lot_index];

            let fiat_proceeds = take * event.spot_price;
            let fiat_cost_basis = take * found.basis_price;
            let held_days = (event.timestamp - lot.timestamp()).num_days();
            let capital_gain_type = if held_days >= configuration.long_term_period_days() {
                CapitalGainType::Long
            } else {
                CapitalGainType::Short
            };

            gain_losses.push(GainLoss {
                event: event.event,
                event_timestamp: event.timestamp,
                event_line: event.line,
                lot: Some(found.lot_index),
                crypto_amount: take,
                fiat_cost_basis,
                fiat_proceeds,
                fiat_gain_loss: fiat_proceeds - fiat_cost_basis,
                capital_gain_type,
                taxable_event_fraction_percent: take.fraction_percent(event.crypto_amount),
                acquired_lot_fraction_percent: take.fraction_percent(lot.crypto_in()),
            });

            state.consume(found.lot_index, take);
            need -= take;
        }
    }

    Ok(gain_losses)
}

/// Re-derive the aggregate totals straight from the transaction streams and
/// compare them with the paired results. Only valid under FIFO, whose
/// consumption is a strict chronological prefix of the lots.
fn verify_fifo_aggregates(
    input: &InputData,
    gain_losses: &GainLossSet,
) -> Result<(), EngineError> {
    let incongruence = |quantity, computed: String, verified: String| EngineError::Incongruence {
        asset: input.asset().to_owned(),
        quantity,
        computed,
        verified,
    };

    let crypto_computed: CryptoAmount = gain_losses.iter().map(|r| r.crypto_amount).sum();
    let proceeds_computed: FiatAmount = gain_losses.iter().map(|r| r.fiat_proceeds).sum();
    let cost_computed: FiatAmount = gain_losses.iter().map(|r| r.fiat_cost_basis).sum();
    let gain_computed: FiatAmount = gain_losses.iter().map(|r| r.fiat_gain_loss).sum();

    let crypto_earned: CryptoAmount = input
        .acquisitions()
        .iter()
        .map(|a| a.crypto_taxable_amount())
        .sum();
    let fiat_earned: FiatAmount = input
        .acquisitions()
        .iter()
        .map(|a| a.fiat_taxable_amount())
        .sum();
    let crypto_sold: CryptoAmount = input
        .disposals()
        .iter()
        .map(|d| d.crypto_taxable_amount())
        .sum();
    let fiat_sold: FiatAmount = input
        .disposals()
        .iter()
        .map(|d| d.crypto_taxable_amount() * d.spot_price())
        .sum();

    let crypto_verified = crypto_earned + crypto_sold;
    if crypto_computed != crypto_verified {
        return Err(incongruence(
            "crypto taxable amount",
            crypto_computed.to_string(),
            crypto_verified.to_string(),
        ));
    }

    let proceeds_verified = fiat_earned + fiat_sold;
    if proceeds_computed != proceeds_verified {
        return Err(incongruence(
            "fiat taxable amount",
            proceeds_computed.to_string(),
            proceeds_verified.to_string(),
        ));
    }

    // FIFO consumes a prefix of the lots: walk it to re-derive cost basis.
    let mut cost_verified = FiatAmount::ZERO;
    let mut to_cover = crypto_sold;
    for lot in input.acquisitions() {
        if to_cover.is_zero() {
            break;
        }
        let take = to_cover.min(lot.crypto_in());
        cost_verified += take * lot.spot_price();
        to_cover -= take;
    }
    if cost_computed != cost_verified {
        return Err(incongruence(
            "cost basis",
            cost_computed.to_string(),
            cost_verified.to_string(),
        ));
    }

    let gain_verified = proceeds_verified - cost_verified;
    if gain_computed != gain_verified {
        return Err(incongruence(
            "gain/loss",
            gain_computed.to_string(),
            gain_verified.to_string(),
        ));
    }

    debug!("{}: FIFO aggregate cross-check passed", input.asset());
    Ok(())
}
