use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::gain_loss::{CapitalGainType, GainLoss};
use crate::model::input_data::InputData;
use crate::model::transaction::{Entry as _, LineId, TransactionType};
use crate::util::year_ext::GetYear as _;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::slice::Iter;
use thiserror::Error;
use tracing::debug;

/// A disposal or outgoing transfer drove an account's running balance below
/// zero: the account is spending crypto it never held.
#[derive(Debug, Error)]
#[error("Line {line}: balance of ({exchange}, {holder}) would fall to {balance}")]
pub struct BalanceUnderflowError {
    pub exchange: String,
    pub holder: String,
    pub line: LineId,
    pub balance: CryptoAmount,
}

/// Final per-account state for one asset.
#[derive(Clone, Debug, Serialize)]
pub struct Balance {
    pub exchange: String,
    pub holder: String,
    pub acquired_balance: CryptoAmount,
    pub sent_balance: CryptoAmount,
    pub received_balance: CryptoAmount,
    pub final_balance: CryptoAmount,
}

/// Per-(exchange, holder) balances for one asset, sorted by account.
#[derive(Clone, Debug)]
pub struct BalanceSet {
    asset: String,
    balances: Vec<Balance>,
}

#[derive(Clone, Debug, Default)]
struct RunningBalance {
    acquired: CryptoAmount,
    sent: CryptoAmount,
    received: CryptoAmount,
    final_balance: CryptoAmount,
}

/// One balance-affecting flow, in `(timestamp, line)` stream order.
enum Flow<'a> {
    Acquire {
        account: (&'a str, &'a str),
        amount: CryptoAmount,
    },
    Send {
        account: (&'a str, &'a str),
        amount: CryptoAmount,
    },
    Transfer {
        from: (&'a str, &'a str),
        to: (&'a str, &'a str),
        sent: CryptoAmount,
        received: CryptoAmount,
    },
}

impl BalanceSet {
    /// Derive balances by a second-pass scan over the transaction streams.
    ///
    /// The non-negativity check runs over the entire stream; the reported
    /// balances accumulate flows through the end of `to_date` only.
    /// Move-typed disposals are skipped: their transfer row already carries
    /// the full outflow (fee included), counting both would double the fee.
    pub(crate) fn derive(
        input: &InputData,
        to_date: NaiveDate,
    ) -> Result<Self, BalanceUnderflowError> {
        let mut steps: Vec<(DateTime<Utc>, LineId, Flow<'_>)> = Vec::new();

        for acquisition in input.acquisitions() {
            steps.push((
                acquisition.timestamp(),
                acquisition.line(),
                Flow::Acquire {
                    account: (acquisition.exchange(), acquisition.holder()),
                    amount: acquisition.crypto_in(),
                },
            ));
        }
        for disposal in input.disposals() {
            if disposal.transaction_type() == TransactionType::Move {
                continue;
            }
            steps.push((
                disposal.timestamp(),
                disposal.line(),
                Flow::Send {
                    account: (disposal.exchange(), disposal.holder()),
                    amount: disposal.crypto_out_with_fee(),
                },
            ));
        }
        for transfer in input.transfers() {
            steps.push((
                transfer.timestamp(),
                transfer.line(),
                Flow::Transfer {
                    from: (transfer.from_exchange(), transfer.from_holder()),
                    to: (transfer.to_exchange(), transfer.to_holder()),
                    sent: transfer.crypto_sent(),
                    received: transfer.crypto_received(),
                },
            ));
        }

        steps.sort_by_key(|(timestamp, line, _)| (*timestamp, *line));

        let mut running: BTreeMap<(&str, &str), RunningBalance> = BTreeMap::new();
        let mut reported: BTreeMap<(String, String), RunningBalance> = BTreeMap::new();

        for (timestamp, line, flow) in steps {
            let in_window = timestamp.date_naive() <= to_date;

            match flow {
                Flow::Acquire { account, amount } => {
                    let entry = running.entry(account).or_default();
                    entry.acquired += amount;
                    entry.final_balance += amount;
                    if in_window {
                        let entry = reported_entry(&mut reported, account);
                        entry.acquired += amount;
                        entry.final_balance += amount;
                    }
                }
                Flow::Send { account, amount } => {
                    let entry = running.entry(account).or_default();
                    entry.sent += amount;
                    entry.final_balance -= amount;
                    check_non_negative(account, entry.final_balance, line)?;
                    if in_window {
                        let entry = reported_entry(&mut reported, account);
                        entry.sent += amount;
                        entry.final_balance -= amount;
                    }
                }
                Flow::Transfer {
                    from,
                    to,
                    sent,
                    received,
                } => {
                    let entry = running.entry(from).or_default();
                    entry.sent += sent;
                    entry.final_balance -= sent;
                    check_non_negative(from, entry.final_balance, line)?;

                    let entry = running.entry(to).or_default();
                    entry.received += received;
                    entry.final_balance += received;

                    if in_window {
                        let entry = reported_entry(&mut reported, from);
                        entry.sent += sent;
                        entry.final_balance -= sent;

                        let entry = reported_entry(&mut reported, to);
                        entry.received += received;
                        entry.final_balance += received;
                    }
                }
            }
        }

        let balances = reported
            .into_iter()
            .map(|((exchange, holder), state)| {
                let balance = Balance {
                    exchange,
                    holder,
                    acquired_balance: state.acquired,
                    sent_balance: state.sent,
                    received_balance: state.received,
                    final_balance: state.final_balance,
                };
                debug!(
                    "{}: ({}, {}) final balance {}",
                    input.asset(),
                    balance.exchange,
                    balance.holder,
                    balance.final_balance,
                );
                balance
            })
            .collect();

        Ok(Self {
            asset: input.asset().to_owned(),
            balances,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Balance> {
        self.balances.iter()
    }

    pub fn find(&self, exchange: &str, holder: &str) -> Option<&Balance> {
        self.balances
            .iter()
            .find(|balance| balance.exchange == exchange && balance.holder == holder)
    }

    /// Sum of final balances across all accounts.
    pub fn total(&self) -> CryptoAmount {
        self.balances
            .iter()
            .map(|balance| balance.final_balance)
            .sum()
    }
}

impl<'a> IntoIterator for &'a BalanceSet {
    type Item = &'a Balance;
    type IntoIter = Iter<'a, Balance>;

    fn into_iter(self) -> Self::IntoIter {
        self.balances.iter()
    }
}

fn reported_entry<'m>(
    reported: &'m mut BTreeMap<(String, String), RunningBalance>,
    account: (&str, &str),
) -> &'m mut RunningBalance {
    reported
        .entry((account.0.to_owned(), account.1.to_owned()))
        .or_default()
}

fn check_non_negative(
    account: (&str, &str),
    balance: CryptoAmount,
    line: LineId,
) -> Result<(), BalanceUnderflowError> {
    if balance.is_negative() {
        return Err(BalanceUnderflowError {
            exchange: account.0.to_owned(),
            holder: account.1.to_owned(),
            line,
            balance,
        });
    }
    Ok(())
}

/// Totals of one `(year, capital-gain type)` bucket of gain/loss records.
#[derive(Clone, Debug, Serialize)]
pub struct YearlyGainLoss {
    pub year: i32,
    pub capital_gain_type: CapitalGainType,
    pub crypto_amount: CryptoAmount,
    pub fiat_amount: FiatAmount,
    pub fiat_cost_basis: FiatAmount,
    pub fiat_gain_loss: FiatAmount,
}

/// Group gain/loss records into yearly totals, newest year first.
pub(crate) fn yearly_summary<'a>(
    gain_losses: impl IntoIterator<Item = &'a GainLoss>,
) -> Vec<YearlyGainLoss> {
    let mut buckets: BTreeMap<(i32, CapitalGainType), YearlyGainLoss> = BTreeMap::new();

    for record in gain_losses {
        let key = (record.get_year(), record.capital_gain_type);
        let bucket = buckets.entry(key).or_insert_with(|| YearlyGainLoss {
            year: key.0,
            capital_gain_type: key.1,
            crypto_amount: CryptoAmount::ZERO,
            fiat_amount: FiatAmount::ZERO,
            fiat_cost_basis: FiatAmount::ZERO,
            fiat_gain_loss: FiatAmount::ZERO,
        });
        bucket.crypto_amount += record.crypto_amount;
        bucket.fiat_amount += record.fiat_proceeds;
        bucket.fiat_cost_basis += record.fiat_cost_basis;
        bucket.fiat_gain_loss += record.fiat_gain_loss;
    }

    let mut summary: Vec<YearlyGainLoss> = buckets.into_values().collect();
    summary.sort_by_key(|entry| (std::cmp::Reverse(entry.year), entry.capital_gain_type));
    summary
}
