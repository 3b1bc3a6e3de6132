use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::config::{Configuration, UnknownReferenceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::warn;

/// Dense, parser-assigned identifier of an input row. Used for tie-breaking
/// equal timestamps and for pointing diagnostics back at the source data.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct LineId(pub u32);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum MalformedInputError {
    #[error("Line {line}: field `{field}` must not be negative")]
    NegativeAmount { line: LineId, field: &'static str },

    #[error("Line {line}: field `{field}` must be non-zero")]
    ZeroAmount { line: LineId, field: &'static str },

    #[error("Line {line}: zero spot price with a non-zero fee has no fiat value")]
    ZeroSpotPriceWithFee { line: LineId },

    #[error("Line {line}: only one of `crypto_fee` and `fiat_fee` may be supplied")]
    BothFeesDefined { line: LineId },

    #[error("Line {line}: transaction type `{kind}` is not valid here")]
    InvalidTransactionType { line: LineId, kind: TransactionType },

    #[error("Line {line}: `crypto_sent` is smaller than `crypto_received`")]
    SentLessThanReceived { line: LineId },

    #[error("Line {line}: fee-typed disposal must have zero `crypto_out_no_fee`")]
    FeeWithPrincipal { line: LineId },

    #[error("Line {line}: cell for field `{field}` is not numeric")]
    NonNumericCell { line: LineId, field: String },

    #[error("Line {line}: missing mandatory cell for field `{field}`")]
    MissingCell { line: LineId, field: String },

    #[error("Line {line}: unable to parse timestamp `{value}`")]
    BadTimestamp { line: LineId, value: String },

    #[error("Line {line}: unknown transaction type `{value}`")]
    UnknownTransactionType { line: LineId, value: String },
}

/// A user-supplied redundant field disagrees with its derivation by more than
/// the configured tolerance.
#[derive(Debug, Error)]
#[error("Line {line}: `{field}` is {supplied}, but derives to {derived}")]
pub struct InconsistentAmountError {
    pub line: LineId,
    pub field: &'static str,
    pub supplied: String,
    pub derived: String,
}

/// Any failure a transaction constructor can produce.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),

    #[error(transparent)]
    Inconsistent(#[from] InconsistentAmountError),

    #[error(transparent)]
    UnknownReference(#[from] UnknownReferenceError),
}

#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TransactionType {
    Airdrop,
    Buy,
    Donate,
    Fee,
    Gift,
    Hardfork,
    Income,
    Interest,
    Mining,
    Move,
    Sell,
    Staking,
    Wages,
}

impl TransactionType {
    /// Kinds acceptable on an acquisition row.
    fn is_acquisition_kind(self) -> bool {
        !matches!(self, Self::Fee | Self::Move | Self::Sell)
    }

    /// Kinds acceptable on a user-supplied disposal row. `Move` is reserved
    /// for disposals synthesized from inter-account transfers.
    fn is_disposal_kind(self) -> bool {
        matches!(self, Self::Donate | Self::Fee | Self::Gift | Self::Sell)
    }
}

#[derive(Debug, Error)]
#[error("Parse error")]
pub struct ParseTransactionTypeError;

impl FromStr for TransactionType {
    type Err = ParseTransactionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "airdrop" => Self::Airdrop,
            "buy" => Self::Buy,
            "donate" => Self::Donate,
            "fee" => Self::Fee,
            "gift" => Self::Gift,
            "hardfork" => Self::Hardfork,
            "income" => Self::Income,
            "interest" => Self::Interest,
            "mining" => Self::Mining,
            "move" => Self::Move,
            "sell" => Self::Sell,
            "staking" => Self::Staking,
            "wages" => Self::Wages,
            _ => return Err(ParseTransactionTypeError),
        })
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Airdrop => "airdrop",
            Self::Buy => "buy",
            Self::Donate => "donate",
            Self::Fee => "fee",
            Self::Gift => "gift",
            Self::Hardfork => "hardfork",
            Self::Income => "income",
            Self::Interest => "interest",
            Self::Mining => "mining",
            Self::Move => "move",
            Self::Sell => "sell",
            Self::Staking => "staking",
            Self::Wages => "wages",
        })
    }
}

/// Common capability set across the three transaction variants.
pub trait Entry {
    fn timestamp(&self) -> DateTime<Utc>;
    fn asset(&self) -> &str;
    fn line(&self) -> LineId;
}

/// Raw, pre-validation inputs for an [`Acquisition`]. Optional fields are
/// derived when absent (see the constructor).
#[derive(Clone, Debug, Default)]
pub struct AcquisitionInput {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub exchange: String,
    pub holder: String,
    pub transaction_type: Option<TransactionType>,
    pub spot_price: FiatAmount,
    pub crypto_in: CryptoAmount,
    pub crypto_fee: Option<CryptoAmount>,
    pub fiat_in_no_fee: Option<FiatAmount>,
    pub fiat_in_with_fee: Option<FiatAmount>,
    pub fiat_fee: Option<FiatAmount>,
    pub line: LineId,
    pub unique_id: Option<String>,
    pub notes: Option<String>,
}

/// Crypto flowing in: a buy, or one of the income kinds (airdrop, hard fork,
/// interest, mining, staking, wages, incoming gift/donation, other income).
///
/// Every acquisition is a potential acquired lot; the income kinds are
/// additionally taxable events in their own right.
#[derive(Clone, Debug, Serialize)]
pub struct Acquisition {
    timestamp: DateTime<Utc>,
    asset: String,
    exchange: String,
    holder: String,
    transaction_type: TransactionType,
    spot_price: FiatAmount,
    crypto_in: CryptoAmount,
    crypto_fee: CryptoAmount,
    fiat_in_no_fee: FiatAmount,
    fiat_in_with_fee: FiatAmount,
    fiat_fee: FiatAmount,
    line: LineId,
    unique_id: Option<String>,
    notes: Option<String>,
}

impl Acquisition {
    pub fn new(
        configuration: &Configuration,
        input: AcquisitionInput,
    ) -> Result<Self, TransactionError> {
        let line = input.line;
        let transaction_type = input.transaction_type.unwrap_or(TransactionType::Buy);

        configuration.check_asset(&input.asset, line)?;
        configuration.check_exchange(&input.exchange, line)?;
        configuration.check_holder(&input.holder, line)?;

        if !transaction_type.is_acquisition_kind() {
            return Err(MalformedInputError::InvalidTransactionType {
                line,
                kind: transaction_type,
            }
            .into());
        }

        check_non_negative(input.spot_price, "spot_price", line)?;
        check_positive(input.crypto_in, "crypto_in", line)?;

        if input.crypto_fee.is_some() && input.fiat_fee.is_some() {
            return Err(MalformedInputError::BothFeesDefined { line }.into());
        }

        let crypto_fee = input.crypto_fee.unwrap_or(CryptoAmount::ZERO);
        check_non_negative_crypto(crypto_fee, "crypto_fee", line)?;

        // A fee paid in crypto is valued at the spot price; a fee paid in
        // fiat involves no crypto at all.
        let fiat_fee = match input.fiat_fee {
            Some(fee) => {
                check_non_negative(fee, "fiat_fee", line)?;
                fee
            }
            None => crypto_fee * input.spot_price,
        };

        if input.spot_price.is_zero() && (!crypto_fee.is_zero() || !fiat_fee.is_zero()) {
            return Err(MalformedInputError::ZeroSpotPriceWithFee { line }.into());
        }

        let derived_no_fee = input.crypto_in * input.spot_price;
        let fiat_in_no_fee = match input.fiat_in_no_fee {
            Some(supplied) => {
                check_consistent(supplied, derived_no_fee, "fiat_in_no_fee", line, configuration)?;
                supplied
            }
            None => derived_no_fee,
        };

        let derived_with_fee = fiat_in_no_fee + fiat_fee;
        let fiat_in_with_fee = match input.fiat_in_with_fee {
            Some(supplied) => {
                check_consistent(
                    supplied,
                    derived_with_fee,
                    "fiat_in_with_fee",
                    line,
                    configuration,
                )?;
                supplied
            }
            None => derived_with_fee,
        };

        Ok(Self {
            timestamp: input.timestamp,
            asset: input.asset,
            exchange: input.exchange,
            holder: input.holder,
            transaction_type,
            spot_price: input.spot_price,
            crypto_in: input.crypto_in,
            crypto_fee,
            fiat_in_no_fee,
            fiat_in_with_fee,
            fiat_fee,
            line,
            unique_id: input.unique_id,
            notes: input.notes,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn spot_price(&self) -> FiatAmount {
        self.spot_price
    }

    pub fn crypto_in(&self) -> CryptoAmount {
        self.crypto_in
    }

    pub fn crypto_fee(&self) -> CryptoAmount {
        self.crypto_fee
    }

    pub fn fiat_in_no_fee(&self) -> FiatAmount {
        self.fiat_in_no_fee
    }

    pub fn fiat_in_with_fee(&self) -> FiatAmount {
        self.fiat_in_with_fee
    }

    pub fn fiat_fee(&self) -> FiatAmount {
        self.fiat_fee
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// A buy produces a cost basis but no income; every other acquisition
    /// kind realizes income at acquisition time.
    pub fn is_taxable(&self) -> bool {
        self.transaction_type != TransactionType::Buy
    }

    pub fn crypto_taxable_amount(&self) -> CryptoAmount {
        if self.is_taxable() {
            self.crypto_in
        } else {
            CryptoAmount::ZERO
        }
    }

    pub fn fiat_taxable_amount(&self) -> FiatAmount {
        if self.is_taxable() {
            self.fiat_in_no_fee
        } else {
            FiatAmount::ZERO
        }
    }

    pub fn crypto_balance_change(&self) -> CryptoAmount {
        self.crypto_in
    }
}

impl Entry for Acquisition {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn asset(&self) -> &str {
        &self.asset
    }

    fn line(&self) -> LineId {
        self.line
    }
}

/// Raw, pre-validation inputs for a [`Disposal`].
#[derive(Clone, Debug, Default)]
pub struct DisposalInput {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub exchange: String,
    pub holder: String,
    pub transaction_type: Option<TransactionType>,
    pub spot_price: FiatAmount,
    pub crypto_out_no_fee: CryptoAmount,
    pub crypto_fee: CryptoAmount,
    pub crypto_out_with_fee: Option<CryptoAmount>,
    pub fiat_out_no_fee: Option<FiatAmount>,
    pub fiat_fee: Option<FiatAmount>,
    pub line: LineId,
    pub unique_id: Option<String>,
    pub notes: Option<String>,
}

/// Crypto flowing out: a sell, outgoing gift or donation, a fee-only event,
/// or the synthetic `move` disposal the transformer derives from an
/// inter-account transfer's fee.
#[derive(Clone, Debug, Serialize)]
pub struct Disposal {
    timestamp: DateTime<Utc>,
    asset: String,
    exchange: String,
    holder: String,
    transaction_type: TransactionType,
    spot_price: FiatAmount,
    crypto_out_no_fee: CryptoAmount,
    crypto_fee: CryptoAmount,
    crypto_out_with_fee: CryptoAmount,
    fiat_out_no_fee: FiatAmount,
    fiat_fee: FiatAmount,
    line: LineId,
    unique_id: Option<String>,
    notes: Option<String>,
}

impl Disposal {
    pub fn new(
        configuration: &Configuration,
        input: DisposalInput,
    ) -> Result<Self, TransactionError> {
        let line = input.line;
        let transaction_type = input.transaction_type.unwrap_or(TransactionType::Sell);

        if !transaction_type.is_disposal_kind() {
            return Err(MalformedInputError::InvalidTransactionType {
                line,
                kind: transaction_type,
            }
            .into());
        }

        Self::build(configuration, transaction_type, input)
    }

    /// Constructor for disposals synthesized by the input transformer: the
    /// fee side of an inter-account transfer (`Move`) and the fee-only
    /// disposal split out of a crypto-fee acquisition (`Fee`).
    pub(crate) fn synthetic(
        configuration: &Configuration,
        transaction_type: TransactionType,
        input: DisposalInput,
    ) -> Result<Self, TransactionError> {
        debug_assert!(matches!(
            transaction_type,
            TransactionType::Move | TransactionType::Fee
        ));
        Self::build(configuration, transaction_type, input)
    }

    fn build(
        configuration: &Configuration,
        transaction_type: TransactionType,
        input: DisposalInput,
    ) -> Result<Self, TransactionError> {
        let line = input.line;

        configuration.check_asset(&input.asset, line)?;
        configuration.check_exchange(&input.exchange, line)?;
        configuration.check_holder(&input.holder, line)?;

        check_non_negative(input.spot_price, "spot_price", line)?;
        check_non_negative_crypto(input.crypto_fee, "crypto_fee", line)?;
        check_non_negative_crypto(input.crypto_out_no_fee, "crypto_out_no_fee", line)?;

        match transaction_type {
            // Only the fee consumes an acquired-lot fraction on a fee-only
            // disposal; a principal amount would be unaccounted for.
            TransactionType::Fee => {
                if !input.crypto_out_no_fee.is_zero() {
                    return Err(MalformedInputError::FeeWithPrincipal { line }.into());
                }
                check_positive(input.crypto_fee, "crypto_fee", line)?;
            }
            TransactionType::Move => {}
            _ => check_positive(input.crypto_out_no_fee, "crypto_out_no_fee", line)?,
        }

        if input.spot_price.is_zero() && !input.crypto_fee.is_zero() {
            return Err(MalformedInputError::ZeroSpotPriceWithFee { line }.into());
        }

        let derived_with_fee = input.crypto_out_no_fee + input.crypto_fee;
        let crypto_out_with_fee = match input.crypto_out_with_fee {
            Some(supplied) => {
                // Crypto quantities carry no exchange-supplied rounding, so
                // redundant crypto fields must match exactly.
                if supplied != derived_with_fee {
                    return Err(InconsistentAmountError {
                        line,
                        field: "crypto_out_with_fee",
                        supplied: supplied.to_string(),
                        derived: derived_with_fee.to_string(),
                    }
                    .into());
                }
                supplied
            }
            None => derived_with_fee,
        };

        let derived_out_no_fee = input.crypto_out_no_fee * input.spot_price;
        let fiat_out_no_fee = match input.fiat_out_no_fee {
            Some(supplied) => {
                check_consistent(
                    supplied,
                    derived_out_no_fee,
                    "fiat_out_no_fee",
                    line,
                    configuration,
                )?;
                supplied
            }
            None => derived_out_no_fee,
        };

        let derived_fee = input.crypto_fee * input.spot_price;
        let fiat_fee = match input.fiat_fee {
            Some(supplied) => {
                check_consistent(supplied, derived_fee, "fiat_fee", line, configuration)?;
                supplied
            }
            None => derived_fee,
        };

        Ok(Self {
            timestamp: input.timestamp,
            asset: input.asset,
            exchange: input.exchange,
            holder: input.holder,
            transaction_type,
            spot_price: input.spot_price,
            crypto_out_no_fee: input.crypto_out_no_fee,
            crypto_fee: input.crypto_fee,
            crypto_out_with_fee,
            fiat_out_no_fee,
            fiat_fee,
            line,
            unique_id: input.unique_id,
            notes: input.notes,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn spot_price(&self) -> FiatAmount {
        self.spot_price
    }

    pub fn crypto_out_no_fee(&self) -> CryptoAmount {
        self.crypto_out_no_fee
    }

    pub fn crypto_fee(&self) -> CryptoAmount {
        self.crypto_fee
    }

    pub fn crypto_out_with_fee(&self) -> CryptoAmount {
        self.crypto_out_with_fee
    }

    pub fn fiat_out_no_fee(&self) -> FiatAmount {
        self.fiat_out_no_fee
    }

    pub fn fiat_fee(&self) -> FiatAmount {
        self.fiat_fee
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_taxable(&self) -> bool {
        self.crypto_out_with_fee > CryptoAmount::ZERO
    }

    /// The full outflow, fee included, consumes acquired lots.
    pub fn crypto_taxable_amount(&self) -> CryptoAmount {
        self.crypto_out_with_fee
    }

    pub fn fiat_taxable_amount(&self) -> FiatAmount {
        self.fiat_out_no_fee + self.fiat_fee
    }

    pub fn crypto_balance_change(&self) -> CryptoAmount {
        self.crypto_out_with_fee
    }
}

impl Entry for Disposal {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn asset(&self) -> &str {
        &self.asset
    }

    fn line(&self) -> LineId {
        self.line
    }
}

/// Raw, pre-validation inputs for a [`Transfer`].
#[derive(Clone, Debug, Default)]
pub struct TransferInput {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub from_exchange: String,
    pub from_holder: String,
    pub to_exchange: String,
    pub to_holder: String,
    pub spot_price: Option<FiatAmount>,
    pub crypto_sent: CryptoAmount,
    pub crypto_received: CryptoAmount,
    pub line: LineId,
    pub unique_id: Option<String>,
    pub notes: Option<String>,
}

/// Crypto moved between the user's own accounts. Not a disposal of the moved
/// principal (cost basis follows the funds), but the network/exchange fee is
/// crypto leaving the user's hands and is taxed through a synthetic `move`
/// disposal.
#[derive(Clone, Debug, Serialize)]
pub struct Transfer {
    timestamp: DateTime<Utc>,
    asset: String,
    from_exchange: String,
    from_holder: String,
    to_exchange: String,
    to_holder: String,
    spot_price: FiatAmount,
    crypto_sent: CryptoAmount,
    crypto_received: CryptoAmount,
    crypto_fee: CryptoAmount,
    fiat_fee: FiatAmount,
    line: LineId,
    unique_id: Option<String>,
    notes: Option<String>,
}

impl Transfer {
    pub fn new(
        configuration: &Configuration,
        input: TransferInput,
    ) -> Result<Self, TransactionError> {
        let line = input.line;

        configuration.check_asset(&input.asset, line)?;
        configuration.check_exchange(&input.from_exchange, line)?;
        configuration.check_holder(&input.from_holder, line)?;
        configuration.check_exchange(&input.to_exchange, line)?;
        configuration.check_holder(&input.to_holder, line)?;

        check_positive(input.crypto_sent, "crypto_sent", line)?;
        check_non_negative_crypto(input.crypto_received, "crypto_received", line)?;

        if input.crypto_sent < input.crypto_received {
            return Err(MalformedInputError::SentLessThanReceived { line }.into());
        }
        let crypto_fee = input.crypto_sent - input.crypto_received;

        // Exchanges often omit the spot price on fee-less transfers; nothing
        // needs valuing in that case.
        let spot_price = input.spot_price.unwrap_or(FiatAmount::ZERO);
        check_non_negative(spot_price, "spot_price", line)?;
        if spot_price.is_zero() && !crypto_fee.is_zero() {
            return Err(MalformedInputError::ZeroSpotPriceWithFee { line }.into());
        }

        if input.from_exchange == input.to_exchange && input.from_holder == input.to_holder {
            warn!(
                "Line {line}: transfer from ({}, {}) to itself",
                input.from_exchange, input.from_holder,
            );
        }

        let fiat_fee = crypto_fee * spot_price;

        Ok(Self {
            timestamp: input.timestamp,
            asset: input.asset,
            from_exchange: input.from_exchange,
            from_holder: input.from_holder,
            to_exchange: input.to_exchange,
            to_holder: input.to_holder,
            spot_price,
            crypto_sent: input.crypto_sent,
            crypto_received: input.crypto_received,
            crypto_fee,
            fiat_fee,
            line,
            unique_id: input.unique_id,
            notes: input.notes,
        })
    }

    pub fn from_exchange(&self) -> &str {
        &self.from_exchange
    }

    pub fn from_holder(&self) -> &str {
        &self.from_holder
    }

    pub fn to_exchange(&self) -> &str {
        &self.to_exchange
    }

    pub fn to_holder(&self) -> &str {
        &self.to_holder
    }

    pub fn spot_price(&self) -> FiatAmount {
        self.spot_price
    }

    pub fn crypto_sent(&self) -> CryptoAmount {
        self.crypto_sent
    }

    pub fn crypto_received(&self) -> CryptoAmount {
        self.crypto_received
    }

    pub fn crypto_fee(&self) -> CryptoAmount {
        self.crypto_fee
    }

    pub fn fiat_fee(&self) -> FiatAmount {
        self.fiat_fee
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

impl Entry for Transfer {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn asset(&self) -> &str {
        &self.asset
    }

    fn line(&self) -> LineId {
        self.line
    }
}

/// The closed sum of the three transaction variants, as streamed from the
/// parser to the input transformer.
#[derive(Clone, Debug, Serialize)]
pub enum Transaction {
    Acquisition(Acquisition),
    Disposal(Disposal),
    Transfer(Transfer),
}

impl Transaction {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Acquisition(acquisition) => acquisition.transaction_type(),
            Self::Disposal(disposal) => disposal.transaction_type(),
            Self::Transfer(_) => TransactionType::Move,
        }
    }

    pub fn spot_price(&self) -> FiatAmount {
        match self {
            Self::Acquisition(acquisition) => acquisition.spot_price(),
            Self::Disposal(disposal) => disposal.spot_price(),
            Self::Transfer(transfer) => transfer.spot_price(),
        }
    }

    pub fn fiat_fee(&self) -> FiatAmount {
        match self {
            Self::Acquisition(acquisition) => acquisition.fiat_fee(),
            Self::Disposal(disposal) => disposal.fiat_fee(),
            Self::Transfer(transfer) => transfer.fiat_fee(),
        }
    }

    pub fn is_taxable(&self) -> bool {
        match self {
            Self::Acquisition(acquisition) => acquisition.is_taxable(),
            Self::Disposal(disposal) => disposal.is_taxable(),
            // A transfer is taxable only through the move-typed disposal the
            // transformer splits out of its fee.
            Self::Transfer(transfer) => !transfer.crypto_fee().is_zero(),
        }
    }

    pub fn crypto_taxable_amount(&self) -> CryptoAmount {
        match self {
            Self::Acquisition(acquisition) => acquisition.crypto_taxable_amount(),
            Self::Disposal(disposal) => disposal.crypto_taxable_amount(),
            Self::Transfer(transfer) => transfer.crypto_fee(),
        }
    }

    pub fn fiat_taxable_amount(&self) -> FiatAmount {
        match self {
            Self::Acquisition(acquisition) => acquisition.fiat_taxable_amount(),
            Self::Disposal(disposal) => disposal.fiat_taxable_amount(),
            Self::Transfer(transfer) => transfer.fiat_fee(),
        }
    }

    pub fn crypto_balance_change(&self) -> CryptoAmount {
        match self {
            Self::Acquisition(acquisition) => acquisition.crypto_balance_change(),
            Self::Disposal(disposal) => disposal.crypto_balance_change(),
            Self::Transfer(transfer) => transfer.crypto_sent(),
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Self::Acquisition(acquisition) => acquisition.notes(),
            Self::Disposal(disposal) => disposal.notes(),
            Self::Transfer(transfer) => transfer.notes(),
        }
    }
}

impl Entry for Transaction {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Acquisition(acquisition) => acquisition.timestamp(),
            Self::Disposal(disposal) => disposal.timestamp(),
            Self::Transfer(transfer) => transfer.timestamp(),
        }
    }

    fn asset(&self) -> &str {
        match self {
            Self::Acquisition(acquisition) => acquisition.asset(),
            Self::Disposal(disposal) => disposal.asset(),
            Self::Transfer(transfer) => transfer.asset(),
        }
    }

    fn line(&self) -> LineId {
        match self {
            Self::Acquisition(acquisition) => acquisition.line(),
            Self::Disposal(disposal) => disposal.line(),
            Self::Transfer(transfer) => transfer.line(),
        }
    }
}

fn check_positive(
    amount: CryptoAmount,
    field: &'static str,
    line: LineId,
) -> Result<(), MalformedInputError> {
    check_non_negative_crypto(amount, field, line)?;
    if amount.is_zero() {
        return Err(MalformedInputError::ZeroAmount { line, field });
    }
    Ok(())
}

fn check_non_negative_crypto(
    amount: CryptoAmount,
    field: &'static str,
    line: LineId,
) -> Result<(), MalformedInputError> {
    if amount.is_negative() {
        return Err(MalformedInputError::NegativeAmount { line, field });
    }
    Ok(())
}

fn check_non_negative(
    amount: FiatAmount,
    field: &'static str,
    line: LineId,
) -> Result<(), MalformedInputError> {
    if amount.is_negative() {
        return Err(MalformedInputError::NegativeAmount { line, field });
    }
    Ok(())
}

/// Compare a user-supplied fiat field with its derivation, within the
/// configured tolerance.
fn check_consistent(
    supplied: FiatAmount,
    derived: FiatAmount,
    field: &'static str,
    line: LineId,
    configuration: &Configuration,
) -> Result<(), InconsistentAmountError> {
    let delta = if supplied > derived {
        supplied - derived
    } else {
        derived - supplied
    };
    if delta > configuration.fiat_tolerance() {
        return Err(InconsistentAmountError {
            line,
            field,
            supplied: supplied.to_string(),
            derived: derived.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::test_configuration;
    use similar_asserts::assert_eq;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn buy_input() -> AcquisitionInput {
        AcquisitionInput {
            timestamp: ts("2020-01-01T00:00:00Z"),
            asset: "BTC".into(),
            exchange: "Coinbase".into(),
            holder: "Alice".into(),
            transaction_type: Some(TransactionType::Buy),
            spot_price: "10000".parse().unwrap(),
            crypto_in: "1".parse().unwrap(),
            line: LineId(1),
            ..Default::default()
        }
    }

    #[test]
    fn buy_derives_fiat_fields() {
        let config = test_configuration();
        let buy = Acquisition::new(&config, buy_input()).unwrap();

        assert_eq!(buy.fiat_in_no_fee(), "10000".parse().unwrap());
        assert_eq!(buy.fiat_in_with_fee(), "10000".parse().unwrap());
        assert_eq!(buy.fiat_fee(), FiatAmount::ZERO);
        assert!(!buy.is_taxable());
        assert_eq!(buy.crypto_taxable_amount(), CryptoAmount::ZERO);
    }

    #[test]
    fn crypto_fee_values_in_fiat() {
        let config = test_configuration();
        let mut input = buy_input();
        input.crypto_fee = Some("0.01".parse().unwrap());
        let buy = Acquisition::new(&config, input).unwrap();

        assert_eq!(buy.fiat_fee(), "100".parse().unwrap());
        assert_eq!(buy.fiat_in_with_fee(), "10100".parse().unwrap());
    }

    #[test]
    fn interest_is_taxable_income() {
        let config = test_configuration();
        let mut input = buy_input();
        input.transaction_type = Some(TransactionType::Interest);
        input.spot_price = "25000".parse().unwrap();
        input.crypto_in = "0.01".parse().unwrap();
        let interest = Acquisition::new(&config, input).unwrap();

        assert!(interest.is_taxable());
        assert_eq!(interest.crypto_taxable_amount(), "0.01".parse().unwrap());
        assert_eq!(interest.fiat_taxable_amount(), "250".parse().unwrap());
    }

    #[test]
    fn rejects_both_fees() {
        let config = test_configuration();
        let mut input = buy_input();
        input.crypto_fee = Some("0.01".parse().unwrap());
        input.fiat_fee = Some("100".parse().unwrap());
        assert!(matches!(
            Acquisition::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::BothFeesDefined { .. }
            ))
        ));
    }

    #[test]
    fn rejects_zero_spot_with_fee() {
        let config = test_configuration();
        let mut input = buy_input();
        input.spot_price = FiatAmount::ZERO;
        input.crypto_fee = Some("0.01".parse().unwrap());
        assert!(matches!(
            Acquisition::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::ZeroSpotPriceWithFee { .. }
            ))
        ));
    }

    #[test]
    fn rejects_unknown_exchange() {
        let config = test_configuration();
        let mut input = buy_input();
        input.exchange = "Mt. Gox".into();
        assert!(matches!(
            Acquisition::new(&config, input),
            Err(TransactionError::UnknownReference(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_fiat() {
        let config = test_configuration();
        let mut input = buy_input();
        input.fiat_in_no_fee = Some("9999".parse().unwrap());
        assert!(matches!(
            Acquisition::new(&config, input),
            Err(TransactionError::Inconsistent(_))
        ));
    }

    #[test]
    fn rejects_sell_typed_acquisition() {
        let config = test_configuration();
        let mut input = buy_input();
        input.transaction_type = Some(TransactionType::Sell);
        assert!(matches!(
            Acquisition::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::InvalidTransactionType { .. }
            ))
        ));
    }

    fn sell_input() -> DisposalInput {
        DisposalInput {
            timestamp: ts("2021-06-01T00:00:00Z"),
            asset: "BTC".into(),
            exchange: "Coinbase".into(),
            holder: "Alice".into(),
            transaction_type: Some(TransactionType::Sell),
            spot_price: "40000".parse().unwrap(),
            crypto_out_no_fee: "1".parse().unwrap(),
            crypto_fee: CryptoAmount::ZERO,
            line: LineId(2),
            ..Default::default()
        }
    }

    #[test]
    fn sell_derives_fiat_fields() {
        let config = test_configuration();
        let sell = Disposal::new(&config, sell_input()).unwrap();

        assert_eq!(sell.crypto_out_with_fee(), "1".parse().unwrap());
        assert_eq!(sell.fiat_out_no_fee(), "40000".parse().unwrap());
        assert!(sell.is_taxable());
        assert_eq!(sell.crypto_taxable_amount(), "1".parse().unwrap());
        assert_eq!(sell.fiat_taxable_amount(), "40000".parse().unwrap());
    }

    #[test]
    fn fee_disposal_taxes_only_the_fee() {
        let config = test_configuration();
        let mut input = sell_input();
        input.transaction_type = Some(TransactionType::Fee);
        input.crypto_out_no_fee = CryptoAmount::ZERO;
        input.crypto_fee = "0.002".parse().unwrap();
        let fee = Disposal::new(&config, input).unwrap();

        assert_eq!(fee.crypto_taxable_amount(), "0.002".parse().unwrap());
        assert_eq!(fee.fiat_taxable_amount(), "80".parse().unwrap());
    }

    #[test]
    fn fee_disposal_rejects_principal() {
        let config = test_configuration();
        let mut input = sell_input();
        input.transaction_type = Some(TransactionType::Fee);
        input.crypto_fee = "0.002".parse().unwrap();
        assert!(matches!(
            Disposal::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::FeeWithPrincipal { .. }
            ))
        ));
    }

    #[test]
    fn rejects_move_typed_user_disposal() {
        let config = test_configuration();
        let mut input = sell_input();
        input.transaction_type = Some(TransactionType::Move);
        assert!(matches!(
            Disposal::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::InvalidTransactionType { .. }
            ))
        ));
    }

    #[test]
    fn rejects_mismatched_crypto_out_with_fee() {
        let config = test_configuration();
        let mut input = sell_input();
        input.crypto_fee = "0.1".parse().unwrap();
        input.crypto_out_with_fee = Some("1.2".parse().unwrap());
        assert!(matches!(
            Disposal::new(&config, input),
            Err(TransactionError::Inconsistent(_))
        ));
    }

    fn transfer_input() -> TransferInput {
        TransferInput {
            timestamp: ts("2020-06-01T00:00:00Z"),
            asset: "BTC".into(),
            from_exchange: "Coinbase".into(),
            from_holder: "Alice".into(),
            to_exchange: "Ledger".into(),
            to_holder: "Alice".into(),
            spot_price: Some("15000".parse().unwrap()),
            crypto_sent: "1".parse().unwrap(),
            crypto_received: "0.99".parse().unwrap(),
            line: LineId(3),
            ..Default::default()
        }
    }

    #[test]
    fn transfer_derives_fee() {
        let config = test_configuration();
        let transfer = Transfer::new(&config, transfer_input()).unwrap();

        assert_eq!(transfer.crypto_fee(), "0.01".parse().unwrap());
        assert_eq!(transfer.fiat_fee(), "150".parse().unwrap());
    }

    #[test]
    fn transfer_allows_missing_spot_price_when_feeless() {
        let config = test_configuration();
        let mut input = transfer_input();
        input.spot_price = None;
        input.crypto_received = input.crypto_sent;
        let transfer = Transfer::new(&config, input).unwrap();

        assert_eq!(transfer.crypto_fee(), CryptoAmount::ZERO);
        assert_eq!(transfer.fiat_fee(), FiatAmount::ZERO);
    }

    #[test]
    fn transfer_rejects_missing_spot_price_with_fee() {
        let config = test_configuration();
        let mut input = transfer_input();
        input.spot_price = None;
        assert!(matches!(
            Transfer::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::ZeroSpotPriceWithFee { .. }
            ))
        ));
    }

    #[test]
    fn transfer_rejects_receiving_more_than_sent() {
        let config = test_configuration();
        let mut input = transfer_input();
        input.crypto_received = "1.5".parse().unwrap();
        assert!(matches!(
            Transfer::new(&config, input),
            Err(TransactionError::Malformed(
                MalformedInputError::SentLessThanReceived { .. }
            ))
        ));
    }
}
