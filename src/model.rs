pub use self::amount::{CryptoAmount, FiatAmount};
pub use self::balance::{Balance, BalanceSet, YearlyGainLoss};
pub use self::computed_data::ComputedData;
pub use self::config::Configuration;
pub use self::entry_set::EntrySet;
pub use self::gain_loss::{CapitalGainType, GainLoss, GainLossSet, TaxableEventRef};
pub use self::input_data::InputData;
pub use self::transaction::{Acquisition, Disposal, Entry, LineId, Transaction, TransactionType, Transfer};

pub mod amount;
pub mod balance;
pub mod computed_data;
pub mod config;
pub mod entry_set;
pub mod gain_loss;
pub mod input_data;
pub mod transaction;
