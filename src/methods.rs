//! Accounting-method protocol.
//!
//! A method decides which acquired lot pays for the next fraction of a
//! taxable event. The engine owns the per-lot remaining amounts and hands the
//! method a [`LotCandidates`] view restricted to lots acquired no later than
//! the event; the method picks a lot (or reports exhaustion) and never
//! mutates balances itself.

use crate::model::amount::{CryptoAmount, FiatAmount};
use crate::model::entry_set::EntrySet;
use crate::model::transaction::{Acquisition, LineId};
use chrono::{DateTime, Utc};
use thiserror::Error;

mod fifo;
mod hifo;
mod lifo;
mod lofo;
mod total_average;

pub use fifo::Fifo;
pub use hifo::Hifo;
pub use lifo::Lifo;
pub use lofo::Lofo;
pub use total_average::TotalAverage;

#[derive(Debug, Error)]
#[error("Unknown accounting method `{0}`")]
pub struct UnknownMethodError(pub String);

/// Direction a method traverses acquired-lot candidates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LotCandidatesOrder {
    OlderToNewer,
    NewerToOlder,
}

/// The slice of a taxable event a method may consult while seeking.
#[derive(Copy, Clone, Debug)]
pub struct EventContext {
    pub timestamp: DateTime<Utc>,
    pub spot_price: FiatAmount,
    pub line: LineId,
}

/// A selected lot: its index among the candidates, how much of it is still
/// unconsumed, and the unit price its consumed fraction is valued at.
///
/// `basis_price` is the lot's own spot price for identity-based methods;
/// averaging methods substitute a synthetic price.
#[derive(Copy, Clone, Debug)]
pub struct LotMatch {
    pub lot_index: usize,
    pub amount: CryptoAmount,
    pub basis_price: FiatAmount,
}

/// Engine-owned seek state that persists across a whole asset run: per-lot
/// remaining amounts plus the first index that may still hold a
/// chronologically-ordered non-exhausted lot.
#[derive(Clone, Debug)]
pub(crate) struct CandidateState {
    remaining: Vec<CryptoAmount>,
    from_index: usize,
}

impl CandidateState {
    pub(crate) fn new(lots: &EntrySet<Acquisition>) -> Self {
        Self {
            remaining: lots.iter().map(Acquisition::crypto_in).collect(),
            from_index: 0,
        }
    }

    pub(crate) fn remaining(&self, lot_index: usize) -> CryptoAmount {
        self.remaining[lot_index]
    }

    pub(crate) fn consume(&mut self, lot_index: usize, amount: CryptoAmount) {
        self.remaining[lot_index] -= amount;
        debug_assert!(!self.remaining[lot_index].is_negative());
    }
}

/// Read view over the acquired lots a method may pick from: every lot with a
/// timestamp at or before the current taxable event.
pub struct LotCandidates<'a> {
    lots: &'a EntrySet<Acquisition>,
    state: &'a mut CandidateState,
    to_index: usize,
}

impl<'a> LotCandidates<'a> {
    pub(crate) fn new(
        lots: &'a EntrySet<Acquisition>,
        state: &'a mut CandidateState,
        through: DateTime<Utc>,
    ) -> Self {
        let to_index = lots.count_through(through);
        Self {
            lots,
            state,
            to_index,
        }
    }

    /// Exclusive upper bound of the candidate range.
    pub fn to_index(&self) -> usize {
        self.to_index
    }

    pub fn lot(&self, lot_index: usize) -> &Acquisition {
        &self.lots[lot_index]
    }

    pub fn has_partial_amount(&self, lot_index: usize) -> bool {
        self.state.remaining(lot_index) != self.lot(lot_index).crypto_in()
    }

    /// Unconsumed amount left in a lot. Zero means exhausted.
    pub fn get_partial_amount(&self, lot_index: usize) -> CryptoAmount {
        self.state.remaining(lot_index)
    }

    pub fn is_exhausted(&self, lot_index: usize) -> bool {
        self.state.remaining(lot_index).is_zero()
    }

    /// First index that may hold a non-exhausted lot when scanning
    /// older-to-newer. Only ever advanced by methods that consume strictly
    /// oldest-first, which is what keeps their seek linear overall.
    pub fn from_index(&self) -> usize {
        self.state.from_index
    }

    pub fn advance_from_index(&mut self) {
        self.state.from_index += 1;
    }

    /// Candidate indexes in the given traversal order.
    pub fn indexes(&self, order: LotCandidatesOrder) -> Box<dyn Iterator<Item = usize>> {
        match order {
            LotCandidatesOrder::OlderToNewer => Box::new(0..self.to_index),
            LotCandidatesOrder::NewerToOlder => Box::new((0..self.to_index).rev()),
        }
    }
}

/// Pluggable lot-selection policy.
///
/// `seek_non_exhausted_acquired_lot` returns `None` when no candidate
/// satisfies the method's rule; the engine turns that into an
/// acquired-lots-exhausted failure if the event still needs crypto.
pub trait AccountingMethod: Send + Sync {
    fn name(&self) -> &'static str;

    fn lot_candidates_order(&self) -> LotCandidatesOrder;

    fn seek_non_exhausted_acquired_lot(
        &self,
        candidates: &mut LotCandidates<'_>,
        event: EventContext,
        taxable_event_amount: CryptoAmount,
    ) -> Option<LotMatch>;
}

/// All built-in methods. Plugins are registered here explicitly; there is no
/// discovery by side effect.
pub fn registry() -> Vec<Box<dyn AccountingMethod>> {
    vec![
        Box::new(Fifo),
        Box::new(Lifo),
        Box::new(Hifo),
        Box::new(Lofo),
        Box::new(TotalAverage),
    ]
}

/// Resolve a configured method name against the registry.
pub fn from_name(name: &str) -> Result<Box<dyn AccountingMethod>, UnknownMethodError> {
    registry()
        .into_iter()
        .find(|method| method.name() == name)
        .ok_or_else(|| UnknownMethodError(name.to_owned()))
}
