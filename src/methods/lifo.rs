use super::{AccountingMethod, EventContext, LotCandidates, LotCandidatesOrder, LotMatch};
use crate::model::amount::CryptoAmount;

/// Last in, first out: the newest lot acquired before the event pays first.
///
/// No tax-year fence is applied here; jurisdictions that require one get it
/// from a dedicated method, not from the engine.
pub struct Lifo;

impl AccountingMethod for Lifo {
    fn name(&self) -> &'static str {
        "lifo"
    }

    fn lot_candidates_order(&self) -> LotCandidatesOrder {
        LotCandidatesOrder::NewerToOlder
    }

    fn seek_non_exhausted_acquired_lot(
        &self,
        candidates: &mut LotCandidates<'_>,
        _event: EventContext,
        _taxable_event_amount: CryptoAmount,
    ) -> Option<LotMatch> {
        candidates
            .indexes(self.lot_candidates_order())
            .find(|lot_index| !candidates.is_exhausted(*lot_index))
            .map(|lot_index| LotMatch {
                lot_index,
                amount: candidates.get_partial_amount(lot_index),
                basis_price: candidates.lot(lot_index).spot_price(),
            })
    }
}
