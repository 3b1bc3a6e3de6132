use super::{AccountingMethod, EventContext, LotCandidates, LotCandidatesOrder, LotMatch};
use crate::model::amount::CryptoAmount;

/// Highest in, first out: the non-exhausted lot with the greatest spot price
/// pays first; price ties go to the earlier lot.
pub struct Hifo;

impl AccountingMethod for Hifo {
    fn name(&self) -> &'static str {
        "hifo"
    }

    fn lot_candidates_order(&self) -> LotCandidatesOrder {
        LotCandidatesOrder::OlderToNewer
    }

    fn seek_non_exhausted_acquired_lot(
        &self,
        candidates: &mut LotCandidates<'_>,
        _event: EventContext,
        _taxable_event_amount: CryptoAmount,
    ) -> Option<LotMatch> {
        // Ascending scan, strict `>` replacement: the earliest lot among
        // equal prices wins.
        let mut best: Option<usize> = None;
        for lot_index in candidates.indexes(self.lot_candidates_order()) {
            if candidates.is_exhausted(lot_index) {
                continue;
            }
            match best {
                Some(current)
                    if candidates.lot(lot_index).spot_price()
                        <= candidates.lot(current).spot_price() => {}
                _ => best = Some(lot_index),
            }
        }

        best.map(|lot_index| LotMatch {
            lot_index,
            amount: candidates.get_partial_amount(lot_index),
            basis_price: candidates.lot(lot_index).spot_price(),
        })
    }
}
