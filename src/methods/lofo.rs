use super::{AccountingMethod, EventContext, LotCandidates, LotCandidatesOrder, LotMatch};
use crate::model::amount::CryptoAmount;

/// Lowest in, first out: the cheapest non-exhausted lot pays first; price
/// ties go to the earlier lot.
pub struct Lofo;

impl AccountingMethod for Lofo {
    fn name(&self) -> &'static str {
        "lofo"
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
        let mut best: Option<usize> = None;
        for lot_index in candidates.indexes(self.lot_candidates_order()) {
            if candidates.is_exhausted(lot_index) {
                continue;
            }
            match best {
                Some(current)
                    if candidates.lot(lot_index).spot_price()
                        >= candidates.lot(current).spot_price() => {}
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

#[cfg(test)]
mod tests {
    use super::super::tests::{event_at, lot, lot_set};
    use super::super::CandidateState;
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn picks_cheapest_lot() {
        let lots = lot_set(vec![
            lot("2020-01-01T00:00:00Z", 1, "30000", "1"),
            lot("2020-02-01T00:00:00Z", 2, "10000", "1"),
            lot("2020-03-01T00:00:00Z", 3, "20000", "1"),
        ]);
        let mut state = CandidateState::new(&lots);
        let mut candidates =
            LotCandidates::new(&lots, &mut state, "2020-04-01T00:00:00Z".parse().unwrap());

        let found = Lofo
            .seek_non_exhausted_acquired_lot(
                &mut candidates,
                event_at("2020-04-01T00:00:00Z", "40000"),
                "0.5".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(found.lot_index, 1);
        assert_eq!(found.basis_price, "10000".parse().unwrap());
    }
}
