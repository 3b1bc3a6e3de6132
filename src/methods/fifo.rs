use super::{AccountingMethod, EventContext, LotCandidates, LotCandidatesOrder, LotMatch};
use crate::model::amount::CryptoAmount;

/// First in, first out: the oldest non-exhausted lot pays first.
///
/// Because consumption is strictly oldest-first, every lot left of the
/// from-index is known exhausted and the seek advances past it permanently,
/// keeping the whole run linear in the number of lots.
pub struct Fifo;

impl AccountingMethod for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
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
        while candidates.from_index() < candidates.to_index() {
            let lot_index = candidates.from_index();
            if candidates.is_exhausted(lot_index) {
                candidates.advance_from_index();
                continue;
            }
            return Some(LotMatch {
                lot_index,
                amount: candidates.get_partial_amount(lot_index),
                basis_price: candidates.lot(lot_index).spot_price(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{event_at, lot, lot_set};
    use super::super::CandidateState;
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn picks_oldest_lot_first() {
        let lots = lot_set(vec![
            lot("2020-01-01T00:00:00Z", 1, "10000", "1"),
            lot("2020-02-01T00:00:00Z", 2, "20000", "1"),
        ]);
        let mut state = CandidateState::new(&lots);
        let mut candidates =
            LotCandidates::new(&lots, &mut state, "2020-03-01T00:00:00Z".parse().unwrap());

        let found = Fifo
            .seek_non_exhausted_acquired_lot(
                &mut candidates,
                event_at("2020-03-01T00:00:00Z", "30000"),
                "1.5".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(found.lot_index, 0);
        assert_eq!(found.amount, "1".parse().unwrap());
        assert_eq!(found.basis_price, "10000".parse().unwrap());
    }

    #[test]
    fn skips_exhausted_lots_permanently() {
        let lots = lot_set(vec![
            lot("2020-01-01T00:00:00Z", 1, "10000", "1"),
            lot("2020-02-01T00:00:00Z", 2, "20000", "1"),
        ]);
        let mut state = CandidateState::new(&lots);
        state.consume(0, "1".parse().unwrap());

        let mut candidates =
            LotCandidates::new(&lots, &mut state, "2020-03-01T00:00:00Z".parse().unwrap());
        let found = Fifo
            .seek_non_exhausted_acquired_lot(
                &mut candidates,
                event_at("2020-03-01T00:00:00Z", "30000"),
                "0.5".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(found.lot_index, 1);
        assert_eq!(state.from_index, 1);
    }

    #[test]
    fn exhausted_when_no_lot_is_old_enough() {
        let lots = lot_set(vec![lot("2020-06-01T00:00:00Z", 1, "10000", "1")]);
        let mut state = CandidateState::new(&lots);
        let mut candidates =
            LotCandidates::new(&lots, &mut state, "2020-03-01T00:00:00Z".parse().unwrap());

        assert!(Fifo
            .seek_non_exhausted_acquired_lot(
                &mut candidates,
                event_at("2020-03-01T00:00:00Z", "30000"),
                "0.5".parse().unwrap(),
            )
            .is_none());
    }
}
