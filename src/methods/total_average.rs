use super::{AccountingMethod, EventContext, LotCandidates, LotCandidatesOrder, LotMatch};
use crate::model::amount::{CryptoAmount, FiatAmount};

/// Total-average method (as used for Japanese filings): every consumed
/// fraction is valued at the volume-weighted average price of all lots
/// acquired up to the event, over the holder's lifetime.
///
/// Lots are still consumed oldest-first so the engine's per-lot bookkeeping
/// (remaining amounts, fraction closure) stays identical to the other
/// methods; only the basis price is synthetic.
pub struct TotalAverage;

impl AccountingMethod for TotalAverage {
    fn name(&self) -> &'static str {
        "total_average"
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
        let lot_index = candidates
            .indexes(LotCandidatesOrder::OlderToNewer)
            .find(|lot_index| !candidates.is_exhausted(*lot_index))?;

        let mut volume = CryptoAmount::ZERO;
        let mut value = FiatAmount::ZERO;
        for index in candidates.indexes(LotCandidatesOrder::OlderToNewer) {
            let lot = candidates.lot(index);
            volume += lot.crypto_in();
            value += lot.crypto_in() * lot.spot_price();
        }

        Some(LotMatch {
            lot_index,
            amount: candidates.get_partial_amount(lot_index),
            basis_price: value / volume,
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
    fn averages_over_all_acquired_lots() {
        // 1 @ 10000 and 1 @ 30000 average to 20000.
        let lots = lot_set(vec![
            lot("2020-01-01T00:00:00Z", 1, "10000", "1"),
            lot("2020-02-01T00:00:00Z", 2, "30000", "1"),
        ]);
        let mut state = CandidateState::new(&lots);
        let mut candidates =
            LotCandidates::new(&lots, &mut state, "2020-03-01T00:00:00Z".parse().unwrap());

        let found = TotalAverage
            .seek_non_exhausted_acquired_lot(
                &mut candidates,
                event_at("2020-03-01T00:00:00Z", "40000"),
                "1.5".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(found.lot_index, 0);
        assert_eq!(found.basis_price, "20000".parse().unwrap());
    }

    #[test]
    fn future_lots_do_not_skew_the_average() {
        let lots = lot_set(vec![
            lot("2020-01-01T00:00:00Z", 1, "10000", "1"),
            lot("2020-06-01T00:00:00Z", 2, "90000", "1"),
        ]);
        let mut state = CandidateState::new(&lots);
        let mut candidates =
            LotCandidates::new(&lots, &mut state, "2020-03-01T00:00:00Z".parse().unwrap());

        let found = TotalAverage
            .seek_non_exhausted_acquired_lot(
                &mut candidates,
                event_at("2020-03-01T00:00:00Z", "40000"),
                "0.5".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(found.basis_price, "10000".parse().unwrap());
    }
}
