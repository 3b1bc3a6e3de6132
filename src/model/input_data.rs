use crate::model::entry_set::EntrySet;
use crate::model::transaction::{Acquisition, Disposal, Transfer};

/// The three sealed entry sets for one asset, as handed to the engine.
///
/// Produced by the input transformer; the disposals set already contains the
/// synthetic fee-only and move-typed disposals.
#[derive(Clone, Debug)]
pub struct InputData {
    asset: String,
    acquisitions: EntrySet<Acquisition>,
    disposals: EntrySet<Disposal>,
    transfers: EntrySet<Transfer>,
}

impl InputData {
    pub fn new(
        acquisitions: EntrySet<Acquisition>,
        disposals: EntrySet<Disposal>,
        transfers: EntrySet<Transfer>,
    ) -> Self {
        debug_assert_eq!(acquisitions.asset(), disposals.asset());
        debug_assert_eq!(acquisitions.asset(), transfers.asset());

        Self {
            asset: acquisitions.asset().to_owned(),
            acquisitions,
            disposals,
            transfers,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn acquisitions(&self) -> &EntrySet<Acquisition> {
        &self.acquisitions
    }

    pub fn disposals(&self) -> &EntrySet<Disposal> {
        &self.disposals
    }

    pub fn transfers(&self) -> &EntrySet<Transfer> {
        &self.transfers
    }
}
