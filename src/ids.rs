//! Identity types used to key guards.

use derive_more::AsRef;
use serde::{Deserialize, Serialize};
use tor_linkspec::RelayIds;

/// The persistent identity of a single guard.
///
/// Two `GuardId`s are equal whenever the underlying [`RelayIds`] overlap in
/// any recognized identity key; this mirrors the way the consensus itself
/// treats relay identities as the unit of deduplication.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, AsRef, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuardId(pub(crate) RelayIds);

impl GuardId {
    /// Construct a new `GuardId` from a relay's identity keys.
    pub fn new(ids: RelayIds) -> Self {
        GuardId(ids)
    }

    /// Return the underlying [`RelayIds`].
    pub fn relay_ids(&self) -> &RelayIds {
        &self.0
    }
}

impl std::fmt::Display for GuardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use tor_linkspec::{Ed25519Identity, RelayIdType};

    #[test]
    fn equality_by_identity() {
        let ed = Ed25519Identity::from([3; 32]);
        let ids_a = RelayIds::builder().ed_identity(ed).build().unwrap();
        let ids_b = RelayIds::builder().ed_identity(ed).build().unwrap();
        assert_eq!(GuardId::new(ids_a), GuardId::new(ids_b));
        assert_eq!(
            GuardId::new(RelayIds::builder().ed_identity(ed).build().unwrap())
                .relay_ids()
                .identity(RelayIdType::Ed25519)
                .is_some(),
            true
        );
    }
}
