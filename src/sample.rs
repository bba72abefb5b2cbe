//! The sampled sets: the bounded, slowly-growing subset of the consensus
//! pool a client is willing to consider for a given reachability class.

use std::collections::HashSet;

use crate::collab::WeightedChoice;
use crate::ids::GuardId;
use crate::registry::GuardRegistry;

/// An unordered, duplicate-free set of guard identities drawn from one pool
/// (utopic or dystopic), refilled lazily to maintain a minimum coverage of
/// that pool.
///
/// A bad guard (one that is currently unlisted) is never removed from a
/// `SampleSet` on that account alone; it is simply filtered out of every
/// view that the selection algorithm takes. It is removed only when the
/// registry destroys the underlying guard, or when a consensus change
/// reclassifies it between the utopic and dystopic pools.
#[derive(Clone, Debug, Default)]
pub struct SampleSet {
    /// The sampled identities.
    members: HashSet<GuardId>,
}

impl SampleSet {
    /// Construct an empty sample set.
    pub fn new() -> Self {
        SampleSet {
            members: HashSet::new(),
        }
    }

    /// Iterate over the sampled identities.
    pub fn iter(&self) -> impl Iterator<Item = &GuardId> {
        self.members.iter()
    }

    /// True iff `id` is present in this sample.
    pub fn contains(&self, id: &GuardId) -> bool {
        self.members.contains(id)
    }

    /// Number of entries currently sampled, regardless of bad status.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True iff no guard has been sampled yet.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Insert `id` unconditionally. Used when restoring from durable state.
    pub(crate) fn insert(&mut self, id: GuardId) {
        self.members.insert(id);
    }

    /// Remove `id`, e.g. because the underlying guard was evicted from the
    /// registry or reclassified to the other pool.
    pub(crate) fn remove(&mut self, id: &GuardId) {
        self.members.remove(id);
    }

    /// Count how many sampled entries are currently non-bad, per `registry`.
    fn non_bad_count(&self, registry: &GuardRegistry) -> usize {
        self.members
            .iter()
            .filter(|id| registry.get(id).map(|g| !g.is_bad()).unwrap_or(false))
            .count()
    }

    /// Refill this sample set from `pool` until it holds at least
    /// `threshold` non-bad entries, drawing fresh candidates via `choose`.
    /// A candidate already present in the set is never drawn twice.
    ///
    /// This implements step 5 of consensus ingestion: `sampleThreshold =
    /// floor(SAMPLE_SET_THRESHOLD * |pool|)`; while the non-bad count is
    /// below that, draw and append.
    pub(crate) fn refill(
        &mut self,
        registry: &GuardRegistry,
        pool: &[GuardId],
        threshold: usize,
        choose: &dyn WeightedChoice<GuardId>,
    ) {
        loop {
            if self.non_bad_count(registry) >= threshold {
                return;
            }
            let candidates: Vec<&GuardId> =
                pool.iter().filter(|id| !self.members.contains(id)).collect();
            if candidates.is_empty() {
                return;
            }
            match choose.choose(&candidates) {
                Some(picked) => {
                    self.members.insert(picked.clone());
                }
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::relay::Relay;
    use std::time::SystemTime;
    use tor_linkspec::{Ed25519Identity, RelayIds};

    struct FirstChoice;
    impl WeightedChoice<GuardId> for FirstChoice {
        fn choose<'a>(&self, pool: &[&'a GuardId]) -> Option<&'a GuardId> {
            pool.first().copied()
        }
    }

    fn relay(byte: u8) -> Relay {
        Relay::new(
            RelayIds::builder()
                .ed_identity(Ed25519Identity::from([byte; 32]))
                .build()
                .unwrap(),
            1000,
            false,
            true,
        )
    }

    #[test]
    fn refill_stops_at_threshold() {
        let mut registry = GuardRegistry::new();
        let now = SystemTime::now();
        let mut pool = Vec::new();
        for i in 0..10u8 {
            let r = relay(i);
            let g = registry.get_or_create(&r, now);
            g.set_listed(true, now);
            pool.push(g.id().clone());
        }
        let mut sample = SampleSet::new();
        sample.refill(&registry, &pool, 3, &FirstChoice);
        assert_eq!(sample.len(), 3);
        sample.refill(&registry, &pool, 3, &FirstChoice);
        assert_eq!(sample.len(), 3);
        sample.refill(&registry, &pool, 5, &FirstChoice);
        assert_eq!(sample.len(), 5);
    }

    #[test]
    fn refill_ignores_bad_entries_towards_threshold() {
        let mut registry = GuardRegistry::new();
        let now = SystemTime::now();
        let r = relay(1);
        let id = registry.get_or_create(&r, now).id().clone();
        // never marked listed: stays bad.
        let mut sample = SampleSet::new();
        sample.insert(id.clone());
        assert_eq!(sample.non_bad_count(&registry), 0);
    }
}
