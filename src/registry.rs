//! Canonical, deduplicated storage for every guard the client has ever seen.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::guard::Guard;
use crate::ids::GuardId;
use crate::relay::Relay;

/// Global deduplication point for guards, keyed by relay identity.
///
/// **Invariant**: at most one [`Guard`] record exists per relay identity for
/// the lifetime of a `GuardRegistry`. [`GuardController`](crate::GuardController)
/// re-materializes guards from the registry on every consensus; it never
/// constructs one directly.
///
/// Concurrency: single-writer. The controller is the only caller that
/// mutates a `GuardRegistry`; nothing in this crate requires locking.
#[derive(Debug, Default)]
pub struct GuardRegistry {
    /// All known guards, keyed by identity.
    guards: HashMap<GuardId, Guard>,
}

impl GuardRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        GuardRegistry {
            guards: HashMap::new(),
        }
    }

    /// Return the canonical `Guard` for `relay`, creating it with default
    /// (never-contacted, unlisted) fields on first call.
    pub fn get_or_create(&mut self, relay: &Relay, now: SystemTime) -> &mut Guard {
        let id = GuardId::new(relay.ids().clone());
        self.guards
            .entry(id.clone())
            .or_insert_with(|| Guard::new(id, relay.is_dystopic(), now))
    }

    /// Look up a guard by identity without creating it.
    pub fn get(&self, id: &GuardId) -> Option<&Guard> {
        self.guards.get(id)
    }

    /// Look up a guard by identity, mutably, without creating it.
    pub fn get_mut(&mut self, id: &GuardId) -> Option<&mut Guard> {
        self.guards.get_mut(id)
    }

    /// Set `listed = false` on every known guard. Call this at the start of
    /// consensus ingestion, before re-marking the guards present in the new
    /// consensus as listed.
    pub fn mark_all_unlisted(&mut self, now: SystemTime) {
        for guard in self.guards.values_mut() {
            guard.set_listed(false, now);
        }
    }

    /// Iterate over every known guard, for eviction sweeps and persistence.
    pub fn iter(&self) -> impl Iterator<Item = &Guard> {
        self.guards.values()
    }

    /// Remove every guard matching `pred`. Used by eviction sweeps
    /// (`removeObsoleteEntryGuards`, `removeDeadEntryGuards`); the registry
    /// itself holds no age policy.
    pub(crate) fn retain(&mut self, mut pred: impl FnMut(&Guard) -> bool) {
        self.guards.retain(|_, g| pred(g));
    }

    /// Number of guards currently tracked.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// True iff no guards are tracked.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use tor_linkspec::{Ed25519Identity, RelayIds};

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
    fn get_or_create_deduplicates() {
        let mut reg = GuardRegistry::new();
        let now = SystemTime::now();
        let r = relay(1);
        let id1 = reg.get_or_create(&r, now).id().clone();
        let id2 = reg.get_or_create(&r, now).id().clone();
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn mark_all_unlisted_then_relist() {
        let mut reg = GuardRegistry::new();
        let now = SystemTime::now();
        let r = relay(2);
        reg.get_or_create(&r, now).set_listed(true, now);
        reg.mark_all_unlisted(now);
        assert!(reg.get(&GuardId::new(r.ids().clone())).unwrap().is_bad());
    }
}
