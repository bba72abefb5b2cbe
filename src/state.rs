//! Durable round-trip state: the part of a [`GuardController`](crate::GuardController)
//! that must survive a client restart.
//!
//! Everything here is plain data; this module carries no logic beyond
//! converting to and from the owned controller state. Loading and storing
//! are left to an embedder-supplied [`tor_persist::DynStorageHandle`], the
//! same abstraction the rest of the arti guard manager uses to stay
//! independent of any particular storage backend.

use std::time::SystemTime;

use humantime_serde::Serde;
use serde::{Deserialize, Serialize};
use tor_persist::DynStorageHandle;

use crate::err::GuardMgrError;
use crate::ids::GuardId;

/// The storage key this crate's state is filed under.
pub const STORAGE_KEY: &str = "guard_select_state";

/// The durable fields of a single guard, as enumerated in the data model:
/// `addedAt`, `madeContact`, `badSince`. Everything else (reachability,
/// retry eligibility) is session- or consensus-derived and is rebuilt from
/// scratch on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedGuard {
    /// The guard's identity.
    pub id: GuardId,
    /// When this guard was first introduced to durable state.
    pub added_at: Serde<SystemTime>,
    /// Whether the client has ever completed a handshake with this guard.
    pub made_contact: bool,
    /// When this guard became unusable, if it currently is.
    pub bad_since: Option<Serde<SystemTime>>,
}

/// The full durable state of a [`GuardController`](crate::GuardController):
/// `usedGuards` (ordered), and both sampled sets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersistentGuardState {
    /// Guards the client has completed a circuit through, in first-use
    /// order.
    pub used_guards: Vec<GuardId>,
    /// Durable per-guard fields, keyed by identity, for every guard the
    /// registry still knows about.
    pub guards: Vec<PersistedGuard>,
    /// Sampled open-network guard identities.
    pub sampled_utopic: Vec<GuardId>,
    /// Sampled commodity-port guard identities.
    pub sampled_dystopic: Vec<GuardId>,
}

impl PersistentGuardState {
    /// Load the most recently stored state, if any.
    pub fn load(storage: &DynStorageHandle<PersistentGuardState>) -> Result<Option<Self>, GuardMgrError> {
        Ok(storage.load()?)
    }

    /// Persist this state, overwriting whatever was stored previously.
    pub fn store(&self, storage: &DynStorageHandle<PersistentGuardState>) -> Result<(), GuardMgrError> {
        Ok(storage.store(self)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let state = PersistentGuardState::default();
        let json = serde_json::to_string(&state).expect("serialize");
        let back: PersistentGuardState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.used_guards, state.used_guards);
    }
}
