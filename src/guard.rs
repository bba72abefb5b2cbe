//! The client-side view of a single guard relay.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{info, trace};

use crate::ids::GuardId;

/// What the client currently believes about one relay it might use (or is
/// using) as an entry guard.
///
/// A `Guard` is created once per relay identity by
/// [`GuardRegistry::getOrCreate`](crate::registry::GuardRegistry::getOrCreate)
/// and lives for as long as the relay stays in the registry; see the
/// registry's module docs for the deduplication invariant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Guard {
    /// This guard's persistent identity.
    id: GuardId,
    /// True iff the guard is reachable only on commodity web ports.
    dystopic: bool,
    /// True iff this relay appeared in the most recently ingested consensus.
    listed: bool,
    /// True iff the client has ever completed a handshake with this guard.
    made_contact: bool,
    /// Timestamp of the first connection failure since the last success, or
    /// `None` if the guard is not currently believed unreachable.
    unreachable_since: Option<SystemTime>,
    /// Timestamp of the most recent connection attempt of any kind.
    last_attempted: Option<SystemTime>,
    /// Timestamp of the most recent attempt; tracked separately from
    /// `last_attempted` only because the originating algorithm keeps the two
    /// distinct. Implementations are free to let them coincide.
    last_tried: Option<SystemTime>,
    /// One-shot override: when true, the guard may be yielded even though
    /// `unreachable_since` is set.
    can_retry: bool,
    /// Timestamp at which this guard became unusable (`listed == false`),
    /// used to decide eviction. `None` while the guard is listed.
    bad_since: Option<SystemTime>,
    /// When this guard was first introduced into durable state.
    added_at: SystemTime,
}

impl Guard {
    /// Construct a brand new guard record with default (never-contacted)
    /// fields, as performed by [`GuardRegistry::getOrCreate`](crate::registry::GuardRegistry::getOrCreate)
    /// the first time a relay identity is seen.
    pub(crate) fn new(id: GuardId, dystopic: bool, now: SystemTime) -> Self {
        Guard {
            id,
            dystopic,
            listed: false,
            made_contact: false,
            unreachable_since: None,
            last_attempted: None,
            last_tried: None,
            can_retry: false,
            bad_since: None,
            added_at: now,
        }
    }

    /// This guard's identity.
    pub fn id(&self) -> &GuardId {
        &self.id
    }

    /// True iff this guard is reachable only on commodity web ports.
    pub fn is_dystopic(&self) -> bool {
        self.dystopic
    }

    /// True iff the guard was present in the most recently ingested
    /// consensus.
    pub fn is_listed(&self) -> bool {
        self.listed
    }

    /// Convenience flag: a guard is "bad" exactly when it is unlisted. Bad
    /// guards must never be used to build a circuit.
    pub fn is_bad(&self) -> bool {
        !self.listed
    }

    /// True iff the client has ever completed a handshake with this guard.
    pub fn made_contact(&self) -> bool {
        self.made_contact
    }

    /// The time this guard first became unreachable since its last success,
    /// if any.
    pub fn unreachable_since(&self) -> Option<SystemTime> {
        self.unreachable_since
    }

    /// The time of the most recent connection attempt.
    pub fn last_attempted(&self) -> Option<SystemTime> {
        self.last_attempted
    }

    /// The time of the most recent attempt, as tracked by the selection
    /// algorithm (used to decide "has every primary guard been tried this
    /// session").
    pub fn last_tried(&self) -> Option<SystemTime> {
        self.last_tried
    }

    /// Whether this guard is currently eligible for a retry despite being
    /// marked unreachable.
    pub fn can_retry(&self) -> bool {
        self.can_retry
    }

    /// The time this guard became bad, if it currently is.
    pub fn bad_since(&self) -> Option<SystemTime> {
        self.bad_since
    }

    /// The time this guard was first added to durable state.
    pub fn added_at(&self) -> SystemTime {
        self.added_at
    }

    /// Return true iff the embedder should currently attempt a connection to
    /// this guard: it is not `unreachable_since`-marked, or it has been given
    /// a one-shot retry.
    pub fn is_reachable_eligible(&self) -> bool {
        self.can_retry || self.unreachable_since.is_none()
    }

    /// Mark this guard listed or unlisted, as part of consensus ingestion.
    /// See [`GuardRegistry::mark_all_unlisted`](crate::registry::GuardRegistry::mark_all_unlisted).
    pub(crate) fn set_listed(&mut self, listed: bool, now: SystemTime) {
        if self.listed && !listed {
            trace!(guard = %safelog::sensitive(&self.id), "guard dropped from consensus");
            if self.bad_since.is_none() {
                self.bad_since = Some(now);
            }
        } else if !self.listed && listed {
            trace!(guard = %safelog::sensitive(&self.id), "guard reappeared in consensus");
            self.bad_since = None;
        }
        self.listed = listed;
    }

    /// Grant this guard a one-shot retry regardless of its unreachable
    /// status.
    pub(crate) fn mark_for_retry(&mut self) {
        self.can_retry = true;
    }

    /// Record that the embedder just tried to connect to this guard; this
    /// updates `last_tried`, which the selection algorithm uses to decide
    /// session progress, independently of success or failure.
    pub(crate) fn record_tried(&mut self, now: SystemTime) {
        self.last_tried = Some(now);
    }

    /// Record the outcome of a connection attempt. See
    /// [`GuardController::register_connect_status`](crate::controller::GuardController::register_connect_status)
    /// for the surrounding bookkeeping (removal from `usedGuards` on a
    /// never-contacted failure is handled by the caller, not here).
    pub(crate) fn record_outcome(&mut self, success: bool, now: SystemTime) -> bool {
        let was_never_contacted = !self.made_contact;
        if success {
            if self.unreachable_since.is_some() {
                info!(guard = %safelog::sensitive(&self.id), "guard reachable again");
            }
            self.unreachable_since = None;
            self.can_retry = false;
            self.last_attempted = Some(now);
            self.made_contact = true;
        } else {
            if self.unreachable_since.is_none() {
                self.unreachable_since = Some(now);
            }
            self.last_attempted = Some(now);
            self.can_retry = false;
        }
        was_never_contacted
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use tor_linkspec::{Ed25519Identity, RelayIds};

    fn test_id() -> GuardId {
        GuardId::new(
            RelayIds::builder()
                .ed_identity(Ed25519Identity::from([7; 32]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn default_fields() {
        let now = SystemTime::now();
        let g = Guard::new(test_id(), false, now);
        assert!(!g.is_listed());
        assert!(g.is_bad());
        assert!(!g.made_contact());
        assert_eq!(g.unreachable_since(), None);
        assert_eq!(g.added_at(), now);
        assert!(g.is_reachable_eligible());
    }

    #[test]
    fn record_outcome_success_clears_unreachable() {
        let now = SystemTime::now();
        let mut g = Guard::new(test_id(), false, now);
        g.record_outcome(false, now);
        assert!(g.unreachable_since().is_some());
        let never_contacted = g.record_outcome(true, now);
        assert!(never_contacted);
        assert!(g.made_contact());
        assert_eq!(g.unreachable_since(), None);
        assert!(!g.can_retry());
    }

    #[test]
    fn set_listed_tracks_bad_since() {
        let now = SystemTime::now();
        let mut g = Guard::new(test_id(), false, now);
        g.set_listed(true, now);
        assert!(!g.is_bad());
        let later = now + std::time::Duration::from_secs(60);
        g.set_listed(false, later);
        assert_eq!(g.bad_since(), Some(later));
        g.set_listed(true, later);
        assert_eq!(g.bad_since(), None);
    }
}
