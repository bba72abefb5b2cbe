//! The guard selection state machine.
//!
//! Three states -- [`SelectionState::PrimaryGuards`], `TryUtopic`,
//! `TryDystopic` -- each implement, conceptually, a single
//! `next(ctx) -> Guard | None` method. Rather than dispatching through
//! mutable state objects, a [`Session`] holds the current state as a plain
//! enum and matches on it directly; a state transition is represented by
//! assigning a new value to `self.state` and returning `None`, telling the
//! driver "this was a transition tick, call me again without spending a
//! timeout attempt."
//!
//! A fourth state, a degraded-mode liveness ring over every guard tried
//! this session, is described as an optional alternative `TRY_DYSTOPIC`
//! exhaustion target; this crate instead always converges back to
//! `PrimaryGuards` on exhaustion (see `DESIGN.md`'s Open Question 2), so
//! that state has no representation here.

use std::time::SystemTime;

use itertools::Itertools;
use tracing::trace;

use crate::collab::{Clock, WeightedChoice};
use crate::config::GuardParams;
use crate::ids::GuardId;
use crate::registry::GuardRegistry;

/// Which of the three states a [`Session`] currently occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SelectionState {
    /// Trying the client's preferred ring of guards, in order.
    PrimaryGuards,
    /// Falling back to previously-used and freshly-sampled open-network
    /// guards.
    TryUtopic,
    /// Falling back further, to guards reachable only on commodity web
    /// ports.
    TryDystopic,
}

/// One `start`..`end` selection session, corresponding to a single circuit
/// build attempt.
///
/// A `Session` borrows nothing; it owns copies of whatever ordering it
/// needs at construction time and is driven purely through
/// [`Session::next_guard`], [`Session::should_continue`] and
/// [`Session::end`]. All mutable guard state (reachability, retry
/// eligibility) lives in the [`GuardRegistry`] passed to each call, not in
/// the session itself.
#[derive(Debug)]
pub struct Session {
    /// Snapshot of `usedGuards`' order, taken at `start`, used to walk used
    /// guards in first-use order without touching the controller's durable
    /// list mid-session.
    used_guards_snapshot: Vec<GuardId>,
    /// The session's primary ring, fixed at construction time.
    primary_guards: Vec<GuardId>,
    /// Sampled-but-unused open-network guards still eligible to draw.
    remaining_utopic: Vec<GuardId>,
    /// Sampled-but-unused commodity-port guards still eligible to draw.
    remaining_dystopic: Vec<GuardId>,
    /// Guards found unreachable so far this session, utopic side.
    tried_guards: Vec<GuardId>,
    /// Guards found unreachable so far this session, dystopic side.
    tried_dystopic_guards: Vec<GuardId>,
    /// Current state.
    state: SelectionState,
    /// The state this session was in before being preempted back to
    /// `PrimaryGuards`, if any.
    previous_state: Option<SelectionState>,
}

impl Session {
    /// Begin a new session: `(usedGuards, sampledUtopic, sampledDystopic)`
    /// minus any guard already excluded, building the primary ring per
    /// §4.3.1.
    pub fn start(
        used_guards: &[GuardId],
        sampled_utopic: impl IntoIterator<Item = GuardId>,
        sampled_dystopic: impl IntoIterator<Item = GuardId>,
        registry: &GuardRegistry,
        params: &GuardParams,
        choose: &dyn WeightedChoice<GuardId>,
    ) -> Session {
        // `usedGuards` is append-only durable state; dedup defensively so a
        // replayed or hand-edited persistence file can't double-count a
        // guard in the primary ring.
        let used_guards_snapshot: Vec<GuardId> = used_guards.iter().cloned().unique().collect();
        let used_set: std::collections::HashSet<GuardId> =
            used_guards_snapshot.iter().cloned().collect();

        let mut remaining_utopic: Vec<GuardId> = sampled_utopic
            .into_iter()
            .filter(|id| !used_set.contains(id))
            .collect();
        let remaining_dystopic: Vec<GuardId> = sampled_dystopic
            .into_iter()
            .filter(|id| !used_set.contains(id))
            .collect();

        let mut primary_guards = Vec::with_capacity(params.n_primary_guards);
        let mut used_copy: std::collections::VecDeque<GuardId> =
            used_guards_snapshot.iter().cloned().collect();

        while primary_guards.len() < params.n_primary_guards {
            let next = Self::next_primary_candidate(
                &mut used_copy,
                &mut remaining_utopic,
                &primary_guards,
                registry,
                choose,
            );
            match next {
                Some(g) => primary_guards.push(g),
                None => break,
            }
        }

        Session {
            used_guards_snapshot,
            primary_guards,
            remaining_utopic,
            remaining_dystopic,
            tried_guards: Vec::new(),
            tried_dystopic_guards: Vec::new(),
            state: SelectionState::PrimaryGuards,
            previous_state: None,
        }
    }

    /// Draw one candidate for the primary ring: prefer the head of
    /// `used_copy` (preserving durable first-use order), falling back to a
    /// weighted draw from `remaining_utopic`. Skips candidates already in
    /// `primary_guards` or currently bad; returns `None` once both sources
    /// are exhausted.
    fn next_primary_candidate(
        used_copy: &mut std::collections::VecDeque<GuardId>,
        remaining_utopic: &mut Vec<GuardId>,
        primary_guards: &[GuardId],
        registry: &GuardRegistry,
        choose: &dyn WeightedChoice<GuardId>,
    ) -> Option<GuardId> {
        loop {
            let candidate = if let Some(c) = used_copy.pop_front() {
                c
            } else if !remaining_utopic.is_empty() {
                let refs: Vec<&GuardId> = remaining_utopic.iter().collect();
                let picked = choose.choose(&refs)?.clone();
                remaining_utopic.retain(|id| id != &picked);
                picked
            } else {
                return None;
            };
            let bad = registry.get(&candidate).map(|g| g.is_bad()).unwrap_or(true);
            if !primary_guards.contains(&candidate) && !bad {
                return Some(candidate);
            }
            // Bad or already present: skip and draw the next candidate from
            // whichever source still has one.
        }
    }

    /// Current state, for diagnostics and tests.
    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// The fixed primary ring for this session.
    pub fn primary_guards(&self) -> &[GuardId] {
        &self.primary_guards
    }

    /// Guards found unreachable so far this session on the open-network
    /// side, per the `triedGuards` data-model field.
    pub fn tried_guards(&self) -> &[GuardId] {
        &self.tried_guards
    }

    /// Guards found unreachable so far this session on the commodity-port
    /// side, per the `triedDystopicGuards` data-model field.
    pub fn tried_dystopic_guards(&self) -> &[GuardId] {
        &self.tried_dystopic_guards
    }

    /// True iff every primary guard has been attempted at least once this
    /// session (i.e. the registry records a `last_tried` for each).
    fn all_primaries_tried(&self, registry: &GuardRegistry) -> bool {
        self.primary_guards
            .iter()
            .all(|id| registry.get(id).map(|g| g.last_tried().is_some()).unwrap_or(true))
    }

    /// True iff some primary guard was last tried more than
    /// `primary_guards_retry_interval` ago.
    fn any_primary_stale(
        &self,
        registry: &GuardRegistry,
        params: &GuardParams,
        now: SystemTime,
    ) -> bool {
        self.primary_guards.iter().any(|id| {
            registry
                .get(id)
                .and_then(|g| g.last_tried())
                .map(|t| {
                    now.duration_since(t)
                        .map(|d| d > params.primary_guards_retry_interval)
                        .unwrap_or(false)
                })
                .unwrap_or(false)
        })
    }

    /// Produce the next candidate to try, or `None` if this call was a
    /// state-transition tick (the driver must retry without spending a
    /// timeout attempt, never dispatching further within the same call).
    pub fn next_guard(
        &mut self,
        registry: &mut GuardRegistry,
        params: &GuardParams,
        choose: &dyn WeightedChoice<GuardId>,
        clock: &dyn Clock,
    ) -> Option<GuardId> {
        let now = clock.now();

        if self.state != SelectionState::PrimaryGuards && self.any_primary_stale(registry, params, now)
        {
            for id in &self.primary_guards {
                if let Some(g) = registry.get_mut(id) {
                    g.mark_for_retry();
                }
            }
            self.previous_state = Some(self.state);
            self.state = SelectionState::PrimaryGuards;
            return None;
        }

        match self.state {
            SelectionState::PrimaryGuards => self.primary_guards_next(registry),
            SelectionState::TryUtopic => self.try_utopic_next(registry, choose),
            SelectionState::TryDystopic => self.try_dystopic_next(registry, choose),
        }
    }

    /// §4.3.3 `PRIMARY_GUARDS`.
    fn primary_guards_next(&mut self, registry: &GuardRegistry) -> Option<GuardId> {
        for id in &self.primary_guards {
            if let Some(g) = registry.get(id) {
                if g.is_reachable_eligible() {
                    return Some(id.clone());
                }
            }
        }
        if self.all_primaries_tried(registry) {
            self.state = self.previous_state.take().unwrap_or(SelectionState::TryUtopic);
        } else {
            trace!("PRIMARY_GUARDS: no eligible guard, but not all tried; awaiting callback");
        }
        None
    }

    /// §4.3.3 `TRY_UTOPIC`.
    fn try_utopic_next(
        &mut self,
        registry: &GuardRegistry,
        choose: &dyn WeightedChoice<GuardId>,
    ) -> Option<GuardId> {
        let non_primary_used: Vec<GuardId> = self
            .used_guards_snapshot
            .iter()
            .filter(|id| !self.primary_guards.contains(id))
            .cloned()
            .collect();

        for id in &non_primary_used {
            if let Some(g) = registry.get(id) {
                if g.is_bad() {
                    continue;
                }
                if g.is_reachable_eligible() {
                    return Some(id.clone());
                } else if !self.tried_guards.contains(id) {
                    self.tried_guards.push(id.clone());
                }
            }
        }

        loop {
            if self.remaining_utopic.is_empty() {
                self.state = SelectionState::TryDystopic;
                return None;
            }
            let refs: Vec<&GuardId> = self.remaining_utopic.iter().collect();
            let Some(picked) = choose.choose(&refs).cloned() else {
                self.state = SelectionState::TryDystopic;
                return None;
            };
            let unreachable = registry
                .get(&picked)
                .map(|g| !g.is_reachable_eligible())
                .unwrap_or(true);
            if unreachable {
                self.remaining_utopic.retain(|id| id != &picked);
                if !self.tried_guards.contains(&picked) {
                    self.tried_guards.push(picked);
                }
                continue;
            }
            return Some(picked);
        }
    }

    /// §4.3.3 `TRY_DYSTOPIC`, symmetric to `TRY_UTOPIC`. Exhaustion
    /// transitions back to `PRIMARY_GUARDS` (the recommended convergence
    /// path), marking all primaries retriable so the reassertion actually
    /// has a chance to succeed.
    fn try_dystopic_next(
        &mut self,
        registry: &mut GuardRegistry,
        choose: &dyn WeightedChoice<GuardId>,
    ) -> Option<GuardId> {
        let non_primary_used: Vec<GuardId> = self
            .used_guards_snapshot
            .iter()
            .filter(|id| {
                !self.primary_guards.contains(id)
                    && registry.get(id).map(|g| g.is_dystopic()).unwrap_or(false)
            })
            .cloned()
            .collect();

        for id in &non_primary_used {
            if let Some(g) = registry.get(id) {
                if g.is_bad() {
                    continue;
                }
                if g.is_reachable_eligible() {
                    return Some(id.clone());
                } else if !self.tried_dystopic_guards.contains(id) {
                    self.tried_dystopic_guards.push(id.clone());
                }
            }
        }

        loop {
            if self.remaining_dystopic.is_empty() {
                for id in &self.primary_guards {
                    if let Some(g) = registry.get_mut(id) {
                        g.mark_for_retry();
                    }
                }
                self.state = SelectionState::PrimaryGuards;
                return None;
            }
            let refs: Vec<&GuardId> = self.remaining_dystopic.iter().collect();
            let Some(picked) = choose.choose(&refs).cloned() else {
                for id in &self.primary_guards {
                    if let Some(g) = registry.get_mut(id) {
                        g.mark_for_retry();
                    }
                }
                self.state = SelectionState::PrimaryGuards;
                return None;
            };
            let unreachable = registry
                .get(&picked)
                .map(|g| !g.is_reachable_eligible())
                .unwrap_or(true);
            if unreachable {
                self.remaining_dystopic.retain(|id| id != &picked);
                if !self.tried_dystopic_guards.contains(&picked) {
                    self.tried_dystopic_guards.push(picked);
                }
                continue;
            }
            return Some(picked);
        }
    }

    /// §4.3.4 `shouldContinue`. Tells the driver whether to keep pulling
    /// candidates after the most recent probe. Always updates
    /// `last_success_at` on success (performed by the caller; see
    /// [`GuardController`](crate::GuardController)).
    pub fn should_continue(
        &mut self,
        success: bool,
        last_success_at: Option<SystemTime>,
        now: SystemTime,
        params: &GuardParams,
    ) -> bool {
        if !success {
            return true;
        }
        match last_success_at {
            Some(prev)
                if now
                    .duration_since(prev)
                    .map(|d| d > params.internet_likely_down_interval)
                    .unwrap_or(false) =>
            {
                self.state = SelectionState::PrimaryGuards;
                true
            }
            _ => false,
        }
    }

}

/// §4.3.5 `end`. Appends `g` to `usedGuards` unless already present; this is
/// the single point that promotes a guard to long-term status. Returns
/// `true` iff `g` was newly appended (idempotent on repeated calls with the
/// same guard).
pub(crate) fn end_session(used_guards: &mut Vec<GuardId>, g: GuardId) -> bool {
    if used_guards.contains(&g) {
        false
    } else {
        used_guards.push(g);
        true
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::unwrap_used)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::relay::Relay;
    use std::time::Duration;
    use tor_linkspec::{Ed25519Identity, RelayIds};

    struct FirstChoice;
    impl WeightedChoice<GuardId> for FirstChoice {
        fn choose<'a>(&self, pool: &[&'a GuardId]) -> Option<&'a GuardId> {
            pool.first().copied()
        }
    }

    struct FixedClock(SystemTime);
    impl Clock for FixedClock {
        fn now(&self) -> SystemTime {
            self.0
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

    fn listed_pool(registry: &mut GuardRegistry, now: SystemTime, n: u8) -> Vec<GuardId> {
        (0..n)
            .map(|i| {
                let r = relay(i);
                let g = registry.get_or_create(&r, now);
                g.set_listed(true, now);
                g.id().clone()
            })
            .collect()
    }

    #[test]
    fn primary_ring_has_no_duplicates_and_respects_cap() {
        let mut registry = GuardRegistry::new();
        let now = SystemTime::UNIX_EPOCH;
        let pool = listed_pool(&mut registry, now, 10);
        let params = GuardParams::default();
        let session = Session::start(&[], pool, vec![], &registry, &params, &FirstChoice);
        assert_eq!(session.primary_guards().len(), params.n_primary_guards);
        let unique: std::collections::HashSet<_> = session.primary_guards().iter().collect();
        assert_eq!(unique.len(), session.primary_guards().len());
    }

    #[test]
    fn primary_ring_prefers_used_guards_in_order() {
        let mut registry = GuardRegistry::new();
        let now = SystemTime::UNIX_EPOCH;
        let pool = listed_pool(&mut registry, now, 10);
        let used = vec![pool[5].clone(), pool[2].clone()];
        let params = GuardParams::default();
        let session = Session::start(&used, pool, vec![], &registry, &params, &FirstChoice);
        assert_eq!(&session.primary_guards()[0..2], &used[..]);
    }

    #[test]
    fn primary_guards_excludes_bad_guards() {
        let mut registry = GuardRegistry::new();
        let now = SystemTime::UNIX_EPOCH;
        let mut pool = listed_pool(&mut registry, now, 5);
        // Mark the first candidate bad; it must not appear in the ring.
        let bad_id = pool[0].clone();
        registry.get_mut(&bad_id).unwrap().set_listed(false, now);
        pool.retain(|id| id != &bad_id);
        let used = vec![bad_id.clone()];
        let params = GuardParams::default();
        let session = Session::start(&used, pool, vec![], &registry, &params, &FirstChoice);
        assert!(!session.primary_guards().contains(&bad_id));
    }

    /// Testable property 6, "preemption law": once some primary's
    /// `last_tried` is older than `primary_guards_retry_interval`, the very
    /// next yielded guard comes from `primary_guards`, even if the session
    /// had already moved on to a later state.
    #[test]
    fn preemption_returns_to_primary_guards_mid_session() {
        let mut registry = GuardRegistry::new();
        let start_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let pool = listed_pool(&mut registry, start_time, 10);
        let params = GuardParams::default();
        let mut session =
            Session::start(&[], pool.clone(), vec![], &registry, &params, &FirstChoice);

        // Record that every primary guard was tried at `start_time`.
        for id in session.primary_guards().to_vec() {
            registry.get_mut(&id).unwrap().record_tried(start_time);
            registry.get_mut(&id).unwrap().record_outcome(false, start_time);
        }
        // Force the session out of PRIMARY_GUARDS.
        session.state = SelectionState::TryUtopic;

        let later = start_time + params.primary_guards_retry_interval + Duration::from_secs(1);
        let clock = FixedClock(later);
        let next = session.next_guard(&mut registry, &params, &FirstChoice, &clock);
        // The preemption tick itself returns None...
        assert_eq!(next, None);
        assert_eq!(session.state(), SelectionState::PrimaryGuards);
        assert_eq!(session.previous_state, Some(SelectionState::TryUtopic));
        // ...and the very next call yields a primary guard.
        let yielded = session.next_guard(&mut registry, &params, &FirstChoice, &clock);
        assert!(yielded.is_some());
        assert!(session.primary_guards().contains(&yielded.unwrap()));
    }

    #[test]
    fn try_dystopic_exhaustion_returns_to_primary_guards() {
        let mut registry = GuardRegistry::new();
        let now = SystemTime::UNIX_EPOCH;
        let pool = listed_pool(&mut registry, now, 3);
        let params = GuardParams::default();
        let mut session = Session::start(&[], pool, vec![], &registry, &params, &FirstChoice);
        session.state = SelectionState::TryDystopic;
        session.remaining_dystopic.clear();
        let clock = FixedClock(now);
        let next = session.next_guard(&mut registry, &params, &FirstChoice, &clock);
        assert_eq!(next, None);
        assert_eq!(session.state(), SelectionState::PrimaryGuards);
    }

    #[test]
    fn end_session_is_idempotent() {
        let mut used = Vec::new();
        let id = GuardId::new(
            RelayIds::builder()
                .ed_identity(Ed25519Identity::from([9; 32]))
                .build()
                .unwrap(),
        );
        assert!(end_session(&mut used, id.clone()));
        assert!(!end_session(&mut used, id));
        assert_eq!(used.len(), 1);
    }
}
