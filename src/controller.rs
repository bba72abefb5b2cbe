//! The client controller: durable state, consensus ingestion, and
//! per-circuit session driving.

use std::time::SystemTime;

use tracing::{debug, info};

use crate::algorithm::{end_session, Session};
use crate::collab::{Clock, ConsensusSource, WeightedChoice};
use crate::config::GuardParams;
use crate::ids::GuardId;
use crate::registry::GuardRegistry;
use crate::sample::SampleSet;

/// The ternary outcome a [`GuardController`] surfaces to its caller at the
/// end of a circuit-build attempt. No exception mechanism is needed; every
/// failure mode observable at this boundary collapses into one of these
/// three cases (see the error kinds in the crate-level design discussion).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ConnectOutcome {
    /// A circuit was built through the returned guard.
    Success,
    /// Every candidate was exhausted without success
    /// (`BUILD_CIRCUIT_TIMEOUT` attempts spent).
    Timeout,
}

/// Owns durable per-client guard state and drives one selection session per
/// circuit attempt.
///
/// The controller is the only writer of the [`GuardRegistry`] it holds, and
/// the only thing that may call into a [`Session`]; per the concurrency
/// model, at most one session is ever in flight against a given controller.
#[derive(Debug)]
pub struct GuardController {
    /// Canonical guard storage.
    registry: GuardRegistry,
    /// Guards the client has completed at least one circuit through, in
    /// order of first successful use.
    used_guards: Vec<GuardId>,
    /// Sampled open-network guards.
    sampled_utopic: SampleSet,
    /// Sampled commodity-port guards.
    sampled_dystopic: SampleSet,
    /// Timestamp of the most recent successful circuit, across sessions.
    last_success_at: Option<SystemTime>,
    /// Tunable parameters.
    params: GuardParams,
}

impl GuardController {
    /// Construct a controller with no durable state, as for a brand new
    /// client identity.
    pub fn new(params: GuardParams) -> Self {
        GuardController {
            registry: GuardRegistry::new(),
            used_guards: Vec::new(),
            sampled_utopic: SampleSet::new(),
            sampled_dystopic: SampleSet::new(),
            last_success_at: None,
            params,
        }
    }

    /// The guards the client has completed a circuit through, in
    /// first-use order.
    pub fn used_guards(&self) -> &[GuardId] {
        &self.used_guards
    }

    /// Read-only access to the guard registry, e.g. for inspection or
    /// persistence.
    pub fn registry(&self) -> &GuardRegistry {
        &self.registry
    }

    /// Timestamp of the most recent successful circuit, if any.
    pub fn last_success_at(&self) -> Option<SystemTime> {
        self.last_success_at
    }

    /// §4.2 `onNewConsensus`. Ingests a freshly downloaded consensus:
    /// re-marks every guard's listed status, partitions the listed guards
    /// into the utopic/dystopic pools, refreshes `bad` on every used guard,
    /// and refills both sampled sets up to their coverage threshold.
    pub fn on_new_consensus(
        &mut self,
        consensus: &dyn ConsensusSource,
        choose: &dyn WeightedChoice<GuardId>,
        clock: &dyn Clock,
    ) {
        let now = clock.now();
        self.registry.mark_all_unlisted(now);

        let relays = consensus.fresh_consensus();
        let mut utopic_pool = Vec::with_capacity(relays.len());
        let mut dystopic_pool = Vec::new();

        for relay in &relays {
            if !relay.is_listed_as_guard() {
                continue;
            }
            let g = self.registry.get_or_create(relay, now);
            g.set_listed(true, now);
            let id = g.id().clone();
            utopic_pool.push(id.clone());
            if relay.is_dystopic() {
                dystopic_pool.push(id);
            }
        }

        // Used guards absent from the new consensus are bad, by definition
        // of `bad = !listed`; nothing further to do here since `set_listed`
        // above already updated every guard the registry knows about.
        debug!(
            used = self.used_guards.len(),
            utopic_pool = utopic_pool.len(),
            dystopic_pool = dystopic_pool.len(),
            "ingested new consensus"
        );

        // floor(threshold * |pool|) would round to zero for any pool smaller
        // than 1/threshold entries, leaving the sampled set permanently
        // empty and the primary ring permanently unbuildable. A non-empty
        // pool must yield at least one sampled candidate.
        let utopic_threshold = Self::sample_threshold(self.params.sample_set_threshold, utopic_pool.len());
        let dystopic_threshold =
            Self::sample_threshold(self.params.sample_set_threshold, dystopic_pool.len());

        self.sampled_utopic
            .refill(&self.registry, &utopic_pool, utopic_threshold, choose);
        self.sampled_dystopic
            .refill(&self.registry, &dystopic_pool, dystopic_threshold, choose);

        self.sweep_expired_guards(now);
    }

    /// Minimum sampled-set coverage for a pool of the given size: at least
    /// one candidate whenever the pool is non-empty.
    fn sample_threshold(fraction: f64, pool_len: usize) -> usize {
        if pool_len == 0 {
            0
        } else {
            ((fraction * pool_len as f64).floor() as usize).max(1)
        }
    }

    /// Entry-guard health sweep: drop any `usedGuard` whose `bad_since` or
    /// `added_at` has aged past its configured lifetime.
    fn sweep_expired_guards(&mut self, now: SystemTime) {
        let lifetime = self.params.guard_lifetime;
        let remove_after = self.params.entry_guard_remove_after;

        let expired: Vec<GuardId> = self
            .registry
            .iter()
            .filter(|g| {
                let too_old = now
                    .duration_since(g.added_at())
                    .map(|age| age > lifetime)
                    .unwrap_or(false);
                let long_dead = g
                    .bad_since()
                    .and_then(|since| now.duration_since(since).ok())
                    .map(|age| age > remove_after)
                    .unwrap_or(false);
                too_old || long_dead
            })
            .map(|g| g.id().clone())
            .collect();

        for id in &expired {
            self.used_guards.retain(|u| u != id);
            self.sampled_utopic.remove(id);
            self.sampled_dystopic.remove(id);
        }
        if !expired.is_empty() {
            self.registry.retain(|g| !expired.contains(g.id()));
        }
    }

    /// §4.2 `buildCircuit`. Drives one selection session to completion,
    /// trying up to `build_circuit_timeout` candidates.
    pub fn build_circuit(
        &mut self,
        is_reachable: &mut dyn FnMut(&GuardId) -> bool,
        choose: &dyn WeightedChoice<GuardId>,
        clock: &dyn Clock,
    ) -> (ConnectOutcome, Option<GuardId>) {
        let mut session = Session::start(
            &self.used_guards,
            self.sampled_utopic.iter().cloned(),
            self.sampled_dystopic.iter().cloned(),
            &self.registry,
            &self.params,
            choose,
        );

        // `next_guard` returns `None` on a bare state-transition tick, which
        // does not consume an attempt; a controller with no guards or no
        // sampled relays cycles `PrimaryGuards -> TryUtopic -> TryDystopic`
        // forever without ever yielding `Some`. Bound the total tick count
        // separately from `attempts` so that case still times out.
        let mut attempts = 0;
        let mut ticks = 0usize;
        let max_ticks = self.params.build_circuit_timeout.saturating_mul(4).max(1);
        while attempts < self.params.build_circuit_timeout {
            if ticks >= max_ticks {
                break;
            }
            ticks += 1;
            let candidate = match session.next_guard(&mut self.registry, &self.params, choose, clock)
            {
                Some(g) => g,
                None => continue,
            };

            let ok = is_reachable(&candidate);
            self.register_connect_status(&candidate, ok, clock);

            let now = clock.now();
            let keep_going =
                session.should_continue(ok, self.last_success_at, now, &self.params);
            if ok {
                self.last_success_at = Some(now);
            }
            if !keep_going {
                end_session(&mut self.used_guards, candidate.clone());
                let outcome = if ok {
                    ConnectOutcome::Success
                } else {
                    ConnectOutcome::Timeout
                };
                return (outcome, Some(candidate));
            }
            attempts += 1;
        }
        (ConnectOutcome::Timeout, None)
    }

    /// §4.2 `registerConnectStatus`. Records the outcome of one connection
    /// attempt on the guard itself, and removes a never-contacted guard
    /// from `usedGuards` on failure.
    fn register_connect_status(&mut self, id: &GuardId, ok: bool, clock: &dyn Clock) {
        let now = clock.now();
        let was_never_contacted = match self.registry.get_mut(id) {
            Some(g) => {
                g.record_tried(now);
                g.record_outcome(ok, now)
            }
            None => return,
        };

        if ok {
            if was_never_contacted {
                info!(guard = %safelog::sensitive(id), "first successful contact");
                self.mark_used_guards_retriable();
            }
        } else if was_never_contacted {
            self.used_guards.retain(|u| u != id);
        }
    }

    /// Optional convergence aid (recommended ON, per design notes): on a
    /// guard's first successful contact, mark every earlier used guard
    /// retriable, to probe for "the network just came back."
    fn mark_used_guards_retriable(&mut self) {
        for id in self.used_guards.clone() {
            if let Some(g) = self.registry.get_mut(&id) {
                g.mark_for_retry();
            }
        }
    }
}
