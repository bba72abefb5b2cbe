//! Tunable constants governing guard selection.

use std::time::Duration;

/// Tunable parameters for the guard selection algorithm.
///
/// All fields have defaults matching the upstream proposal; an embedder
/// wiring this crate into a full client is expected to override them from
/// its own configuration file only if it has a specific reason to.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct GuardParams {
    /// Size of the primary guard ring.
    pub n_primary_guards: usize,
    /// How long a primary guard may go untried before the algorithm forces
    /// a return to `PRIMARY_GUARDS` to give it another chance.
    pub primary_guards_retry_interval: Duration,
    /// Minimum fraction of a consensus pool that must be present (and
    /// non-bad) in the corresponding sampled set.
    pub sample_set_threshold: f64,
    /// How long since the last successful circuit before a new success is
    /// treated as "the network just came back", triggering reconvergence to
    /// the primary guards.
    pub internet_likely_down_interval: Duration,
    /// Whether to prefer bandwidth-weighted selection over uniform random
    /// choice. The algorithm itself is agnostic; this flag is forwarded to
    /// the embedder's [`WeightedChoice`](crate::WeightedChoice) implementation.
    pub prioritize_bandwidth: bool,
    /// Maximum number of candidates a single [`GuardController::build_circuit`](crate::GuardController::build_circuit)
    /// call will draw before giving up.
    pub build_circuit_timeout: usize,
    /// Maximum age of a guard record, measured from `added_at`, before it is
    /// evicted as obsolete.
    pub guard_lifetime: Duration,
    /// Maximum age of a guard's `bad_since` timestamp before it is evicted.
    pub entry_guard_remove_after: Duration,
}

impl Default for GuardParams {
    fn default() -> Self {
        GuardParams {
            n_primary_guards: 3,
            primary_guards_retry_interval: Duration::from_secs(3 * 60),
            sample_set_threshold: 0.02,
            internet_likely_down_interval: Duration::from_secs(5 * 60),
            prioritize_bandwidth: true,
            build_circuit_timeout: 30,
            guard_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
            entry_guard_remove_after: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let p = GuardParams::default();
        assert_eq!(p.n_primary_guards, 3);
        assert_eq!(p.primary_guards_retry_interval, Duration::from_secs(180));
        assert!((p.sample_set_threshold - 0.02).abs() < f64::EPSILON);
        assert_eq!(p.internet_likely_down_interval, Duration::from_secs(300));
        assert!(p.prioritize_bandwidth);
        assert_eq!(p.build_circuit_timeout, 30);
    }
}
