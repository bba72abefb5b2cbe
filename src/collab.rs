//! Traits for the collaborators this crate consumes but does not implement.
//!
//! The selection algorithm is deliberately ignorant of how a connection is
//! actually attempted, how a consensus is downloaded and parsed, and how
//! bandwidth-weighted sampling works. Those concerns are supplied by the
//! embedder through the traits below, following the same "ask the universe"
//! pattern used elsewhere for directory abstraction.

use std::time::SystemTime;

use crate::err::PickGuardError;
use crate::relay::Relay;

/// A source of "fresh" relay lists, standing in for a downloaded and parsed
/// network consensus.
pub trait ConsensusSource {
    /// Return every relay currently listed as usable as a guard.
    fn fresh_consensus(&self) -> Vec<Relay>;
}

/// Bandwidth-weighted (or, if the embedder prefers, uniform) random choice
/// over a pool of candidates.
///
/// Implementations backing a real client are expected to weight by
/// advertised bandwidth; tests may inject a deterministic or
/// round-robin implementation.
pub trait WeightedChoice<T> {
    /// Pick one element of `pool`. Returns `None` only if `pool` is empty.
    fn choose<'a>(&self, pool: &[&'a T]) -> Option<&'a T>;
}

/// Uniform random choice, ignoring bandwidth entirely.
///
/// A reasonable default for an embedder that has not wired in real
/// consensus weights yet; real clients should prefer a bandwidth-weighted
/// implementation instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformChoice;

impl<T> WeightedChoice<T> for UniformChoice {
    fn choose<'a>(&self, pool: &[&'a T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        pool.choose(&mut rand::thread_rng()).copied()
    }
}

/// Pick one element of `pool`, surfacing an empty pool as a proper
/// [`PickGuardError`] instead of a bare `None`.
pub fn pick_or_err<'a, T>(
    choose: &dyn WeightedChoice<T>,
    pool: &[&'a T],
) -> Result<&'a T, PickGuardError> {
    choose.choose(pool).ok_or(PickGuardError::NoCandidatesAvailable)
}

/// A monotonic clock, abstracted so that tests can inject simulated time.
pub trait Clock {
    /// Return the current time.
    fn now(&self) -> SystemTime;
}

/// A [`Clock`] backed by [`SystemTime::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uniform_choice_picks_from_pool() {
        let items = [1, 2, 3];
        let refs: Vec<&i32> = items.iter().collect();
        let picked = UniformChoice.choose(&refs).expect("non-empty pool");
        assert!(items.contains(picked));
    }

    #[test]
    fn uniform_choice_empty_pool_is_none() {
        let refs: Vec<&i32> = Vec::new();
        assert!(UniformChoice.choose(&refs).is_none());
    }

    #[test]
    fn pick_or_err_wraps_empty_pool() {
        let refs: Vec<&i32> = Vec::new();
        let err = pick_or_err(&UniformChoice, &refs).unwrap_err();
        assert!(matches!(err, PickGuardError::NoCandidatesAvailable));
    }

    #[test]
    fn pick_or_err_passes_through_choice() {
        let items = [7];
        let refs: Vec<&i32> = items.iter().collect();
        let picked = pick_or_err(&UniformChoice, &refs).expect("non-empty pool");
        assert_eq!(*picked, 7);
    }
}
