//! The consensus-supplied view of a single relay.

use tor_linkspec::{HasRelayIds, RelayIds};

/// An immutable snapshot of a relay as it appears in a single consensus.
///
/// `Relay` is the unit the embedder hands to [`GuardRegistry::getOrCreate`]
/// (see [`crate::registry::GuardRegistry`]) each time a new consensus
/// arrives; the registry turns it into (or reuses) a long-lived [`Guard`](crate::Guard).
#[derive(Clone, Debug)]
pub struct Relay {
    /// The relay's identity keys, as advertised in the consensus.
    ids: RelayIds,
    /// The relay's self-reported or measured bandwidth weight.
    ///
    /// Units are whatever [`WeightedChoice`](crate::WeightedChoice) expects;
    /// this crate never interprets the value itself.
    bandwidth: u32,
    /// True iff the relay is reachable only on commodity web ports (80, 443),
    /// i.e. it belongs to the dystopic pool.
    dystopic: bool,
    /// True iff the directory authorities currently list this relay with
    /// the `Guard` flag.
    listed_as_guard: bool,
}

impl Relay {
    /// Construct a new `Relay` from its consensus-advertised properties.
    pub fn new(ids: RelayIds, bandwidth: u32, dystopic: bool, listed_as_guard: bool) -> Self {
        Relay {
            ids,
            bandwidth,
            dystopic,
            listed_as_guard,
        }
    }

    /// Return this relay's advertised bandwidth weight.
    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    /// Return true iff this relay is reachable only on commodity web ports.
    pub fn is_dystopic(&self) -> bool {
        self.dystopic
    }

    /// Return true iff the consensus lists this relay with the `Guard` flag.
    pub fn is_listed_as_guard(&self) -> bool {
        self.listed_as_guard
    }

    /// Return this relay's identity keys.
    pub fn ids(&self) -> &RelayIds {
        &self.ids
    }
}

impl HasRelayIds for Relay {
    fn identity(
        &self,
        key_type: tor_linkspec::RelayIdType,
    ) -> Option<tor_linkspec::RelayIdRef<'_>> {
        self.ids.identity(key_type)
    }
}
