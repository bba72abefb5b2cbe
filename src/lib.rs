//! Select and track entry guards for a Tor client.
//!
//! A guard is a relay that a client uses as the first hop of every circuit it
//! builds, for as long as the guard remains usable. Concentrating the first
//! hop onto a small, slowly-changing set of relays bounds the set of
//! observers who can ever see a given client's traffic enter the network.
//!
//! This crate implements the core decision procedure only: given durable
//! per-client state (which guards have been used, which are sampled from the
//! consensus) and the outcome of each connection attempt, it yields the next
//! guard a circuit builder should try. It does not open connections, does not
//! parse a consensus document, and does not perform bandwidth-weighted
//! sampling itself -- those are supplied by the embedder through the traits
//! in [`collab`].
// @@ begin lint list maintained by maint/add_warning @@
#![deny(missing_docs)]
#![warn(noop_method_call)]
#![deny(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![deny(clippy::ref_option_ref)]
#![deny(clippy::unnecessary_wraps)]
#![deny(clippy::unwrap_used)]
//! <!-- @@ end lint list maintained by maint/add_warning @@ -->

// Glossary:
//     Primary guard
//     Sample
//     Utopic / Dystopic
//     Session

mod algorithm;
mod collab;
mod config;
mod controller;
mod err;
mod guard;
mod ids;
mod registry;
mod relay;
mod sample;
mod state;

pub use algorithm::{SelectionState, Session};
pub use collab::{pick_or_err, Clock, ConsensusSource, UniformChoice, WeightedChoice};
pub use config::GuardParams;
pub use controller::{ConnectOutcome, GuardController};
pub use err::{GuardMgrError, PickGuardError};
pub use guard::Guard;
pub use ids::GuardId;
pub use registry::GuardRegistry;
pub use relay::Relay;
pub use state::PersistentGuardState;
