//! # Concurrency primitives.
//!
//! - [`Lock`] serializes work per key, optionally capped globally. Every
//!   lifecycle operation of one app runs under the app's key.
//! - [`VoteGate`] is a one-veto-wins ballot used to let consumers reject a
//!   navigation.
//! - [`ReadyBarrier`] resolves once every participant finished reacting to a
//!   navigation, so events fire only after the routing work is done.

mod barrier;
mod lock;
mod vote;

pub use barrier::{ReadyBarrier, ReadyCounter};
pub use lock::Lock;
pub use vote::{GateOutcome, VoteController, VoteGate};
