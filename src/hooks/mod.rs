//! # Extension points.
//!
//! Hooks are named, typed callback slots that run **inline** at a fixed point of
//! an operation (before loading, after mounting, on a phase error, ...). Each
//! slot can be tapped, tapped once, or untapped independently.
//!
//! - [`Hook`] — notification slot. Panicking taps are caught and ignored.
//! - [`DecisionHook`] — slot whose answer alters control flow (retry a failed
//!   load, ignore an unmount failure). The answer is `true` when any tap says
//!   so; a panicking tap answers `false`.
//!
//! ```text
//!  operation ──► hook.call(&ctx) ──► tap #1 ─► tap #2 ─► ...   (registration order)
//!                      │
//!                      └─ once-taps are removed before they run
//! ```
//!
//! For asynchronous, queued observation use a [`Subscribe`](crate::Subscribe)r instead.

mod slot;

pub use slot::{DecisionHook, Hook, TapId};
