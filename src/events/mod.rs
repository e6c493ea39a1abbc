//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `AppController`, `LifecycleRunner`, `Container`,
//!   `NavigationCoordinator`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the container listener (fans out to its `SubscriberSet`)
//!   and anything holding a `Bus::subscribe()` receiver.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
