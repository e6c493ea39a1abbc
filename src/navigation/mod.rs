//! # Navigation: history access and consumer consensus.
//!
//! - [`HistoryBackend`] / [`MemoryHistory`]: the process-wide history surface.
//! - [`NavigationCoordinator`]: intercepts push/replace/pop, asks every
//!   [`NavigationConsumer`] to vote and signal readiness, and only then
//!   dispatches the history events, in submission order.
//!
//! Containers register themselves as consumers; hosts drive navigation through
//! the coordinator instead of writing the history directly.

mod consumer;
mod coordinator;
mod history;

pub use consumer::{
    ConsumerId, NavigationConsumer, NavigationDescriptor, NavigationMode, RouterNavigation,
};
pub use coordinator::{
    DeadLoop, NavigationCoordinator, NavigationHandle, NavigationHooks, NavigationOutcome,
};
pub use history::{HistoryBackend, HistoryWrite, Location, MemoryHistory, NavEvent};
