//! # Event subscriber trait.
//!
//! [`Subscribe`] is the asynchronous observation point of the runtime. Unlike
//! [`Hook`](crate::Hook) taps, which run inline and can steer control flow,
//! subscribers only observe: each gets
//! - a **dedicated worker task**,
//! - a **bounded queue** (capacity via [`Subscribe::queue_capacity`]),
//! - **panic isolation** (panics are reported as `EventKind::SubscriberPanicked`).
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only** and publishes
//!   `EventKind::SubscriberOverflow`.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use mountvisor::{Event, EventKind, Subscribe};
//!
//! struct BrokenApps;
//!
//! #[async_trait]
//! impl Subscribe for BrokenApps {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::AppBroken) {
//!             // page an on-call, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "broken-apps" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, never in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
