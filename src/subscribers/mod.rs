//! # Event subscribers.
//!
//! ```text
//! AppController / Container / Coordinator ── publish(Event) ──► Bus
//!                                                                 │
//!                                           container listener ◄──┘
//!                                                   │
//!                                            SubscriberSet::emit
//!                                        ┌──────────┼──────────┐
//!                                        ▼          ▼          ▼
//!                                    LogWriter   Metrics     Custom
//! ```
//!
//! Subscribers observe only. To steer control flow (retry a failed load,
//! ignore an unmount failure) tap a decision hook instead.

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
