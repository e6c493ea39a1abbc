//! # Runtime events emitted by app controllers, containers and the coordinator.
//!
//! The [`EventKind`] enum classifies events across four groups:
//! - **App lifecycle**: loading, bootstrapping, mounting, updating, unmounting, unloading
//! - **Arbitration**: operations interrupted or cancelled by a newer one
//! - **Navigation**: proposed, committed, vetoed, dead loop
//! - **Container**: registration, activation, destruction
//!
//! The [`Event`] struct carries metadata such as timestamps, app name, phase,
//! reasons and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use mountvisor::{Event, EventKind, Phase};
//!
//! let ev = Event::new(EventKind::PhaseFailed)
//!     .with_app("checkout")
//!     .with_phase(Phase::Mount)
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::PhaseFailed);
//! assert_eq!(ev.app.as_deref(), Some("checkout"));
//! assert_eq!(ev.phase, Some(Phase::Mount));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::lifecycle::Phase;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `app` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `app` (subscriber name), `reason` ("full" / "closed").
    SubscriberOverflow,

    // === App lifecycle ===
    /// The source loader is about to be invoked.
    ///
    /// Sets: `app`, `attempt`.
    LoadStarting,

    /// Source loading succeeded; lifecycle validated.
    ///
    /// Sets: `app`, `attempt`.
    Loaded,

    /// One loader attempt failed.
    ///
    /// Sets: `app`, `attempt`, `reason`.
    LoadFailed,

    /// A retry of the loader was granted.
    ///
    /// Sets: `app`, `attempt` (failed attempt), `delay_ms`.
    LoadRetryScheduled,

    /// A phase is about to run.
    ///
    /// Sets: `app`, `phase`.
    PhaseStarting,

    /// A phase completed.
    ///
    /// Sets: `app`, `phase`.
    PhaseCompleted,

    /// A phase failed (including timeouts and panics).
    ///
    /// Sets: `app`, `phase`, `reason`.
    PhaseFailed,

    /// A phase exceeded its budget (always followed by `PhaseFailed`).
    ///
    /// Sets: `app`, `phase`, `timeout_ms`.
    PhaseTimeout,

    /// The app entered `SkipBecauseBroken`.
    ///
    /// Sets: `app`, `phase`, `reason`.
    AppBroken,

    /// The app was unloaded and reset to `NotLoaded`.
    ///
    /// Sets: `app`.
    AppUnloaded,

    // === Arbitration ===
    /// An operation holding control was superseded before committing.
    ///
    /// Sets: `app`, `reason` ("<kind> by <kind>").
    OperationInterrupted,

    /// A queued operation was superseded before it started.
    ///
    /// Sets: `app`, `reason` ("<kind> by <kind>").
    OperationCancelled,

    // === Navigation ===
    /// A navigation was submitted to consumers.
    ///
    /// Sets: `url`, `reason` (mode).
    NavigationProposed,

    /// A navigation was approved and its browser events dispatched.
    ///
    /// Sets: `url`.
    NavigationCommitted,

    /// A navigation was vetoed and the history reverted.
    ///
    /// Sets: `url`.
    NavigationVetoed,

    /// Counter-navigations looped; auto-redirection aborted.
    ///
    /// Sets: `url`, `attempt` (repetitions).
    DeadLoopDetected,

    // === Container ===
    /// App registered with a container.
    ///
    /// Sets: `container`, `app`.
    AppRegistered,

    /// App removed from a container.
    ///
    /// Sets: `container`, `app`.
    AppUnregistered,

    /// `activate_app` completed; `app` is now mounted (absent = none).
    ///
    /// Sets: `container`, `app` (optional).
    AppActivated,

    /// `activate_app` failed.
    ///
    /// Sets: `container`, `app` (requested name), `reason`.
    ActivationFailed,

    /// Container destroyed.
    ///
    /// Sets: `container`.
    ContainerDestroyed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// App (or subscriber) name, if applicable.
    pub app: Option<Arc<str>>,
    /// Container name, if applicable.
    pub container: Option<Arc<str>>,
    /// Lifecycle phase, if applicable.
    pub phase: Option<Phase>,
    /// Navigation target, if applicable.
    pub url: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt / repetition count (starting from 1).
    pub attempt: Option<u32>,
    /// Phase budget in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            app: None,
            container: None,
            phase: None,
            url: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
        }
    }

    /// Attaches an app name.
    #[inline]
    pub fn with_app(mut self, app: impl Into<Arc<str>>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Attaches a container name.
    #[inline]
    pub fn with_container(mut self, container: impl Into<Arc<str>>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Attaches a phase.
    #[inline]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Attaches a navigation target.
    #[inline]
    pub fn with_url(mut self, url: impl Into<Arc<str>>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a phase budget (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_app(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_app(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
