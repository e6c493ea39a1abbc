//! # LogWriter — events to `tracing`
//!
//! A subscriber forwarding every [`Event`] to the `tracing` ecosystem. Failures
//! go out at `warn`, lifecycle progress at `info`, chatty per-phase events at
//! `debug`. Install any `tracing` subscriber (e.g. `tracing-subscriber`'s `fmt`)
//! to see them.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let app = e.app.as_deref().unwrap_or("-");
        let container = e.container.as_deref().unwrap_or("-");
        let phase = e.phase.map(|p| p.as_str()).unwrap_or("-");
        let url = e.url.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
                warn!(seq = e.seq, subscriber = app, reason, kind = ?e.kind, "subscriber trouble");
            }
            EventKind::LoadStarting => {
                debug!(seq = e.seq, app, attempt = e.attempt, "loading source");
            }
            EventKind::Loaded => {
                info!(seq = e.seq, app, attempt = e.attempt, "loaded");
            }
            EventKind::LoadFailed => {
                warn!(seq = e.seq, app, attempt = e.attempt, reason, "load failed");
            }
            EventKind::LoadRetryScheduled => {
                info!(seq = e.seq, app, attempt = e.attempt, delay_ms = e.delay_ms, "load retry scheduled");
            }
            EventKind::PhaseStarting => {
                debug!(seq = e.seq, app, phase, "phase starting");
            }
            EventKind::PhaseCompleted => {
                debug!(seq = e.seq, app, phase, "phase completed");
            }
            EventKind::PhaseFailed => {
                warn!(seq = e.seq, app, phase, reason, "phase failed");
            }
            EventKind::PhaseTimeout => {
                warn!(seq = e.seq, app, phase, timeout_ms = e.timeout_ms, "phase timed out");
            }
            EventKind::AppBroken => {
                warn!(seq = e.seq, app, phase, reason, "app broken");
            }
            EventKind::AppUnloaded => {
                info!(seq = e.seq, app, "unloaded");
            }
            EventKind::OperationInterrupted | EventKind::OperationCancelled => {
                debug!(seq = e.seq, app, reason, kind = ?e.kind, "operation superseded");
            }
            EventKind::NavigationProposed => {
                debug!(seq = e.seq, url, mode = reason, "navigation proposed");
            }
            EventKind::NavigationCommitted => {
                info!(seq = e.seq, url, "navigation committed");
            }
            EventKind::NavigationVetoed => {
                info!(seq = e.seq, url, "navigation vetoed");
            }
            EventKind::DeadLoopDetected => {
                warn!(seq = e.seq, url, repetitions = e.attempt, "dead loop detected");
            }
            EventKind::AppRegistered | EventKind::AppUnregistered => {
                debug!(seq = e.seq, container, app, kind = ?e.kind, "registry changed");
            }
            EventKind::AppActivated => {
                info!(seq = e.seq, container, app, "activated");
            }
            EventKind::ActivationFailed => {
                warn!(seq = e.seq, container, app, reason, "activation failed");
            }
            EventKind::ContainerDestroyed => {
                info!(seq = e.seq, container, "destroyed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
