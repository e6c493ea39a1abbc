//! Error types used by the mountvisor runtime and hosted apps.
//!
//! - [`PhaseError`] — raised by a single lifecycle phase (user code, timeouts, panics).
//! - [`AppError`] — raised by [`AppController`](crate::AppController) operations.
//! - [`NavigationError`] — raised by the [`NavigationCoordinator`](crate::NavigationCoordinator).
//! - [`ContainerError`] — raised by the [`Container`](crate::Container).
//!
//! Every enum provides `as_label()`, a short stable snake_case label for logs/metrics.
//! [`AppError`] is `Clone` because shared operations (`load`, `unload`) hand the
//! same result to every caller.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::app::{AppState, TaskKind};
use crate::lifecycle::Phase;

/// # Errors produced by a lifecycle phase.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// The phase function reported a failure.
    #[error("{error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The phase exceeded its configured budget.
    #[error("{phase} timed out after {timeout:?}")]
    Timeout {
        /// Phase that timed out.
        phase: Phase,
        /// The configured budget.
        timeout: Duration,
    },

    /// The phase future panicked.
    #[error("{phase} panicked: {info}")]
    Panicked {
        /// Phase that panicked.
        phase: Phase,
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl PhaseError {
    /// Convenience constructor for [`PhaseError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        PhaseError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use mountvisor::PhaseError;
    ///
    /// assert_eq!(PhaseError::fail("boom").as_label(), "phase_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PhaseError::Fail { .. } => "phase_failed",
            PhaseError::Timeout { .. } => "phase_timeout",
            PhaseError::Panicked { .. } => "phase_panicked",
        }
    }
}

/// # Errors produced by app controller operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// The lifecycle lacks a `mount` or `unmount` function.
    #[error("app '{app}' has an invalid lifecycle: {reason}")]
    InvalidLifecycle {
        /// App name.
        app: Arc<str>,
        /// What is missing.
        reason: &'static str,
    },

    /// Source loading failed and no further retry was granted.
    #[error("app '{app}' failed to load after {attempts} attempt(s): {error}")]
    Load {
        /// App name.
        app: Arc<str>,
        /// Number of loader invocations.
        attempts: u32,
        /// Last loader error.
        error: PhaseError,
    },

    /// A bootstrap/mount/unmount/update phase failed.
    #[error("{error}")]
    Phase {
        /// App name.
        app: Arc<str>,
        /// Phase that failed.
        phase: Phase,
        /// The original error.
        error: PhaseError,
    },

    /// The operation held control but was superseded before committing.
    #[error("app '{app}': {kind} interrupted by {by}")]
    Interrupted {
        /// App name.
        app: Arc<str>,
        /// Operation that was interrupted.
        kind: TaskKind,
        /// Operation that superseded it.
        by: TaskKind,
    },

    /// The operation was superseded while still queued.
    #[error("app '{app}': {kind} cancelled by {by}")]
    Cancelled {
        /// App name.
        app: Arc<str>,
        /// Operation that was cancelled.
        kind: TaskKind,
        /// Operation that superseded it.
        by: TaskKind,
    },

    /// `start()` on a broken app.
    #[error("app '{app}' cannot start when broken")]
    Broken {
        /// App name.
        app: Arc<str>,
    },

    /// The app was unloaded; it accepts no further start/update.
    #[error("app '{app}' has been unloaded")]
    Unloaded {
        /// App name.
        app: Arc<str>,
    },

    /// `update()` on an app whose lifecycle has no update phase.
    #[error("app '{app}' has no update")]
    NoUpdate {
        /// App name.
        app: Arc<str>,
    },

    /// `update()` from a state that cannot reach `Mounted`.
    #[error("app '{app}' cannot update in state {state}")]
    CannotUpdate {
        /// App name.
        app: Arc<str>,
        /// State observed.
        state: AppState,
    },
}

impl AppError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AppError::InvalidLifecycle { .. } => "app_invalid_lifecycle",
            AppError::Load { .. } => "app_load_failed",
            AppError::Phase { .. } => "app_phase_failed",
            AppError::Interrupted { .. } => "app_interrupted",
            AppError::Cancelled { .. } => "app_cancelled",
            AppError::Broken { .. } => "app_broken",
            AppError::Unloaded { .. } => "app_unloaded",
            AppError::NoUpdate { .. } => "app_no_update",
            AppError::CannotUpdate { .. } => "app_cannot_update",
        }
    }

    /// Interruption and cancellation are control-flow signals, not failures.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            AppError::Interrupted { .. } | AppError::Cancelled { .. }
        )
    }

    /// Name of the app the error belongs to.
    pub fn app(&self) -> &str {
        match self {
            AppError::InvalidLifecycle { app, .. }
            | AppError::Load { app, .. }
            | AppError::Phase { app, .. }
            | AppError::Interrupted { app, .. }
            | AppError::Cancelled { app, .. }
            | AppError::Broken { app }
            | AppError::Unloaded { app }
            | AppError::NoUpdate { app }
            | AppError::CannotUpdate { app, .. } => app,
        }
    }
}

/// # Errors produced by the navigation coordinator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// A URL was requested too many times within one navigation burst.
    #[error("dead loop detected: '{url}' requested {count} times in one burst")]
    DeadLoop {
        /// URL that kept being requested.
        url: String,
        /// How many times it was requested.
        count: u32,
    },

    /// The coordinator was torn down.
    #[error("navigation coordinator closed")]
    Closed,
}

impl NavigationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NavigationError::DeadLoop { .. } => "navigation_dead_loop",
            NavigationError::Closed => "navigation_closed",
        }
    }
}

/// # Errors produced by a container.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Another container is already attached to the mount root.
    #[error("mount root '{root}' already has a container attached")]
    RootInUse {
        /// The contested root.
        root: String,
    },

    /// No registered app matches the requested name.
    #[error("cannot find app '{name}'")]
    AppNotFound {
        /// Requested name.
        name: String,
    },

    /// A later `activate_app` call took over.
    #[error("activation of {target} interrupted by {by}")]
    Interrupted {
        /// Target of this activation (`null` for deactivation).
        target: String,
        /// Target of the activation that took over.
        by: String,
    },

    /// The container was destroyed.
    #[error("container '{name}' destroyed")]
    Destroyed {
        /// Container name.
        name: Arc<str>,
    },

    /// An app operation failed.
    #[error(transparent)]
    App(#[from] AppError),

    /// The navigation driving a route-mode container failed.
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

impl ContainerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContainerError::RootInUse { .. } => "container_root_in_use",
            ContainerError::AppNotFound { .. } => "container_app_not_found",
            ContainerError::Interrupted { .. } => "container_interrupted",
            ContainerError::Destroyed { .. } => "container_destroyed",
            ContainerError::App(e) => e.as_label(),
            ContainerError::Navigation(e) => e.as_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_kinds_are_distinct_and_worded() {
        let interrupted = AppError::Interrupted {
            app: "foo".into(),
            kind: TaskKind::Start,
            by: TaskKind::Stop,
        };
        let cancelled = AppError::Cancelled {
            app: "foo".into(),
            kind: TaskKind::Stop,
            by: TaskKind::Start,
        };
        assert!(interrupted.is_interruption());
        assert!(cancelled.is_interruption());
        assert!(interrupted.to_string().contains("interrupted"));
        assert!(cancelled.to_string().contains("cancelled"));
        assert_ne!(interrupted.as_label(), cancelled.as_label());
    }

    #[test]
    fn phase_error_keeps_original_message() {
        let err = AppError::Phase {
            app: "foo".into(),
            phase: Phase::Mount,
            error: PhaseError::fail("kaboom"),
        };
        assert_eq!(err.to_string(), "kaboom");
        assert_eq!(err.app(), "foo");
        assert!(!err.is_interruption());
    }

    #[test]
    fn container_error_forwards_app_label() {
        let err = ContainerError::from(AppError::Broken { app: "x".into() });
        assert_eq!(err.as_label(), "app_broken");
        assert_eq!(err.to_string(), "app 'x' cannot start when broken");
    }
}
