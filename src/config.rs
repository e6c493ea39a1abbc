//! # Runtime configuration.
//!
//! Plain structs with `Default`, mirroring how they are consumed:
//! 1. **Container creation**: `Container::builder(name, root, config)`
//! 2. **Per-app defaults**: every [`AppController`](crate::AppController) the
//!    container registers copies [`ContainerConfig::app`].
//! 3. **Coordinator creation**: `NavigationCoordinator::new(backend, NavigationConfig)`
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore in the `Lock`)
//! - any phase timeout of `0s` → no timeout
//! - `dead_loop_threshold = 0` → dead-loop detection disabled

use std::time::Duration;

use crate::lifecycle::Phase;
use crate::policies::RetryPolicy;

/// Per-phase time budgets.
///
/// `Duration::ZERO` disables the budget for that phase. Load budgets apply to
/// each loader attempt separately; an expired attempt enters the retry path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTimeouts {
    /// Budget of one [`SourceLoader`](crate::SourceLoader) attempt.
    pub load: Duration,
    /// Budget of the whole bootstrap array.
    pub bootstrap: Duration,
    /// Budget of the whole mount array.
    pub mount: Duration,
    /// Budget of the whole unmount array.
    pub unmount: Duration,
    /// Budget of the whole update array.
    pub update: Duration,
}

impl PhaseTimeouts {
    /// No budget for any phase.
    pub const NONE: PhaseTimeouts = PhaseTimeouts {
        load: Duration::ZERO,
        bootstrap: Duration::ZERO,
        mount: Duration::ZERO,
        unmount: Duration::ZERO,
        update: Duration::ZERO,
    };

    /// Same budget for every phase.
    pub fn uniform(d: Duration) -> Self {
        Self {
            load: d,
            bootstrap: d,
            mount: d,
            unmount: d,
            update: d,
        }
    }

    /// Returns the budget of `phase` as an `Option` (`None` = unbounded).
    #[inline]
    pub fn for_phase(&self, phase: Phase) -> Option<Duration> {
        let d = match phase {
            Phase::Load => self.load,
            Phase::Bootstrap => self.bootstrap,
            Phase::Mount => self.mount,
            Phase::Unmount => self.unmount,
            Phase::Update => self.update,
        };
        (d > Duration::ZERO).then_some(d)
    }
}

impl Default for PhaseTimeouts {
    /// No budgets: phases may take as long as they need.
    fn default() -> Self {
        Self::NONE
    }
}

/// Per-app settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppConfig {
    /// Phase budgets.
    pub timeouts: PhaseTimeouts,
    /// Bounds for load retries granted by the `load_error` hook.
    pub retry: RetryPolicy,
    /// When `true`, mount/update arrays always run to the end even if a stop
    /// or unload is requested in between. When `false` (default) the
    /// traversal suspends between two functions and lets the stop run.
    pub safe: bool,
}

/// Container-wide settings.
///
/// ## Field semantics
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `max_concurrent`: how many app operations may run at once across all
///   apps of the container (`0` = unlimited)
/// - `app`: defaults copied into every registered app
#[derive(Clone, Debug)]
pub struct ContainerConfig {
    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Maximum number of app operations running concurrently.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = at most `n` operations (of distinct apps) at once
    pub max_concurrent: usize,

    /// Defaults for registered apps.
    pub app: AppConfig,
}

impl ContainerConfig {
    /// Returns the global concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ContainerConfig {
    /// - `bus_capacity = 1024`
    /// - `max_concurrent = 0` (unlimited)
    /// - `app = AppConfig::default()` (no timeouts, no retries, `safe = false`)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            max_concurrent: 0,
            app: AppConfig::default(),
        }
    }
}

/// Navigation coordinator settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationConfig {
    /// How many times one URL may be requested within a single burst of
    /// back-to-back navigations before auto-redirection is aborted
    /// (`0` = never abort).
    pub dead_loop_threshold: u32,
}

impl NavigationConfig {
    /// Returns the threshold as an `Option` (`None` = detection disabled).
    #[inline]
    pub fn dead_loop_limit(&self) -> Option<u32> {
        (self.dead_loop_threshold > 0).then_some(self.dead_loop_threshold)
    }
}

impl Default for NavigationConfig {
    /// `dead_loop_threshold = 10`.
    fn default() -> Self {
        Self {
            dead_loop_threshold: 10,
        }
    }
}
