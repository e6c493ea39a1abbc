//! # Runs one phase of a lifecycle.
//!
//! [`LifecycleRunner`] owns the installed [`Lifecycle`] of one app and the
//! extension points of every phase. [`LifecycleRunner::run_phase`] traverses a
//! phase array with an optional budget and publishes events to the [`Bus`].
//!
//! ## Flow
//! ```text
//! run_phase(phase)
//!   ├─► publish PhaseStarting, hooks.before
//!   ├─► for each fn (in order):
//!   │     ├─ i > 0 and !keep_going() → Suspended { ran: i }
//!   │     ├─ hooks.each
//!   │     └─ fn(props).await          (panic → PhaseError::Panicked)
//!   ├─► budget exceeded → PhaseTimeout, then the failure path
//!   ├─► Ok        → hooks.after, publish PhaseCompleted
//!   └─► Err(e)    → hooks.error, publish PhaseFailed
//! ```
//!
//! ## Rules
//! - Exactly one terminal event per traversal: `PhaseCompleted` or
//!   `PhaseFailed`; a suspended traversal publishes neither.
//! - `PhaseTimeout` is published **in addition to** `PhaseFailed`.
//! - The runner is cleared independently of the owning controller's state.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::time;

use super::phase::Phase;
use super::phase_fn::MountProps;
use super::spec::Lifecycle;
use crate::error::{AppError, PhaseError};
use crate::events::{Bus, Event, EventKind};
use crate::hooks::Hook;
use crate::subscribers::panic_message;

/// Argument of the `before`, `each` and `after` extension points.
#[derive(Clone, Debug)]
pub struct PhaseContext {
    /// App name.
    pub app: Arc<str>,
    /// Phase being run.
    pub phase: Phase,
    /// Position in the phase array (`each` only).
    pub index: Option<usize>,
}

/// Argument of the `error` extension point.
#[derive(Clone, Debug)]
pub struct PhaseFailure {
    /// App name.
    pub app: Arc<str>,
    /// Phase that failed.
    pub phase: Phase,
    /// The error.
    pub error: PhaseError,
}

/// Extension points of one phase.
#[derive(Debug)]
pub struct PhaseHooks {
    /// Before the first function runs.
    pub before: Hook<PhaseContext>,
    /// Before each function of the array.
    pub each: Hook<PhaseContext>,
    /// After the whole array completed.
    pub after: Hook<PhaseContext>,
    /// When the phase failed (including timeouts and panics).
    pub error: Hook<PhaseFailure>,
}

impl PhaseHooks {
    fn new() -> Self {
        Self {
            before: Hook::new("before"),
            each: Hook::new("each"),
            after: Hook::new("after"),
            error: Hook::new("error"),
        }
    }
}

/// How a traversal ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Every function ran.
    Completed,
    /// The gate closed between two functions; `ran` functions completed.
    Suspended {
        /// Number of functions that ran.
        ran: usize,
    },
}

/// Holder of an app's lifecycle and per-phase extension points.
pub struct LifecycleRunner {
    app: Arc<str>,
    bus: Bus,
    fns: RwLock<Option<Arc<Lifecycle>>>,
    hooks: [PhaseHooks; 5],
}

impl LifecycleRunner {
    /// Creates an empty runner for `app` publishing to `bus`.
    pub fn new(app: impl Into<Arc<str>>, bus: Bus) -> Self {
        Self {
            app: app.into(),
            bus,
            fns: RwLock::new(None),
            hooks: std::array::from_fn(|_| PhaseHooks::new()),
        }
    }

    /// Installs a lifecycle after checking that `mount` and `unmount` exist.
    pub fn set_fns(&self, lifecycle: Lifecycle) -> Result<Arc<Lifecycle>, AppError> {
        lifecycle
            .validate()
            .map_err(|reason| AppError::InvalidLifecycle {
                app: Arc::clone(&self.app),
                reason,
            })?;
        let lifecycle = Arc::new(lifecycle);
        *self.fns.write() = Some(Arc::clone(&lifecycle));
        Ok(lifecycle)
    }

    /// Installed lifecycle, if any.
    pub fn fns(&self) -> Option<Arc<Lifecycle>> {
        self.fns.read().clone()
    }

    /// Drops the installed lifecycle.
    pub fn clear(&self) {
        self.fns.write().take();
    }

    /// Returns `true` when the installed lifecycle has an update array.
    pub fn has_update(&self) -> bool {
        self.fns
            .read()
            .as_ref()
            .is_some_and(|lc| lc.update().is_some())
    }

    /// Extension points of `phase`.
    pub fn hooks(&self, phase: Phase) -> &PhaseHooks {
        &self.hooks[phase.index()]
    }

    /// Runs the `phase` array with `props`.
    ///
    /// `keep_going` is consulted between two functions; returning `false`
    /// suspends the traversal. `budget` bounds the whole array.
    pub async fn run_phase<G>(
        &self,
        phase: Phase,
        props: MountProps,
        budget: Option<Duration>,
        keep_going: G,
    ) -> Result<Traversal, PhaseError>
    where
        G: FnMut() -> bool + Send,
    {
        let Some(lifecycle) = self.fns() else {
            return Err(PhaseError::fail(format!("{} has no lifecycle installed", self.app)));
        };
        let hooks = self.hooks(phase);
        let ctx = PhaseContext {
            app: Arc::clone(&self.app),
            phase,
            index: None,
        };

        self.bus.publish(
            Event::new(EventKind::PhaseStarting)
                .with_app(Arc::clone(&self.app))
                .with_phase(phase),
        );
        hooks.before.call(&ctx);

        let res = self
            .guarded(phase, budget, self.traverse(&lifecycle, phase, props, keep_going))
            .await
            .and_then(|r| r);

        match &res {
            Ok(Traversal::Completed) => {
                hooks.after.call(&ctx);
                self.bus.publish(
                    Event::new(EventKind::PhaseCompleted)
                        .with_app(Arc::clone(&self.app))
                        .with_phase(phase),
                );
            }
            Ok(Traversal::Suspended { ran }) => {
                tracing::debug!(app = %self.app, %phase, ran, "phase suspended");
            }
            Err(e) => self.report_failure(phase, e),
        }
        res
    }

    /// Publishes `PhaseFailed` and fires the `error` extension point.
    pub(crate) fn report_failure(&self, phase: Phase, error: &PhaseError) {
        self.hooks(phase).error.call(&PhaseFailure {
            app: Arc::clone(&self.app),
            phase,
            error: error.clone(),
        });
        self.bus.publish(
            Event::new(EventKind::PhaseFailed)
                .with_app(Arc::clone(&self.app))
                .with_phase(phase)
                .with_reason(error.to_string()),
        );
    }

    /// Runs `fut` under `budget`, turning panics into [`PhaseError::Panicked`].
    pub(crate) async fn guarded<F, T>(
        &self,
        phase: Phase,
        budget: Option<Duration>,
        fut: F,
    ) -> Result<T, PhaseError>
    where
        F: Future<Output = T>,
    {
        let caught = AssertUnwindSafe(fut).catch_unwind();
        let res = match budget {
            Some(dur) => match time::timeout(dur, caught).await {
                Ok(r) => r,
                Err(_elapsed) => {
                    self.bus.publish(
                        Event::new(EventKind::PhaseTimeout)
                            .with_app(Arc::clone(&self.app))
                            .with_phase(phase)
                            .with_timeout(dur),
                    );
                    return Err(PhaseError::Timeout {
                        phase,
                        timeout: dur,
                    });
                }
            },
            None => caught.await,
        };
        res.map_err(|panic| PhaseError::Panicked {
            phase,
            info: panic_message(panic.as_ref()),
        })
    }

    async fn traverse<G>(
        &self,
        lifecycle: &Lifecycle,
        phase: Phase,
        props: MountProps,
        mut keep_going: G,
    ) -> Result<Traversal, PhaseError>
    where
        G: FnMut() -> bool,
    {
        let each = &self.hooks(phase).each;
        for (i, f) in lifecycle.phase(phase).iter().enumerate() {
            if i > 0 && !keep_going() {
                return Ok(Traversal::Suspended { ran: i });
            }
            each.call(&PhaseContext {
                app: Arc::clone(&self.app),
                phase,
                index: Some(i),
            });
            f.call(props.clone()).await?;
        }
        Ok(Traversal::Completed)
    }
}

impl std::fmt::Debug for LifecycleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRunner")
            .field("app", &self.app)
            .field("fns", &self.fns.read().as_deref())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::PhaseFn;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl PhaseFn {
        let log = Arc::clone(log);
        move |_p: MountProps| {
            log.lock().push(tag);
            futures::future::ready(Ok::<(), PhaseError>(()))
        }
    }

    fn props() -> MountProps {
        MountProps::new("app", "#root")
    }

    #[tokio::test]
    async fn rejects_lifecycle_without_unmount() {
        let runner = LifecycleRunner::new("app", Bus::new(8));
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = runner
            .set_fns(Lifecycle::builder().mount(recorder(&log, "m")).build())
            .unwrap_err();
        assert_eq!(
            err,
            AppError::InvalidLifecycle {
                app: "app".into(),
                reason: "missing unmount"
            }
        );
        assert!(runner.fns().is_none());
    }

    #[tokio::test]
    async fn runs_array_in_order_with_hooks() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let runner = LifecycleRunner::new("app", bus);
        let log = Arc::new(Mutex::new(Vec::new()));
        runner
            .set_fns(
                Lifecycle::builder()
                    .mount(recorder(&log, "m1"))
                    .mount(recorder(&log, "m2"))
                    .unmount(recorder(&log, "u"))
                    .build(),
            )
            .unwrap();

        let l = log.clone();
        runner.hooks(Phase::Mount).before.tap("t", move |_| l.lock().push("before"));
        let l = log.clone();
        runner.hooks(Phase::Mount).each.tap("t", move |c| {
            l.lock().push(if c.index == Some(0) { "each0" } else { "each1" })
        });
        let l = log.clone();
        runner.hooks(Phase::Mount).after.tap("t", move |_| l.lock().push("after"));

        let res = runner.run_phase(Phase::Mount, props(), None, || true).await;
        assert_eq!(res, Ok(Traversal::Completed));
        assert_eq!(
            *log.lock(),
            vec!["before", "each0", "m1", "each1", "m2", "after"]
        );
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::PhaseStarting);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::PhaseCompleted);
    }

    #[tokio::test]
    async fn closed_gate_suspends_between_functions() {
        let runner = LifecycleRunner::new("app", Bus::new(8));
        let log = Arc::new(Mutex::new(Vec::new()));
        runner
            .set_fns(
                Lifecycle::builder()
                    .mount(recorder(&log, "m1"))
                    .mount(recorder(&log, "m2"))
                    .unmount(recorder(&log, "u"))
                    .build(),
            )
            .unwrap();

        let res = runner.run_phase(Phase::Mount, props(), None, || false).await;
        assert_eq!(res, Ok(Traversal::Suspended { ran: 1 }));
        assert_eq!(*log.lock(), vec!["m1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_and_panics_become_phase_errors() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let runner = LifecycleRunner::new("app", bus);
        let failures = Arc::new(Mutex::new(Vec::new()));
        let f = failures.clone();
        runner
            .hooks(Phase::Mount)
            .error
            .tap("t", move |e| f.lock().push(e.error.as_label()));

        runner
            .set_fns(
                Lifecycle::builder()
                    .mount(|_p: MountProps| async {
                        time::sleep(Duration::from_secs(10)).await;
                        Ok::<(), PhaseError>(())
                    })
                    .unmount(|_p: MountProps| async {
                        if true {
                            panic!("unmount exploded");
                        }
                        Ok::<(), PhaseError>(())
                    })
                    .build(),
            )
            .unwrap();

        let err = runner
            .run_phase(Phase::Mount, props(), Some(Duration::from_millis(50)), || true)
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::Timeout { phase: Phase::Mount, .. }));

        let err = runner
            .run_phase(Phase::Unmount, props(), None, || true)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PhaseError::Panicked {
                phase: Phase::Unmount,
                info: "unmount exploded".into()
            }
        );

        assert_eq!(*failures.lock(), vec!["phase_timeout", "phase_panicked"]);
        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PhaseStarting,
                EventKind::PhaseTimeout,
                EventKind::PhaseFailed,
                EventKind::PhaseStarting,
                EventKind::PhaseFailed,
            ]
        );
    }

    #[tokio::test]
    async fn clear_is_independent() {
        let runner = LifecycleRunner::new("app", Bus::new(8));
        let log = Arc::new(Mutex::new(Vec::new()));
        runner
            .set_fns(
                Lifecycle::builder()
                    .mount(recorder(&log, "m"))
                    .unmount(recorder(&log, "u"))
                    .update(recorder(&log, "up"))
                    .build(),
            )
            .unwrap();
        assert!(runner.has_update());
        runner.clear();
        assert!(!runner.has_update());
        assert!(runner.run_phase(Phase::Mount, props(), None, || true).await.is_err());
    }
}
