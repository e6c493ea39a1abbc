//! # AppController: the lifecycle state machine of one app.
//!
//! Every operation (`load`, `start`, `stop`, `update`, `unload`) returns a
//! `'static` boxed future. Calling an operation **claims the top task**
//! synchronously, so the order of calls (not the order of polling) decides
//! which operation wins a race.
//!
//! ```text
//! start() ─ claim(Start) ─► Lock::wait_for(app) ─► checkpoint (queued → Cancelled)
//!                                   │
//!                                   ├─► load (shared) ─► checkpoint (→ Interrupted)
//!                                   ├─► bootstrap     ─► checkpoint (→ Interrupted)
//!                                   └─► mount [f1, f2, ...]
//!                                          └─ between fns: down-direction top task
//!                                             and !safe → suspend (Mounted, Interrupted)
//! ```
//!
//! ## Rules
//! - Start/Update go up, Stop/Unload go down. A newer top task of the same
//!   direction never interrupts an older one.
//! - Committed work (bootstrap, a mount/update array once begun, unmount)
//!   runs to completion; the newer operation waits on the [`Lock`].
//! - `load()` and `unload()` are shared: every caller gets the same result.
//! - A broken app never affects other apps; `start()` on it rejects until
//!   it is unloaded.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;

use super::state::{AppState, TaskKind};
use crate::config::AppConfig;
use crate::error::{AppError, PhaseError};
use crate::events::{Bus, Event, EventKind};
use crate::hooks::{DecisionHook, Hook};
use crate::lifecycle::{
    Lifecycle, LifecycleRunner, MountProps, Phase, PhaseFailure, SourceLoader, Traversal,
};
use crate::sync::Lock;

static APP_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of a controller; the [`Lock`] key of its operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(u64);

impl AppId {
    fn next() -> Self {
        AppId(APP_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<Lifecycle>, AppError>>>;
type SharedUnload = Shared<BoxFuture<'static, Result<(), AppError>>>;

/// Argument of the `before_load` extension point.
#[derive(Clone, Debug)]
pub struct LoadContext {
    /// App name.
    pub app: Arc<str>,
    /// Loader attempt about to run (starting from 1).
    pub attempt: u32,
}

/// Argument of the `load_error` decision hook.
#[derive(Clone, Debug)]
pub struct LoadFailure {
    /// App name.
    pub app: Arc<str>,
    /// Attempt that failed (starting from 1).
    pub attempt: u32,
    /// Loader error.
    pub error: PhaseError,
}

/// Operation-level extension points of a controller.
///
/// Per-phase points (`before`/`each`/`after`/`error`) live on the
/// [`LifecycleRunner`], see [`AppController::runner`].
#[derive(Debug)]
pub struct AppHooks {
    /// Fires before every loader attempt.
    pub before_load: Hook<LoadContext>,
    /// Answers whether a failed load should be retried.
    pub load_error: DecisionHook<LoadFailure>,
    /// Answers whether a failed unmount should be ignored by `stop()`.
    pub unmount_error: DecisionHook<PhaseFailure>,
}

impl AppHooks {
    fn new() -> Self {
        Self {
            before_load: Hook::new("before_load"),
            load_error: DecisionHook::new("load_error"),
            unmount_error: DecisionHook::new("unmount_error"),
        }
    }
}

/// Diagnostic snapshot of a controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppStatus {
    /// App name.
    pub name: Arc<str>,
    /// Current state.
    pub state: AppState,
    /// Most recently requested operation.
    pub top: Option<TaskKind>,
    /// `unload()` was called.
    pub unloaded: bool,
    /// The last unmount failed.
    pub unmount_failed: bool,
    /// Loader attempts of the last load.
    pub load_attempts: u32,
}

#[derive(Clone, Copy, Debug)]
struct Top {
    kind: TaskKind,
    seq: u64,
}

#[derive(Clone, Copy)]
enum Checkpoint {
    /// Just left the Lock queue; nothing started.
    Queued,
    /// In control, nothing committed since the last checkpoint.
    Running,
}

struct Core {
    state: AppState,
    top: Option<Top>,
    next_seq: u64,
    unloaded: bool,
    unmount_failed: bool,
    load_attempts: u32,
    props: Arc<Value>,
    load: Option<(u64, SharedLoad)>,
    unload: Option<SharedUnload>,
}

impl Core {
    fn claim(&mut self, kind: TaskKind) -> Top {
        let top = Top {
            kind,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.top = Some(top);
        top
    }
}

struct Inner {
    id: AppId,
    name: Arc<str>,
    root: Arc<str>,
    config: AppConfig,
    loader: Arc<dyn SourceLoader>,
    runner: LifecycleRunner,
    hooks: AppHooks,
    bus: Bus,
    lock: Arc<Lock<AppId>>,
    core: Mutex<Core>,
}

/// Lifecycle state machine of one app. Cheap to clone.
#[derive(Clone)]
pub struct AppController {
    inner: Arc<Inner>,
}

impl AppController {
    /// Standalone controller with its own bus and lock, rendering into `root`.
    pub fn new(
        name: impl Into<Arc<str>>,
        root: impl Into<Arc<str>>,
        loader: Arc<dyn SourceLoader>,
        config: AppConfig,
    ) -> Self {
        Self::attached(
            name.into(),
            root.into(),
            loader,
            config,
            Value::Null,
            Bus::default(),
            Arc::new(Lock::new()),
        )
    }

    pub(crate) fn attached(
        name: Arc<str>,
        root: Arc<str>,
        loader: Arc<dyn SourceLoader>,
        config: AppConfig,
        props: Value,
        bus: Bus,
        lock: Arc<Lock<AppId>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: AppId::next(),
                runner: LifecycleRunner::new(Arc::clone(&name), bus.clone()),
                name,
                root,
                config,
                loader,
                hooks: AppHooks::new(),
                bus,
                lock,
                core: Mutex::new(Core {
                    state: AppState::NotLoaded,
                    top: None,
                    next_seq: 0,
                    unloaded: false,
                    unmount_failed: false,
                    load_attempts: 0,
                    props: Arc::new(props),
                    load: None,
                    unload: None,
                }),
            }),
        }
    }

    /// App name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Lock key of this controller.
    pub fn id(&self) -> AppId {
        self.inner.id
    }

    /// Current state.
    pub fn state(&self) -> AppState {
        self.inner.core.lock().state
    }

    /// Bus this controller publishes to.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Operation-level extension points.
    pub fn hooks(&self) -> &AppHooks {
        &self.inner.hooks
    }

    /// Phase runner (per-phase extension points, installed lifecycle).
    pub fn runner(&self) -> &LifecycleRunner {
        &self.inner.runner
    }

    /// Diagnostic snapshot.
    pub fn snapshot(&self) -> AppStatus {
        let core = self.inner.core.lock();
        AppStatus {
            name: Arc::clone(&self.inner.name),
            state: core.state,
            top: core.top.map(|t| t.kind),
            unloaded: core.unloaded,
            unmount_failed: core.unmount_failed,
            load_attempts: core.load_attempts,
        }
    }

    /// Loads the lifecycle through the [`SourceLoader`].
    ///
    /// Concurrent and later calls share one result; a failed load is
    /// forgotten so the next call invokes the loader again.
    pub fn load(&self) -> BoxFuture<'static, Result<Arc<Lifecycle>, AppError>> {
        if self.inner.core.lock().unloaded {
            let err = AppError::Unloaded {
                app: Arc::clone(&self.inner.name),
            };
            return futures::future::ready(Err(err)).boxed();
        }
        Inner::load(&self.inner).boxed()
    }

    /// Loads (if needed), bootstraps (once) and mounts the app.
    pub fn start(&self) -> BoxFuture<'static, Result<(), AppError>> {
        let inner = Arc::clone(&self.inner);
        let claimed = {
            let mut core = inner.core.lock();
            if core.unloaded {
                Err(AppError::Unloaded {
                    app: Arc::clone(&inner.name),
                })
            } else if core.state == AppState::SkipBecauseBroken {
                Err(AppError::Broken {
                    app: Arc::clone(&inner.name),
                })
            } else {
                let top = core.claim(TaskKind::Start);
                Ok((top, core.state == AppState::Mounted))
            }
        };
        async move {
            let (me, mounted) = claimed?;
            if mounted {
                return Ok(());
            }
            inner.lock.wait_for(inner.id, || inner.run_start(me)).await
        }
        .boxed()
    }

    /// Unmounts the app if it is mounted.
    pub fn stop(&self) -> BoxFuture<'static, Result<(), AppError>> {
        let inner = Arc::clone(&self.inner);
        let me = {
            let mut core = inner.core.lock();
            (!core.unloaded).then(|| core.claim(TaskKind::Stop))
        };
        async move {
            match me {
                Some(me) => inner.lock.wait_for(inner.id, || inner.run_stop(me)).await,
                None => Ok(()),
            }
        }
        .boxed()
    }

    /// Replaces the props and runs the update array.
    pub fn update(&self, props: Value) -> BoxFuture<'static, Result<(), AppError>> {
        let inner = Arc::clone(&self.inner);
        let claimed = {
            let mut core = inner.core.lock();
            inner
                .update_precondition(&core)
                .map(|()| core.claim(TaskKind::Update))
        };
        async move {
            let me = claimed?;
            inner
                .lock
                .wait_for(inner.id, || inner.run_update(me, props))
                .await
        }
        .boxed()
    }

    /// Unmounts (if needed) and forgets the lifecycle. Terminal: afterwards
    /// `start` and `update` reject with [`AppError::Unloaded`].
    pub fn unload(&self) -> BoxFuture<'static, Result<(), AppError>> {
        let inner = Arc::clone(&self.inner);
        let mut core = inner.core.lock();
        if let Some(fut) = &core.unload {
            return fut.clone().boxed();
        }
        core.unloaded = true;
        let me = core.claim(TaskKind::Unload);
        let pending_load = match core.state {
            AppState::LoadingSourceCode => core.load.as_ref().map(|(_, f)| f.clone()),
            _ => None,
        };
        let fut = {
            let inner = Arc::clone(&inner);
            async move {
                if let Some(load) = pending_load {
                    let _ = load.await;
                }
                inner.lock.wait_for(inner.id, || inner.run_unload(me)).await
            }
            .boxed()
            .shared()
        };
        core.unload = Some(fut.clone());
        drop(core);
        fut.boxed()
    }
}

impl fmt::Debug for AppController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("AppController")
            .field("name", &self.inner.name)
            .field("state", &core.state)
            .field("top", &core.top.map(|t| t.kind))
            .finish()
    }
}

impl Inner {
    fn set_state(&self, state: AppState) {
        let prev = std::mem::replace(&mut self.core.lock().state, state);
        if prev != state {
            tracing::trace!(app = %self.name, from = %prev, to = %state, "state");
        }
    }

    fn mount_props(&self) -> MountProps {
        MountProps {
            name: Arc::clone(&self.name),
            root: Arc::clone(&self.root),
            props: Arc::clone(&self.core.lock().props),
        }
    }

    /// Rejects the operation `me` if an incompatible newer operation took over.
    fn checkpoint(&self, me: Top, at: Checkpoint) -> Result<(), AppError> {
        let top = match self.core.lock().top {
            Some(top) if top.seq != me.seq && !me.kind.compatible_with(top.kind) => top,
            _ => return Ok(()),
        };
        let app = Arc::clone(&self.name);
        let (err, kind) = match at {
            Checkpoint::Queued => (
                AppError::Cancelled {
                    app,
                    kind: me.kind,
                    by: top.kind,
                },
                EventKind::OperationCancelled,
            ),
            Checkpoint::Running => (
                AppError::Interrupted {
                    app,
                    kind: me.kind,
                    by: top.kind,
                },
                EventKind::OperationInterrupted,
            ),
        };
        self.publish_superseded(kind, me.kind, top.kind);
        Err(err)
    }

    /// Gate of a mount/update traversal: `false` once a down-direction
    /// operation is waiting.
    fn keep_going(&self, me: Top) -> bool {
        if self.config.safe {
            return true;
        }
        match self.core.lock().top {
            Some(top) => top.seq == me.seq || me.kind.compatible_with(top.kind),
            None => true,
        }
    }

    fn superseded_by(&self, me: Top) -> TaskKind {
        self.core.lock().top.map(|t| t.kind).unwrap_or(me.kind)
    }

    fn publish_superseded(&self, kind: EventKind, me: TaskKind, by: TaskKind) {
        self.bus.publish(
            Event::new(kind)
                .with_app(Arc::clone(&self.name))
                .with_reason(format!("{me} by {by}")),
        );
    }

    fn broken(&self, phase: Phase, error: PhaseError) -> AppError {
        self.set_state(AppState::SkipBecauseBroken);
        self.bus.publish(
            Event::new(EventKind::AppBroken)
                .with_app(Arc::clone(&self.name))
                .with_phase(phase)
                .with_reason(error.to_string()),
        );
        AppError::Phase {
            app: Arc::clone(&self.name),
            phase,
            error,
        }
    }

    fn load(this: &Arc<Self>) -> SharedLoad {
        let mut core = this.core.lock();
        if let Some((_, fut)) = &core.load {
            return fut.clone();
        }
        let seq = core.next_seq;
        core.next_seq += 1;
        let fut = {
            let inner = Arc::clone(this);
            async move { inner.run_load(seq).await }.boxed().shared()
        };
        core.load = Some((seq, fut.clone()));
        fut
    }

    async fn run_load(&self, seq: u64) -> Result<Arc<Lifecycle>, AppError> {
        self.set_state(AppState::LoadingSourceCode);
        let budget = self.config.timeouts.for_phase(Phase::Load);
        let mut attempt = 0u32;

        let res = loop {
            attempt += 1;
            self.core.lock().load_attempts = attempt;
            self.hooks.before_load.call(&LoadContext {
                app: Arc::clone(&self.name),
                attempt,
            });
            self.bus.publish(
                Event::new(EventKind::LoadStarting)
                    .with_app(Arc::clone(&self.name))
                    .with_attempt(attempt),
            );

            let error = match self
                .runner
                .guarded(Phase::Load, budget, self.loader.load(&self.name))
                .await
                .and_then(|r| r)
            {
                Ok(lifecycle) => break self.runner.set_fns(lifecycle),
                Err(e) => e,
            };

            self.bus.publish(
                Event::new(EventKind::LoadFailed)
                    .with_app(Arc::clone(&self.name))
                    .with_attempt(attempt)
                    .with_reason(error.to_string()),
            );
            let wants_retry = self.hooks.load_error.decide(&LoadFailure {
                app: Arc::clone(&self.name),
                attempt,
                error: error.clone(),
            });
            let retry = attempt - 1;
            if !(wants_retry && self.config.retry.allows(retry)) {
                break Err(AppError::Load {
                    app: Arc::clone(&self.name),
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.config.retry.delay(retry);
            self.bus.publish(
                Event::new(EventKind::LoadRetryScheduled)
                    .with_app(Arc::clone(&self.name))
                    .with_attempt(attempt)
                    .with_delay(delay),
            );
            tokio::time::sleep(delay).await;
        };

        match &res {
            Ok(_) => {
                self.set_state(AppState::NotBootstrapped);
                self.bus.publish(
                    Event::new(EventKind::Loaded)
                        .with_app(Arc::clone(&self.name))
                        .with_attempt(attempt),
                );
            }
            Err(_) => {
                let mut core = self.core.lock();
                core.state = AppState::LoadError;
                if core.load.as_ref().is_some_and(|(s, _)| *s == seq) {
                    core.load = None;
                }
            }
        }
        res
    }

    async fn run_start(self: &Arc<Self>, me: Top) -> Result<(), AppError> {
        self.checkpoint(me, Checkpoint::Queued)?;
        loop {
            let state = self.core.lock().state;
            match state {
                AppState::Mounted => return Ok(()),
                AppState::NotLoaded | AppState::LoadingSourceCode | AppState::LoadError => {
                    Inner::load(self).await?;
                    self.checkpoint(me, Checkpoint::Running)?;
                }
                AppState::NotBootstrapped => {
                    self.set_state(AppState::Bootstrapping);
                    let budget = self.config.timeouts.for_phase(Phase::Bootstrap);
                    match self
                        .runner
                        .run_phase(Phase::Bootstrap, self.mount_props(), budget, || true)
                        .await
                    {
                        Ok(_) => self.set_state(AppState::NotMounted),
                        Err(e) => return Err(self.broken(Phase::Bootstrap, e)),
                    }
                    self.checkpoint(me, Checkpoint::Running)?;
                }
                AppState::NotMounted => return self.run_mount(me).await,
                AppState::SkipBecauseBroken => {
                    return Err(AppError::Broken {
                        app: Arc::clone(&self.name),
                    });
                }
                // Transitional states are only observed while an operation
                // holds the lock.
                other => {
                    tracing::warn!(app = %self.name, state = %other, "start found a transitional state");
                    return Err(self.suspended(me));
                }
            }
        }
    }

    async fn run_mount(&self, me: Top) -> Result<(), AppError> {
        self.set_state(AppState::Mounting);
        let budget = self.config.timeouts.for_phase(Phase::Mount);
        let res = self
            .runner
            .run_phase(Phase::Mount, self.mount_props(), budget, || self.keep_going(me))
            .await;

        match res {
            Ok(Traversal::Completed) => {
                self.set_state(AppState::Mounted);
                Ok(())
            }
            Ok(Traversal::Suspended { .. }) => {
                self.set_state(AppState::Mounted);
                Err(self.suspended(me))
            }
            Err(e) => {
                // Best effort: leave the root clean; the mount error wins.
                let budget = self.config.timeouts.for_phase(Phase::Unmount);
                if let Err(cleanup) = self
                    .runner
                    .run_phase(Phase::Unmount, self.mount_props(), budget, || true)
                    .await
                {
                    tracing::debug!(app = %self.name, error = %cleanup, "cleanup unmount failed");
                }
                Err(self.broken(Phase::Mount, e))
            }
        }
    }

    fn suspended(&self, me: Top) -> AppError {
        let by = self.superseded_by(me);
        self.publish_superseded(EventKind::OperationInterrupted, me.kind, by);
        AppError::Interrupted {
            app: Arc::clone(&self.name),
            kind: me.kind,
            by,
        }
    }

    async fn run_stop(&self, me: Top) -> Result<(), AppError> {
        self.checkpoint(me, Checkpoint::Queued)?;
        if self.core.lock().state != AppState::Mounted {
            return Ok(());
        }
        self.run_unmount().await
    }

    /// Runs the unmount array; the app ends `NotMounted` whatever happens.
    async fn run_unmount(&self) -> Result<(), AppError> {
        self.set_state(AppState::Stopping);
        let budget = self.config.timeouts.for_phase(Phase::Unmount);
        let res = self
            .runner
            .run_phase(Phase::Unmount, self.mount_props(), budget, || true)
            .await;

        let mut core = self.core.lock();
        core.state = AppState::NotMounted;
        core.unmount_failed = res.is_err();
        drop(core);

        match res {
            Ok(_) => Ok(()),
            Err(error) => {
                let ignored = self.hooks.unmount_error.decide(&PhaseFailure {
                    app: Arc::clone(&self.name),
                    phase: Phase::Unmount,
                    error: error.clone(),
                });
                if ignored {
                    tracing::debug!(app = %self.name, %error, "unmount failure ignored");
                    Ok(())
                } else {
                    Err(AppError::Phase {
                        app: Arc::clone(&self.name),
                        phase: Phase::Unmount,
                        error,
                    })
                }
            }
        }
    }

    fn update_precondition(&self, core: &Core) -> Result<(), AppError> {
        let app = Arc::clone(&self.name);
        if core.unloaded {
            return Err(AppError::Unloaded { app });
        }
        if let Some(lifecycle) = self.runner.fns()
            && lifecycle.update().is_none()
        {
            return Err(AppError::NoUpdate { app });
        }
        if core.state.rejects_update() {
            return Err(AppError::CannotUpdate {
                app,
                state: core.state,
            });
        }
        Ok(())
    }

    async fn run_update(&self, me: Top, props: Value) -> Result<(), AppError> {
        self.checkpoint(me, Checkpoint::Queued)?;
        {
            let mut core = self.core.lock();
            self.update_precondition(&core)?;
            if core.state != AppState::Mounted {
                return Err(AppError::CannotUpdate {
                    app: Arc::clone(&self.name),
                    state: core.state,
                });
            }
            core.props = Arc::new(props);
            core.state = AppState::Updating;
        }

        let budget = self.config.timeouts.for_phase(Phase::Update);
        let res = self
            .runner
            .run_phase(Phase::Update, self.mount_props(), budget, || self.keep_going(me))
            .await;

        match res {
            Ok(Traversal::Completed) => {
                self.set_state(AppState::Mounted);
                Ok(())
            }
            Ok(Traversal::Suspended { .. }) => {
                self.set_state(AppState::Mounted);
                Err(self.suspended(me))
            }
            Err(e) => Err(self.broken(Phase::Update, e)),
        }
    }

    async fn run_unload(&self, me: Top) -> Result<(), AppError> {
        self.checkpoint(me, Checkpoint::Queued)?;
        let needs_unmount = {
            let core = self.core.lock();
            core.state == AppState::Mounted || core.unmount_failed
        };
        let res = if needs_unmount {
            self.run_unmount().await
        } else {
            Ok(())
        };

        self.set_state(AppState::Unloading);
        self.runner.clear();
        {
            let mut core = self.core.lock();
            core.load = None;
            core.unmount_failed = false;
            core.state = AppState::NotLoaded;
        }
        self.bus
            .publish(Event::new(EventKind::AppUnloaded).with_app(Arc::clone(&self.name)));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use tokio::sync::{Notify, oneshot};

    use crate::lifecycle::{LoaderFn, PhaseFn};
    use crate::policies::RetryPolicy;

    type Log = Arc<Mutex<Vec<String>>>;

    fn boxed_ok() -> BoxFuture<'static, Result<(), PhaseError>> {
        futures::future::ready(Ok(())).boxed()
    }

    fn step(log: &Log, tag: &str) -> impl PhaseFn {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |_p: MountProps| {
            log.lock().push(tag.clone());
            boxed_ok()
        }
    }

    fn failing(msg: &'static str) -> impl PhaseFn {
        move |_p: MountProps| futures::future::ready(Err::<(), _>(PhaseError::fail(msg))).boxed()
    }

    /// Step that blocks until `gate` is notified.
    fn held(log: &Log, tag: &str, gate: Arc<Notify>) -> impl PhaseFn {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |_p: MountProps| {
            let (log, tag, gate) = (log.clone(), tag.clone(), gate.clone());
            async move {
                log.lock().push(format!("{tag}:begin"));
                gate.notified().await;
                log.lock().push(format!("{tag}:end"));
                Ok::<(), PhaseError>(())
            }
            .boxed()
        }
    }

    fn controller(
        lifecycle: impl Fn() -> Lifecycle + Send + Sync + 'static,
        config: AppConfig,
    ) -> (AppController, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let lifecycle = Arc::new(lifecycle);
        let loader = LoaderFn::arc(move |_name: Arc<str>| {
            c.fetch_add(1, Ordering::SeqCst);
            let lc = lifecycle();
            async move { Ok::<_, PhaseError>(lc) }
        });
        (AppController::new("app", "#root", loader, config), calls)
    }

    fn basic(log: &Log) -> impl Fn() -> Lifecycle + Send + Sync + 'static {
        let log = Arc::clone(log);
        move || {
            Lifecycle::builder()
                .bootstrap(step(&log, "bootstrap"))
                .mount(step(&log, "mount1"))
                .mount(step(&log, "mount2"))
                .unmount(step(&log, "unmount"))
                .update(step(&log, "update"))
                .build()
        }
    }

    #[tokio::test]
    async fn start_runs_every_mount_fn_once_in_order() {
        let log: Log = Default::default();
        let (app, calls) = controller(basic(&log), AppConfig::default());

        app.start().await.unwrap();
        app.start().await.unwrap();

        assert_eq!(app.state(), AppState::Mounted);
        assert_eq!(*log.lock(), vec!["bootstrap", "mount1", "mount2"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bootstrap_runs_once_across_restarts() {
        let log: Log = Default::default();
        let (app, _) = controller(basic(&log), AppConfig::default());

        app.start().await.unwrap();
        app.stop().await.unwrap();
        assert_eq!(app.state(), AppState::NotMounted);
        app.start().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["bootstrap", "mount1", "mount2", "unmount", "mount1", "mount2"]
        );
    }

    #[tokio::test]
    async fn load_is_shared_and_cached() {
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let loader = LoaderFn::arc(move |_name: Arc<str>| {
            c.fetch_add(1, Ordering::SeqCst);
            let rx = rx.clone();
            async move {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<_, PhaseError>(
                    Lifecycle::builder()
                        .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                        .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                        .build(),
                )
            }
        });
        let app = AppController::new("app", "#root", loader, AppConfig::default());

        let a = tokio::spawn(app.load());
        let b = tokio::spawn(app.load());
        while app.state() != AppState::LoadingSourceCode {
            tokio::task::yield_now().await;
        }
        tx.send(()).unwrap();

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        let c = app.load().await.unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.state(), AppState::NotBootstrapped);
    }

    #[tokio::test]
    async fn invalid_lifecycle_is_rejected() {
        let log: Log = Default::default();
        let l = log.clone();
        let (app, _) = controller(
            move || Lifecycle::builder().mount(step(&l, "mount")).build(),
            AppConfig::default(),
        );
        let err = app.start().await.unwrap_err();
        assert_eq!(err.as_label(), "app_invalid_lifecycle");
        assert_eq!(app.state(), AppState::LoadError);
    }

    #[tokio::test(start_paused = true)]
    async fn load_retries_when_the_hook_asks_and_budget_allows() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let loader = LoaderFn::arc(move |_name: Arc<str>| {
            let n = a.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    return Err(PhaseError::fail("network"));
                }
                Ok(Lifecycle::builder()
                    .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .build())
            }
        });
        let config = AppConfig {
            retry: RetryPolicy {
                max_retries: 2,
                first: Duration::from_millis(100),
                ..RetryPolicy::default()
            },
            ..AppConfig::default()
        };
        let app = AppController::new("app", "#root", loader, config);
        let mut rx = app.bus().subscribe();
        app.hooks().load_error.tap("always", |_| true);

        let started = tokio::time::Instant::now();
        app.start().await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(app.snapshot().load_attempts, 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
        let retries = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == EventKind::LoadRetryScheduled)
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn exhausted_load_sets_load_error_and_start_restarts_the_chain() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let loader = LoaderFn::arc(move |_name: Arc<str>| {
            let n = a.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    return Err(PhaseError::fail("offline"));
                }
                Ok(Lifecycle::builder()
                    .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .build())
            }
        });
        let app = AppController::new("app", "#root", loader, AppConfig::default());

        let err = app.start().await.unwrap_err();
        assert!(matches!(err, AppError::Load { attempts: 1, .. }));
        assert_eq!(app.state(), AppState::LoadError);

        app.start().await.unwrap();
        assert_eq!(app.state(), AppState::Mounted);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mount_failure_breaks_the_app_and_cleans_up() {
        let log: Log = Default::default();
        let l = log.clone();
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(failing("kaboom"))
                    .unmount(step(&l, "unmount"))
                    .build()
            },
            AppConfig::default(),
        );

        let err = app.start().await.unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
        assert_eq!(app.state(), AppState::SkipBecauseBroken);
        assert_eq!(*log.lock(), vec!["unmount"]);

        let again = app.start().await.unwrap_err();
        assert_eq!(again, AppError::Broken { app: "app".into() });
    }

    #[tokio::test]
    async fn stop_resets_state_even_when_unmount_fails() {
        let log: Log = Default::default();
        let l = log.clone();
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(step(&l, "mount"))
                    .unmount(failing("stuck"))
                    .build()
            },
            AppConfig::default(),
        );

        app.start().await.unwrap();
        let err = app.stop().await.unwrap_err();
        assert_eq!(err.to_string(), "stuck");
        assert_eq!(app.state(), AppState::NotMounted);
        assert!(app.snapshot().unmount_failed);

        app.stop().await.unwrap();

        app.start().await.unwrap();
        app.hooks().unmount_error.tap("ignore", |_| true);
        app.stop().await.unwrap();
        assert_eq!(app.state(), AppState::NotMounted);
    }

    #[tokio::test]
    async fn stop_then_interrupts_start_before_anything_is_committed() {
        let log: Log = Default::default();
        let (release, rx) = oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));
        let l = log.clone();
        let loader = LoaderFn::arc(move |_name: Arc<str>| {
            let (rx, l) = (rx.clone(), l.clone());
            async move {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<_, PhaseError>(
                    Lifecycle::builder()
                        .bootstrap(step(&l, "bootstrap"))
                        .mount(step(&l, "mount"))
                        .unmount(step(&l, "unmount"))
                        .build(),
                )
            }
        });
        let app = AppController::new("app", "#root", loader, AppConfig::default());

        let start = tokio::spawn(app.start());
        while app.state() != AppState::LoadingSourceCode {
            tokio::task::yield_now().await;
        }

        let stop = tokio::spawn(app.stop());
        release.send(()).unwrap();

        let err = start.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            AppError::Interrupted {
                app: "app".into(),
                kind: TaskKind::Start,
                by: TaskKind::Stop
            }
        );
        assert!(err.to_string().contains("interrupted"));
        stop.await.unwrap().unwrap();
        assert_eq!(app.state(), AppState::NotBootstrapped);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn queued_stop_is_cancelled_by_a_newer_start() {
        let log: Log = Default::default();
        let gate = Arc::new(Notify::new());
        let (l, g) = (log.clone(), gate.clone());
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(held(&l, "mount", g.clone()))
                    .unmount(step(&l, "unmount"))
                    .build()
            },
            AppConfig::default(),
        );

        let first = tokio::spawn(app.start());
        while app.state() != AppState::Mounting {
            tokio::task::yield_now().await;
        }
        let stop = tokio::spawn(app.stop());
        let second = tokio::spawn(app.start());
        tokio::task::yield_now().await;
        gate.notify_one();

        first.await.unwrap().unwrap();
        let err = stop.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            AppError::Cancelled {
                app: "app".into(),
                kind: TaskKind::Stop,
                by: TaskKind::Start
            }
        );
        second.await.unwrap().unwrap();
        assert_eq!(app.state(), AppState::Mounted);
        assert_eq!(*log.lock(), vec!["mount:begin", "mount:end"]);
    }

    #[tokio::test]
    async fn unsafe_mount_suspends_between_functions_for_stop() {
        let log: Log = Default::default();
        let gate = Arc::new(Notify::new());
        let (l, g) = (log.clone(), gate.clone());
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(held(&l, "mount1", g.clone()))
                    .mount(step(&l, "mount2"))
                    .unmount(step(&l, "unmount"))
                    .build()
            },
            AppConfig::default(),
        );

        let start = tokio::spawn(app.start());
        while app.state() != AppState::Mounting {
            tokio::task::yield_now().await;
        }
        let stop = tokio::spawn(app.stop());
        tokio::task::yield_now().await;
        gate.notify_one();

        let err = start.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::Interrupted { by: TaskKind::Stop, .. }));
        stop.await.unwrap().unwrap();
        assert_eq!(app.state(), AppState::NotMounted);
        assert_eq!(*log.lock(), vec!["mount1:begin", "mount1:end", "unmount"]);
    }

    #[tokio::test]
    async fn safe_mount_runs_the_whole_array_before_stop() {
        let log: Log = Default::default();
        let gate = Arc::new(Notify::new());
        let (l, g) = (log.clone(), gate.clone());
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(held(&l, "mount1", g.clone()))
                    .mount(step(&l, "mount2"))
                    .unmount(step(&l, "unmount"))
                    .build()
            },
            AppConfig {
                safe: true,
                ..AppConfig::default()
            },
        );

        let start = tokio::spawn(app.start());
        while app.state() != AppState::Mounting {
            tokio::task::yield_now().await;
        }
        let stop = tokio::spawn(app.stop());
        tokio::task::yield_now().await;
        gate.notify_one();

        start.await.unwrap().unwrap();
        stop.await.unwrap().unwrap();
        assert_eq!(
            *log.lock(),
            vec!["mount1:begin", "mount1:end", "mount2", "unmount"]
        );
    }

    #[tokio::test]
    async fn unload_waits_for_an_in_flight_load() {
        let (release, rx) = oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));
        let loader = LoaderFn::arc(move |_name: Arc<str>| {
            let rx = rx.clone();
            async move {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<_, PhaseError>(
                    Lifecycle::builder()
                        .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                        .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                        .build(),
                )
            }
        });
        let app = AppController::new("app", "#root", loader, AppConfig::default());

        let load = tokio::spawn(app.load());
        while app.state() != AppState::LoadingSourceCode {
            tokio::task::yield_now().await;
        }
        let unload = tokio::spawn(app.unload());
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!unload.is_finished());
        assert_eq!(app.state(), AppState::LoadingSourceCode);

        release.send(()).unwrap();
        assert!(load.await.unwrap().is_ok());
        unload.await.unwrap().unwrap();

        assert_eq!(app.state(), AppState::NotLoaded);
        assert!(app.runner().fns().is_none());
        assert_eq!(
            app.load().await.unwrap_err(),
            AppError::Unloaded { app: "app".into() }
        );
    }

    #[tokio::test]
    async fn queued_update_is_cancelled_by_a_newer_stop() {
        let log: Log = Default::default();
        let gate = Arc::new(Notify::new());
        let (l, g) = (log.clone(), gate.clone());
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(held(&l, "mount", g.clone()))
                    .unmount(step(&l, "unmount"))
                    .update(step(&l, "update"))
                    .build()
            },
            AppConfig::default(),
        );

        let start = tokio::spawn(app.start());
        while app.state() != AppState::Mounting {
            tokio::task::yield_now().await;
        }
        let update = tokio::spawn(app.update(serde_json::json!({"v": 1})));
        let stop = tokio::spawn(app.stop());
        tokio::task::yield_now().await;
        gate.notify_one();

        start.await.unwrap().unwrap();
        assert_eq!(
            update.await.unwrap().unwrap_err(),
            AppError::Cancelled {
                app: "app".into(),
                kind: TaskKind::Update,
                by: TaskKind::Stop
            }
        );
        stop.await.unwrap().unwrap();
        assert_eq!(app.state(), AppState::NotMounted);
        assert_eq!(*log.lock(), vec!["mount:begin", "mount:end", "unmount"]);
    }

    #[tokio::test]
    async fn unsafe_update_suspends_between_functions_for_stop() {
        let log: Log = Default::default();
        let gate = Arc::new(Notify::new());
        let (l, g) = (log.clone(), gate.clone());
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(step(&l, "mount"))
                    .unmount(step(&l, "unmount"))
                    .update(held(&l, "update1", g.clone()))
                    .update(step(&l, "update2"))
                    .build()
            },
            AppConfig::default(),
        );
        app.start().await.unwrap();

        let update = tokio::spawn(app.update(Value::Null));
        while app.state() != AppState::Updating {
            tokio::task::yield_now().await;
        }
        let stop = tokio::spawn(app.stop());
        tokio::task::yield_now().await;
        gate.notify_one();

        assert_eq!(
            update.await.unwrap().unwrap_err(),
            AppError::Interrupted {
                app: "app".into(),
                kind: TaskKind::Update,
                by: TaskKind::Stop
            }
        );
        stop.await.unwrap().unwrap();
        assert_eq!(app.state(), AppState::NotMounted);
        assert_eq!(
            *log.lock(),
            vec!["mount", "update1:begin", "update1:end", "unmount"]
        );
    }

    #[tokio::test]
    async fn unload_overtakes_starts_waiting_on_bootstrap() {
        let log: Log = Default::default();
        let gate = Arc::new(Notify::new());
        let (l, g) = (log.clone(), gate.clone());
        let (app, _) = controller(
            move || {
                Lifecycle::builder()
                    .bootstrap(held(&l, "bootstrap", g.clone()))
                    .mount(step(&l, "mount"))
                    .unmount(step(&l, "unmount"))
                    .build()
            },
            AppConfig::default(),
        );

        let first = tokio::spawn(app.start());
        while app.state() != AppState::Bootstrapping {
            tokio::task::yield_now().await;
        }
        let queued = tokio::spawn(app.start());
        tokio::task::yield_now().await;
        let unload = tokio::spawn(app.unload());
        tokio::task::yield_now().await;
        gate.notify_one();

        // Bootstrap is committed work: it finishes before anyone bails out.
        assert_eq!(
            first.await.unwrap().unwrap_err(),
            AppError::Interrupted {
                app: "app".into(),
                kind: TaskKind::Start,
                by: TaskKind::Unload
            }
        );
        assert_eq!(
            queued.await.unwrap().unwrap_err(),
            AppError::Cancelled {
                app: "app".into(),
                kind: TaskKind::Start,
                by: TaskKind::Unload
            }
        );
        unload.await.unwrap().unwrap();
        assert_eq!(app.state(), AppState::NotLoaded);
        assert_eq!(*log.lock(), vec!["bootstrap:begin", "bootstrap:end"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mount_timeout_behaves_like_a_failure() {
        let (app, _) = controller(
            || {
                Lifecycle::builder()
                    .mount(|_p: MountProps| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<(), PhaseError>(())
                    })
                    .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .build()
            },
            AppConfig {
                timeouts: crate::config::PhaseTimeouts {
                    mount: Duration::from_millis(200),
                    ..Default::default()
                },
                ..AppConfig::default()
            },
        );

        let err = app.start().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Phase {
                phase: Phase::Mount,
                error: PhaseError::Timeout { .. },
                ..
            }
        ));
        assert_eq!(app.state(), AppState::SkipBecauseBroken);
    }

    #[tokio::test]
    async fn update_preconditions_and_failure() {
        let log: Log = Default::default();
        let (app, _) = controller(basic(&log), AppConfig::default());

        let err = app.update(serde_json::json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, AppError::CannotUpdate { state: AppState::NotLoaded, .. }));

        app.start().await.unwrap();
        app.update(serde_json::json!({"a": 2})).await.unwrap();
        assert_eq!(app.state(), AppState::Mounted);
        assert_eq!(log.lock().last().map(String::as_str), Some("update"));

        let l = log.clone();
        let (plain, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(step(&l, "m"))
                    .unmount(step(&l, "u"))
                    .build()
            },
            AppConfig::default(),
        );
        plain.start().await.unwrap();
        assert_eq!(
            plain.update(serde_json::Value::Null).await.unwrap_err(),
            AppError::NoUpdate { app: "app".into() }
        );

        let l = log.clone();
        let (fragile, _) = controller(
            move || {
                Lifecycle::builder()
                    .mount(step(&l, "m"))
                    .unmount(step(&l, "u"))
                    .update(failing("bad props"))
                    .build()
            },
            AppConfig::default(),
        );
        fragile.start().await.unwrap();
        let err = fragile.update(serde_json::Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "bad props");
        assert_eq!(fragile.state(), AppState::SkipBecauseBroken);
    }

    #[tokio::test]
    async fn update_sees_the_new_props() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let (app, _) = controller(
            move || {
                let s = s.clone();
                Lifecycle::builder()
                    .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .update(move |p: MountProps| {
                        s.lock().push((*p.props).clone());
                        async { Ok::<(), PhaseError>(()) }
                    })
                    .build()
            },
            AppConfig::default(),
        );
        app.start().await.unwrap();
        app.update(serde_json::json!({"theme": "dark"})).await.unwrap();
        assert_eq!(*seen.lock(), vec![serde_json::json!({"theme": "dark"})]);
    }

    #[tokio::test]
    async fn unload_is_shared_terminal_and_unmounts() {
        let log: Log = Default::default();
        let (app, calls) = controller(basic(&log), AppConfig::default());
        let mut rx = app.bus().subscribe();

        app.start().await.unwrap();
        let (a, b) = tokio::join!(app.unload(), app.unload());
        a.unwrap();
        b.unwrap();
        app.unload().await.unwrap();

        assert_eq!(app.state(), AppState::NotLoaded);
        assert!(app.runner().fns().is_none());
        assert_eq!(log.lock().iter().filter(|s| *s == "unmount").count(), 1);
        assert_eq!(
            app.start().await.unwrap_err(),
            AppError::Unloaded { app: "app".into() }
        );
        assert_eq!(
            app.update(Value::Null).await.unwrap_err(),
            AppError::Unloaded { app: "app".into() }
        );
        app.stop().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let unloaded = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == EventKind::AppUnloaded)
            .count();
        assert_eq!(unloaded, 1);
    }

    #[tokio::test]
    async fn unload_retries_a_failed_unmount() {
        let tries = Arc::new(AtomicU32::new(0));
        let t = tries.clone();
        let (app, _) = controller(
            move || {
                let t = t.clone();
                Lifecycle::builder()
                    .mount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
                    .unmount(move |_p: MountProps| {
                        let n = t.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if n == 0 {
                                Err(PhaseError::fail("first unmount fails"))
                            } else {
                                Ok(())
                            }
                        }
                    })
                    .build()
            },
            AppConfig::default(),
        );

        app.start().await.unwrap();
        assert!(app.stop().await.is_err());
        app.unload().await.unwrap();
        assert_eq!(tries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn before_load_hook_sees_each_attempt() {
        let log: Log = Default::default();
        let (app, _) = controller(basic(&log), AppConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        app.hooks()
            .before_load
            .tap("record", move |ctx| s.lock().push(ctx.attempt));

        app.load().await.unwrap();
        assert_eq!(*seen.lock(), vec![1]);
    }
}
