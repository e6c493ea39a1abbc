//! # Container: the apps sharing one mount root, and which of them is active.
//!
//! ```text
//! register_app(spec) ──► AppController::attached(.., bus, lock)   (duplicates ignored)
//!                               └─ route mode + running ─► coordinator.reroute()
//!
//! activate_app(target)
//!   sync:  generation += 1, current_active := target
//!          claim stop() on the previously active / mounted app
//!   async: await the stops
//!          ├─ superseded ─► Interrupted { target, by }
//!          └─ target.start()
//!               ├─ interrupted and superseded ─► Interrupted { target, by }
//!               └─ Ok ─► current_mounted := target, AppActivated
//!
//! destroy() (shared) ─► unregister consumer ─► unload every app ─► release root
//!                       ─► ContainerDestroyed ─► drain subscribers
//! ```
//!
//! Every container owns a [`Bus`]; a listener task forwards its events, and
//! those of the coordinator, to the container's [`SubscriberSet`].

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::roots::RootClaim;
use super::routes::{RouteConfig, RouteConsumer};
use crate::app::{AppController, AppId, AppSpec, AppState};
use crate::config::ContainerConfig;
use crate::error::{AppError, ContainerError};
use crate::events::{Bus, Event, EventKind};
use crate::hooks::Hook;
use crate::navigation::{ConsumerId, NavigationConsumer, NavigationCoordinator};
use crate::subscribers::SubscriberSet;
use crate::sync::Lock;

type SharedDestroy = Shared<BoxFuture<'static, Result<(), ContainerError>>>;

/// Argument of the `activation_error` extension point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationFailure {
    /// Container name.
    pub container: Arc<str>,
    /// Requested app.
    pub name: String,
}

/// Extension points of a container.
#[derive(Debug)]
pub struct ContainerHooks {
    /// Fires when `activate_app` names no registered app.
    pub activation_error: Hook<ActivationFailure>,
}

struct Registry {
    apps: Vec<(AppSpec, AppController)>,
    current_mounted: Option<AppController>,
    current_active: Option<AppController>,
    generation: u64,
    consumer: Option<(ConsumerId, Arc<RouteConsumer>)>,
    destroy: Option<SharedDestroy>,
}

impl Registry {
    fn find(&self, name: &str) -> Option<&AppController> {
        self.apps
            .iter()
            .find(|(_, app)| app.name() == name)
            .map(|(_, app)| app)
    }

    fn active_name(&self) -> String {
        target_name(self.current_active.as_ref())
    }
}

fn target_name(app: Option<&AppController>) -> String {
    app.map_or_else(|| "null".to_string(), |a| a.name().to_string())
}

fn same(a: Option<&AppController>, b: &AppController) -> bool {
    a.is_some_and(|a| a.id() == b.id())
}

pub(crate) struct Inner {
    pub(crate) name: Arc<str>,
    root: Arc<str>,
    config: ContainerConfig,
    bus: Bus,
    lock: Arc<Lock<AppId>>,
    hooks: ContainerHooks,
    pub(crate) routes: Option<RouteConfig>,
    pub(crate) coordinator: NavigationCoordinator,
    registry: Mutex<Registry>,
    claim: Mutex<Option<RootClaim>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Apps attached to one mount root. Cheap to clone.
///
/// Built with [`Container::builder`]; must be built inside a tokio runtime.
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<Inner>,
}

impl Container {
    pub(crate) fn assemble(
        name: Arc<str>,
        claim: RootClaim,
        config: ContainerConfig,
        subs: SubscriberSet,
        bus: Bus,
        routes: Option<RouteConfig>,
        coordinator: NavigationCoordinator,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let listener = spawn_listener(
            subs,
            bus.subscribe(),
            coordinator.bus().subscribe(),
            shutdown.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                root: claim.root(),
                name,
                lock: Arc::new(Lock::with_capacity(config.max_concurrent)),
                config,
                bus,
                hooks: ContainerHooks {
                    activation_error: Hook::new("activation_error"),
                },
                routes,
                coordinator,
                registry: Mutex::new(Registry {
                    apps: Vec::new(),
                    current_mounted: None,
                    current_active: None,
                    generation: 0,
                    consumer: None,
                    destroy: None,
                }),
                claim: Mutex::new(Some(claim)),
                listener: Mutex::new(Some(listener)),
                shutdown,
            }),
        }
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mount root.
    pub fn root(&self) -> &str {
        &self.inner.root
    }

    /// Event bus shared with the apps.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Extension points.
    pub fn hooks(&self) -> &ContainerHooks {
        &self.inner.hooks
    }

    /// Coordinator driving route mode.
    pub fn coordinator(&self) -> &NavigationCoordinator {
        &self.inner.coordinator
    }

    /// Returns `true` for a route-driven container.
    pub fn is_route_driven(&self) -> bool {
        self.inner.routes.is_some()
    }

    /// Registered apps, in registration order.
    pub fn apps(&self) -> Vec<AppController> {
        let registry = self.inner.registry.lock();
        registry.apps.iter().map(|(_, app)| app.clone()).collect()
    }

    /// App registered under `name`.
    pub fn app(&self, name: &str) -> Option<AppController> {
        self.inner.registry.lock().find(name).cloned()
    }

    /// App whose last activation completed.
    pub fn current_mounted(&self) -> Option<AppController> {
        self.inner.registry.lock().current_mounted.clone()
    }

    /// Target of the latest activation, possibly still in flight.
    pub fn current_active(&self) -> Option<AppController> {
        self.inner.registry.lock().current_active.clone()
    }

    /// Registers an app. A name already registered is ignored and the
    /// existing controller returned.
    pub fn register_app(&self, spec: AppSpec) -> Result<AppController, ContainerError> {
        let app = self.inner.register(spec)?;
        self.inner.reroute();
        Ok(app)
    }

    /// Registers several apps, rerouting once.
    pub fn register_apps(
        &self,
        specs: impl IntoIterator<Item = AppSpec>,
    ) -> Result<Vec<AppController>, ContainerError> {
        let apps = specs
            .into_iter()
            .map(|spec| self.inner.register(spec))
            .collect::<Result<Vec<_>, _>>()?;
        self.inner.reroute();
        Ok(apps)
    }

    /// Unloads and forgets `name`.
    pub fn unregister_app(&self, name: &str) -> BoxFuture<'static, Result<(), ContainerError>> {
        let inner = Arc::clone(&self.inner);
        let removed = inner.unregister(name);
        async move {
            let app = removed?;
            let res = app.unload().await;
            inner.reroute();
            res.map_err(ContainerError::from)
        }
        .boxed()
    }

    /// Makes `name` the only mounted app (`None` unmounts the current one).
    ///
    /// Resolves to the mounted controller. An activation overtaken by a later
    /// one fails with [`ContainerError::Interrupted`].
    pub fn activate_app(
        &self,
        name: Option<&str>,
    ) -> BoxFuture<'static, Result<Option<AppController>, ContainerError>> {
        Inner::activate(&self.inner, name)
    }

    /// Route mode: registers with the coordinator and waits until the current
    /// location has been evaluated. Manual mode: no-op.
    pub async fn run(&self) -> Result<(), ContainerError> {
        if self.inner.routes.is_none() {
            return Ok(());
        }
        {
            let mut registry = self.inner.registry.lock();
            if registry.destroy.is_some() {
                return Err(self.inner.destroyed());
            }
            if registry.consumer.is_none() {
                let consumer = Arc::new(RouteConsumer {
                    container: Arc::downgrade(&self.inner),
                });
                let shared: Arc<dyn NavigationConsumer> = consumer.clone();
                let id = self.inner.coordinator.register(Arc::downgrade(&shared));
                registry.consumer = Some((id, consumer));
            }
        }
        self.inner.coordinator.reroute().outcome().await?;
        Ok(())
    }

    /// Unloads every app, leaves the coordinator and releases the root.
    /// Every call returns the same shared result.
    pub fn destroy(&self) -> BoxFuture<'static, Result<(), ContainerError>> {
        let mut registry = self.inner.registry.lock();
        if let Some(fut) = &registry.destroy {
            return fut.clone().boxed();
        }
        let consumer = registry.consumer.take();
        let apps: Vec<AppController> = registry.apps.drain(..).map(|(_, app)| app).collect();
        registry.current_active = None;
        registry.current_mounted = None;
        registry.generation += 1;

        let inner = Arc::clone(&self.inner);
        let fut = async move {
            if let Some((id, _)) = consumer {
                inner.coordinator.unregister(id);
            }
            let results = join_all(apps.iter().map(|app| app.unload())).await;
            let first_error = results.into_iter().find_map(Result::err);

            inner.claim.lock().take();
            tracing::debug!(container = %inner.name, root = %inner.root, "container destroyed");
            inner
                .bus
                .publish(Event::new(EventKind::ContainerDestroyed).with_container(Arc::clone(&inner.name)));
            inner.shutdown.cancel();
            let listener = inner.listener.lock().take();
            if let Some(listener) = listener {
                let _ = listener.await;
            }
            first_error.map_or(Ok(()), |e| Err(ContainerError::App(e)))
        }
        .boxed()
        .shared();
        registry.destroy = Some(fut.clone());
        drop(registry);
        fut.boxed()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("Container")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("apps", &registry.apps.len())
            .field("active", &registry.active_name())
            .finish()
    }
}

impl Inner {
    fn destroyed(&self) -> ContainerError {
        ContainerError::Destroyed {
            name: Arc::clone(&self.name),
        }
    }

    fn register(&self, spec: AppSpec) -> Result<AppController, ContainerError> {
        let mut registry = self.registry.lock();
        if registry.destroy.is_some() {
            return Err(self.destroyed());
        }
        if let Some(existing) = registry.find(spec.name()) {
            tracing::debug!(container = %self.name, app = spec.name(), "app already registered");
            return Ok(existing.clone());
        }
        let app = AppController::attached(
            spec.name_arc(),
            Arc::clone(&self.root),
            spec.loader(),
            spec.config_override().unwrap_or(self.config.app),
            spec.initial_props().clone(),
            self.bus.clone(),
            Arc::clone(&self.lock),
        );
        registry.apps.push((spec, app.clone()));
        drop(registry);

        self.bus.publish(
            Event::new(EventKind::AppRegistered)
                .with_container(Arc::clone(&self.name))
                .with_app(app.name()),
        );
        Ok(app)
    }

    fn unregister(&self, name: &str) -> Result<AppController, ContainerError> {
        let mut registry = self.registry.lock();
        let Some(pos) = registry.apps.iter().position(|(_, app)| app.name() == name) else {
            return Err(ContainerError::AppNotFound {
                name: name.to_string(),
            });
        };
        let (_, app) = registry.apps.remove(pos);
        if same(registry.current_active.as_ref(), &app) {
            registry.current_active = None;
            registry.generation += 1;
        }
        if same(registry.current_mounted.as_ref(), &app) {
            registry.current_mounted = None;
        }
        drop(registry);

        self.bus.publish(
            Event::new(EventKind::AppUnregistered)
                .with_container(Arc::clone(&self.name))
                .with_app(app.name()),
        );
        Ok(app)
    }

    /// First registered app whose rules match `url`.
    pub(crate) fn match_url(&self, url: &str) -> Option<AppController> {
        let registry = self.registry.lock();
        registry
            .apps
            .iter()
            .find(|(spec, _)| spec.matches(url))
            .map(|(_, app)| app.clone())
    }

    /// Re-evaluates the location when running in route mode.
    fn reroute(&self) {
        let running = self.registry.lock().consumer.is_some();
        if running {
            // The outcome is observed by the consumer itself.
            let _ = self.coordinator.reroute();
        }
    }

    fn activation_failed(&self, name: &str) {
        tracing::warn!(container = %self.name, app = name, "cannot find app to activate");
        self.bus.publish(
            Event::new(EventKind::ActivationFailed)
                .with_container(Arc::clone(&self.name))
                .with_app(name)
                .with_reason("not_found"),
        );
        self.hooks.activation_error.call(&ActivationFailure {
            container: Arc::clone(&self.name),
            name: name.to_string(),
        });
    }

    pub(crate) fn activate(
        this: &Arc<Self>,
        name: Option<&str>,
    ) -> BoxFuture<'static, Result<Option<AppController>, ContainerError>> {
        let prepared = this.prepare_activation(name);
        let inner = Arc::clone(this);
        async move {
            let (generation, target, stops) = prepared?;
            inner.complete_activation(generation, target, stops).await
        }
        .boxed()
    }

    /// Claims the activation: bumps the generation and claims the stops of
    /// the apps that must make room, so that the call order decides races.
    #[allow(clippy::type_complexity)]
    fn prepare_activation(
        &self,
        name: Option<&str>,
    ) -> Result<
        (
            u64,
            Option<AppController>,
            Vec<BoxFuture<'static, Result<(), AppError>>>,
        ),
        ContainerError,
    > {
        let mut registry = self.registry.lock();
        if registry.destroy.is_some() {
            return Err(self.destroyed());
        }
        let target = match name {
            None => None,
            Some(name) => match registry.find(name) {
                Some(app) => Some(app.clone()),
                None => {
                    drop(registry);
                    self.activation_failed(name);
                    return Err(ContainerError::AppNotFound {
                        name: name.to_string(),
                    });
                }
            },
        };

        registry.generation += 1;
        let previous = std::mem::replace(&mut registry.current_active, target.clone());
        let mut leaving: Vec<AppController> = Vec::new();
        for app in [previous, registry.current_mounted.clone()].into_iter().flatten() {
            if !same(target.as_ref(), &app) && !leaving.iter().any(|l| l.id() == app.id()) {
                leaving.push(app);
            }
        }
        let stops = leaving.iter().map(AppController::stop).collect();
        Ok((registry.generation, target, stops))
    }

    async fn complete_activation(
        &self,
        generation: u64,
        target: Option<AppController>,
        stops: Vec<BoxFuture<'static, Result<(), AppError>>>,
    ) -> Result<Option<AppController>, ContainerError> {
        for res in join_all(stops).await {
            match res {
                Ok(()) => {}
                Err(e) if e.is_interruption() => {
                    tracing::debug!(container = %self.name, error = %e, "stop superseded");
                }
                Err(e) => {
                    tracing::warn!(container = %self.name, error = %e, "previous app failed to stop");
                }
            }
        }
        self.still_latest(generation, target.as_ref())?;
        {
            let mut registry = self.registry.lock();
            if registry
                .current_mounted
                .as_ref()
                .is_some_and(|m| m.state() != AppState::Mounted)
            {
                registry.current_mounted = None;
            }
        }

        let Some(app) = target else {
            return Ok(None);
        };
        if let Err(e) = app.start().await {
            if e.is_interruption() {
                self.still_latest(generation, Some(&app))?;
            }
            return Err(ContainerError::App(e));
        }

        let mut registry = self.registry.lock();
        if registry.generation != generation {
            return Err(ContainerError::Interrupted {
                target: app.name().to_string(),
                by: registry.active_name(),
            });
        }
        registry.current_mounted = Some(app.clone());
        drop(registry);

        tracing::debug!(container = %self.name, app = app.name(), "app activated");
        self.bus.publish(
            Event::new(EventKind::AppActivated)
                .with_container(Arc::clone(&self.name))
                .with_app(app.name()),
        );
        Ok(Some(app))
    }

    fn still_latest(
        &self,
        generation: u64,
        target: Option<&AppController>,
    ) -> Result<(), ContainerError> {
        let registry = self.registry.lock();
        if registry.generation == generation {
            return Ok(());
        }
        if registry.destroy.is_some() {
            return Err(self.destroyed());
        }
        Err(ContainerError::Interrupted {
            target: target_name(target),
            by: registry.active_name(),
        })
    }
}

/// Forwards container and coordinator events to the subscribers until
/// `shutdown`, then drains the subscriber queues.
fn spawn_listener(
    subs: SubscriberSet,
    mut own: broadcast::Receiver<Event>,
    mut navigation: broadcast::Receiver<Event>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut navigation_open = true;
        loop {
            tokio::select! {
                biased;
                ev = own.recv() => match ev {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "container listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                ev = navigation.recv(), if navigation_open => match ev {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "container listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => navigation_open = false,
                },
                _ = shutdown.cancelled() => break,
            }
        }
        while let Ok(ev) = own.try_recv() {
            subs.emit(&ev);
        }
        subs.shutdown().await;
    })
}
