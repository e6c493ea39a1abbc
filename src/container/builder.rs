//! # ContainerBuilder: wires a [`Container`] together.
//!
//! ```text
//! Container::builder(name, root, cfg)
//!     .with_subscribers(..) .routes(..) .coordinator(..)
//!     .build() ─► claim root ─► Bus + SubscriberSet ─► listener task
//! ```

use std::sync::Arc;

use super::orchestrator::Container;
use super::roots::RootClaim;
use super::routes::RouteConfig;
use crate::config::ContainerConfig;
use crate::error::ContainerError;
use crate::events::Bus;
use crate::navigation::NavigationCoordinator;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Container`].
pub struct ContainerBuilder {
    name: Arc<str>,
    root: Arc<str>,
    cfg: ContainerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    routes: Option<RouteConfig>,
    coordinator: Option<NavigationCoordinator>,
}

impl Container {
    /// Starts building container `name` attached to `root`.
    pub fn builder(
        name: impl Into<Arc<str>>,
        root: impl Into<Arc<str>>,
        cfg: ContainerConfig,
    ) -> ContainerBuilder {
        ContainerBuilder {
            name: name.into(),
            root: root.into(),
            cfg,
            subscribers: Vec::new(),
            routes: None,
            coordinator: None,
        }
    }
}

impl ContainerBuilder {
    /// Sets event subscribers.
    ///
    /// Subscribers receive the events of the container, its apps and its
    /// coordinator through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Makes the container route-driven.
    pub fn routes(mut self, routes: RouteConfig) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Uses `coordinator` instead of [`NavigationCoordinator::global`].
    pub fn coordinator(mut self, coordinator: NavigationCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Claims the root and starts the event listener.
    ///
    /// Fails with [`ContainerError::RootInUse`] when another live container
    /// holds the root. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Container, ContainerError> {
        let claim = RootClaim::acquire(self.root)?;
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let coordinator = self
            .coordinator
            .unwrap_or_else(NavigationCoordinator::global);

        Ok(Container::assemble(
            self.name,
            claim,
            self.cfg,
            subs,
            bus,
            self.routes,
            coordinator,
        ))
    }
}
