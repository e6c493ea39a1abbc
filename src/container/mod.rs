//! Containers: registries of apps sharing a mount root.
//!
//! - [`Container`] owns the apps, switches the active one and, in route mode,
//!   follows the [`NavigationCoordinator`](crate::NavigationCoordinator).
//! - [`ContainerBuilder`] wires the bus, subscribers and coordinator.
//! - [`RouteConfig`] holds route-mode settings (fallback and veto).

mod builder;
mod orchestrator;
mod roots;
mod routes;

pub use builder::ContainerBuilder;
pub use orchestrator::{ActivationFailure, Container, ContainerHooks};
pub use routes::RouteConfig;
