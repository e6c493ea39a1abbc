//! # mountvisor
//!
//! **Mountvisor** hosts several independently loaded sub-applications on one
//! mount root. It drives each app through a lifecycle state machine,
//! serializes conflicting operations, and makes every URL change wait for
//! the consent of the parties that render into the page.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   AppSpec    │   │   AppSpec    │   │   AppSpec    │
//!     │ (loader #1)  │   │ (loader #2)  │   │ (loader #3)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Container (one per mount root)                                   │
//! │  - Bus (broadcast events)                                         │
//! │  - Lock<AppId> (per-app FIFO, optional global capacity)           │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - activate_app: stop previous ─► start target                    │
//! └──────┬──────────────────┬──────────────────┬───────────────▲──────┘
//!        ▼                  ▼                  ▼               │ accept(nav)
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │ vote / count
//!     │AppController │   │AppController │   │AppController │   │
//!     │ load/start/  │   │              │   │              │   │
//!     │ stop/update/ │   │              │   │              │   │
//!     │ unload       │   │              │   │              │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ LifecycleRunner  │                  │                 │
//!      ▼                  ▼                  ▼                 │
//! ┌─────────────────────────────────────────────┐   ┌──────────┴────────────┐
//! │          Bus (broadcast channel)            │◄──│ NavigationCoordinator │
//! └──────────────────────┬──────────────────────┘   │ push / replace / pop  │
//!                        ▼                          │ VoteGate + ReadyBarrier│
//!               container listener                  │ ordered flush         │
//!                        ▼                          └──────────┬────────────┘
//!                  SubscriberSet                               ▼
//!               ┌────────┼────────┐                     HistoryBackend
//!               ▼        ▼        ▼                  (popstate / hashchange)
//!            worker1  worker2  workerN
//! ```
//!
//! ### App lifecycle
//! ```text
//! NOT_LOADED ─► LOADING_SOURCE_CODE ─┬─► NOT_BOOTSTRAPPED ─► BOOTSTRAPPING ─► NOT_MOUNTED ◄────┐
//!                                    └─► LOAD_ERROR (start() loads again)          │            │
//!                                                                                   ▼            │
//!                                                        UPDATING ◄──► MOUNTED ◄── MOUNTING   STOPPING
//!                                                                         │                     ▲
//!                                                                         └─────────────────────┘
//! failing bootstrap / mount / update ─► SKIP_BECAUSE_BROKEN
//! unload() ─► UNLOADING ─► NOT_LOADED   (start/update reject afterwards)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                                 |
//! |-------------------|----------------------------------------------------------------|----------------------------------------------------|
//! | **Lifecycles**    | Phase arrays loaded on demand, run with budgets.               | [`Lifecycle`], [`PhaseFn`], [`SourceLoader`]       |
//! | **Apps**          | State machine with top-task arbitration.                       | [`AppController`], [`AppState`], [`TaskKind`]      |
//! | **Containers**    | Root ownership, registration, activation, route mode.          | [`Container`], [`AppSpec`], [`RouteConfig`]        |
//! | **Navigation**    | Vote/ready consensus before history events fire.               | [`NavigationCoordinator`], [`NavigationConsumer`]  |
//! | **Extension**     | Typed hook slots, decision hooks.                              | [`Hook`], [`DecisionHook`]                         |
//! | **Subscriber API**| Queued observation of runtime events.                          | [`Subscribe`], [`Event`]                           |
//! | **Policies**      | Load retry spacing.                                            | [`RetryPolicy`], [`JitterPolicy`]                  |
//! | **Errors**        | Typed errors per layer.                                        | [`AppError`], [`ContainerError`], [`PhaseError`]   |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use mountvisor::{
//!     AppSpec, AppState, Container, ContainerConfig, Lifecycle, LoaderFn, MountProps, PhaseError,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = LoaderFn::arc(|_name: Arc<str>| async {
//!         Ok::<_, PhaseError>(
//!             Lifecycle::builder()
//!                 .mount(|p: MountProps| async move {
//!                     println!("mounting {} into {}", p.name, p.root);
//!                     Ok::<(), PhaseError>(())
//!                 })
//!                 .unmount(|_p: MountProps| async { Ok::<(), PhaseError>(()) })
//!                 .build(),
//!         )
//!     });
//!
//!     let container = Container::builder("shell", "#app", ContainerConfig::default()).build()?;
//!     container.register_app(AppSpec::new("hello", loader))?;
//!
//!     let app = container.activate_app(Some("hello")).await?.expect("target app");
//!     assert_eq!(app.state(), AppState::Mounted);
//!
//!     container.destroy().await?;
//!     Ok(())
//! }
//! ```
mod app;
mod config;
mod container;
mod error;
mod events;
mod hooks;
mod lifecycle;
mod navigation;
mod policies;
mod subscribers;
mod sync;

// ---- Public re-exports ----

pub use app::{
    ActiveWhen, AppController, AppHooks, AppId, AppSpec, AppState, AppStatus, LoadContext,
    LoadFailure, TaskKind,
};
pub use config::{AppConfig, ContainerConfig, NavigationConfig, PhaseTimeouts};
pub use container::{ActivationFailure, Container, ContainerBuilder, ContainerHooks, RouteConfig};
pub use error::{AppError, ContainerError, NavigationError, PhaseError};
pub use events::{Bus, Event, EventKind};
pub use hooks::{DecisionHook, Hook, TapId};
pub use lifecycle::{
    BoxPhaseFuture, Lifecycle, LifecycleBuilder, LifecycleRunner, LoaderFn, MountProps, Phase,
    PhaseContext, PhaseFailure, PhaseFn, PhaseFnRef, PhaseHooks, SourceLoader, Traversal,
};
pub use navigation::{
    ConsumerId, DeadLoop, HistoryBackend, HistoryWrite, Location, MemoryHistory,
    NavEvent, NavigationConsumer, NavigationCoordinator, NavigationDescriptor, NavigationHandle,
    NavigationHooks, NavigationMode, NavigationOutcome, RouterNavigation,
};
pub use policies::{JitterPolicy, RetryPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use sync::{GateOutcome, Lock, ReadyBarrier, ReadyCounter, VoteController, VoteGate};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
