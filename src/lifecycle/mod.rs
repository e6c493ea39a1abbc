//! # App lifecycles.
//!
//! - [`Phase`] names the stages of a lifecycle.
//! - [`PhaseFn`] is one step of a phase array; closures implement it.
//! - [`Lifecycle`] bundles the arrays (`mount`/`unmount` required).
//! - [`SourceLoader`] produces a lifecycle; [`LoaderFn`] adapts closures.
//! - [`LifecycleRunner`] installs a lifecycle and runs its phases with
//!   budgets, panic isolation and per-phase extension points.

mod loader;
mod phase;
mod phase_fn;
mod runner;
mod spec;

pub use loader::{LoaderFn, SourceLoader};
pub use phase::Phase;
pub use phase_fn::{BoxPhaseFuture, MountProps, PhaseFn, PhaseFnRef};
pub use runner::{LifecycleRunner, PhaseContext, PhaseFailure, PhaseHooks, Traversal};
pub use spec::{Lifecycle, LifecycleBuilder};
